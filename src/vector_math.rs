use ndarray::ArrayView1;

/// Cosine similarity in [-1, 1].
///
/// Returns 0 when either vector has zero norm, and 0 on dimensionality
/// mismatch (the index guarantees a fixed dimension per deployment, so a
/// mismatch means the unit is unusable, not that the caller should crash).
pub fn cosine_similarity(query: &[f32], candidate: &[f32]) -> f32 {
    if query.is_empty() || query.len() != candidate.len() {
        return 0.0;
    }

    let query = ArrayView1::from(query);
    let candidate = ArrayView1::from(candidate);

    let denom = query.dot(&query).sqrt() * candidate.dot(&candidate).sqrt();
    if denom <= f32::EPSILON {
        return 0.0;
    }

    (query.dot(&candidate) / denom).clamp(-1.0, 1.0)
}

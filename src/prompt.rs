//! Prompt assembly.
//!
//! `assemble` is a pure function from (query, history, candidates, system
//! instructions) to an ordered sequence of role-tagged segments. Rendering
//! that sequence into engine text is a separate concern: `PromptFormat`
//! owns the role-delimiter convention, the matching stop sequences, and the
//! scrubbing of delimiters the engine leaks past its stop condition.

use serde::{Deserialize, Serialize};

use crate::index::RetrievalCandidate;
use crate::store::{ChatRole, ConversationTurn};

/// Substituted for the context block when retrieval came back empty, so the
/// model is never handed a silently empty context section.
pub const NO_CONTEXT_PLACEHOLDER: &str =
    "No relevant documents were found for this question; answer from general knowledge only.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub struct PromptSegment {
    pub role: PromptRole,
    pub text: String,
}

/// An assembled prompt: ordered segments, not yet serialized.
#[derive(Debug, Clone, Default)]
pub struct Prompt {
    pub segments: Vec<PromptSegment>,
}

/// Builds the prompt for one exchange.
///
/// System instructions appear exactly once, on the first turn of a session
/// (`history` empty), and never again. The current user segment carries the
/// retrieved context and the ORIGINAL query text: rewriting steers retrieval
/// only and must never change what the model sees as the user's utterance.
pub fn assemble(
    query: &str,
    history: &[ConversationTurn],
    candidates: &[RetrievalCandidate],
    system_instructions: &str,
) -> Prompt {
    let mut segments = Vec::new();

    if history.is_empty() && !system_instructions.trim().is_empty() {
        segments.push(PromptSegment {
            role: PromptRole::System,
            text: system_instructions.trim().to_string(),
        });
    }

    for turn in history {
        segments.push(PromptSegment {
            role: match turn.role {
                ChatRole::User => PromptRole::User,
                ChatRole::Assistant => PromptRole::Assistant,
            },
            text: turn.text.clone(),
        });
    }

    segments.push(PromptSegment {
        role: PromptRole::User,
        text: render_user_turn(query, candidates),
    });

    Prompt { segments }
}

fn render_user_turn(query: &str, candidates: &[RetrievalCandidate]) -> String {
    let mut text = String::from("Context:\n");

    if candidates.is_empty() {
        text.push_str(NO_CONTEXT_PLACEHOLDER);
    } else {
        for (i, candidate) in candidates.iter().enumerate() {
            if i > 0 {
                text.push_str("\n\n");
            }
            text.push_str(&format!(
                "Source Chunk {} ({:.2}):\n{}",
                i + 1,
                candidate.score,
                candidate.unit.text
            ));
        }
    }

    text.push_str("\n\nQuestion: ");
    text.push_str(query);
    text
}

/// Role-delimiter convention of the target engine.
///
/// Opaque to the rest of the pipeline: assembly produces segments, and one
/// of these serializes them, supplies the stop strings that halt generation
/// at the next-turn boundary, and scrubs anything that leaks past it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptFormat {
    /// `<start_of_turn>user` / `<start_of_turn>model` (Gemma-family).
    Gemma,
    /// `<|im_start|>role` / `<|im_end|>` (ChatML-family).
    ChatMl,
}

impl PromptFormat {
    pub fn render(&self, prompt: &Prompt) -> String {
        match self {
            PromptFormat::Gemma => render_gemma(prompt),
            PromptFormat::ChatMl => render_chatml(prompt),
        }
    }

    /// Stop strings handed to the engine so generation halts exactly where
    /// the model would start impersonating the next turn.
    pub fn stop_sequences(&self) -> Vec<String> {
        match self {
            PromptFormat::Gemma => vec!["<end_of_turn>".to_string(), "<start_of_turn>".to_string()],
            PromptFormat::ChatMl => vec!["<|im_end|>".to_string(), "<|im_start|>".to_string()],
        }
    }

    /// Cleans generated text: cuts at the first leaked delimiter (dropping
    /// any impersonated next turn after it) and strips a bare role label the
    /// runtime left behind when it consumed the delimiter itself.
    pub fn scrub(&self, raw: &str) -> String {
        let markers: &[&str] = match self {
            PromptFormat::Gemma => &["<end_of_turn>", "<start_of_turn>"],
            PromptFormat::ChatMl => &["<|im_end|>", "<|im_start|>"],
        };

        // Cutting at the earliest marker also drops any impersonated turn
        // that follows it.
        let mut text = raw;
        if let Some(pos) = markers.iter().filter_map(|m| text.find(m)).min() {
            text = &text[..pos];
        }

        let mut cleaned = text.trim().to_string();
        if let Some(last_newline) = cleaned.rfind('\n') {
            let last_line = cleaned[last_newline + 1..].trim();
            if matches!(last_line, "user" | "model" | "assistant" | "system") {
                cleaned.truncate(last_newline);
                cleaned.truncate(cleaned.trim_end().len());
            }
        }

        cleaned
    }
}

fn render_gemma(prompt: &Prompt) -> String {
    let mut out = String::new();
    // Gemma has no system role: fold instructions into the first user turn.
    let mut pending_system: Option<&str> = None;

    for segment in &prompt.segments {
        match segment.role {
            PromptRole::System => pending_system = Some(&segment.text),
            PromptRole::User => {
                out.push_str("<start_of_turn>user\n");
                if let Some(system) = pending_system.take() {
                    out.push_str(system);
                    out.push_str("\n\n");
                }
                out.push_str(&segment.text);
                out.push_str("<end_of_turn>\n");
            }
            PromptRole::Assistant => {
                out.push_str("<start_of_turn>model\n");
                out.push_str(&segment.text);
                out.push_str("<end_of_turn>\n");
            }
        }
    }

    out.push_str("<start_of_turn>model\n");
    out
}

fn render_chatml(prompt: &Prompt) -> String {
    let mut out = String::new();

    for segment in &prompt.segments {
        let role = match segment.role {
            PromptRole::System => "system",
            PromptRole::User => "user",
            PromptRole::Assistant => "assistant",
        };
        out.push_str(&format!("<|im_start|>{}\n{}<|im_end|>\n", role, segment.text));
    }

    out.push_str("<|im_start|>assistant\n");
    out
}

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::chunker::ChunkRequest;
use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn status(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let units = state.pipeline.unit_count().await?;
    let engine_healthy = state.pipeline.engine_healthy().await;

    Ok(Json(json!({
        "units": units,
        "engine": state.engine.name(),
        "engine_healthy": engine_healthy,
    })))
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub reply: String,
}

pub async fn query(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let reply = state.pipeline.answer_query(&request.query, None).await?;
    Ok(Json(QueryResponse { reply }))
}

pub async fn ingest(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChunkRequest>,
) -> Result<Json<Value>, ApiError> {
    let units = state.pipeline.ingest(request).await?;
    Ok(Json(json!({ "units": units })))
}

#[derive(Debug, Deserialize)]
pub struct IngestOnceRequest {
    pub key: String,
    pub source: ChunkRequest,
}

pub async fn ingest_once(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IngestOnceRequest>,
) -> Result<Json<Value>, ApiError> {
    match state.pipeline.ingest_once(&request.key, request.source).await? {
        Some(units) => Ok(Json(json!({ "units": units, "skipped": false }))),
        None => Ok(Json(json!({ "units": 0, "skipped": true }))),
    }
}

pub async fn list_units(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let units = state.pipeline.list_units().await?;
    let listing: Vec<Value> = units
        .iter()
        .map(|unit| json!({ "id": unit.id, "text": unit.text }))
        .collect();
    Ok(Json(json!({ "units": listing })))
}

pub async fn delete_unit(
    State(state): State<Arc<AppState>>,
    Path(unit_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !state.pipeline.delete_unit(&unit_id).await? {
        return Err(ApiError::NotFound(format!("unit {}", unit_id)));
    }
    Ok(Json(json!({ "deleted": unit_id })))
}

pub async fn clear_units(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let removed = state.pipeline.clear_units().await?;
    Ok(Json(json!({ "removed": removed })))
}

pub async fn reset_session(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    state.pipeline.reset_session().await?;
    Ok(Json(json!({ "reset": true })))
}

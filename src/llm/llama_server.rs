//! HTTP binding to a local llama.cpp-compatible inference server.
//!
//! Talks to the native `/completion` endpoint (prompt in, text out) and the
//! OpenAI-compatible `/v1/embeddings` endpoint. Model loading and lifecycle
//! belong to the server process, not this crate.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::engine::GenerationEngine;
use super::types::CompletionRequest;
use crate::core::errors::ApiError;

#[derive(Clone)]
pub struct LlamaServerEngine {
    base_url: String,
    client: Client,
}

impl LlamaServerEngine {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    fn completion_body(request: &CompletionRequest, stream: bool) -> Value {
        let mut body = json!({
            "prompt": request.prompt,
            "stream": stream,
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(n) = request.max_tokens {
                obj.insert("n_predict".to_string(), json!(n));
            }
            if let Some(t) = request.temperature {
                obj.insert("temperature".to_string(), json!(t));
            }
            if let Some(t) = request.top_p {
                obj.insert("top_p".to_string(), json!(t));
            }
            if let Some(t) = request.top_k {
                obj.insert("top_k".to_string(), json!(t));
            }
            if !request.stop.is_empty() {
                obj.insert("stop".to_string(), json!(request.stop));
            }
        }

        body
    }
}

#[async_trait]
impl GenerationEngine for LlamaServerEngine {
    fn name(&self) -> &str {
        "llama_server"
    }

    async fn health_check(&self) -> Result<bool, ApiError> {
        let url = format!("{}/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, ApiError> {
        let url = format!("{}/completion", self.base_url);
        let body = Self::completion_body(&request, false);

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::engine)?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Engine(format!("completion error: {}", text)));
        }

        let payload: Value = res.json().await.map_err(ApiError::engine)?;
        Ok(payload["content"].as_str().unwrap_or_default().to_string())
    }

    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
        let url = format!("{}/completion", self.base_url);
        let body = Self::completion_body(&request, true);

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::engine)?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Engine(format!("stream error: {}", text)));
        }

        let (tx, rx) = mpsc::channel(32);
        let mut stream = res.bytes_stream();

        tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(bytes) => {
                        let chunk_str = String::from_utf8_lossy(&bytes);
                        for line in chunk_str.lines() {
                            let line = line.trim();
                            let Some(data) = line.strip_prefix("data: ") else {
                                continue;
                            };

                            let Ok(event) = serde_json::from_str::<Value>(data) else {
                                continue;
                            };

                            if let Some(content) = event["content"].as_str() {
                                if !content.is_empty()
                                    && tx.send(Ok(content.to_string())).await.is_err()
                                {
                                    return;
                                }
                            }
                            if event["stop"].as_bool() == Some(true) {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(ApiError::engine(e))).await;
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let body = json!({ "input": inputs });

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::engine)?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Engine(format!("embedding error: {}", text)));
        }

        let payload: Value = res.json().await.map_err(ApiError::engine)?;

        let mut embeddings = Vec::new();
        if let Some(data) = payload["data"].as_array() {
            for item in data {
                if let Some(vals) = item["embedding"].as_array() {
                    let vec: Vec<f32> = vals
                        .iter()
                        .filter_map(|v| v.as_f64().map(|f| f as f32))
                        .collect();
                    embeddings.push(vec);
                }
            }
        }

        if embeddings.len() != inputs.len() {
            return Err(ApiError::Engine(format!(
                "expected {} embeddings, got {}",
                inputs.len(),
                embeddings.len()
            )));
        }

        Ok(embeddings)
    }
}

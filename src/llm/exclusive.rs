//! Serialized access to the shared generation engine.
//!
//! The engine holds mutable inference state, so a session may have at most
//! one call (rewrite, main completion or embedding) in flight. Every caller
//! goes through this gate; for streams the permit is held by the pump task
//! until the token stream drains.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use super::engine::GenerationEngine;
use super::types::CompletionRequest;
use crate::core::errors::ApiError;

#[derive(Clone)]
pub struct ExclusiveEngine {
    inner: Arc<dyn GenerationEngine>,
    gate: Arc<Mutex<()>>,
}

impl ExclusiveEngine {
    pub fn new(inner: Arc<dyn GenerationEngine>) -> Self {
        Self {
            inner,
            gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub async fn health_check(&self) -> Result<bool, ApiError> {
        self.inner.health_check().await
    }

    pub async fn complete(&self, request: CompletionRequest) -> Result<String, ApiError> {
        let _permit = self.gate.lock().await;
        self.inner.complete(request).await
    }

    pub async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        let _permit = self.gate.lock().await;
        self.inner.embed(inputs).await
    }

    pub async fn stream(
        &self,
        request: CompletionRequest,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
        let permit = self.gate.clone().lock_owned().await;
        let mut inner_rx = self.inner.stream(request).await?;

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            // The permit rides with the pump so the engine stays exclusive
            // until this stream is exhausted.
            let _permit = permit;
            while let Some(item) = inner_rx.recv().await {
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;

    /// Records the highest number of concurrent calls it ever saw.
    struct CountingEngine {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl CountingEngine {
        fn new() -> Self {
            Self {
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }

        fn enter(&self) {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
        }

        fn exit(&self) {
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl GenerationEngine for CountingEngine {
        fn name(&self) -> &str {
            "counting"
        }

        async fn health_check(&self) -> Result<bool, ApiError> {
            Ok(true)
        }

        async fn complete(&self, _request: CompletionRequest) -> Result<String, ApiError> {
            self.enter();
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            self.exit();
            Ok("done".to_string())
        }

        async fn stream(
            &self,
            _request: CompletionRequest,
        ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
            let (tx, rx) = mpsc::channel(4);
            tokio::spawn(async move {
                let _ = tx.send(Ok("tok".to_string())).await;
            });
            Ok(rx)
        }

        async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
            self.enter();
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            self.exit();
            Ok(inputs.iter().map(|_| vec![0.0]).collect())
        }
    }

    #[tokio::test]
    async fn concurrent_calls_are_serialized() {
        let engine = Arc::new(CountingEngine::new());
        let exclusive = ExclusiveEngine::new(engine.clone());

        let mut handles = Vec::new();
        for _ in 0..4 {
            let exclusive = exclusive.clone();
            handles.push(tokio::spawn(async move {
                exclusive
                    .complete(CompletionRequest::new("hi"))
                    .await
                    .unwrap();
                exclusive.embed(&["x".to_string()]).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(engine.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stream_forwards_tokens_in_order() {
        let exclusive = ExclusiveEngine::new(Arc::new(CountingEngine::new()));
        let mut rx = exclusive.stream(CompletionRequest::new("hi")).await.unwrap();

        let first = rx.recv().await.unwrap().unwrap();
        assert_eq!(first, "tok");
        assert!(rx.recv().await.is_none());
    }
}

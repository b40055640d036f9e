//! End-to-end pipeline scenarios against a scripted in-process engine.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use moneta_backend::chunker::ChunkRequest;
use moneta_backend::core::config::AppConfig;
use moneta_backend::core::errors::ApiError;
use moneta_backend::llm::{CompletionRequest, ExclusiveEngine, GenerationEngine};
use moneta_backend::pipeline::RagPipeline;
use moneta_backend::prompt::NO_CONTEXT_PLACEHOLDER;
use moneta_backend::store::{ChatRole, RecordStore, SqliteStore};

/// Deterministic engine: embeddings by substring needle, one canned rewrite
/// reply, one canned token stream. Records every prompt it sees.
struct ScriptedEngine {
    needles: Vec<(&'static str, Vec<f32>)>,
    default_vector: Vec<f32>,
    rewrite_reply: Option<&'static str>,
    answer_tokens: Vec<&'static str>,
    embed_inputs: Mutex<Vec<String>>,
    completed_prompts: Mutex<Vec<String>>,
    streamed_prompts: Mutex<Vec<String>>,
}

impl ScriptedEngine {
    fn new(
        needles: Vec<(&'static str, Vec<f32>)>,
        rewrite_reply: Option<&'static str>,
        answer_tokens: Vec<&'static str>,
    ) -> Arc<Self> {
        Arc::new(Self {
            needles,
            default_vector: vec![0.0, 0.0],
            rewrite_reply,
            answer_tokens,
            embed_inputs: Mutex::new(Vec::new()),
            completed_prompts: Mutex::new(Vec::new()),
            streamed_prompts: Mutex::new(Vec::new()),
        })
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        for (needle, vector) in &self.needles {
            if text.contains(needle) {
                return vector.clone();
            }
        }
        self.default_vector.clone()
    }

    fn last_streamed_prompt(&self) -> String {
        self.streamed_prompts.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl GenerationEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn health_check(&self) -> Result<bool, ApiError> {
        Ok(true)
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, ApiError> {
        self.completed_prompts.lock().unwrap().push(request.prompt);
        match self.rewrite_reply {
            Some(reply) => Ok(reply.to_string()),
            None => Err(ApiError::Engine("no scripted completion".to_string())),
        }
    }

    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
        self.streamed_prompts.lock().unwrap().push(request.prompt);

        let (tx, rx) = mpsc::channel(16);
        let tokens: Vec<String> = self.answer_tokens.iter().map(|t| t.to_string()).collect();
        tokio::spawn(async move {
            for token in tokens {
                if tx.send(Ok(token)).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        let mut recorded = self.embed_inputs.lock().unwrap();
        let mut vectors = Vec::new();
        for input in inputs {
            recorded.push(input.clone());
            vectors.push(self.vector_for(input));
        }
        Ok(vectors)
    }
}

async fn build_pipeline(
    engine: Arc<ScriptedEngine>,
    config: AppConfig,
) -> (RagPipeline, Arc<dyn RecordStore>) {
    let tmp = std::env::temp_dir().join(format!("moneta-e2e-{}.db", uuid::Uuid::new_v4()));
    let store: Arc<dyn RecordStore> = Arc::new(SqliteStore::open(tmp).await.unwrap());
    let pipeline = RagPipeline::new(store.clone(), ExclusiveEngine::new(engine), &config).unwrap();
    (pipeline, store)
}

fn base_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.system_instructions = "SYSTEM RULES".to_string();
    config.retrieval.min_score = None;
    config.generation.flush_every_tokens = 1;
    config
}

const STATEMENT: &str = "Account Summary: checking and savings, combined balance $3,410.02.\n\
\n\
October 2025 Transaction History: groceries $154.20, rent $1,200.00.";

#[tokio::test]
async fn ingested_statement_is_retrieved_ranked_and_answered() {
    let engine = ScriptedEngine::new(
        vec![
            ("Account Summary", vec![1.0, 0.0]),
            ("Transaction History", vec![0.6, 0.8]),
            ("balance right now", vec![0.9, 0.1]),
        ],
        None,
        vec!["Your combined balance ", "is $3,410.02."],
    );
    let (pipeline, _store) = build_pipeline(engine.clone(), base_config()).await;

    let ingested = pipeline
        .ingest(ChunkRequest::Paragraph {
            text: STATEMENT.to_string(),
        })
        .await
        .unwrap();
    assert_eq!(ingested, 2);

    let (tx, mut rx) = mpsc::channel(32);
    let reply = pipeline
        .answer_query("What is my balance right now?", Some(tx))
        .await
        .unwrap();
    assert_eq!(reply, "Your combined balance is $3,410.02.");

    let mut streamed = String::new();
    while let Some(batch) = rx.recv().await {
        streamed.push_str(&batch);
    }
    assert_eq!(streamed, reply);

    let prompt = engine.last_streamed_prompt();
    // Both units retrieved; the summary unit is the better match and must
    // rank first.
    let summary_pos = prompt.find("Account Summary").unwrap();
    let history_pos = prompt.find("October 2025 Transaction History").unwrap();
    assert!(prompt.contains("Source Chunk 1"));
    assert!(prompt.contains("Source Chunk 2"));
    assert!(summary_pos < history_pos);

    // First turn of the session: system instructions appear exactly once.
    assert_eq!(prompt.matches("SYSTEM RULES").count(), 1);
    assert!(prompt.contains("Question: What is my balance right now?"));
}

#[tokio::test]
async fn below_threshold_retrieval_is_empty_and_prompt_says_so() {
    // cosine([1,0], [0.3, 0.954]) is 0.30, below the 0.45 threshold.
    let engine = ScriptedEngine::new(
        vec![
            ("Account Summary", vec![1.0, 0.0]),
            ("unrelated topic", vec![0.3, 0.954]),
        ],
        None,
        vec!["General knowledge answer."],
    );

    let mut config = base_config();
    config.retrieval.min_score = Some(0.45);
    let (pipeline, _store) = build_pipeline(engine.clone(), config).await;

    pipeline
        .ingest(ChunkRequest::Paragraph {
            text: "Account Summary: balances.".to_string(),
        })
        .await
        .unwrap();

    let reply = pipeline
        .answer_query("Tell me about an unrelated topic, please.", None)
        .await
        .unwrap();
    assert_eq!(reply, "General knowledge answer.");

    let prompt = engine.last_streamed_prompt();
    assert!(prompt.contains(NO_CONTEXT_PLACEHOLDER));
    assert!(!prompt.contains("Source Chunk"));
}

#[tokio::test]
async fn ambiguous_query_rewrites_retrieval_but_not_the_user_turn() {
    let engine = ScriptedEngine::new(
        vec![("October groceries", vec![1.0, 0.0])],
        Some("How much did I spend on October groceries?"),
        vec!["$154.20 in total."],
    );
    let (pipeline, store) = build_pipeline(engine.clone(), base_config()).await;

    pipeline
        .ingest(ChunkRequest::Paragraph {
            text: "October groceries came to $154.20 across six trips.".to_string(),
        })
        .await
        .unwrap();

    // Prior exchange that the anaphor points back into.
    store
        .append_turn(ChatRole::User, "Show my October groceries")
        .await
        .unwrap();
    store
        .append_turn(ChatRole::Assistant, "Six trips, $154.20 total.")
        .await
        .unwrap();

    let original = "How much did I spend on that?";
    let reply = pipeline.answer_query(original, None).await.unwrap();
    assert_eq!(reply, "$154.20 in total.");

    // Retrieval used the rewrite, not the literal query.
    let embeds = engine.embed_inputs.lock().unwrap().clone();
    assert!(embeds
        .iter()
        .any(|text| text == "How much did I spend on October groceries?"));

    // The rendered user turn carries the original query verbatim, and the
    // follow-up turn omits the system instructions.
    let prompt = engine.last_streamed_prompt();
    assert!(prompt.contains("Question: How much did I spend on that?"));
    assert!(!prompt.contains("Question: How much did I spend on October groceries?"));
    assert_eq!(prompt.matches("SYSTEM RULES").count(), 0);
}

#[tokio::test]
async fn answered_exchange_lands_in_memory_in_order() {
    let engine = ScriptedEngine::new(vec![], None, vec!["Reply."]);
    let (pipeline, store) = build_pipeline(engine, base_config()).await;

    pipeline
        .ingest(ChunkRequest::Paragraph {
            text: "Some context.".to_string(),
        })
        .await
        .unwrap();

    pipeline.answer_query("First question, long enough.", None).await.unwrap();

    let turns = store.list_turns(10).await.unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].role, ChatRole::User);
    assert_eq!(turns[0].text, "First question, long enough.");
    assert_eq!(turns[1].role, ChatRole::Assistant);
    assert_eq!(turns[1].text, "Reply.");

    pipeline.reset_session().await.unwrap();
    assert!(store.list_turns(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn empty_source_is_an_ingestion_error() {
    let engine = ScriptedEngine::new(vec![], None, vec![]);
    let (pipeline, _store) = build_pipeline(engine, base_config()).await;

    let result = pipeline
        .ingest(ChunkRequest::Paragraph {
            text: "   \n\n   ".to_string(),
        })
        .await;
    assert!(matches!(result, Err(ApiError::Ingestion(_))));
}

#[tokio::test]
async fn ingest_once_runs_only_until_the_flag_is_set() {
    let engine = ScriptedEngine::new(vec![], None, vec![]);
    let (pipeline, _store) = build_pipeline(engine, base_config()).await;

    let request = ChunkRequest::Paragraph {
        text: "Seed statement.".to_string(),
    };

    let first = pipeline.ingest_once("seed.v1", request.clone()).await.unwrap();
    assert_eq!(first, Some(1));

    let second = pipeline.ingest_once("seed.v1", request).await.unwrap();
    assert_eq!(second, None);
    assert_eq!(pipeline.unit_count().await.unwrap(), 1);
}

#[tokio::test]
async fn deleting_a_unit_removes_it_from_later_answers() {
    let engine = ScriptedEngine::new(
        vec![("fee schedule", vec![1.0, 0.0])],
        None,
        vec!["ok"],
    );
    let (pipeline, _store) = build_pipeline(engine.clone(), base_config()).await;

    pipeline
        .ingest(ChunkRequest::Paragraph {
            text: "fee schedule: $5 monthly".to_string(),
        })
        .await
        .unwrap();

    let units = pipeline.list_units().await.unwrap();
    assert_eq!(units.len(), 1);
    pipeline.delete_unit(&units[0].id).await.unwrap();
    assert!(pipeline.list_units().await.unwrap().is_empty());

    pipeline
        .answer_query("What is the fee schedule for checking?", None)
        .await
        .unwrap();
    let prompt = engine.last_streamed_prompt();
    assert!(prompt.contains(NO_CONTEXT_PLACEHOLDER));
}

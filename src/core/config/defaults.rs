//! Baked-in configuration defaults.
//!
//! Every tunable here is a deployment knob, not a semantic constant: tests
//! and embedders override them freely through `AppConfig`.

pub const DEFAULT_ENGINE_BASE_URL: &str = "http://127.0.0.1:8088";

pub const DEFAULT_FIXED_WIDTH_CHARS: usize = 500;

pub const DEFAULT_TOP_K: usize = 4;
pub const DEFAULT_MIN_SCORE: f32 = 0.45;

pub const DEFAULT_MIN_QUERY_CHARS: usize = 12;
pub const DEFAULT_MIN_REWRITE_CHARS: usize = 5;
pub const DEFAULT_REWRITE_HISTORY_WINDOW: usize = 6;
pub const DEFAULT_REWRITE_MAX_TOKENS: u32 = 64;

pub const DEFAULT_GENERATION_MAX_TOKENS: u32 = 512;
pub const DEFAULT_GENERATION_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_FLUSH_EVERY_TOKENS: usize = 1;

pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Anaphoric reference words that mark a query as under-specified
/// without surrounding conversation.
pub fn default_trigger_words() -> Vec<String> {
    ["that", "this", "it", "those", "them", "these", "one"]
        .iter()
        .map(|w| w.to_string())
        .collect()
}

pub fn default_system_instructions() -> String {
    "You are Moneta, a personal finance assistant running entirely on the \
     user's device. Answer questions about the user's accounts and \
     transactions using the provided source chunks. Be concise and concrete; \
     quote amounts and dates exactly as they appear in the sources. If the \
     sources do not cover the question, say so and answer from general \
     knowledge."
        .to_string()
}

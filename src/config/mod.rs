// src/config/mod.rs
// All values come from the environment (with a .env file loaded first);
// defaults keep a local single-node deployment working out of the box.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    // ── Embedding API
    pub embedding_base_url: String,
    pub embedding_api_key: String,
    pub embedding_model: String,
    pub embedding_dim: usize,

    // ── Profile storage
    pub profile_dir: String,
    pub embed_dir: String,

    // ── Qdrant
    pub qdrant_url: String,
    pub qdrant_collection: String,
    pub qdrant_timeout: u64,

    // ── Retrieval
    pub search_k: usize,
    pub recent_history_limit: usize,
}

fn env_var_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    match std::env::var(key) {
        Ok(val) => {
            // Tolerate trailing comments and whitespace in .env values
            let clean = val.split('#').next().unwrap_or("").trim();
            clean.parse::<T>().unwrap_or(default)
        }
        Err(_) => default,
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self {
            embedding_base_url: env_var_or(
                "EMBEDDING_BASE_URL",
                "https://api.openai.com".to_string(),
            ),
            embedding_api_key: env_var_or("EMBEDDING_API_KEY", String::new()),
            embedding_model: env_var_or(
                "EMBEDDING_MODEL",
                "text-embedding-3-large".to_string(),
            ),
            embedding_dim: env_var_or("EMBEDDING_DIM", 768),
            profile_dir: env_var_or("PROFILE_DIR", "./data/profiles".to_string()),
            embed_dir: env_var_or("EMBED_DIR", "./data/embed".to_string()),
            qdrant_url: env_var_or("QDRANT_URL", "http://localhost:6333".to_string()),
            qdrant_collection: env_var_or(
                "QDRANT_COLLECTION",
                "conversation_messages".to_string(),
            ),
            qdrant_timeout: env_var_or("QDRANT_TIMEOUT", 30),
            search_k: env_var_or("SEARCH_K", 3),
            recent_history_limit: env_var_or("RECENT_HISTORY_LIMIT", 10),
        }
    }
}

pub static CONFIG: Lazy<EngineConfig> = Lazy::new(EngineConfig::from_env);

/// Sampling options recognized by the generation capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: usize,
    pub num_beams: usize,
    pub max_new_tokens: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            top_p: 0.7,
            top_k: 40,
            num_beams: 3,
            max_new_tokens: 512,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_var_or_falls_back_on_garbage() {
        std::env::set_var("MIMIC_TEST_NUM", "not a number");
        let v: usize = env_var_or("MIMIC_TEST_NUM", 7);
        assert_eq!(v, 7);
        std::env::remove_var("MIMIC_TEST_NUM");
    }

    #[test]
    fn env_var_or_strips_inline_comment() {
        std::env::set_var("MIMIC_TEST_K", "5 # top-k");
        let v: usize = env_var_or("MIMIC_TEST_K", 1);
        assert_eq!(v, 5);
        std::env::remove_var("MIMIC_TEST_K");
    }

    #[test]
    fn sampling_defaults() {
        let s = SamplingConfig::default();
        assert_eq!(s.num_beams, 3);
        assert_eq!(s.max_new_tokens, 512);
    }
}

// src/matcher.rs

//! Persona disambiguation for requests that name no explicit character.
//!
//! Ranks every profile body against the intent phrase by cosine similarity
//! in the provider's embedding space. This is a second, throwaway embedding
//! of the profile text, independent of the persisted identity vector used
//! for conditioning.

use std::sync::Arc;

use tracing::{debug, info};

use crate::embedding::{utils::cosine_similarity, EmbeddingProvider};
use crate::error::{EngineError, Result};
use crate::profile::ProfileRepository;

pub struct CharacterMatcher {
    provider: Arc<dyn EmbeddingProvider>,
    profiles: Arc<ProfileRepository>,
}

impl CharacterMatcher {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, profiles: Arc<ProfileRepository>) -> Self {
        Self { provider, profiles }
    }

    /// Pick the persona whose profile best matches the intent phrase.
    /// Ties go to the first candidate in the repository's stable order.
    pub async fn match_persona(&self, intent_phrase: &str) -> Result<String> {
        let candidates = self.profiles.list_profiles().await?;

        if candidates.is_empty() {
            return Err(EngineError::NoPersonasAvailable);
        }
        if candidates.len() == 1 {
            debug!(persona = %candidates[0].name, "single profile, skipping similarity");
            return Ok(candidates[0].name.clone());
        }

        let intent = self.provider.embed(intent_phrase).await?;
        let bodies: Vec<String> = candidates.iter().map(|p| p.body.clone()).collect();
        let profile_embeddings = self.provider.embed_batch(&bodies).await?;

        let mut best_idx = 0;
        let mut best_score = f32::MIN;
        for (idx, embedding) in profile_embeddings.iter().enumerate() {
            let score = cosine_similarity(&intent, embedding);
            debug!(persona = %candidates[idx].name, score, "matcher candidate");
            // Strict `>` keeps the first-encountered candidate on ties
            if score > best_score {
                best_score = score;
                best_idx = idx;
            }
        }

        let name = candidates[best_idx].name.clone();
        info!(persona = %name, score = best_score, "matched persona from intent phrase");
        Ok(name)
    }
}

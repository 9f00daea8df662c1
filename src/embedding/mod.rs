// src/embedding/mod.rs

//! The text-embedding seam and the vector math used by ranking.
//! All embedding goes through the `EmbeddingProvider` trait — no direct
//! HTTP calls in business logic.

pub mod openai;

pub use openai::OpenAiEmbeddingClient;

use crate::error::Result;
use async_trait::async_trait;

/// Converts text to a fixed-length vector. Deterministic for identical
/// text and provider version; the dimension is fixed per deployment.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts in one call. The default loops over `embed`;
    /// HTTP-backed providers override with a real batch request.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize;
}

pub mod utils {
    /// Cosine similarity between two embeddings.
    /// Mismatched lengths and zero vectors score 0.0.
    pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return 0.0;
        }

        let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        dot_product / (norm_a * norm_b)
    }

    /// Normalize an embedding vector in place.
    pub fn normalize_embedding(embedding: &mut [f32]) {
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in embedding.iter_mut() {
                *value /= norm;
            }
        }
    }
}

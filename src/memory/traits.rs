// src/memory/traits.rs

//! The store seam for conversation memory. Business logic only talks to
//! this trait — no direct qdrant calls outside the backend.

use async_trait::async_trait;

use crate::error::Result;
use crate::memory::types::Exchange;

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Embed the combined exchange, timestamp it, and store it.
    /// The embedding is computed once, at write time.
    async fn append(
        &self,
        conversation_id: &str,
        user_text: &str,
        response_text: &str,
    ) -> Result<Exchange>;

    /// Top `k` exchanges of this conversation by similarity to the query,
    /// ties broken by more-recent timestamp. The conversation id is a hard
    /// filter: no exchange from another conversation ever leaks in.
    /// An empty store yields an empty vec.
    async fn search_relevant(
        &self,
        conversation_id: &str,
        query_text: &str,
        k: usize,
    ) -> Result<Vec<Exchange>>;

    /// The most recent `limit` exchanges, oldest-to-newest, regardless of
    /// relevance. Fallback for when semantic search is unavailable or the
    /// query text is empty.
    async fn recent_history(&self, conversation_id: &str, limit: usize) -> Result<Vec<Exchange>>;
}

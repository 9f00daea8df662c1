// src/memory/ephemeral.rs
// In-process ConversationStore with exact cosine ranking. Backs tests and
// single-node embedded deployments where no qdrant is running.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::embedding::{utils::cosine_similarity, EmbeddingProvider};
use crate::error::Result;
use crate::memory::traits::ConversationStore;
use crate::memory::types::Exchange;

struct StoredExchange {
    exchange: Exchange,
    embedding: Vec<f32>,
}

pub struct EphemeralConversationStore {
    provider: Arc<dyn EmbeddingProvider>,
    entries: RwLock<Vec<StoredExchange>>,
}

impl EphemeralConversationStore {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider,
            entries: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ConversationStore for EphemeralConversationStore {
    async fn append(
        &self,
        conversation_id: &str,
        user_text: &str,
        response_text: &str,
    ) -> Result<Exchange> {
        let exchange = Exchange::new(conversation_id, user_text, response_text);
        let embedding = self.provider.embed(&exchange.combined_text()).await?;

        // Write lock taken after the embedding call so appends for other
        // conversations are not serialized behind the provider.
        let mut entries = self.entries.write().await;
        entries.push(StoredExchange {
            exchange: exchange.clone(),
            embedding,
        });
        Ok(exchange)
    }

    async fn search_relevant(
        &self,
        conversation_id: &str,
        query_text: &str,
        k: usize,
    ) -> Result<Vec<Exchange>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query = self.provider.embed(query_text).await?;

        let entries = self.entries.read().await;
        let mut scored: Vec<(f32, &StoredExchange)> = entries
            .iter()
            .filter(|s| s.exchange.conversation_id == conversation_id)
            .map(|s| (cosine_similarity(&query, &s.embedding), s))
            .collect();

        scored.sort_by(|(sa, ea), (sb, eb)| {
            sb.partial_cmp(sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| eb.exchange.timestamp.cmp(&ea.exchange.timestamp))
        });
        scored.truncate(k);

        Ok(scored.into_iter().map(|(_, s)| s.exchange.clone()).collect())
    }

    async fn recent_history(&self, conversation_id: &str, limit: usize) -> Result<Vec<Exchange>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let entries = self.entries.read().await;
        let mut matching: Vec<Exchange> = entries
            .iter()
            .filter(|s| s.exchange.conversation_id == conversation_id)
            .map(|s| s.exchange.clone())
            .collect();

        matching.sort_by_key(|e| e.timestamp);
        if matching.len() > limit {
            matching.drain(..matching.len() - limit);
        }
        Ok(matching)
    }
}

// src/memory/qdrant.rs
// Implements ConversationStore for qdrant (REST API, one point per exchange).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::embedding::EmbeddingProvider;
use crate::error::{EngineError, Result};
use crate::memory::traits::ConversationStore;
use crate::memory::types::Exchange;

pub struct QdrantConversationStore {
    client: Client,
    base_url: String,
    collection: String,
    provider: Arc<dyn EmbeddingProvider>,
}

impl QdrantConversationStore {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        collection: impl Into<String>,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            collection: collection.into(),
            provider,
        }
    }

    /// Create the collection if missing. Safe to call repeatedly.
    pub async fn ensure_collection(&self) -> Result<()> {
        let url = format!("{}/collections/{}", self.base_url, self.collection);
        let resp = self.client.get(&url).send().await.map_err(unavailable)?;
        if resp.status().is_success() {
            return Ok(());
        }

        let req_body = json!({
            "vectors": {
                "size": self.provider.dimension(),
                "distance": "Cosine"
            }
        });
        let resp = self
            .client
            .put(&url)
            .json(&req_body)
            .send()
            .await
            .map_err(unavailable)?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if status.is_success() || status.as_u16() == 409 || body.contains("already exists") {
            Ok(())
        } else {
            Err(EngineError::MemoryStoreUnavailable(format!(
                "failed to create collection: {body}"
            )))
        }
    }

    /// Upsert endpoint with `wait=true`: the default acknowledges before
    /// the point is applied, and a search on the same conversation right
    /// after an append must see the new exchange.
    fn upsert_url(&self) -> String {
        format!(
            "{}/collections/{}/points?wait=true",
            self.base_url, self.collection
        )
    }

    fn conversation_filter(conversation_id: &str) -> Value {
        json!({
            "must": [{
                "key": "conversation_id",
                "match": { "value": conversation_id }
            }]
        })
    }

    fn point_to_exchange(point: &Value) -> Exchange {
        let payload = point.get("payload").cloned().unwrap_or_else(|| json!({}));
        Exchange {
            id: point
                .get("id")
                .and_then(|id| id.as_str())
                .unwrap_or_default()
                .to_string(),
            conversation_id: payload
                .get("conversation_id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            user_prompt: payload
                .get("user_prompt")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            response: payload
                .get("bot_response")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            timestamp: payload
                .get("timestamp")
                .and_then(|v| v.as_i64())
                .map(millis_to_datetime)
                .unwrap_or_else(Utc::now),
        }
    }
}

fn unavailable(e: reqwest::Error) -> EngineError {
    EngineError::MemoryStoreUnavailable(e.to_string())
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap())
}

#[async_trait]
impl ConversationStore for QdrantConversationStore {
    async fn append(
        &self,
        conversation_id: &str,
        user_text: &str,
        response_text: &str,
    ) -> Result<Exchange> {
        let exchange = Exchange::new(conversation_id, user_text, response_text);
        let embedding = self.provider.embed(&exchange.combined_text()).await?;

        let url = self.upsert_url();
        let point = json!({
            "id": exchange.id,
            "vector": embedding,
            "payload": {
                "conversation_id": exchange.conversation_id,
                "user_prompt": exchange.user_prompt,
                "bot_response": exchange.response,
                "timestamp": exchange.timestamp.timestamp_millis(),
            }
        });

        let resp = self
            .client
            .put(&url)
            .json(&json!({ "points": [point] }))
            .send()
            .await
            .map_err(unavailable)?;

        if !resp.status().is_success() {
            return Err(EngineError::MemoryStoreUnavailable(format!(
                "upsert failed: {}",
                resp.text().await.unwrap_or_default()
            )));
        }

        debug!(conversation = %conversation_id, id = %exchange.id, "exchange stored");
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
        let embedding = self.provider.embed(query_text).await?;

        let url = format!(
            "{}/collections/{}/points/search",
            self.base_url, self.collection
        );
        let req_body = json!({
            "vector": embedding,
            "limit": k,
            "with_payload": true,
            "filter": Self::conversation_filter(conversation_id),
        });

        let resp = self
            .client
            .post(&url)
            .json(&req_body)
            .send()
            .await
            .map_err(unavailable)?;

        if !resp.status().is_success() {
            return Err(EngineError::MemoryStoreUnavailable(format!(
                "search failed: {}",
                resp.text().await.unwrap_or_default()
            )));
        }

        let resp_json: Value = resp.json().await.map_err(unavailable)?;
        let mut scored: Vec<(f64, Exchange)> = Vec::new();
        if let Some(points) = resp_json.get("result").and_then(|r| r.as_array()) {
            for point in points {
                let score = point.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0);
                scored.push((score, Self::point_to_exchange(point)));
            }
        }

        // Qdrant already ranks by score; re-sort so equal scores favor the
        // more recent exchange.
        scored.sort_by(|(sa, ea), (sb, eb)| {
            sb.partial_cmp(sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| eb.timestamp.cmp(&ea.timestamp))
        });
        scored.truncate(k);

        Ok(scored.into_iter().map(|(_, e)| e).collect())
    }

    async fn recent_history(&self, conversation_id: &str, limit: usize) -> Result<Vec<Exchange>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        // Scroll the conversation's points and order by timestamp here;
        // qdrant has no recency ordering without a payload index.
        let url = format!(
            "{}/collections/{}/points/scroll",
            self.base_url, self.collection
        );
        let req_body = json!({
            "filter": Self::conversation_filter(conversation_id),
            "limit": 1000,
            "with_payload": true,
        });

        let resp = self
            .client
            .post(&url)
            .json(&req_body)
            .send()
            .await
            .map_err(unavailable)?;

        if !resp.status().is_success() {
            return Err(EngineError::MemoryStoreUnavailable(format!(
                "scroll failed: {}",
                resp.text().await.unwrap_or_default()
            )));
        }

        let resp_json: Value = resp.json().await.map_err(unavailable)?;
        let mut exchanges: Vec<Exchange> = resp_json
            .get("result")
            .and_then(|r| r.get("points"))
            .and_then(|p| p.as_array())
            .map(|points| points.iter().map(Self::point_to_exchange).collect())
            .unwrap_or_default();

        if resp_json
            .pointer("/result/next_page_offset")
            .is_some_and(|v| !v.is_null())
        {
            warn!(
                conversation = %conversation_id,
                "conversation exceeds one scroll page, recent history may be truncated"
            );
        }

        exchanges.sort_by_key(|e| e.timestamp);
        if exchanges.len() > limit {
            exchanges.drain(..exchanges.len() - limit);
        }
        Ok(exchanges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct NullProvider;

    #[async_trait]
    impl EmbeddingProvider for NullProvider {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.0; 3])
        }
        fn dimension(&self) -> usize {
            3
        }
    }

    fn store() -> QdrantConversationStore {
        QdrantConversationStore::new(
            Client::new(),
            "http://localhost:6333",
            "conversation_messages",
            Arc::new(NullProvider),
        )
    }

    #[test]
    fn upserts_wait_for_the_point_to_apply() {
        assert_eq!(
            store().upsert_url(),
            "http://localhost:6333/collections/conversation_messages/points?wait=true"
        );
    }

    #[test]
    fn point_payload_maps_onto_an_exchange() {
        let point = json!({
            "id": "abc-123",
            "score": 0.9,
            "payload": {
                "conversation_id": "c1",
                "user_prompt": "hello",
                "bot_response": "hi there",
                "timestamp": 1700000000000i64,
            }
        });

        let exchange = QdrantConversationStore::point_to_exchange(&point);
        assert_eq!(exchange.id, "abc-123");
        assert_eq!(exchange.conversation_id, "c1");
        assert_eq!(exchange.user_prompt, "hello");
        assert_eq!(exchange.response, "hi there");
        assert_eq!(exchange.timestamp.timestamp_millis(), 1700000000000);
    }
}

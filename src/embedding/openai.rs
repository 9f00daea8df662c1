// src/embedding/openai.rs
// HTTP embedding provider against an OpenAI-style /v1/embeddings endpoint.

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::EmbeddingProvider;
use crate::error::{EngineError, Result};

pub struct OpenAiEmbeddingClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    dimension: usize,
}

impl OpenAiEmbeddingClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            dimension,
        }
    }

    async fn request(&self, input: serde_json::Value) -> Result<EmbeddingResponse> {
        let body = json!({
            "model": self.model,
            "input": input,
            "dimensions": self.dimension,
        });

        let response = self
            .client
            .post(format!("{}/v1/embeddings", self.base_url))
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(header::CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Embedding(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_else(|_| "<no body>".into());
            return Err(EngineError::Embedding(format!(
                "embedding API error ({status}): {error_text}"
            )));
        }

        response
            .json::<EmbeddingResponse>()
            .await
            .map_err(|e| EngineError::Embedding(e.to_string()))
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        // Mismatched dimensions across a deployment are a fatal
        // configuration error, not something to paper over.
        if vector.len() != self.dimension {
            return Err(EngineError::Embedding(format!(
                "embedding dimension mismatch: expected {}, got {}",
                self.dimension,
                vector.len()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!("requesting embedding for {} chars", text.len());

        let result = self.request(json!(text)).await?;
        let first = result
            .data
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::Embedding("no embedding data in API response".into()))?;

        self.check_dimension(&first.embedding)?;
        Ok(first.embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        const MAX_BATCH_SIZE: usize = 100;
        if texts.len() > MAX_BATCH_SIZE {
            return Err(EngineError::Embedding(format!(
                "batch size {} exceeds maximum of {MAX_BATCH_SIZE}",
                texts.len()
            )));
        }

        debug!("requesting embeddings for a batch of {} texts", texts.len());

        let result = self.request(json!(texts)).await?;
        if result.data.len() != texts.len() {
            return Err(EngineError::Embedding(format!(
                "embedding count mismatch: expected {}, got {}",
                texts.len(),
                result.data.len()
            )));
        }

        let mut data = result.data;
        // The API is allowed to return items out of order.
        data.sort_by_key(|item| item.index);

        let embeddings: Vec<Vec<f32>> = data.into_iter().map(|item| item.embedding).collect();
        for embedding in &embeddings {
            self.check_dimension(embedding)?;
        }
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

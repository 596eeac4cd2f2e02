//! Retrieval over Qdrant, with query embeddings from Ollama

use super::{RetrievalService, ServiceError, Snippet};
use crate::config::RetrievalConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub struct QdrantRetrieval {
    client: reqwest::Client,
    qdrant_url: String,
    api_key: Option<String>,
    embedding_endpoint: String,
    embedding_model: String,
}

impl QdrantRetrieval {
    pub fn new(config: &RetrievalConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            qdrant_url: config.qdrant_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            embedding_endpoint: config.embedding_endpoint.trim_end_matches('/').to_string(),
            embedding_model: config.embedding_model.clone(),
        }
    }

    async fn embed(&self, query: &str) -> Result<Vec<f32>, ServiceError> {
        let request = EmbedRequest {
            model: self.embedding_model.clone(),
            input: vec![query.to_string()],
        };

        let response = self
            .client
            .post(format!("{}/api/embed", self.embedding_endpoint))
            .json(&request)
            .send()
            .await
            .map_err(ServiceError::network)?;

        if !response.status().is_success() {
            return Err(ServiceError::Status {
                service: "embedding",
                status: response.status().as_u16(),
            });
        }

        let embedded: EmbedResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Parse(e.to_string()))?;

        embedded
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::Parse("embedding response was empty".to_string()))
    }
}

#[async_trait]
impl RetrievalService for QdrantRetrieval {
    async fn search(
        &self,
        query: &str,
        namespace: &str,
        top_k: usize,
    ) -> Result<Vec<Snippet>, ServiceError> {
        let vector = self.embed(query).await?;

        let mut request = self
            .client
            .post(format!(
                "{}/collections/{}/points/search",
                self.qdrant_url, namespace
            ))
            .json(&SearchRequest {
                vector,
                limit: top_k,
                with_payload: true,
            });
        if let Some(key) = &self.api_key {
            request = request.header("api-key", key);
        }

        let response = request.send().await.map_err(ServiceError::network)?;
        if !response.status().is_success() {
            return Err(ServiceError::Status {
                service: "qdrant",
                status: response.status().as_u16(),
            });
        }

        let found: SearchResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Parse(e.to_string()))?;

        tracing::debug!(namespace, hits = found.result.len(), "retrieval complete");
        Ok(found.result.into_iter().filter_map(ScoredPoint::into_snippet).collect())
    }
}

#[derive(Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Serialize)]
struct SearchRequest {
    vector: Vec<f32>,
    limit: usize,
    with_payload: bool,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    score: f32,
    #[serde(default)]
    payload: serde_json::Map<String, serde_json::Value>,
}

impl ScoredPoint {
    /// Points without a text payload carry nothing to cite
    fn into_snippet(mut self) -> Option<Snippet> {
        let text = match self.payload.remove("text") {
            Some(serde_json::Value::String(text)) => text,
            _ => return None,
        };
        let metadata = self
            .payload
            .remove("metadata")
            .unwrap_or(serde_json::Value::Null);

        Some(Snippet {
            text,
            score: self.score,
            metadata,
        })
    }
}

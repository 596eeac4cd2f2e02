//! Collaborator interfaces consumed by the stages and the delivery pipeline.
//!
//! Each trait is the boundary to one external service. The HTTP-backed
//! implementations in the submodules are what the binary wires up; tests use
//! in-process fakes.

pub mod ollama;
pub mod prompt;
pub mod publish;
pub mod qdrant;
pub mod speech;
pub mod verifier;

pub use ollama::OllamaReasoning;
pub use prompt::Prompt;
pub use publish::{HttpPublisher, LogPublisher};
pub use qdrant::QdrantRetrieval;
pub use speech::HttpSpeechSynthesizer;
pub use verifier::HmacVerifier;

use crate::orchestration::types::ClassificationResult;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Lazy, finite, single-pass sequence of text tokens
pub type TokenStream = BoxStream<'static, Result<String, ServiceError>>;

/// Reasoning backend: plain completion, token streaming and typed classification
#[async_trait]
pub trait ReasoningService: Send + Sync {
    async fn complete(&self, prompt: &Prompt, temperature: f32) -> Result<String, ServiceError>;

    async fn stream(&self, prompt: &Prompt, temperature: f32) -> Result<TokenStream, ServiceError>;

    async fn classify(&self, prompt: &Prompt) -> Result<ClassificationResult, ServiceError>;
}

/// A ranked passage returned by the retrieval backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snippet {
    pub text: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[async_trait]
pub trait RetrievalService: Send + Sync {
    async fn search(
        &self,
        query: &str,
        namespace: &str,
        top_k: usize,
    ) -> Result<Vec<Snippet>, ServiceError>;
}

/// Text to audio
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ServiceError>;
}

/// Fire-and-forget outbound publication
pub trait Publisher: Send + Sync {
    fn publish(&self, routing_key: &str, payload: serde_json::Value);
}

/// Signature check for session admission and intake requests
pub trait Verifier: Send + Sync {
    fn verify(&self, signature: &str, payload: &[u8]) -> bool;
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("{service} returned status {status}")]
    Status { service: &'static str, status: u16 },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ServiceError {
    pub(crate) fn network(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

// Stage implementations

mod aggregate;
mod classify;
mod company;
mod fallback;
mod general;

pub use aggregate::AggregateStage;
pub use classify::ClassifyStage;
pub use company::CompanyResearchStage;
pub use fallback::FallbackStage;
pub use general::GeneralResearchStage;

use super::types::{InteractionState, StateField, StateUpdate};
use crate::config::RetrievalConfig;
use crate::services::{Prompt, ReasoningService, RetrievalService, ServiceError};
use crate::streaming::DeliveryPipeline;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// Base trait for all stages
#[async_trait]
pub trait Stage: Send + Sync {
    /// Compute this stage's partial update from the current state
    async fn run(&self, state: &InteractionState) -> Result<StateUpdate, StageError>;

    /// Fields this stage may write
    fn writes(&self) -> &'static [StateField];

    fn description(&self) -> &str {
        ""
    }
}

/// Collaborators shared by every stage of one workflow
#[derive(Clone)]
pub struct StageServices {
    pub reasoning: Arc<dyn ReasoningService>,
    pub retrieval: Arc<dyn RetrievalService>,
    pub delivery: Arc<DeliveryPipeline>,
    pub general_collection: String,
    pub company_collection_suffix: String,
    pub top_k: usize,
}

impl StageServices {
    pub fn new(
        reasoning: Arc<dyn ReasoningService>,
        retrieval: Arc<dyn RetrievalService>,
        delivery: Arc<DeliveryPipeline>,
        retrieval_config: &RetrievalConfig,
    ) -> Self {
        Self {
            reasoning,
            retrieval,
            delivery,
            general_collection: retrieval_config.general_collection.clone(),
            company_collection_suffix: retrieval_config.company_collection_suffix.clone(),
            top_k: retrieval_config.top_k,
        }
    }

    pub fn company_namespace(&self, tenant_id: &str) -> String {
        format!("{}{}", tenant_id, self.company_collection_suffix)
    }

    /// Produce an answer, streaming it to the session when `stream` is set.
    ///
    /// The returned text is the full answer either way.
    pub async fn answer(
        &self,
        state: &InteractionState,
        prompt: &Prompt,
        temperature: f32,
        stream: bool,
    ) -> Result<String, StageError> {
        if !stream {
            return Ok(self.reasoning.complete(prompt, temperature).await?);
        }

        let tokens = self.reasoning.stream(prompt, temperature).await?;
        let text = self
            .delivery
            .deliver(&state.session_id, state.voice, tokens)
            .await?;
        Ok(text)
    }
}

/// Adapts an async closure into a [`Stage`]
pub struct FnStage<F> {
    writes: &'static [StateField],
    func: F,
}

impl<F, Fut> FnStage<F>
where
    F: Fn(InteractionState) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StateUpdate, StageError>> + Send,
{
    pub fn new(writes: &'static [StateField], func: F) -> Self {
        Self { writes, func }
    }
}

#[async_trait]
impl<F, Fut> Stage for FnStage<F>
where
    F: Fn(InteractionState) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StateUpdate, StageError>> + Send,
{
    async fn run(&self, state: &InteractionState) -> Result<StateUpdate, StageError> {
        (self.func)(state.clone()).await
    }

    fn writes(&self) -> &'static [StateField] {
        self.writes
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("Dependency unavailable: {0}")]
    Dependency(#[from] ServiceError),

    #[error("Missing input: {0}")]
    MissingInput(&'static str),

    #[error("Processing error: {0}")]
    Processing(String),
}

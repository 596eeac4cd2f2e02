// General research - answers from the shared legal corpus

use super::{Stage, StageError, StageServices};
use crate::orchestration::types::{InteractionState, StateField, StateUpdate};
use crate::services::Prompt;
use async_trait::async_trait;

const TEMPERATURE: f32 = 0.0;

const SYSTEM_PROMPT: &str = "You are a Mexican Legal Research Expert. Analyze the user's query and provide relevant legal context using the provided Mexican legal documents.

## Your Role:
- Extract relevant legal provisions from the context documents
- Provide structured legal analysis with proper citations
- Focus on current, applicable Mexican law

## Guidelines:
- Use the provided context documents as the primary source
- Include specific article numbers and legal references
- Consider federal vs. state jurisdiction when relevant
- Provide factual legal context, not legal advice
- **Format your response using valid Markdown. Use headings, bullet points, numbers, indentations, and bold or italics for clarity.**

Analyze the query and provide comprehensive Mexican legal context using the available legal documents.";

pub struct GeneralResearchStage {
    services: StageServices,
}

impl GeneralResearchStage {
    pub fn new(services: StageServices) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Stage for GeneralResearchStage {
    async fn run(&self, state: &InteractionState) -> Result<StateUpdate, StageError> {
        let context = self
            .services
            .retrieval
            .search(&state.input, &self.services.general_collection, self.services.top_k)
            .await?;
        tracing::debug!(session_id = %state.session_id, snippets = context.len(), "general context retrieved");

        let prompt = Prompt::new(SYSTEM_PROMPT, &state.input)
            .with_history(&state.history)
            .with_context(context);

        // The sole branch streams; with a sibling, aggregate streams instead
        let sole_branch = !state.classification.is_some_and(|c| c.company);
        let text = self
            .services
            .answer(state, &prompt, TEMPERATURE, sole_branch)
            .await?;

        Ok(StateUpdate::general_response(text))
    }

    fn writes(&self) -> &'static [StateField] {
        &[StateField::GeneralResponse]
    }

    fn description(&self) -> &str {
        "Legal research over statutes and regulations"
    }
}

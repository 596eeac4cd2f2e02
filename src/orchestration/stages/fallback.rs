// Fallback - polite reply for out-of-scope or vague queries

use super::{Stage, StageError, StageServices};
use crate::orchestration::types::{InteractionState, StateField, StateUpdate};
use crate::services::Prompt;
use async_trait::async_trait;

const TEMPERATURE: f32 = 0.5;

const SYSTEM_PROMPT: &str = "You are a legal assistant fallback agent.

The user's request has already been determined to be outside the scope of this assistant, or too vague to answer.

Politely inform the user that you cannot help with this request because it is outside the scope of this assistant or lacks sufficient detail.

Explain that your expertise is limited to legal topics, including:
- General legal principles, statutes, and regulations
- Company-specific legal documents and policies
- Legal compliance and related matters

If the user would like help with a legal question, encourage them to ask about those topics with more specific details.

**Format your response using valid Markdown.**";

pub struct FallbackStage {
    services: StageServices,
}

impl FallbackStage {
    pub fn new(services: StageServices) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Stage for FallbackStage {
    async fn run(&self, state: &InteractionState) -> Result<StateUpdate, StageError> {
        let prompt = Prompt::new(SYSTEM_PROMPT, &state.input).with_history(&state.history);
        let text = self.services.answer(state, &prompt, TEMPERATURE, true).await?;
        Ok(StateUpdate::final_response(text))
    }

    fn writes(&self) -> &'static [StateField] {
        &[StateField::FinalResponse]
    }

    fn description(&self) -> &str {
        "Out-of-scope reply"
    }
}

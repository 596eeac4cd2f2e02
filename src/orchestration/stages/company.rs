// Company research - answers from the tenant's own documents

use super::{Stage, StageError, StageServices};
use crate::orchestration::types::{InteractionState, StateField, StateUpdate};
use crate::services::Prompt;
use async_trait::async_trait;

const TEMPERATURE: f32 = 0.0;

const SYSTEM_PROMPT: &str = "You are a Company Legal Document Specialist. Analyze the user's query using the provided company documents and policies.

## Your Role:
- Extract relevant provisions from company contracts and policies
- Assess compliance status based on internal documents
- Identify policy requirements and gaps

## Guidelines:
- Focus on the company's internal legal documents
- Use the provided context as the primary source
- Reference actual document sections
- Provide factual information only
- **Format your response using valid Markdown. Use headings, bullet points, numbers, indentations, and bold or italics for clarity.**

If no context was found, state that you found no company documents to analyze.";

pub struct CompanyResearchStage {
    services: StageServices,
}

impl CompanyResearchStage {
    pub fn new(services: StageServices) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Stage for CompanyResearchStage {
    async fn run(&self, state: &InteractionState) -> Result<StateUpdate, StageError> {
        if state.tenant_id.is_empty() {
            return Err(StageError::MissingInput("tenant_id"));
        }

        let namespace = self.services.company_namespace(&state.tenant_id);
        let context = self
            .services
            .retrieval
            .search(&state.input, &namespace, self.services.top_k)
            .await?;
        tracing::debug!(
            session_id = %state.session_id,
            namespace = %namespace,
            snippets = context.len(),
            "company context retrieved"
        );

        let prompt = Prompt::new(SYSTEM_PROMPT, &state.input)
            .with_history(&state.history)
            .with_context(context);

        let sole_branch = !state.classification.is_some_and(|c| c.general);
        let text = self
            .services
            .answer(state, &prompt, TEMPERATURE, sole_branch)
            .await?;

        Ok(StateUpdate::company_response(text))
    }

    fn writes(&self) -> &'static [StateField] {
        &[StateField::CompanyResponse]
    }

    fn description(&self) -> &str {
        "Research over the tenant's contracts and policies"
    }
}

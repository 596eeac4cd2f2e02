// Classify - decides which research branches a query needs

use super::{Stage, StageError, StageServices};
use crate::orchestration::types::{InteractionState, StateField, StateUpdate};
use crate::services::Prompt;
use async_trait::async_trait;

const SYSTEM_PROMPT: &str = r#"You are a legal context router. Analyze the user's query to determine what information is needed to answer it.

Set "general" to true if the query requires:
- Country or jurisdiction laws, statutes, regulations
- Legal precedents or case law
- General legal principles or requirements

Set "company" to true if the query requires:
- Company-specific documents, policies, contracts
- Internal legal matters
- The company's compliance status

Both fields can be true at the same time.

If the query is outside the scope of legal topics, or too vague to determine the required context, set both fields to false.

Examples:
- "What are employment laws in Jalisco?" -> {"general": true, "company": false}
- "Review our employment contract" -> {"general": false, "company": true}
- "Is our privacy policy compliant?" -> {"general": true, "company": true}
- "What's the weather today?" -> {"general": false, "company": false}
- "Help" -> {"general": false, "company": false}

Respond with a JSON object with exactly the boolean fields "general" and "company"."#;

pub struct ClassifyStage {
    services: StageServices,
}

impl ClassifyStage {
    pub fn new(services: StageServices) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Stage for ClassifyStage {
    async fn run(&self, state: &InteractionState) -> Result<StateUpdate, StageError> {
        if state.input.trim().is_empty() {
            return Err(StageError::MissingInput("input"));
        }

        let prompt = Prompt::new(SYSTEM_PROMPT, &state.input).with_history(&state.history);
        let result = self.services.reasoning.classify(&prompt).await?;

        tracing::info!(
            session_id = %state.session_id,
            general = result.general,
            company = result.company,
            "query classified"
        );
        Ok(StateUpdate::classification(result))
    }

    fn writes(&self) -> &'static [StateField] {
        &[StateField::Classification]
    }

    fn description(&self) -> &str {
        "Routes a query to general law, company documents, both, or neither"
    }
}

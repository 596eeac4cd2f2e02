// Aggregate - joins the research branches into the final answer

use super::{Stage, StageError, StageServices};
use crate::orchestration::types::{InteractionState, StateField, StateUpdate};
use crate::services::Prompt;
use async_trait::async_trait;

const TEMPERATURE: f32 = 0.5;

const NO_RESEARCH: &str = "No additional research context available.";

const SYSTEM_PROMPT: &str = "You are a Legal Research Aggregator. Synthesize research from multiple sources into a comprehensive response to the user's legal query.

## Guidelines:
- Combine all available research sources
- Distinguish between general law and company-specific requirements
- Reference previous conversation turns when relevant
- Provide actionable guidance with proper citations
- **Format your response using valid Markdown. Use headings, bullet points, numbers, indentations, and bold or italics for clarity.**";

pub struct AggregateStage {
    services: StageServices,
}

impl AggregateStage {
    pub fn new(services: StageServices) -> Self {
        Self { services }
    }

    fn system_prompt(general: Option<&str>, company: Option<&str>) -> String {
        let mut sections = Vec::new();
        if let Some(general) = general {
            sections.push(format!("GENERAL LEGAL RESEARCH:\n{}", general.trim()));
        }
        if let Some(company) = company {
            sections.push(format!("COMPANY LEGAL RESEARCH:\n{}", company.trim()));
        }
        let research = if sections.is_empty() {
            NO_RESEARCH.to_string()
        } else {
            sections.join("\n\n")
        };

        format!(
            "{}\n\n## Available Research:\n{}\n\nSynthesize the above research to provide a comprehensive legal response.",
            SYSTEM_PROMPT, research
        )
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|text| !text.trim().is_empty())
}

#[async_trait]
impl Stage for AggregateStage {
    async fn run(&self, state: &InteractionState) -> Result<StateUpdate, StageError> {
        let general = non_empty(&state.general_response);
        let company = non_empty(&state.company_response);

        match (general, company) {
            (Some(only), None) | (None, Some(only)) => {
                tracing::debug!(session_id = %state.session_id, "single branch, aggregation skipped");
                return Ok(StateUpdate::final_response(only.trim()));
            }
            (None, None) => {
                tracing::warn!(session_id = %state.session_id, "research came back empty, answering without context");
            }
            (Some(_), Some(_)) => {}
        }

        let prompt = Prompt::new(Self::system_prompt(general, company), &state.input)
            .with_history(&state.history);
        let text = self.services.answer(state, &prompt, TEMPERATURE, true).await?;

        Ok(StateUpdate::final_response(text))
    }

    fn writes(&self) -> &'static [StateField] {
        &[StateField::FinalResponse]
    }

    fn description(&self) -> &str {
        "Combines general and company research"
    }
}

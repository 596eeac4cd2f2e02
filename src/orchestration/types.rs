// Shared state and identifiers for orchestration runs

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of a stage in the orchestration graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageId(String);

impl StageId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StageId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for StageId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Author of a prior turn
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    #[serde(alias = "human")]
    User,
    #[serde(alias = "ai")]
    Assistant,
    System,
}

impl TurnRole {
    pub fn as_str(&self) -> &str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
            TurnRole::System => "system",
        }
    }
}

/// A prior turn of the conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    #[serde(alias = "message_type")]
    pub role: TurnRole,
    #[serde(alias = "content")]
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            text: text.into(),
        }
    }
}

/// Which research branches a query needs. Both false means out of scope.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassificationResult {
    #[serde(alias = "general_law")]
    pub general: bool,
    #[serde(alias = "company_law")]
    pub company: bool,
}

impl ClassificationResult {
    pub fn new(general: bool, company: bool) -> Self {
        Self { general, company }
    }

    pub fn is_out_of_scope(&self) -> bool {
        !self.general && !self.company
    }

    pub fn needs_both(&self) -> bool {
        self.general && self.company
    }
}

/// Fields of [`InteractionState`] a stage can declare as its write set
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StateField {
    Classification,
    GeneralResponse,
    CompanyResponse,
    FinalResponse,
}

/// Per-request state threaded through one orchestration run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InteractionState {
    pub session_id: String,
    pub tenant_id: String,
    pub input: String,
    pub history: Vec<Turn>,
    pub voice: bool,
    pub classification: Option<ClassificationResult>,
    pub general_response: Option<String>,
    pub company_response: Option<String>,
    pub final_response: Option<String>,
}

impl InteractionState {
    pub fn new(
        session_id: impl Into<String>,
        tenant_id: impl Into<String>,
        input: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            tenant_id: tenant_id.into(),
            input: input.into(),
            history: Vec::new(),
            voice: false,
            classification: None,
            general_response: None,
            company_response: None,
            final_response: None,
        }
    }

    pub fn with_history(mut self, history: Vec<Turn>) -> Self {
        self.history = history;
        self
    }

    pub fn with_voice(mut self, voice: bool) -> Self {
        self.voice = voice;
        self
    }

    /// Merge a stage's partial update. Only fields present in the update are touched.
    pub fn apply(&mut self, update: StateUpdate) {
        if let Some(classification) = update.classification {
            self.classification = Some(classification);
        }
        if let Some(general) = update.general_response {
            self.general_response = Some(general);
        }
        if let Some(company) = update.company_response {
            self.company_response = Some(company);
        }
        if let Some(final_response) = update.final_response {
            self.final_response = Some(final_response);
        }
    }
}

/// Partial state produced by a stage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub classification: Option<ClassificationResult>,
    pub general_response: Option<String>,
    pub company_response: Option<String>,
    pub final_response: Option<String>,
}

impl StateUpdate {
    pub fn classification(result: ClassificationResult) -> Self {
        Self {
            classification: Some(result),
            ..Self::default()
        }
    }

    pub fn general_response(text: impl Into<String>) -> Self {
        Self {
            general_response: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn company_response(text: impl Into<String>) -> Self {
        Self {
            company_response: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn final_response(text: impl Into<String>) -> Self {
        Self {
            final_response: Some(text.into()),
            ..Self::default()
        }
    }

    /// Fields this update writes
    pub fn touched(&self) -> Vec<StateField> {
        let mut fields = Vec::new();
        if self.classification.is_some() {
            fields.push(StateField::Classification);
        }
        if self.general_response.is_some() {
            fields.push(StateField::GeneralResponse);
        }
        if self.company_response.is_some() {
            fields.push(StateField::CompanyResponse);
        }
        if self.final_response.is_some() {
            fields.push(StateField::FinalResponse);
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_accepts_legacy_field_names() {
        let parsed: ClassificationResult =
            serde_json::from_str(r#"{"general_law": true, "company_law": false}"#).unwrap();
        assert_eq!(parsed, ClassificationResult::new(true, false));
        assert!(!parsed.is_out_of_scope());
        assert!(ClassificationResult::default().is_out_of_scope());
    }

    #[test]
    fn test_apply_only_touches_present_fields() {
        let mut state = InteractionState::new("s1", "t1", "hello");
        state.apply(StateUpdate::general_response("A"));
        state.apply(StateUpdate::company_response("B"));

        assert_eq!(state.general_response.as_deref(), Some("A"));
        assert_eq!(state.company_response.as_deref(), Some("B"));
        assert!(state.final_response.is_none());
        assert!(state.classification.is_none());
    }

    #[test]
    fn test_touched_lists_written_fields() {
        let update = StateUpdate::final_response("done");
        assert_eq!(update.touched(), vec![StateField::FinalResponse]);
        assert!(StateUpdate::default().touched().is_empty());
    }

    #[test]
    fn test_turn_accepts_chat_history_shape() {
        let turn: Turn = serde_json::from_str(r#"{"role": "human", "content": "hi"}"#).unwrap();
        assert_eq!(turn, Turn::user("hi"));
    }
}

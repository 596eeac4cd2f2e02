//! Prompt assembly shared by every reasoning call.

use super::Snippet;
use crate::orchestration::types::Turn;
use serde::{Deserialize, Serialize};

/// A chat message in the reasoning backend's wire shape
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// System instructions plus conversation, with optional retrieved context
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub history: Vec<Turn>,
    pub input: String,
    pub context: Vec<Snippet>,
}

impl Prompt {
    pub fn new(system: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            input: input.into(),
            ..Self::default()
        }
    }

    pub fn with_history(mut self, history: &[Turn]) -> Self {
        self.history = history.to_vec();
        self
    }

    pub fn with_context(mut self, context: Vec<Snippet>) -> Self {
        self.context = context;
        self
    }

    /// Render into the ordered message list sent to the backend
    pub fn to_messages(&self) -> Vec<ChatMessage> {
        let mut system = self.system.trim().to_string();

        if !self.context.is_empty() {
            system.push_str("\n\n## Context:\n");
            for (i, snippet) in self.context.iter().enumerate() {
                system.push_str(&format!("[{}] {}\n", i + 1, snippet.text.trim()));
            }
        }

        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(ChatMessage::new("system", system));
        for turn in &self.history {
            messages.push(ChatMessage::new(turn.role.as_str(), turn.text.clone()));
        }
        messages.push(ChatMessage::new("user", self.input.clone()));
        messages
    }
}

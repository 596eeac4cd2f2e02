//! Delivery of partial results to live client sessions.
//!
//! A [`ConnectionHandle`] wraps whatever transport a session arrived on; the
//! [`ConnectionRegistry`] maps session ids to handles; the
//! [`DeliveryPipeline`] turns a token stream into [`StreamUnit`]s and sends
//! them to whichever handle is registered, best-effort.

pub mod delivery;
pub mod registry;

pub use delivery::{DeliveryPipeline, SentenceBuffer};
pub use registry::{ConnectionRegistry, RegistrySnapshot};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// One unit sent over the streaming channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamUnit {
    #[serde(rename = "text")]
    Text { data: String },

    /// Synthesized speech for one flushed sentence; `audio_data` is base64
    #[serde(rename = "audio_response")]
    Audio { text: String, audio_data: String },

    #[serde(rename = "START")]
    Start,

    #[serde(rename = "END")]
    End,
}

impl StreamUnit {
    pub fn text(data: impl Into<String>) -> Self {
        StreamUnit::Text { data: data.into() }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StreamUnit::Text { .. } => "text",
            StreamUnit::Audio { .. } => "audio_response",
            StreamUnit::Start => "START",
            StreamUnit::End => "END",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection closed")]
    Closed,

    #[error("Send failed: {0}")]
    Send(String),
}

/// Something a [`StreamUnit`] can be written to
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, unit: &StreamUnit) -> Result<(), TransportError>;
}

/// Opaque reference to a live session transport. Liveness is only learned on send failure.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    connected_at: DateTime<Utc>,
    transport: Arc<dyn Transport>,
}

impl ConnectionHandle {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            id: Uuid::new_v4(),
            connected_at: Utc::now(),
            transport,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    pub async fn send(&self, unit: &StreamUnit) -> Result<(), TransportError> {
        self.transport.send(unit).await
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("connected_at", &self.connected_at)
            .finish()
    }
}

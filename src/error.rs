//! Top-level error type.

use crate::orchestration::orchestrator::{ConfigurationError, EngineError};
use crate::services::ServiceError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or unreadable configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Malformed stage graph, detected at compile time.
    #[error("graph configuration error: {0}")]
    Graph(#[from] ConfigurationError),

    /// An orchestration run failed.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// A collaborator could not be constructed or reached.
    #[error("service error: {0}")]
    Service(#[from] ServiceError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, Error>;

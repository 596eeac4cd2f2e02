//! Signed interaction requests -> queued jobs.

use super::worker::{Job, SubmitError, WorkerPool};
use crate::orchestration::{InteractionState, Turn};
use crate::services::Verifier;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Body of `POST /interactions/internal/interact`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InteractionRequest {
    #[serde(alias = "chat_id")]
    pub session_id: String,
    #[serde(alias = "company_id")]
    pub tenant_id: String,
    pub input: String,
    #[serde(default)]
    pub chat_history: Vec<Turn>,
    #[serde(default)]
    pub voice: bool,
}

impl From<InteractionRequest> for InteractionState {
    fn from(request: InteractionRequest) -> Self {
        InteractionState::new(request.session_id, request.tenant_id, request.input)
            .with_history(request.chat_history)
            .with_voice(request.voice)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Acknowledgement {
    pub detail: String,
}

impl Acknowledgement {
    pub fn received() -> Self {
        Self {
            detail: "Request received".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("Invalid signature")]
    Unauthorized,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Server busy, try again later")]
    Busy,

    #[error("Service unavailable")]
    Unavailable,
}

impl IntakeError {
    pub fn status(&self) -> StatusCode {
        match self {
            IntakeError::Unauthorized => StatusCode::UNAUTHORIZED,
            IntakeError::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
            IntakeError::Busy | IntakeError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for IntakeError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(serde_json::json!({ "detail": self.to_string() })),
        )
            .into_response()
    }
}

/// Verifies, validates and enqueues interaction requests
pub struct RequestIntake {
    verifier: Arc<dyn Verifier>,
    pool: WorkerPool,
}

impl RequestIntake {
    pub fn new(verifier: Arc<dyn Verifier>, pool: WorkerPool) -> Self {
        Self { verifier, pool }
    }

    /// Accept a raw request body signed with `signature`.
    ///
    /// Returns as soon as the job is queued; the run itself happens on a worker.
    pub fn accept(&self, signature: Option<&str>, body: &[u8]) -> Result<Acknowledgement, IntakeError> {
        let signature = signature.ok_or(IntakeError::Unauthorized)?;
        if !self.verifier.verify(signature, body) {
            tracing::warn!("intake rejected: bad signature");
            return Err(IntakeError::Unauthorized);
        }

        let request: InteractionRequest = serde_json::from_slice(body)
            .map_err(|e| IntakeError::InvalidRequest(e.to_string()))?;
        if request.input.trim().is_empty() {
            return Err(IntakeError::InvalidRequest("input must not be empty".to_string()));
        }
        if request.session_id.trim().is_empty() {
            return Err(IntakeError::InvalidRequest("session_id must not be empty".to_string()));
        }

        let job = Job::new(request.into());
        let (job_id, session_id) = (job.id, job.state.session_id.clone());

        self.pool.submit(job).map_err(|e| match e {
            SubmitError::Full => {
                tracing::warn!(session_id = %session_id, "intake rejected: queue full");
                IntakeError::Busy
            }
            SubmitError::Closed => IntakeError::Unavailable,
        })?;

        tracing::info!(job_id = %job_id, session_id = %session_id, "interaction accepted");
        Ok(Acknowledgement::received())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_accepts_legacy_field_names() {
        let request: InteractionRequest = serde_json::from_str(
            r#"{"chat_id": "c1", "company_id": "acme", "input": "hola",
                "chat_history": [{"role": "ai", "content": "hi"}]}"#,
        )
        .unwrap();

        let state: InteractionState = request.into();
        assert_eq!(state.session_id, "c1");
        assert_eq!(state.tenant_id, "acme");
        assert_eq!(state.history, vec![Turn::assistant("hi")]);
        assert!(!state.voice);
    }

    #[test]
    fn test_error_statuses() {
        assert_eq!(IntakeError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            IntakeError::InvalidRequest("x".into()).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(IntakeError::Busy.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}

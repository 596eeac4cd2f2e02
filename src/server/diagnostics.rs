use super::AppState;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.registry.snapshot().await)
}

/// Drop a session's registration. Unknown ids are not an error.
pub async fn drop_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> StatusCode {
    if state.registry.remove(&session_id).await.is_some() {
        tracing::info!(session_id = %session_id, "session removed via diagnostics");
    }
    StatusCode::NO_CONTENT
}

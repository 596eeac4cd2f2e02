//! HTTP and WebSocket surface, plus the wiring from configuration to a running service.

pub mod diagnostics;
pub mod greetings;
pub mod intake;
pub mod worker;
pub mod ws;

pub use intake::{Acknowledgement, InteractionRequest, IntakeError, RequestIntake};
pub use worker::{Job, JobRunner, SubmitError, WorkerPool};

use crate::config::AppConfig;
use crate::error::Result;
use crate::orchestration::{CompiledOrchestrator, StageServices, build_workflow};
use crate::services::{
    HmacVerifier, HttpPublisher, HttpSpeechSynthesizer, OllamaReasoning, Publisher,
    QdrantRetrieval, Verifier,
};
use crate::streaming::{ConnectionRegistry, DeliveryPipeline};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use std::sync::Arc;

/// Everything a run needs, built once per process
pub struct Components {
    pub registry: Arc<ConnectionRegistry>,
    pub delivery: Arc<DeliveryPipeline>,
    pub workflow: Arc<CompiledOrchestrator>,
    pub publisher: Arc<dyn Publisher>,
}

impl Components {
    /// Build the HTTP-backed collaborators and compile the workflow
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let registry = Arc::new(ConnectionRegistry::new());
        let delivery = Arc::new(DeliveryPipeline::new(
            registry.clone(),
            Arc::new(HttpSpeechSynthesizer::new(&config.speech)),
            config.streaming.min_sentence_chars,
        ));

        let services = StageServices::new(
            Arc::new(OllamaReasoning::new(&config.reasoning)?),
            Arc::new(QdrantRetrieval::new(&config.retrieval)),
            delivery.clone(),
            &config.retrieval,
        );
        let workflow = Arc::new(build_workflow(services)?);

        Ok(Self {
            registry,
            delivery,
            workflow,
            publisher: HttpPublisher::from_config(&config.publish),
        })
    }
}

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
    pub delivery: Arc<DeliveryPipeline>,
    pub verifier: Arc<dyn Verifier>,
    pub intake: Arc<RequestIntake>,
}

impl AppState {
    /// Start the worker pool and assemble handler state
    pub fn start(components: Components, verifier: Arc<dyn Verifier>, config: &AppConfig) -> Self {
        let runner = Arc::new(JobRunner::new(
            components.workflow,
            components.delivery.clone(),
            components.publisher,
            config.publish.outgoing_routing_key.clone(),
            config.publish.dead_letter_routing_key.clone(),
        ));
        let pool = WorkerPool::start(runner, config.server.workers, config.server.queue_capacity);
        tracing::info!(
            workers = pool.worker_count(),
            queue_capacity = config.server.queue_capacity,
            "worker pool started"
        );

        Self {
            registry: components.registry,
            delivery: components.delivery,
            verifier: verifier.clone(),
            intake: Arc::new(RequestIntake::new(verifier, pool)),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(diagnostics::health))
        .route("/ws/interact/{session_id}", get(ws::interact))
        .route("/interactions/internal/interact", post(submit_interaction))
        .route("/diagnostics/sessions", get(diagnostics::list_sessions))
        .route("/diagnostics/sessions/{session_id}", delete(diagnostics::drop_session))
        .with_state(state)
}

async fn submit_interaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let signature = headers.get("x-signature").and_then(|v| v.to_str().ok());
    match state.intake.accept(signature, &body) {
        Ok(ack) => (StatusCode::ACCEPTED, Json(ack)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Bind and serve until the process is stopped
pub async fn serve(config: AppConfig, bind: Option<String>) -> Result<()> {
    if config.security.hmac_secret.is_empty() {
        tracing::warn!("no HMAC secret configured; every signed request will be rejected");
    }

    let components = Components::from_config(&config)?;
    let verifier: Arc<dyn Verifier> = Arc::new(HmacVerifier::new(&config.security.hmac_secret));
    let state = AppState::start(components, verifier, &config);

    let addr = bind.unwrap_or_else(|| config.bind_address());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("lexroute listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::{FnStage, Orchestrator, StateField, StateUpdate};
    use crate::services::{LogPublisher, ServiceError, SpeechSynthesizer};
    use crate::streaming::{ConnectionHandle, StreamUnit, Transport, TransportError};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const SECRET: &str = "test-secret";

    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        async fn send(&self, _unit: &StreamUnit) -> std::result::Result<(), TransportError> {
            Ok(())
        }
    }

    struct SilentSynthesizer;

    #[async_trait]
    impl SpeechSynthesizer for SilentSynthesizer {
        async fn synthesize(&self, _text: &str) -> std::result::Result<Vec<u8>, ServiceError> {
            Ok(Vec::new())
        }
    }

    fn test_state(queue_capacity: usize) -> AppState {
        let registry = Arc::new(ConnectionRegistry::new());
        let delivery = Arc::new(DeliveryPipeline::new(
            registry.clone(),
            Arc::new(SilentSynthesizer),
            10,
        ));

        let mut graph = Orchestrator::new();
        graph.register_stage(
            "answer",
            Arc::new(FnStage::new(&[StateField::FinalResponse], |_| async {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                Ok(StateUpdate::final_response("ok"))
            })),
        );

        let components = Components {
            registry,
            delivery,
            workflow: Arc::new(graph.compile().unwrap()),
            publisher: Arc::new(LogPublisher),
        };
        let mut config = AppConfig::default();
        config.server.workers = 1;
        config.server.queue_capacity = queue_capacity;

        AppState::start(components, Arc::new(HmacVerifier::new(SECRET)), &config)
    }

    fn signed_request(body: &str, signature: Option<String>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/interactions/internal/interact")
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header("x-signature", signature);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn sign(body: &str) -> Option<String> {
        Some(HmacVerifier::new(SECRET).sign(body.as_bytes()))
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_signed_request_is_acknowledged() {
        let body = r#"{"session_id": "c1", "tenant_id": "acme", "input": "¿Qué dice la ley?"}"#;
        let response = router(test_state(8))
            .oneshot(signed_request(body, sign(body)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"detail": "Request received"})
        );
    }

    #[tokio::test]
    async fn test_bad_or_missing_signature_is_unauthorized() {
        let body = r#"{"session_id": "c1", "tenant_id": "acme", "input": "hola"}"#;
        let app = router(test_state(8));

        let forged = app
            .clone()
            .oneshot(signed_request(body, Some("00ff".to_string())))
            .await
            .unwrap();
        assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);

        let unsigned = app.oneshot(signed_request(body, None)).await.unwrap();
        assert_eq!(unsigned.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_empty_input_is_unprocessable() {
        let body = r#"{"session_id": "c1", "tenant_id": "acme", "input": "   "}"#;
        let response = router(test_state(8))
            .oneshot(signed_request(body, sign(body)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_full_queue_is_service_unavailable() {
        let app = router(test_state(1));
        let body = r#"{"session_id": "c1", "tenant_id": "acme", "input": "hola"}"#;

        let mut statuses = Vec::new();
        for _ in 0..6 {
            let response = app
                .clone()
                .oneshot(signed_request(body, sign(body)))
                .await
                .unwrap();
            statuses.push(response.status());
        }
        assert!(statuses.contains(&StatusCode::ACCEPTED));
        assert!(statuses.contains(&StatusCode::SERVICE_UNAVAILABLE));
    }

    #[tokio::test]
    async fn test_diagnostics_sessions() {
        let state = test_state(8);
        state
            .registry
            .register("b", ConnectionHandle::new(Arc::new(NullTransport)))
            .await;
        state
            .registry
            .register("a", ConnectionHandle::new(Arc::new(NullTransport)))
            .await;
        let app = router(state.clone());

        let listed = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/diagnostics/sessions")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            body_json(listed).await,
            serde_json::json!({"count": 2, "session_ids": ["a", "b"]})
        );

        for _ in 0..2 {
            let removed = app
                .clone()
                .oneshot(
                    Request::builder()
                        .method("DELETE")
                        .uri("/diagnostics/sessions/a")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(removed.status(), StatusCode::NO_CONTENT);
        }
        assert_eq!(state.registry.snapshot().await.session_ids, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_health() {
        let response = router(test_state(1))
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }
}

//! Session endpoint: one WebSocket per client session.

use super::{AppState, greetings};
use crate::streaming::{ConnectionHandle, StreamUnit, Transport, TransportError};
use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade, close_code};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;

const OUTBOUND_BUFFER: usize = 64;

#[derive(Debug, Deserialize)]
pub struct SessionParams {
    #[serde(rename = "x-signature")]
    pub signature: Option<String>,
    #[serde(rename = "x-payload")]
    pub payload: Option<String>,
    #[serde(default)]
    pub voice: bool,
}

/// Outbound half of a socket, fed through a channel so sends never hold the socket
pub struct WsTransport {
    outbound: mpsc::Sender<Message>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&self, unit: &StreamUnit) -> Result<(), TransportError> {
        let text = serde_json::to_string(unit).map_err(|e| TransportError::Send(e.to_string()))?;
        self.outbound
            .send(Message::Text(text.into()))
            .await
            .map_err(|_| TransportError::Closed)
    }
}

pub async fn interact(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    Query(params): Query<SessionParams>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_session(socket, session_id, params, state))
}

fn signature_valid(state: &AppState, params: &SessionParams) -> bool {
    match (&params.signature, &params.payload) {
        (Some(signature), Some(payload)) => state.verifier.verify(signature, payload.as_bytes()),
        _ => false,
    }
}

async fn handle_session(mut socket: WebSocket, session_id: String, params: SessionParams, state: AppState) {
    if !signature_valid(&state, &params) {
        tracing::warn!(session_id = %session_id, "session rejected: bad signature");
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: close_code::POLICY,
                reason: Utf8Bytes::from_static("invalid signature"),
            })))
            .await;
        return;
    }

    let (mut sink, mut inbound) = socket.split();
    let (outbound, mut queued) = mpsc::channel::<Message>(OUTBOUND_BUFFER);

    let writer = tokio::spawn(async move {
        while let Some(message) = queued.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    let handle = ConnectionHandle::new(Arc::new(WsTransport { outbound }));
    let handle_id = handle.id();
    state.registry.register(session_id.clone(), handle).await;
    tracing::info!(session_id = %session_id, voice = params.voice, "session opened");

    if params.voice {
        state
            .delivery
            .greet(&session_id, greetings::random_greeting())
            .await;
    }

    // Inbound frames carry nothing; read only to notice the close
    while let Some(frame) = inbound.next().await {
        match frame {
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    if state.registry.remove_if_current(&session_id, handle_id).await {
        tracing::info!(session_id = %session_id, "session closed");
    } else {
        tracing::debug!(session_id = %session_id, "stale session closed, newer handle kept");
    }
    writer.abort();
}

//! Process-wide session id -> connection handle map.

use super::ConnectionHandle;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Read-only view for diagnostics
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RegistrySnapshot {
    pub count: usize,
    pub session_ids: Vec<String>,
}

/// Session registry. One instance per process, shared by `Arc`.
///
/// A single lock guards the map; every operation holds it for one map
/// access only.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` under `id`, replacing any previous handle.
    ///
    /// The superseded handle is returned, not closed; closing it is up to the caller.
    pub async fn register(
        &self,
        id: impl Into<String>,
        handle: ConnectionHandle,
    ) -> Option<ConnectionHandle> {
        let id = id.into();
        let previous = self.connections.write().await.insert(id.clone(), handle);
        if previous.is_some() {
            tracing::info!(session_id = %id, "session re-registered, previous handle superseded");
        }
        previous
    }

    pub async fn resolve(&self, id: &str) -> Option<ConnectionHandle> {
        self.connections.read().await.get(id).cloned()
    }

    /// Remove `id`. Absent ids are a no-op.
    pub async fn remove(&self, id: &str) -> Option<ConnectionHandle> {
        self.connections.write().await.remove(id)
    }

    /// Remove `id` only while it still maps to the handle `handle_id`
    pub async fn remove_if_current(&self, id: &str, handle_id: Uuid) -> bool {
        let mut connections = self.connections.write().await;
        match connections.get(id) {
            Some(current) if current.id() == handle_id => {
                connections.remove(id);
                true
            }
            _ => false,
        }
    }

    pub async fn snapshot(&self) -> RegistrySnapshot {
        let mut session_ids: Vec<String> = self.connections.read().await.keys().cloned().collect();
        session_ids.sort();
        RegistrySnapshot {
            count: session_ids.len(),
            session_ids,
        }
    }
}

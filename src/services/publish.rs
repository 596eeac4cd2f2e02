//! Outbound publication. Both implementations return immediately.

use super::Publisher;
use crate::config::PublishConfig;

/// Posts each publication to `{endpoint}/{routing_key}` on a detached task
pub struct HttpPublisher {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpPublisher {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }

    /// HTTP publisher when an endpoint is configured, log-only otherwise
    pub fn from_config(config: &PublishConfig) -> std::sync::Arc<dyn Publisher> {
        match &config.endpoint {
            Some(endpoint) => std::sync::Arc::new(Self::new(endpoint.clone())),
            None => std::sync::Arc::new(LogPublisher),
        }
    }
}

impl Publisher for HttpPublisher {
    fn publish(&self, routing_key: &str, payload: serde_json::Value) {
        let client = self.client.clone();
        let url = format!("{}/{}", self.endpoint, routing_key);
        let routing_key = routing_key.to_string();

        tokio::spawn(async move {
            match client.post(&url).json(&payload).send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!(routing_key = %routing_key, "published");
                }
                Ok(response) => {
                    tracing::warn!(routing_key = %routing_key, status = %response.status(), "publish rejected");
                }
                Err(e) => {
                    tracing::warn!(routing_key = %routing_key, error = %e, "publish failed");
                }
            }
        });
    }
}

/// Writes publications to the log
pub struct LogPublisher;

impl Publisher for LogPublisher {
    fn publish(&self, routing_key: &str, payload: serde_json::Value) {
        tracing::info!(routing_key, %payload, "publish");
    }
}

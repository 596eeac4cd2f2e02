//! Configuration file support.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! runnable local setup against Ollama, Qdrant and a speech endpoint on
//! localhost.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "lexroute.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub reasoning: ReasoningConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Concurrent orchestration runs
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Accepted-but-not-started runs before intake answers 503
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningConfig {
    #[serde(default = "default_ollama_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Longest silence between response chunks, in milliseconds.
    /// Streams may run longer than this overall.
    #[serde(default = "default_request_timeout")]
    pub timeout_ms: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_ollama_endpoint")]
    pub embedding_endpoint: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Collection holding general legal documents
    #[serde(default = "default_general_collection")]
    pub general_collection: String,

    /// Appended to the tenant id to name its document collection
    #[serde(default = "default_company_suffix")]
    pub company_collection_suffix: String,

    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    #[serde(default = "default_speech_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_speech_model")]
    pub model: String,

    #[serde(default = "default_voice")]
    pub voice: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Outbound broker bridge; publications are only logged when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default = "default_outgoing_key")]
    pub outgoing_routing_key: String,

    #[serde(default = "default_dead_letter_key")]
    pub dead_letter_routing_key: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Shared HMAC secret for signatures
    #[serde(default)]
    pub hmac_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// A voice buffer must be longer than this before it is flushed
    #[serde(default = "default_min_sentence_chars")]
    pub min_sentence_chars: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    64
}

fn default_ollama_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "gpt-oss:20b".to_string()
}

fn default_request_timeout() -> u64 {
    120_000
}

fn default_connect_timeout() -> u64 {
    10_000
}

fn default_qdrant_url() -> String {
    "http://localhost:6333".to_string()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_general_collection() -> String {
    "legal_documents".to_string()
}

fn default_company_suffix() -> String {
    "_company_docs".to_string()
}

fn default_top_k() -> usize {
    5
}

fn default_speech_endpoint() -> String {
    "http://localhost:8880/v1/audio/speech".to_string()
}

fn default_speech_model() -> String {
    "tts-1".to_string()
}

fn default_voice() -> String {
    "alloy".to_string()
}

fn default_outgoing_key() -> String {
    "messages.outgoing.send".to_string()
}

fn default_dead_letter_key() -> String {
    "interactions.dead_letter".to_string()
}

fn default_min_sentence_chars() -> usize {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            endpoint: default_ollama_endpoint(),
            model: default_model(),
            timeout_ms: default_request_timeout(),
            connect_timeout_ms: default_connect_timeout(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            qdrant_url: default_qdrant_url(),
            api_key: None,
            embedding_endpoint: default_ollama_endpoint(),
            embedding_model: default_embedding_model(),
            general_collection: default_general_collection(),
            company_collection_suffix: default_company_suffix(),
            top_k: default_top_k(),
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            endpoint: default_speech_endpoint(),
            model: default_speech_model(),
            voice: default_voice(),
        }
    }
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            outgoing_routing_key: default_outgoing_key(),
            dead_letter_routing_key: default_dead_letter_key(),
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            min_sentence_chars: default_min_sentence_chars(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load from an explicit path, a discovered file, or defaults; then apply env overrides
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit.map(Path::to_path_buf).or_else(find_config) {
            Some(path) => {
                tracing::info!(path = %path.display(), "loading configuration");
                Self::from_file(path)?
            }
            None => {
                tracing::info!("no configuration file found, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(secret) = std::env::var("LEXROUTE_HMAC_SECRET") {
            self.security.hmac_secret = secret;
        }
        if let Ok(model) = std::env::var("LEXROUTE_OLLAMA_MODEL") {
            self.reasoning.model = model;
        }
        if let Ok(key) = std::env::var("LEXROUTE_QDRANT_API_KEY") {
            self.retrieval.api_key = Some(key);
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn find_config() -> Option<PathBuf> {
    let local_config = PathBuf::from(CONFIG_FILE_NAME);
    if local_config.exists() {
        return Some(local_config);
    }

    if let Some(config_dir) = dirs::config_dir() {
        let user_config = config_dir.join("lexroute").join("config.toml");
        if user_config.exists() {
            return Some(user_config);
        }
    }

    None
}

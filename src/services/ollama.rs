//! Ollama-backed reasoning service

use super::prompt::ChatMessage;
use super::{Prompt, ReasoningService, ServiceError, TokenStream};
use crate::config::ReasoningConfig;
use crate::orchestration::types::ClassificationResult;
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reasoning service talking to Ollama's `/api/chat`
pub struct OllamaReasoning {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OllamaReasoning {
    pub fn new(config: &ReasoningConfig) -> Result<Self, ServiceError> {
        // No total timeout: a long answer may stream for minutes
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .read_timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ServiceError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request(&self, prompt: &Prompt, temperature: f32, stream: bool) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: prompt.to_messages(),
            stream,
            format: None,
            options: ChatOptions { temperature },
        }
    }

    async fn send(&self, request: &ChatRequest) -> Result<reqwest::Response, ServiceError> {
        let response = self
            .client
            .post(format!("{}/api/chat", self.endpoint))
            .json(request)
            .send()
            .await
            .map_err(ServiceError::network)?;

        if !response.status().is_success() {
            return Err(ServiceError::Status {
                service: "ollama",
                status: response.status().as_u16(),
            });
        }

        Ok(response)
    }

    async fn chat(&self, request: &ChatRequest) -> Result<String, ServiceError> {
        let chat_response: ChatResponse = self
            .send(request)
            .await?
            .json()
            .await
            .map_err(|e| ServiceError::Parse(e.to_string()))?;

        Ok(chat_response.message.content)
    }
}

#[async_trait]
impl ReasoningService for OllamaReasoning {
    async fn complete(&self, prompt: &Prompt, temperature: f32) -> Result<String, ServiceError> {
        self.chat(&self.request(prompt, temperature, false)).await
    }

    async fn stream(&self, prompt: &Prompt, temperature: f32) -> Result<TokenStream, ServiceError> {
        let response = self.send(&self.request(prompt, temperature, true)).await?;
        let mut bytes = response.bytes_stream();

        let tokens: TokenStream = Box::pin(async_stream::stream! {
            let mut buffer: Vec<u8> = Vec::new();

            while let Some(chunk) = bytes.next().await {
                match chunk {
                    Ok(chunk) => buffer.extend_from_slice(&chunk),
                    Err(e) => {
                        yield Err(ServiceError::network(e));
                        return;
                    }
                }

                while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=newline_pos).collect();
                    match parse_stream_line(&line) {
                        Ok(Some(token)) => {
                            yield Ok(token);
                        }
                        Ok(None) => {}
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
            }

            match parse_stream_line(&buffer) {
                Ok(Some(token)) => {
                    yield Ok(token);
                }
                Ok(None) => {}
                Err(e) => {
                    yield Err(e);
                }
            }
        });

        Ok(tokens)
    }

    async fn classify(&self, prompt: &Prompt) -> Result<ClassificationResult, ServiceError> {
        let mut request = self.request(prompt, 0.0, false);
        request.format = Some("json".to_string());

        let content = self.chat(&request).await?;
        parse_classification(&content)
    }
}

/// Parse one NDJSON line of a streaming chat response into its token, if any
fn parse_stream_line(line: &[u8]) -> Result<Option<String>, ServiceError> {
    let line = std::str::from_utf8(line)
        .map_err(|e| ServiceError::Parse(e.to_string()))?
        .trim();
    if line.is_empty() {
        return Ok(None);
    }

    let parsed: StreamResponse =
        serde_json::from_str(line).map_err(|e| ServiceError::Parse(e.to_string()))?;
    if let Some(error) = parsed.error {
        return Err(ServiceError::Parse(format!("stream error: {}", error)));
    }

    Ok(parsed
        .message
        .map(|m| m.content)
        .filter(|content| !content.is_empty()))
}

fn parse_classification(content: &str) -> Result<ClassificationResult, ServiceError> {
    serde_json::from_str(content.trim())
        .map_err(|e| ServiceError::Parse(format!("Failed to parse classification: {}", e)))
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<String>,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct StreamResponse {
    #[serde(default)]
    message: Option<ChatMessage>,
    #[serde(default)]
    error: Option<String>,
}

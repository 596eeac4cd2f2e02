//! HTTP speech synthesis (OpenAI-compatible `/v1/audio/speech` shape)

use super::{ServiceError, SpeechSynthesizer};
use crate::config::SpeechConfig;
use async_trait::async_trait;
use serde::Serialize;

pub struct HttpSpeechSynthesizer {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    voice: String,
}

impl HttpSpeechSynthesizer {
    pub fn new(config: &SpeechConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            voice: config.voice.clone(),
        }
    }
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
}

#[async_trait]
impl SpeechSynthesizer for HttpSpeechSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ServiceError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&SpeechRequest {
                model: &self.model,
                voice: &self.voice,
                input: text,
            })
            .send()
            .await
            .map_err(ServiceError::network)?;

        if !response.status().is_success() {
            return Err(ServiceError::Status {
                service: "speech",
                status: response.status().as_u16(),
            });
        }

        let audio = response.bytes().await.map_err(ServiceError::network)?;
        Ok(audio.to_vec())
    }
}

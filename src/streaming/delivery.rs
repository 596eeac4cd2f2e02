//! Token stream -> delivery units, with sentence buffering for voice sessions.

use super::{ConnectionRegistry, StreamUnit};
use crate::services::{ServiceError, SpeechSynthesizer, TokenStream};
use base64::Engine as _;
use futures_util::StreamExt;
use std::sync::Arc;

const SENTENCE_TERMINATORS: [char; 3] = ['.', '?', '!'];

/// Accumulates voice tokens until a sentence is long enough to speak.
///
/// A flush happens when the incoming token carries a terminal mark and the
/// buffer is longer than `min_chars` characters. Short fragments such as
/// "Dr." or "p. 4" stay buffered and join the next sentence.
#[derive(Debug)]
pub struct SentenceBuffer {
    buffer: String,
    min_chars: usize,
}

impl SentenceBuffer {
    pub fn new(min_chars: usize) -> Self {
        Self {
            buffer: String::new(),
            min_chars,
        }
    }

    /// Add a token; returns a sentence when the flush rule fires
    pub fn push(&mut self, token: &str) -> Option<String> {
        self.buffer.push_str(token);

        if token.contains(SENTENCE_TERMINATORS) && self.buffer.chars().count() > self.min_chars {
            return self.take();
        }
        None
    }

    /// Drain whatever is left once the source is exhausted
    pub fn finish(&mut self) -> Option<String> {
        self.take()
    }

    fn take(&mut self) -> Option<String> {
        let sentence = self.buffer.trim().to_string();
        self.buffer.clear();
        (!sentence.is_empty()).then_some(sentence)
    }
}

/// Sends partial output to the session registered for a run.
///
/// Delivery is best-effort: transport and synthesis failures are logged and
/// the token source keeps being consumed, because the complete text is still
/// needed for publication. Only a failure of the token source itself is
/// returned.
pub struct DeliveryPipeline {
    registry: Arc<ConnectionRegistry>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    min_sentence_chars: usize,
}

impl DeliveryPipeline {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        min_sentence_chars: usize,
    ) -> Self {
        Self {
            registry,
            synthesizer,
            min_sentence_chars,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Stream `tokens` to `session_id` and return the full concatenated text
    pub async fn deliver(
        &self,
        session_id: &str,
        voice: bool,
        mut tokens: TokenStream,
    ) -> Result<String, ServiceError> {
        let mut full_text = String::new();
        let mut sentences = SentenceBuffer::new(self.min_sentence_chars);

        while let Some(token) = tokens.next().await {
            let token = token?;
            full_text.push_str(&token);

            if voice {
                if let Some(sentence) = sentences.push(&token) {
                    self.dispatch_speech(session_id, sentence).await;
                }
            } else {
                self.dispatch(session_id, StreamUnit::text(token)).await;
            }
        }

        if voice {
            if let Some(rest) = sentences.finish() {
                self.dispatch_speech(session_id, rest).await;
            }
            self.dispatch(session_id, StreamUnit::End).await;
        }

        Ok(full_text)
    }

    /// Open a voice turn with a spoken greeting
    pub async fn greet(&self, session_id: &str, greeting: &str) {
        self.dispatch(session_id, StreamUnit::Start).await;
        self.dispatch_speech(session_id, greeting.to_string()).await;
    }

    /// Terminal signal for a session whose run ended without one
    pub async fn terminate(&self, session_id: &str) -> bool {
        self.dispatch(session_id, StreamUnit::End).await
    }

    /// Send one unit to the currently registered handle; true if it was accepted
    pub async fn dispatch(&self, session_id: &str, unit: StreamUnit) -> bool {
        let Some(handle) = self.registry.resolve(session_id).await else {
            tracing::debug!(session_id, unit = unit.kind(), "no connection registered, unit dropped");
            return false;
        };

        match handle.send(&unit).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(session_id, unit = unit.kind(), error = %e, "delivery failed, continuing");
                false
            }
        }
    }

    async fn dispatch_speech(&self, session_id: &str, sentence: String) {
        match self.synthesizer.synthesize(&sentence).await {
            Ok(audio) => {
                let audio_data = base64::engine::general_purpose::STANDARD.encode(audio);
                self.dispatch(
                    session_id,
                    StreamUnit::Audio {
                        text: sentence,
                        audio_data,
                    },
                )
                .await;
            }
            Err(e) => {
                tracing::warn!(session_id, error = %e, "speech synthesis failed, sentence skipped");
            }
        }
    }
}

//! HTTP speech synthesis client.

use crate::config::TtsConfig;
use crate::error::{Result, SeraphError};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tracing::debug;

/// Turns one segment of text into encoded audio.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Bytes>;
}

/// Posts `{text, language}` and returns the raw response body.
#[derive(Debug, Clone)]
pub struct HttpSynthesizer {
    http: reqwest::Client,
    url: String,
    language: String,
}

impl HttpSynthesizer {
    /// # Errors
    ///
    /// Returns `SeraphError::Config` if the HTTP client cannot be built.
    pub fn new(config: &TtsConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| SeraphError::Config(format!("tts http client: {e}")))?;
        Ok(Self {
            http,
            url: config.url.clone(),
            language: config.language.clone(),
        })
    }
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Bytes> {
        debug!(chars = text.chars().count(), "synthesis request");
        let response = self
            .http
            .post(&self.url)
            .json(&serde_json::json!({ "text": text, "language": self.language }))
            .send()
            .await
            .map_err(|e| SeraphError::Transport(format!("synthesis request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SeraphError::Tts(format!("synthesis endpoint returned {status}")));
        }
        let audio = response
            .bytes()
            .await
            .map_err(|e| SeraphError::Transport(format!("synthesis body: {e}")))?;
        if audio.is_empty() {
            return Err(SeraphError::Tts("synthesis returned no audio".into()));
        }
        Ok(audio)
    }
}

//! Optional per-segment translation before synthesis.

use crate::config::TranslatorConfig;
use crate::error::{Result, SeraphError};
use async_trait::async_trait;
use std::time::Duration;

/// Translates one segment.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str) -> Result<String>;
}

/// Translation through an OpenAI-compatible completion endpoint.
#[derive(Debug, Clone)]
pub struct LlmTranslator {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    prompt: String,
}

impl LlmTranslator {
    /// # Errors
    ///
    /// Returns `SeraphError::Config` if the HTTP client cannot be built.
    pub fn new(config: &TranslatorConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SeraphError::Config(format!("translator http client: {e}")))?;
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.api_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            prompt: config.prompt.clone(),
        })
    }
}

#[async_trait]
impl Translator for LlmTranslator {
    async fn translate(&self, text: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": self.prompt},
                {"role": "user", "content": text},
            ],
            "stream": false,
        });
        let mut request = self.http.post(&self.endpoint).json(&body);
        if !self.api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.api_key));
        }
        let response = request
            .send()
            .await
            .map_err(|e| SeraphError::Transport(format!("translation request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SeraphError::Transport(format!(
                "translation endpoint returned {status}"
            )));
        }
        let value: serde_json::Value = response.json().await?;
        let translated = value
            .pointer("/choices/0/message/content")
            .and_then(serde_json::Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SeraphError::Parse("translation body has no content".into()))?;
        Ok(translated.to_owned())
    }
}

/// Translate `text`, falling back to the original on any failure.
///
/// Returns the rendered text and whether translation succeeded.
pub async fn translate_or_original(translator: &dyn Translator, text: &str) -> (String, bool) {
    match translator.translate(text).await {
        Ok(translated) => (translated, true),
        Err(e) => {
            tracing::warn!("translation failed, speaking original text: {e}");
            (text.to_owned(), false)
        }
    }
}

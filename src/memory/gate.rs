//! Yes/no decision endpoints used to gate optional work.

use crate::error::{Result, SeraphError};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Asks `POST <url>?text=<q>` and reads a boolean answer from `decision_key`.
///
/// Used for the memory-save check and the screenshot check. Any failure
/// answers "no".
#[derive(Debug, Clone)]
pub struct DecisionGate {
    http: reqwest::Client,
    url: String,
    decision_key: String,
}

impl DecisionGate {
    pub fn new(url: impl Into<String>, decision_key: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(CHECK_TIMEOUT)
            .build()
            .map_err(|e| SeraphError::Config(format!("decision http client: {e}")))?;
        Ok(Self {
            http,
            url: url.into(),
            decision_key: decision_key.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// `true` only when the endpoint answers yes.
    pub async fn check(&self, text: &str) -> bool {
        match self.ask(text).await {
            Ok(answer) => {
                debug!(url = %self.url, answer, "decision check");
                answer
            }
            Err(e) => {
                warn!(url = %self.url, "decision check failed, treating as no: {e}");
                false
            }
        }
    }

    async fn ask(&self, text: &str) -> Result<bool> {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        let url = format!("{}{separator}text={}", self.url, urlencoding::encode(text));
        let resp = self.http.post(&url).send().await?;
        if !resp.status().is_success() {
            return Err(SeraphError::Transport(format!(
                "decision endpoint returned {}",
                resp.status()
            )));
        }
        let body: Value = resp.json().await?;
        Ok(body.get(&self.decision_key).is_some_and(is_yes))
    }
}

fn is_yes(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => {
            let s = s.trim();
            s.eq_ignore_ascii_case("yes") || s.eq_ignore_ascii_case("true") || s == "是"
        }
        Value::Number(n) => n.as_i64() == Some(1),
        _ => false,
    }
}

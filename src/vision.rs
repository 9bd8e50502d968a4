//! Optional screenshot attachment for user-facing turns.

use crate::config::VisionConfig;
use crate::conversation::{ContentPart, Message};
use crate::error::Result;
use crate::memory::DecisionGate;
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use std::sync::Arc;
use tracing::{debug, warn};

/// Host-side screen capture.
#[async_trait]
pub trait ScreenshotProvider: Send + Sync {
    /// PNG bytes of the current screen.
    async fn capture(&self) -> Result<Vec<u8>>;
}

pub fn png_data_url(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}

/// Decides whether a turn gets a screenshot and builds the user message.
pub struct VisionPolicy {
    auto_screenshot: bool,
    gate: Option<DecisionGate>,
    provider: Arc<dyn ScreenshotProvider>,
}

impl VisionPolicy {
    /// `None` when vision is disabled.
    pub fn from_config(
        config: &VisionConfig,
        provider: Option<Arc<dyn ScreenshotProvider>>,
    ) -> Result<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }
        let Some(provider) = provider else {
            warn!("vision enabled but no screenshot provider, running text-only");
            return Ok(None);
        };
        let gate = if config.auto_screenshot {
            None
        } else {
            Some(DecisionGate::new(
                config.check_url.clone(),
                config.decision_key.clone(),
            )?)
        };
        Ok(Some(Self {
            auto_screenshot: config.auto_screenshot,
            gate,
            provider,
        }))
    }

    async fn wants_screenshot(&self, text: &str) -> bool {
        if self.auto_screenshot {
            return true;
        }
        match &self.gate {
            Some(gate) => gate.check(text).await,
            None => false,
        }
    }

    /// User message for `text`, multimodal when a screenshot was taken.
    pub async fn user_message(&self, text: &str) -> Message {
        if !self.wants_screenshot(text).await {
            return Message::user(text);
        }
        match self.provider.capture().await {
            Ok(png) => {
                debug!(bytes = png.len(), "screenshot attached");
                Message::user_multimodal(vec![
                    ContentPart::Text {
                        text: text.to_owned(),
                    },
                    ContentPart::Image {
                        url: png_data_url(&png),
                    },
                ])
            }
            Err(e) => {
                warn!("screenshot failed, sending text only: {e}");
                Message::user(text)
            }
        }
    }
}

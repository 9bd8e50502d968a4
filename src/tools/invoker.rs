//! HTTP client for `/discover` and `/invoke`.

use super::types::{DiscoveryResponse, ToolDescriptor, result_text};
use crate::config::ToolsConfig;
use crate::error::{Result, SeraphError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Discovered tool set plus the session used to talk to the tool server.
#[derive(Debug, Clone)]
pub struct ToolInvoker {
    http: reqwest::Client,
    server_url: String,
    session_id: String,
    server_name: String,
    tools: Vec<ToolDescriptor>,
}

impl ToolInvoker {
    /// Create an invoker with an empty tool set. No network traffic.
    ///
    /// # Errors
    ///
    /// Returns `SeraphError::Config` if the HTTP client cannot be built.
    pub fn new(config: &ToolsConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(TOOL_TIMEOUT)
            .build()
            .map_err(|e| SeraphError::Config(format!("tool http client: {e}")))?;
        Ok(Self {
            http,
            server_url: config.server_url.trim_end_matches('/').to_owned(),
            session_id: uuid::Uuid::new_v4().to_string(),
            server_name: String::new(),
            tools: Vec::new(),
        })
    }

    /// Fetch the tool list from the server and remember it.
    ///
    /// # Errors
    ///
    /// Transport errors for network failures or non-success status, parse
    /// errors for an unexpected body.
    pub async fn discover(&mut self) -> Result<&[ToolDescriptor]> {
        let url = format!("{}/discover", self.server_url);
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "session_id": self.session_id }))
            .send()
            .await
            .map_err(|e| SeraphError::Transport(format!("tool discovery: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SeraphError::Transport(format!(
                "tool discovery returned {status}"
            )));
        }
        let body: DiscoveryResponse = response
            .json()
            .await
            .map_err(|e| SeraphError::Parse(format!("tool discovery body: {e}")))?;

        info!(
            server = %body.server.name,
            count = body.functions.len(),
            "discovered tools"
        );
        self.server_name = body.server.name;
        self.tools = body.functions;
        Ok(&self.tools)
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn has_tools(&self) -> bool {
        !self.tools.is_empty()
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// OpenAI `tools[]` array for the discovered set.
    pub fn schemas_for_api(&self) -> Vec<serde_json::Value> {
        self.tools.iter().map(ToolDescriptor::to_openai).collect()
    }

    /// Invoke a discovered tool.
    ///
    /// Returns `Ok(None)` when the server is unreachable, answers with an
    /// error status, or returns no result.
    ///
    /// # Errors
    ///
    /// `SeraphError::Tool` when `name` is not in the discovered set; the
    /// request is never sent in that case.
    pub async fn invoke(&self, name: &str, parameters: serde_json::Value) -> Result<Option<String>> {
        if !self.tools.iter().any(|t| t.name == name) {
            return Err(SeraphError::Tool(format!("unknown tool '{name}'")));
        }

        let url = format!("{}/invoke", self.server_url);
        debug!(tool = name, "invoking tool");
        let response = match self
            .http
            .post(&url)
            .json(&serde_json::json!({
                "session_id": self.session_id,
                "name": name,
                "parameters": parameters,
            }))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                error!(tool = name, "tool invocation failed: {e}");
                return Ok(None);
            }
        };

        let status = response.status();
        if !status.is_success() {
            error!(tool = name, %status, "tool invocation returned error status");
            return Ok(None);
        }
        match response.json::<serde_json::Value>().await {
            Ok(body) => Ok(result_text(&body)),
            Err(e) => {
                warn!(tool = name, "tool result was not JSON: {e}");
                Ok(None)
            }
        }
    }
}

/// Build an invoker and run discovery, or return `None` when tools are
/// disabled, discovery fails, or the server offers nothing.
pub async fn connect(config: &ToolsConfig) -> Option<ToolInvoker> {
    if !config.enabled {
        return None;
    }
    let mut invoker = match ToolInvoker::new(config) {
        Ok(i) => i,
        Err(e) => {
            warn!("tool support disabled: {e}");
            return None;
        }
    };
    match invoker.discover().await {
        Ok(tools) if tools.is_empty() => {
            info!("tool server offers no tools; tool support disabled");
            None
        }
        Ok(_) => Some(invoker),
        Err(e) => {
            warn!("tool discovery failed, tool support disabled for this session: {e}");
            None
        }
    }
}

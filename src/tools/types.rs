//! Wire types for the tool protocol.

use serde::{Deserialize, Serialize};

/// A remotely hosted function the model may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON Schema for the call parameters.
    #[serde(default = "empty_object_schema", alias = "parameterSchema")]
    pub parameters: serde_json::Value,
}

fn empty_object_schema() -> serde_json::Value {
    serde_json::json!({"type": "object", "properties": {}})
}

impl ToolDescriptor {
    /// OpenAI `tools[]` entry for this descriptor.
    pub fn to_openai(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// Server identity returned alongside the discovered functions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    #[serde(default)]
    pub name: String,
}

/// Body of a successful `/discover` response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryResponse {
    #[serde(default)]
    pub functions: Vec<ToolDescriptor>,
    #[serde(default)]
    pub server: ServerInfo,
}

/// Extract the text handed back to the model from an `/invoke` result:
/// `result.content` when it is a string, otherwise the JSON of `result`.
pub fn result_text(body: &serde_json::Value) -> Option<String> {
    let result = body.get("result")?;
    match result.get("content") {
        Some(serde_json::Value::String(text)) => Some(text.clone()),
        _ => Some(result.to_string()),
    }
}

use crate::adapters::anthropic::AnthropicTool;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCreateParams {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: Value,
}

/// Client-local tool catalog, in registration order.
#[derive(Debug, Default)]
pub struct Tools {
    registered: RwLock<Vec<AnthropicTool>>,
}

impl Tools {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool; re-registering a name replaces it in place.
    pub fn create(&self, params: ToolCreateParams) -> AnthropicTool {
        let tool = AnthropicTool {
            name: params.name,
            description: params.description,
            input_schema: params.input_schema,
        };
        let mut registered = match self.registered.write() {
            Ok(registered) => registered,
            Err(poisoned) => poisoned.into_inner(),
        };
        match registered.iter_mut().find(|existing| existing.name == tool.name) {
            Some(existing) => *existing = tool.clone(),
            None => registered.push(tool.clone()),
        }
        tracing::debug!(tool = %tool.name, "tool registered");
        tool
    }

    pub fn get(&self, name: &str) -> Option<AnthropicTool> {
        let registered = match self.registered.read() {
            Ok(registered) => registered,
            Err(poisoned) => poisoned.into_inner(),
        };
        registered.iter().find(|tool| tool.name == name).cloned()
    }

    pub fn list(&self) -> Vec<AnthropicTool> {
        match self.registered.read() {
            Ok(registered) => registered.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

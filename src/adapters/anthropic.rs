use super::convert::{messages_to_prompt, output_text, parse_cli_output, session_token, stream_event_text};
use super::{FileReference, Role};
use crate::models::{ExecutionRequest, OutputFormat};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSource {
    #[serde(rename = "type")]
    pub kind: String,
    pub media_type: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Image { source: ImageSource },
    #[serde(other)]
    Other,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    /// Plain text; text blocks are joined with a newline, other blocks dropped.
    pub fn text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } if !text.is_empty() => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnthropicMessage {
    pub role: Role,
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<FileReference>>,
}

impl AnthropicMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(content.into()),
            files: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnthropicTool {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageCreateParams {
    pub model: String,
    pub messages: Vec<AnthropicMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<AnthropicTool>>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    /// Milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl MessageCreateParams {
    pub fn to_execution_request(&self, format: OutputFormat) -> ExecutionRequest {
        let mut request = ExecutionRequest::new()
            .with_prompt(messages_to_prompt(&self.messages))
            .with_output_format(format)
            .with_flag("temperature", self.temperature.map(|value| json!(value)))
            .with_flag("maxTokens", self.max_tokens.map(|value| json!(value)))
            .with_flag("topP", self.top_p.map(|value| json!(value)))
            .with_flag("stop", self.stop_sequences.as_ref().map(|stops| json!(stops.join(","))));
        request.timeout_ms = self.timeout;
        if let Some(tools) = self.tools.as_deref().filter(|tools| !tools.is_empty()) {
            request.allowed_tools = tools.iter().map(|tool| tool.name.clone()).collect();
        }
        request
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnthropicUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub role: Role,
    #[serde(default)]
    pub model: String,
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub usage: AnthropicUsage,
    #[serde(default)]
    pub stop_reason: Option<String>,
}

impl MessageResponse {
    /// Builds a message from buffered CLI output. A native `message` object is
    /// kept; anything else becomes one text block.
    pub fn from_cli_output(output: &str, model: &str) -> Self {
        let value = parse_cli_output(output);

        if value.get("type").and_then(Value::as_str) == Some("message") {
            if let Ok(mut message) = serde_json::from_value::<MessageResponse>(value.clone()) {
                if message.model.is_empty() {
                    message.model = model.to_string();
                }
                return message;
            }
        }

        let text = output_text(&value).unwrap_or_else(|| output.trim().to_string());
        Self {
            id: session_token(&value).unwrap_or_else(message_id),
            kind: "message".to_string(),
            role: Role::Assistant,
            model: model.to_string(),
            content: vec![ContentBlock::text(text)],
            usage: AnthropicUsage {
                input_tokens: value.pointer("/usage/input_tokens").and_then(Value::as_u64).unwrap_or(0),
                output_tokens: value.pointer("/usage/output_tokens").and_then(Value::as_u64).unwrap_or(0),
            },
            stop_reason: Some("end_turn".to_string()),
        }
    }

    pub fn text(&self) -> String {
        MessageContent::Blocks(self.content.clone()).text()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStreamEventType {
    ContentBlockStart,
    ContentBlockDelta,
    ContentBlockStop,
    MessageStop,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDelta {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageStreamEvent {
    #[serde(rename = "type")]
    pub kind: MessageStreamEventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<StreamDelta>,
}

impl MessageStreamEvent {
    /// Translates one streamed CLI event. Native content-block events pass
    /// through; assistant text becomes a text delta and `result` ends the message.
    pub fn from_event(event: &Value) -> Option<Self> {
        let native = match event.get("type").and_then(Value::as_str) {
            Some("stream_event") => event.get("event"),
            _ => Some(event),
        };
        if let Some(native) = native {
            if let Ok(parsed) = serde_json::from_value::<MessageStreamEvent>(native.clone()) {
                return Some(parsed);
            }
        }

        if let Some(text) = stream_event_text(event) {
            return Some(Self {
                kind: MessageStreamEventType::ContentBlockDelta,
                index: Some(0),
                delta: Some(StreamDelta {
                    kind: Some("text_delta".to_string()),
                    text: Some(text),
                }),
            });
        }

        if event.get("type").and_then(Value::as_str) == Some("result") {
            return Some(Self {
                kind: MessageStreamEventType::MessageStop,
                index: None,
                delta: None,
            });
        }

        None
    }
}

pub(crate) fn message_id() -> String {
    format!("msg_{}", uuid::Uuid::new_v4().simple())
}

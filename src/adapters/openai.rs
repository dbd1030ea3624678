use super::convert::{
    messages_to_prompt, openai_to_anthropic_tools, output_text, parse_cli_output, session_token, stream_event_text,
};
use super::{FileReference, Role};
use crate::models::{ExecutionRequest, OutputFormat};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAiMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<FileReference>>,
}

impl OpenAiMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            files: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAiFunction {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAiTool {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: OpenAiFunction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StopSequence {
    One(String),
    Many(Vec<String>),
}

impl StopSequence {
    pub fn joined(&self) -> String {
        match self {
            Self::One(stop) => stop.clone(),
            Self::Many(stops) => stops.join(","),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionCreateParams {
    pub model: String,
    pub messages: Vec<OpenAiMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<OpenAiTool>>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<StopSequence>,
    /// Milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl ChatCompletionCreateParams {
    pub fn to_execution_request(&self, format: OutputFormat) -> ExecutionRequest {
        let mut request = ExecutionRequest::new()
            .with_prompt(messages_to_prompt(&self.messages))
            .with_output_format(format)
            .with_flag("temperature", self.temperature.map(|value| json!(value)))
            .with_flag("maxTokens", self.max_tokens.map(|value| json!(value)))
            .with_flag("topP", self.top_p.map(|value| json!(value)))
            .with_flag("stop", self.stop.as_ref().map(|stop| json!(stop.joined())));
        request.timeout_ms = self.timeout;
        if let Some(tools) = self.tools.as_deref().filter(|tools| !tools.is_empty()) {
            request.allowed_tools = openai_to_anthropic_tools(tools)
                .into_iter()
                .map(|tool| tool.name)
                .collect();
        }
        request
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionChoice {
    #[serde(default)]
    pub index: u32,
    pub message: ChoiceMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatCompletion {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<CompletionChoice>,
    pub usage: Usage,
}

impl Default for ChatCompletion {
    fn default() -> Self {
        Self {
            id: String::new(),
            object: "chat.completion".to_string(),
            created: 0,
            model: String::new(),
            choices: Vec::new(),
            usage: Usage::default(),
        }
    }
}

impl ChatCompletion {
    /// Builds a completion from buffered CLI output. Output that already has
    /// the chat-completion shape is kept; anything else is wrapped in one choice.
    pub fn from_cli_output(output: &str, model: &str) -> Self {
        let value = parse_cli_output(output);

        if value.get("choices").is_some() {
            if let Ok(mut completion) = serde_json::from_value::<ChatCompletion>(value.clone()) {
                if completion.id.is_empty() {
                    completion.id = completion_id();
                }
                if completion.model.is_empty() {
                    completion.model = model.to_string();
                }
                if completion.created == 0 {
                    completion.created = chrono::Utc::now().timestamp();
                }
                return completion;
            }
        }

        let content = output_text(&value).unwrap_or_else(|| output.trim().to_string());
        let prompt_tokens = value.pointer("/usage/input_tokens").and_then(Value::as_u64).unwrap_or(0);
        let completion_tokens = value.pointer("/usage/output_tokens").and_then(Value::as_u64).unwrap_or(0);
        Self {
            id: session_token(&value).unwrap_or_else(completion_id),
            created: chrono::Utc::now().timestamp(),
            model: model.to_string(),
            choices: vec![CompletionChoice {
                index: 0,
                message: ChoiceMessage {
                    role: Role::Assistant,
                    content,
                },
                finish_reason: Some("stop".to_string()),
            }],
            usage: Usage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
            ..Self::default()
        }
    }

    pub fn content(&self) -> Option<&str> {
        self.choices.first().map(|choice| choice.message.content.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: ChunkDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub id: String,
    pub object: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
}

impl ChatCompletionChunk {
    /// Translates one streamed CLI event. Events without text are skipped,
    /// except the terminal `result` event which closes the choice.
    pub fn from_event(event: &Value, id: &str, model: &str, created: i64) -> Option<Self> {
        if event.get("object").and_then(Value::as_str) == Some("chat.completion.chunk") {
            if let Ok(chunk) = serde_json::from_value::<ChatCompletionChunk>(event.clone()) {
                return Some(chunk);
            }
        }

        let (delta, finish_reason) = if let Some(text) = stream_event_text(event) {
            (
                ChunkDelta {
                    role: Some(Role::Assistant),
                    content: Some(text),
                },
                None,
            )
        } else if event.get("type").and_then(Value::as_str) == Some("result") {
            (ChunkDelta::default(), Some("stop".to_string()))
        } else {
            return None;
        };

        Some(Self {
            id: id.to_string(),
            object: "chat.completion.chunk".to_string(),
            created,
            model: model.to_string(),
            choices: vec![StreamChoice {
                index: 0,
                delta,
                finish_reason,
            }],
        })
    }
}

pub(crate) fn completion_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
}

use super::anthropic::{AnthropicMessage, AnthropicTool, ContentBlock, MessageContent};
use super::openai::{OpenAiFunction, OpenAiMessage, OpenAiTool};
use super::Role;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Anything that can be flattened into a `ROLE: text` prompt block.
pub trait PromptMessage {
    fn role(&self) -> Role;
    fn text(&self) -> String;
}

impl PromptMessage for OpenAiMessage {
    fn role(&self) -> Role {
        self.role
    }

    fn text(&self) -> String {
        self.content.clone()
    }
}

impl PromptMessage for AnthropicMessage {
    fn role(&self) -> Role {
        self.role
    }

    fn text(&self) -> String {
        self.content.text()
    }
}

/// A message of either surface, as kept in a session history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConversationMessage {
    OpenAi(OpenAiMessage),
    Anthropic(AnthropicMessage),
}

impl PromptMessage for ConversationMessage {
    fn role(&self) -> Role {
        match self {
            Self::OpenAi(message) => message.role,
            Self::Anthropic(message) => message.role,
        }
    }

    fn text(&self) -> String {
        match self {
            Self::OpenAi(message) => message.text(),
            Self::Anthropic(message) => message.text(),
        }
    }
}

impl From<OpenAiMessage> for ConversationMessage {
    fn from(value: OpenAiMessage) -> Self {
        Self::OpenAi(value)
    }
}

impl From<AnthropicMessage> for ConversationMessage {
    fn from(value: AnthropicMessage) -> Self {
        Self::Anthropic(value)
    }
}

pub fn openai_to_anthropic_message(message: &OpenAiMessage) -> AnthropicMessage {
    AnthropicMessage {
        role: message.role,
        content: MessageContent::Blocks(vec![ContentBlock::text(message.content.clone())]),
        files: message.files.clone(),
    }
}

pub fn anthropic_to_openai_message(message: &AnthropicMessage) -> OpenAiMessage {
    OpenAiMessage {
        role: message.role,
        content: message.content.text(),
        files: message.files.clone(),
    }
}

pub fn openai_to_anthropic_tools(tools: &[OpenAiTool]) -> Vec<AnthropicTool> {
    tools
        .iter()
        .map(|tool| AnthropicTool {
            name: tool.function.name.clone(),
            description: tool.function.description.clone(),
            input_schema: tool.function.parameters.clone().unwrap_or_else(|| json!({})),
        })
        .collect()
}

pub fn anthropic_to_openai_tools(tools: &[AnthropicTool]) -> Vec<OpenAiTool> {
    tools
        .iter()
        .map(|tool| OpenAiTool {
            kind: "function".to_string(),
            function: OpenAiFunction {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: Some(tool.input_schema.clone()),
            },
        })
        .collect()
}

pub fn messages_to_prompt<M: PromptMessage>(messages: &[M]) -> String {
    messages
        .iter()
        .map(|message| format!("{}: {}", message.role().as_str().to_uppercase(), message.text()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Parses single-shot CLI output. Text that is not JSON becomes a one-choice
/// completion carrying the trimmed text verbatim.
pub fn parse_cli_output(output: &str) -> Value {
    match serde_json::from_str::<Value>(output) {
        Ok(value) => value,
        Err(_) => json!({
            "choices": [
                {
                    "message": {
                        "role": "assistant",
                        "content": output.trim()
                    }
                }
            ]
        }),
    }
}

/// Best-effort assistant text of a parsed single-shot response.
pub fn output_text(value: &Value) -> Option<String> {
    if let Some(text) = value.as_str() {
        return Some(text.to_string());
    }
    if let Some(result) = value.get("result").and_then(Value::as_str) {
        return Some(result.to_string());
    }
    if let Some(content) = value
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
    {
        return Some(content.to_string());
    }
    value.get("content").and_then(blocks_text)
}

/// Text carried by one streamed CLI event, if any.
pub fn stream_event_text(event: &Value) -> Option<String> {
    match event.get("type").and_then(Value::as_str) {
        Some("assistant") => event
            .pointer("/message/content")
            .and_then(blocks_text)
            .filter(|text| !text.is_empty()),
        Some("content_block_delta") => event
            .pointer("/delta/text")
            .and_then(Value::as_str)
            .map(str::to_string),
        Some("stream_event") => event.get("event").and_then(stream_event_text),
        _ => event
            .pointer("/choices/0/delta/content")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

/// Session token reported by the CLI, preferring a top-level `id`.
pub fn session_token(value: &Value) -> Option<String> {
    ["id", "session_id"]
        .iter()
        .filter_map(|key| value.get(*key).and_then(Value::as_str))
        .find(|token| !token.trim().is_empty())
        .map(str::to_string)
}

fn blocks_text(content: &Value) -> Option<String> {
    match content {
        Value::String(text) => Some(text.clone()),
        Value::Array(blocks) => Some(
            blocks
                .iter()
                .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|block| block.get("text").and_then(Value::as_str))
                .filter(|text| !text.is_empty())
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(text: &str) -> OpenAiMessage {
        OpenAiMessage {
            role: Role::User,
            content: text.to_string(),
            files: None,
        }
    }

    #[test]
    fn openai_message_survives_round_trip() {
        let original = OpenAiMessage {
            role: Role::Assistant,
            content: "Hello there".to_string(),
            files: None,
        };
        let anthropic = openai_to_anthropic_message(&original);
        assert_eq!(anthropic.role, Role::Assistant);
        assert_eq!(
            anthropic.content,
            MessageContent::Blocks(vec![ContentBlock::text("Hello there")])
        );
        assert_eq!(anthropic_to_openai_message(&anthropic), original);
    }

    #[test]
    fn anthropic_blocks_concatenate_text_only() {
        let message = AnthropicMessage {
            role: Role::User,
            content: MessageContent::Blocks(vec![
                ContentBlock::text("first"),
                ContentBlock::Image {
                    source: serde_json::from_value(json!({
                        "type": "base64", "media_type": "image/png", "data": "AAAA"
                    }))
                    .expect("image source"),
                },
                ContentBlock::text("second"),
            ]),
            files: None,
        };
        assert_eq!(anthropic_to_openai_message(&message).content, "first\nsecond");
    }

    #[test]
    fn tools_convert_both_ways() {
        let openai = vec![OpenAiTool {
            kind: "function".to_string(),
            function: OpenAiFunction {
                name: "lookup".to_string(),
                description: Some("Look things up".to_string()),
                parameters: None,
            },
        }];
        let anthropic = openai_to_anthropic_tools(&openai);
        assert_eq!(anthropic[0].name, "lookup");
        assert_eq!(anthropic[0].input_schema, json!({}));

        let back = anthropic_to_openai_tools(&anthropic);
        assert_eq!(back[0].kind, "function");
        assert_eq!(back[0].function.description.as_deref(), Some("Look things up"));
        assert_eq!(back[0].function.parameters, Some(json!({})));
    }

    #[test]
    fn prompt_flattens_roles_and_content() {
        let messages: Vec<ConversationMessage> = vec![
            OpenAiMessage {
                role: Role::System,
                content: "Be brief".to_string(),
                files: None,
            }
            .into(),
            openai_to_anthropic_message(&user("Hi")).into(),
        ];
        assert_eq!(messages_to_prompt(&messages), "SYSTEM: Be brief\n\nUSER: Hi");
    }

    #[test]
    fn non_json_output_becomes_single_choice() {
        let value = parse_cli_output("hello");
        assert_eq!(value["choices"].as_array().map(Vec::len), Some(1));
        assert_eq!(value["choices"][0]["message"]["content"], "hello");
        assert_eq!(value["choices"][0]["message"]["role"], "assistant");
        assert_eq!(output_text(&value).as_deref(), Some("hello"));
    }

    #[test]
    fn json_output_is_kept_as_is() {
        let value = parse_cli_output(r#"{"type":"result","result":"done","session_id":"s-1"}"#);
        assert_eq!(output_text(&value).as_deref(), Some("done"));
        assert_eq!(session_token(&value).as_deref(), Some("s-1"));
        assert_eq!(session_token(&json!({"id": "x", "session_id": "y"})).as_deref(), Some("x"));
        assert_eq!(session_token(&json!({"id": ""})), None);
    }

    #[test]
    fn stream_text_is_extracted_from_known_event_shapes() {
        let assistant = json!({
            "type": "assistant",
            "message": { "content": [{ "type": "text", "text": "hi" }] }
        });
        assert_eq!(stream_event_text(&assistant).as_deref(), Some("hi"));

        let partial = json!({
            "type": "stream_event",
            "event": { "type": "content_block_delta", "delta": { "type": "text_delta", "text": "par" } }
        });
        assert_eq!(stream_event_text(&partial).as_deref(), Some("par"));

        let chunk = json!({ "choices": [{ "delta": { "content": "c" } }] });
        assert_eq!(stream_event_text(&chunk).as_deref(), Some("c"));

        assert_eq!(stream_event_text(&json!({ "type": "system", "subtype": "init" })), None);
    }
}

//! OpenAI- and Anthropic-compatible client surfaces over the headless Claude
//! CLI. Every call becomes one CLI subprocess; buffered calls collect stdout,
//! streaming calls yield newline-delimited JSON events as they arrive.

pub mod adapters;
pub mod chat;
pub mod client;
pub mod errors;
pub mod harness;
pub mod messages;
pub mod models;
pub mod runner;
pub mod session;
pub mod tools;

pub use crate::adapters::anthropic::{
    AnthropicMessage, AnthropicTool, ContentBlock, MessageContent, MessageCreateParams, MessageResponse,
    MessageStreamEvent, MessageStreamEventType,
};
pub use crate::adapters::convert::{
    anthropic_to_openai_message, anthropic_to_openai_tools, openai_to_anthropic_message, openai_to_anthropic_tools,
    ConversationMessage,
};
pub use crate::adapters::openai::{
    ChatCompletion, ChatCompletionChunk, ChatCompletionCreateParams, OpenAiFunction, OpenAiMessage, OpenAiTool,
    StopSequence,
};
pub use crate::adapters::{FileReference, Role};
pub use crate::chat::ChatCompletionStream;
pub use crate::client::ClaudeCode;
pub use crate::errors::{ApiError, BridgeError, BridgeResult};
pub use crate::harness::demux::{EventStream, StreamEvent};
pub use crate::messages::MessageStream;
pub use crate::models::{ClientOptions, ExecutionRequest, OutputFormat};
pub use crate::runner::{AbortHandle, CliByteStream, CliRunner};
pub use crate::session::{Session, SessionParams};
pub use crate::tools::ToolCreateParams;

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// Installs a global subscriber filtered by `RUST_LOG` (default `info`).
///
/// With a directory, JSON events go to a daily-rolling `claude-bridge.log`
/// there; otherwise plain text goes to stderr. Fails if a global subscriber
/// is already set.
pub fn init_tracing(log_dir: Option<&Path>) -> Result<(), String> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let Some(log_dir) = log_dir else {
        return tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|error| error.to_string());
    };

    std::fs::create_dir_all(log_dir).map_err(|error| error.to_string())?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "claude-bridge.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| error.to_string())
}

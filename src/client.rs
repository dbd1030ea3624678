use crate::chat::Chat;
use crate::messages::Messages;
use crate::models::{ClientOptions, MCP_URL_ENV};
use crate::runner::CliRunner;
use crate::session::Sessions;
use crate::tools::Tools;
use std::sync::Arc;

/// Facade over one CLI installation, exposing both API shapes.
pub struct ClaudeCode {
    runner: Arc<CliRunner>,
    chat: Chat,
    messages: Messages,
    sessions: Sessions,
    tools: Tools,
}

impl ClaudeCode {
    pub fn new(options: ClientOptions) -> Self {
        let runner = Arc::new(CliRunner::new(options));
        Self {
            chat: Chat::new(runner.clone()),
            messages: Messages::new(runner.clone()),
            sessions: Sessions::new(runner.clone()),
            tools: Tools::new(),
            runner,
        }
    }

    /// Client configured from `ANTHROPIC_API_KEY`, `CLAUDE_CLI_PATH` and
    /// `CLAUDE_CLI_TIMEOUT_MS`.
    pub fn from_env() -> Self {
        Self::new(ClientOptions::from_env())
    }

    pub fn chat(&self) -> &Chat {
        &self.chat
    }

    pub fn messages(&self) -> &Messages {
        &self.messages
    }

    pub fn sessions(&self) -> &Sessions {
        &self.sessions
    }

    pub fn tools(&self) -> &Tools {
        &self.tools
    }

    /// Points later executions at an MCP server via the child environment.
    pub fn set_mcp_server(&self, url: impl Into<String>) {
        let url = url.into();
        tracing::info!(url = %url, "mcp server configured");
        self.runner.set_env(MCP_URL_ENV, url);
    }

    /// Direct access to the process layer, including cancellable execution.
    pub fn runner(&self) -> &CliRunner {
        &self.runner
    }
}

impl Default for ClaudeCode {
    fn default() -> Self {
        Self::new(ClientOptions::default())
    }
}

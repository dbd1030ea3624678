use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_CLI_PATH: &str = "claude";
pub const DEFAULT_TIMEOUT_MS: u64 = 300_000;
pub const DEFAULT_MODEL: &str = "claude-code";
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
pub const MCP_URL_ENV: &str = "CLAUDE_CODE_MCP_URL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    Text,
    Json,
    StreamJson,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
            Self::StreamJson => "stream-json",
        }
    }
}

/// One logical invocation of the CLI.
///
/// Built per call and not mutated once handed to a runner. `continue_session`
/// and `resume` are not meant to be combined; `StreamJson` output is only
/// valid on the streaming path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    pub prompt: Option<String>,
    pub output_format: Option<OutputFormat>,
    pub system_prompt: Option<String>,
    #[serde(default, rename = "continue")]
    pub continue_session: bool,
    pub resume: Option<String>,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default)]
    pub disallowed_tools: Vec<String>,
    pub mcp_config: Option<String>,
    pub max_turns: Option<u32>,
    /// Overrides the client timeout for this call. Never forwarded as a flag.
    pub timeout_ms: Option<u64>,
    /// Pass-through options, emitted as `--<kebab-key> <value>` in insertion order.
    #[serde(default)]
    pub extra_flags: Vec<(String, serde_json::Value)>,
}

impl ExecutionRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }

    pub fn with_resume(mut self, session_id: impl Into<String>) -> Self {
        self.resume = Some(session_id.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Sets a pass-through flag. `None`/`null` values are ignored, and a
    /// repeated key replaces the earlier value in place.
    pub fn with_flag(mut self, key: impl Into<String>, value: impl Into<Option<serde_json::Value>>) -> Self {
        let key = key.into();
        let Some(value) = value.into() else {
            return self;
        };
        if value.is_null() {
            return self;
        }
        if let Some(slot) = self.extra_flags.iter_mut().find(|(existing, _)| *existing == key) {
            slot.1 = value;
        } else {
            self.extra_flags.push((key, value));
        }
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientOptions {
    pub api_key: Option<String>,
    pub cli_path: String,
    /// Arguments placed before the generated flags, e.g. a script for an interpreter.
    pub cli_args: Vec<String>,
    pub timeout_ms: u64,
    pub env: BTreeMap<String, String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            api_key: None,
            cli_path: DEFAULT_CLI_PATH.to_string(),
            cli_args: Vec::new(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            env: BTreeMap::new(),
        }
    }
}

impl ClientOptions {
    pub fn from_env() -> Self {
        let mut options = Self::default();
        options.api_key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty());
        if let Ok(path) = std::env::var("CLAUDE_CLI_PATH") {
            if !path.trim().is_empty() {
                options.cli_path = path;
            }
        }
        if let Some(timeout_ms) = std::env::var("CLAUDE_CLI_TIMEOUT_MS")
            .ok()
            .and_then(|value| value.trim().parse::<u64>().ok())
            .filter(|value| *value > 0)
        {
            options.timeout_ms = timeout_ms;
        }
        options
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_cli_path(mut self, cli_path: impl Into<String>) -> Self {
        self.cli_path = cli_path.into();
        self
    }

    pub fn with_cli_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cli_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Environment overrides for the child; explicit `env` entries win over the API key.
    pub fn child_env(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        if let Some(api_key) = &self.api_key {
            env.insert(API_KEY_ENV.to_string(), api_key.clone());
        }
        for (key, value) in &self.env {
            env.insert(key.clone(), value.clone());
        }
        env
    }
}

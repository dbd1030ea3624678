use super::CliCommand;
use crate::models::{ClientOptions, ExecutionRequest};
use once_cell::sync::Lazy;
use std::collections::BTreeMap;

static CAMEL_BOUNDARY_RE: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"([a-z0-9])([A-Z])").expect("valid camel boundary regex"));

/// Keys with a dedicated flag; pass-through entries using them are ignored.
const RECOGNIZED_KEYS: &[&str] = &[
    "prompt",
    "outputFormat",
    "systemPrompt",
    "continue",
    "resume",
    "allowedTools",
    "disallowedTools",
    "mcpConfig",
    "maxTurns",
];

#[derive(Debug, Default)]
pub struct ClaudeAdapter;

impl ClaudeAdapter {
    pub fn build_command(
        &self,
        request: &ExecutionRequest,
        options: &ClientOptions,
        env: BTreeMap<String, String>,
    ) -> CliCommand {
        let mut args = options.cli_args.clone();
        args.extend(self.build_args(request));
        CliCommand {
            program: options.cli_path.clone(),
            args,
            env,
        }
    }

    pub fn build_args(&self, request: &ExecutionRequest) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(prompt) = request.prompt.as_deref().filter(|value| !value.is_empty()) {
            args.push("-p".to_string());
            args.push(prompt.to_string());
        }

        if let Some(format) = request.output_format {
            args.push("--output-format".to_string());
            args.push(format.as_str().to_string());
        }

        if let Some(system_prompt) = request.system_prompt.as_deref().filter(|value| !value.is_empty()) {
            args.push("--system-prompt".to_string());
            args.push(system_prompt.to_string());
        }

        if request.continue_session {
            args.push("--continue".to_string());
        }

        if let Some(resume) = request.resume.as_deref().filter(|value| !value.is_empty()) {
            args.push("--resume".to_string());
            args.push(resume.to_string());
        }

        if !request.allowed_tools.is_empty() {
            args.push("--allowedTools".to_string());
            args.push(request.allowed_tools.join(","));
        }

        if !request.disallowed_tools.is_empty() {
            args.push("--disallowedTools".to_string());
            args.push(request.disallowed_tools.join(","));
        }

        if let Some(mcp_config) = request.mcp_config.as_deref().filter(|value| !value.is_empty()) {
            args.push("--mcp-config".to_string());
            args.push(mcp_config.to_string());
        }

        if let Some(max_turns) = request.max_turns.filter(|value| *value > 0) {
            args.push("--max-turns".to_string());
            args.push(max_turns.to_string());
        }

        for (key, value) in &request.extra_flags {
            if RECOGNIZED_KEYS.contains(&key.as_str()) {
                continue;
            }
            let Some(rendered) = flag_value(value) else {
                continue;
            };
            args.push(format!("--{}", to_kebab_case(key)));
            args.push(rendered);
        }

        args
    }
}

pub fn to_kebab_case(key: &str) -> String {
    CAMEL_BOUNDARY_RE
        .replace_all(key, "$1-$2")
        .to_lowercase()
}

fn flag_value(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(string) => Some(string.clone()),
        serde_json::Value::Bool(flag) => Some(flag.to_string()),
        serde_json::Value::Number(number) => Some(number.to_string()),
        serde_json::Value::Array(items) => Some(
            items
                .iter()
                .filter_map(flag_value)
                .collect::<Vec<_>>()
                .join(","),
        ),
        serde_json::Value::Object(_) => Some(value.to_string()),
    }
}

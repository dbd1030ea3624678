use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const TIMEOUT_STATUS: i32 = 408;
pub const CANCELLED_STATUS: i32 = 499;
pub const INTERNAL_STATUS: i32 = 500;

#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    #[error("Claude CLI execution timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("Claude CLI execution failed: {message}{}", stderr_suffix(.stderr))]
    Spawn {
        message: String,
        stderr: String,
        code: &'static str,
    },
    #[error("Claude CLI process exited with code {}{}", display_code(.code), stderr_suffix(.stderr))]
    Exit { code: Option<i32>, stderr: String },
    #[error("Claude CLI execution was cancelled")]
    Cancelled,
    #[error("INVALID_REQUEST: {0}")]
    InvalidRequest(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Numeric status surfaced to callers of either API shape.
    pub fn status(&self) -> i32 {
        match self {
            Self::Timeout { .. } => TIMEOUT_STATUS,
            Self::Cancelled => CANCELLED_STATUS,
            Self::InvalidRequest(_) => 400,
            Self::Exit { code: Some(code), .. } if *code != 0 => *code,
            Self::Exit { .. } | Self::Spawn { .. } | Self::Io(_) | Self::Internal(_) => INTERNAL_STATUS,
        }
    }

    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::Timeout { .. } => Some("TIMEOUT"),
            Self::Spawn { code, .. } => Some(*code),
            Self::Cancelled => Some("CANCELLED"),
            Self::InvalidRequest(_) => Some("INVALID_REQUEST"),
            Self::Exit { .. } | Self::Io(_) | Self::Internal(_) => None,
        }
    }
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!("\nStderr: {}", stderr)
    }
}

fn display_code(code: &Option<i32>) -> String {
    code.map(|code| code.to_string())
        .unwrap_or_else(|| "null".to_string())
}

impl From<std::io::Error> for BridgeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(value: serde_json::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;

/// Error shape shared by the chat-completions and messages surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub message: String,
    pub status: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (status {})", self.message, self.status)
    }
}

impl std::error::Error for ApiError {}

impl From<BridgeError> for ApiError {
    fn from(value: BridgeError) -> Self {
        Self {
            message: value.to_string(),
            status: value.status(),
            code: value.code().map(str::to_string),
        }
    }
}

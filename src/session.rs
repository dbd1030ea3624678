use crate::adapters::convert::{messages_to_prompt, parse_cli_output, session_token, ConversationMessage};
use crate::adapters::openai::ChatCompletion;
use crate::errors::ApiError;
use crate::models::{ExecutionRequest, OutputFormat, DEFAULT_MODEL};
use crate::runner::Executor;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const SESSION_SUFFIX_LEN: usize = 7;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionParams {
    pub messages: Vec<ConversationMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

pub struct Sessions {
    executor: Arc<dyn Executor>,
}

impl Sessions {
    pub(crate) fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor }
    }

    /// Sends the opening messages and binds the conversation to the token the
    /// CLI reports, or to a generated one when it reports none.
    pub async fn create(&self, params: SessionParams) -> Result<Session, ApiError> {
        let request = ExecutionRequest::new()
            .with_prompt(messages_to_prompt(&params.messages))
            .with_output_format(OutputFormat::Json);
        let output = self.executor.execute(request).await?;
        let id = session_token(&parse_cli_output(&output)).unwrap_or_else(generate_session_id);
        tracing::info!(session_id = %id, "session created");

        Ok(Session {
            id,
            model: params.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            executor: Arc::clone(&self.executor),
            messages: params.messages,
        })
    }

    /// Reattaches to an existing conversation. The returned session starts
    /// with an empty local history.
    pub async fn resume(&self, session_id: impl Into<String>) -> Result<Session, ApiError> {
        let id = session_id.into();
        let request = ExecutionRequest::new()
            .with_resume(id.clone())
            .with_output_format(OutputFormat::Json);
        self.executor.execute(request).await?;
        tracing::info!(session_id = %id, "session resumed");

        Ok(Session {
            id,
            model: DEFAULT_MODEL.to_string(),
            executor: Arc::clone(&self.executor),
            messages: Vec::new(),
        })
    }
}

/// In-memory accumulator of one conversation's messages.
///
/// Not synchronised: concurrent `continue_with` calls need external ordering,
/// which `&mut self` enforces.
pub struct Session {
    id: String,
    model: String,
    executor: Arc<dyn Executor>,
    messages: Vec<ConversationMessage>,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Appends `messages` to the history, then sends only those messages
    /// with `--resume <id>`. The history keeps them even if the call fails.
    pub async fn continue_with<I, M>(&mut self, messages: I) -> Result<ChatCompletion, ApiError>
    where
        I: IntoIterator<Item = M>,
        M: Into<ConversationMessage>,
    {
        let messages: Vec<ConversationMessage> = messages.into_iter().map(Into::into).collect();
        self.messages.extend(messages.iter().cloned());

        let request = ExecutionRequest::new()
            .with_prompt(messages_to_prompt(&messages))
            .with_resume(self.id.clone())
            .with_output_format(OutputFormat::Json);
        let output = self.executor.execute(request).await?;
        Ok(ChatCompletion::from_cli_output(&output, &self.model))
    }

    pub fn messages(&self) -> Vec<ConversationMessage> {
        self.messages.clone()
    }
}

/// `session_<unix millis>_<7 base-36 chars>`.
pub fn generate_session_id() -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..SESSION_SUFFIX_LEN)
        .map(|_| BASE36[rng.random_range(0..BASE36.len())] as char)
        .collect();
    format!("session_{}_{}", chrono::Utc::now().timestamp_millis(), suffix)
}

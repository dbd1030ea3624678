use crate::adapters::openai::{completion_id, ChatCompletion, ChatCompletionChunk, ChatCompletionCreateParams};
use crate::errors::{ApiError, BridgeError};
use crate::harness::demux::EventStream;
use crate::models::{OutputFormat, DEFAULT_MODEL};
use crate::runner::Executor;
use futures::future::try_join_all;
use futures::Stream;
use std::sync::Arc;

/// OpenAI-style entry point: `client.chat().completions()`.
pub struct Chat {
    completions: ChatCompletions,
}

impl Chat {
    pub(crate) fn new(executor: Arc<dyn Executor>) -> Self {
        Self {
            completions: ChatCompletions { executor },
        }
    }

    pub fn completions(&self) -> &ChatCompletions {
        &self.completions
    }
}

pub struct ChatCompletions {
    executor: Arc<dyn Executor>,
}

impl ChatCompletions {
    pub async fn create(&self, params: ChatCompletionCreateParams) -> Result<ChatCompletion, ApiError> {
        if params.stream {
            return Err(BridgeError::InvalidRequest(
                "stream is not supported by create; use create_stream".to_string(),
            )
            .into());
        }
        let model = model_or_default(&params.model);
        tracing::debug!(model = %model, messages = params.messages.len(), "creating chat completion");
        let output = self
            .executor
            .execute(params.to_execution_request(OutputFormat::Json))
            .await?;
        Ok(ChatCompletion::from_cli_output(&output, &model))
    }

    pub fn create_stream(&self, params: ChatCompletionCreateParams) -> ChatCompletionStream {
        let model = model_or_default(&params.model);
        tracing::debug!(model = %model, messages = params.messages.len(), "streaming chat completion");
        let bytes = self
            .executor
            .execute_stream(params.to_execution_request(OutputFormat::StreamJson));
        ChatCompletionStream {
            events: EventStream::new(bytes),
            id: completion_id(),
            model,
            created: chrono::Utc::now().timestamp(),
        }
    }

    /// Runs every request concurrently. Results keep the input order; the
    /// first failure fails the whole batch.
    pub async fn batch_create(&self, params: Vec<ChatCompletionCreateParams>) -> Result<Vec<ChatCompletion>, ApiError> {
        try_join_all(params.into_iter().map(|params| self.create(params))).await
    }
}

/// Chat-completion chunks translated from the CLI's streamed events.
pub struct ChatCompletionStream {
    events: EventStream,
    id: String,
    model: String,
    created: i64,
}

impl ChatCompletionStream {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Next chunk; events without chat content are skipped.
    pub async fn next_chunk(&mut self) -> Option<Result<ChatCompletionChunk, ApiError>> {
        loop {
            match self.events.next_event().await? {
                Ok(event) => {
                    if let Some(chunk) = ChatCompletionChunk::from_event(&event, &self.id, &self.model, self.created) {
                        return Some(Ok(chunk));
                    }
                }
                Err(error) => return Some(Err(error.into())),
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<ChatCompletionChunk, ApiError>> {
        futures::stream::unfold(self, |mut stream| async move {
            let chunk = stream.next_chunk().await?;
            Some((chunk, stream))
        })
    }
}

pub(crate) fn model_or_default(model: &str) -> String {
    if model.trim().is_empty() {
        DEFAULT_MODEL.to_string()
    } else {
        model.to_string()
    }
}

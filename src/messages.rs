use crate::adapters::anthropic::{MessageCreateParams, MessageResponse, MessageStreamEvent};
use crate::chat::model_or_default;
use crate::errors::{ApiError, BridgeError};
use crate::harness::demux::EventStream;
use crate::models::OutputFormat;
use crate::runner::Executor;
use futures::future::try_join_all;
use futures::Stream;
use std::sync::Arc;

/// Anthropic-style entry point: `client.messages()`.
pub struct Messages {
    executor: Arc<dyn Executor>,
}

impl Messages {
    pub(crate) fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor }
    }

    pub async fn create(&self, params: MessageCreateParams) -> Result<MessageResponse, ApiError> {
        if params.stream {
            return Err(BridgeError::InvalidRequest(
                "stream is not supported by create; use create_stream".to_string(),
            )
            .into());
        }
        let model = model_or_default(&params.model);
        tracing::debug!(model = %model, messages = params.messages.len(), "creating message");
        let output = self
            .executor
            .execute(params.to_execution_request(OutputFormat::Json))
            .await?;
        Ok(MessageResponse::from_cli_output(&output, &model))
    }

    pub fn create_stream(&self, params: MessageCreateParams) -> MessageStream {
        tracing::debug!(messages = params.messages.len(), "streaming message");
        let bytes = self
            .executor
            .execute_stream(params.to_execution_request(OutputFormat::StreamJson));
        MessageStream {
            events: EventStream::new(bytes),
        }
    }

    pub async fn batch_create(&self, params: Vec<MessageCreateParams>) -> Result<Vec<MessageResponse>, ApiError> {
        try_join_all(params.into_iter().map(|params| self.create(params))).await
    }
}

pub struct MessageStream {
    events: EventStream,
}

impl MessageStream {
    pub async fn next_event(&mut self) -> Option<Result<MessageStreamEvent, ApiError>> {
        loop {
            match self.events.next_event().await? {
                Ok(event) => {
                    if let Some(translated) = MessageStreamEvent::from_event(&event) {
                        return Some(Ok(translated));
                    }
                }
                Err(error) => return Some(Err(error.into())),
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<MessageStreamEvent, ApiError>> {
        futures::stream::unfold(self, |mut stream| async move {
            let event = stream.next_event().await?;
            Some((event, stream))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::Messages;
    use crate::adapters::anthropic::{AnthropicMessage, MessageCreateParams, MessageStreamEventType};
    use crate::adapters::Role;
    use crate::errors::BridgeError;
    use crate::models::OutputFormat;
    use crate::runner::mock::MockExecutor;
    use futures::StreamExt;
    use std::sync::Arc;

    fn params(text: &str) -> MessageCreateParams {
        MessageCreateParams {
            model: "sonnet".to_string(),
            messages: vec![AnthropicMessage::new(Role::User, text)],
            stop_sequences: Some(vec!["END".to_string()]),
            ..MessageCreateParams::default()
        }
    }

    #[tokio::test]
    async fn create_wraps_plain_output_in_a_text_block() {
        let executor = Arc::new(MockExecutor::replying(Ok("Hello there\n")));
        let message = Messages::new(executor.clone()).create(params("hi")).await.expect("message");
        assert_eq!(message.text(), "Hello there");
        assert_eq!(message.model, "sonnet");
        assert_eq!(message.stop_reason.as_deref(), Some("end_turn"));

        let request = &executor.requests()[0];
        assert_eq!(request.output_format, Some(OutputFormat::Json));
        assert!(request.extra_flags.contains(&("stop".to_string(), serde_json::json!("END"))));
    }

    #[tokio::test]
    async fn create_rejects_stream_flag() {
        let mut request = params("hi");
        request.stream = true;
        let error = Messages::new(Arc::new(MockExecutor::replying(Ok(""))))
            .create(request)
            .await
            .expect_err("rejected");
        assert_eq!(error.status, 400);
    }

    #[tokio::test]
    async fn batch_create_keeps_input_order() {
        let executor = Arc::new(MockExecutor::replying(Ok("ok")));
        let messages = Messages::new(executor)
            .batch_create(vec![params("one"), params("two")])
            .await
            .expect("batch");
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|message| message.text() == "ok"));
    }

    #[tokio::test]
    async fn stream_translates_events_and_ends_on_error() {
        let executor = Arc::new(MockExecutor::streaming(vec![
            Ok("{\"type\":\"stream_event\",\"event\":{\"type\":\"content_block_start\",\"index\":0}}\n"),
            Ok("{\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi\"}}\n{\"type\":\"result\"}\n"),
            Err(BridgeError::Cancelled),
        ]));
        let events: Vec<_> = Messages::new(executor).create_stream(params("hi")).into_stream().collect().await;

        assert_eq!(events.len(), 4);
        assert_eq!(events[0].as_ref().map(|event| event.kind).ok(), Some(MessageStreamEventType::ContentBlockStart));
        let delta = events[1].as_ref().expect("delta").delta.clone().expect("delta body");
        assert_eq!(delta.text.as_deref(), Some("Hi"));
        assert_eq!(events[2].as_ref().map(|event| event.kind).ok(), Some(MessageStreamEventType::MessageStop));
        assert_eq!(events[3].as_ref().map_err(|error| error.status).err(), Some(499));
    }
}

use super::line_buffer::LineBuffer;
use crate::errors::BridgeResult;
use crate::runner::CliByteStream;
use bytes::Bytes;
use futures::Stream;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

/// One parsed JSON line of streamed CLI output.
pub type StreamEvent = serde_json::Value;

pub const DEFAULT_MAX_EVENT_LINE_BYTES: usize = 16 * 1024 * 1024;

/// Pull-based view of a live byte source as parsed JSON events.
///
/// Partial lines are carried over between chunks and every complete line is
/// yielded before more input is awaited. Blank and malformed lines are
/// dropped. A single line longer than the line limit
/// (`DEFAULT_MAX_EVENT_LINE_BYTES` unless set with `with_max_line_bytes`) is
/// skipped whole with a warning. The sequence ends when the source ends and
/// yields the source's error (once) if it fails; it cannot be restarted.
pub struct EventStream<S = CliByteStream> {
    source: S,
    lines: LineBuffer,
    pending: VecDeque<StreamEvent>,
    finished: bool,
}

impl<S> EventStream<S>
where
    S: Stream<Item = BridgeResult<Bytes>> + Unpin,
{
    pub fn new(source: S) -> Self {
        Self::with_max_line_bytes(source, DEFAULT_MAX_EVENT_LINE_BYTES)
    }

    pub fn with_max_line_bytes(source: S, max_line_bytes: usize) -> Self {
        Self {
            source,
            lines: LineBuffer::discarding_oversized(max_line_bytes),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    /// Waits for the next event; `None` once the process output is exhausted.
    pub async fn next_event(&mut self) -> Option<BridgeResult<StreamEvent>> {
        futures::StreamExt::next(self).await
    }

    fn ingest(&mut self, chunk: &[u8]) {
        for line in self.lines.push(chunk) {
            self.accept_line(&line);
        }
        let overflowed = self.lines.consume_overflowed_bytes();
        if overflowed > 0 {
            tracing::warn!(bytes = overflowed, "stream line exceeded line limit; skipped");
        }
    }

    fn accept_line(&mut self, line: &str) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return;
        }
        match serde_json::from_str::<StreamEvent>(trimmed) {
            Ok(event) => self.pending.push_back(event),
            Err(error) => {
                tracing::debug!(error = %error, line = %trimmed, "skipping malformed stream line");
            }
        }
    }
}

impl<S> Stream for EventStream<S>
where
    S: Stream<Item = BridgeResult<Bytes>> + Unpin,
{
    type Item = BridgeResult<StreamEvent>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(event) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }
            if this.finished {
                return Poll::Ready(None);
            }

            match Pin::new(&mut this.source).poll_next(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(chunk))) => this.ingest(&chunk),
                Poll::Ready(Some(Err(error))) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(error)));
                }
                Poll::Ready(None) => {
                    this.finished = true;
                    let rest = this.lines.flush();
                    this.accept_line(&rest);
                }
            }
        }
    }
}

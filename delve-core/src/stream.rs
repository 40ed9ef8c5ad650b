//! Stream accumulation — turns delta events into one assembled buffer.
//!
//! Providers report reasoning either inline (a literal `<think>` segment in
//! the content) or through a separate channel. The accumulator folds both
//! into the inline convention so the stripper only ever deals with markers.

use crate::error::{LlmError, StageError};
use crate::marker::{CLOSE_MARKER, MarkerScanner, MarkerState, OPEN_MARKER};
use crate::types::{DeltaEvent, DeltaStream};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Who opened a reasoning segment that was still open when the stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentOrigin {
    /// The model wrote the opening marker into its content.
    Model,
    /// The accumulator inserted it for a reasoning-channel delta.
    Synthesized,
}

/// The final, immutable buffer produced by a [`StreamAccumulator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledText {
    text: String,
    implicit_close: Option<SegmentOrigin>,
}

impl AssembledText {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }

    /// Set when the accumulator had to close the final segment at end of stream.
    pub fn implicit_close(&self) -> Option<SegmentOrigin> {
        self.implicit_close
    }

    /// The buffer as the model left it, when the model itself never closed
    /// its reasoning segment.
    pub fn unterminated_source(&self) -> Option<&str> {
        match self.implicit_close {
            Some(SegmentOrigin::Model) => self.text.strip_suffix(CLOSE_MARKER),
            _ => None,
        }
    }
}

/// How consumption of a delta stream ended.
#[derive(Debug)]
pub enum StreamEnd {
    /// The provider finished the stream normally.
    Completed,
    /// The provider terminated the stream with an error.
    Interrupted(LlmError),
    /// The caller cancelled consumption.
    Cancelled,
}

/// Folds delta events into one append-only buffer.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    buffer: String,
    scanner: MarkerScanner,
    synthesized_open: bool,
    events: usize,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one delta event.
    pub fn push(&mut self, event: DeltaEvent) {
        self.events += 1;

        if let Some(content) = event.content_delta.filter(|c| !c.is_empty()) {
            if self.synthesized_open && self.scanner.state() == MarkerState::Inside {
                // Content resumes after a reasoning-channel burst.
                self.append(CLOSE_MARKER);
            }
            self.append(&content);
        }

        if let Some(reasoning) = event.reasoning_delta.filter(|r| !r.is_empty()) {
            if self.scanner.state() == MarkerState::Outside {
                self.append(OPEN_MARKER);
                self.synthesized_open = true;
            }
            self.append(&reasoning);
        }
    }

    fn append(&mut self, text: &str) {
        self.buffer.push_str(text);
        self.scanner.advance(&self.buffer);
        if self.scanner.state() == MarkerState::Outside {
            self.synthesized_open = false;
        }
    }

    /// The partial buffer; always safe to read, even mid-stream.
    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Number of events applied so far.
    pub fn events(&self) -> usize {
        self.events
    }

    /// Drain `stream` into the buffer until it ends, fails, or `cancel` fires.
    ///
    /// Cancellation is observed between deltas; whatever was appended before
    /// it stays in the buffer.
    pub async fn consume(&mut self, mut stream: DeltaStream, cancel: &CancellationToken) -> StreamEnd {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return StreamEnd::Cancelled,
                next = stream.next() => next,
            };
            match next {
                Some(Ok(event)) => self.push(event),
                Some(Err(e)) => return StreamEnd::Interrupted(e),
                None => return StreamEnd::Completed,
            }
        }
    }

    /// Seal the buffer, closing a reasoning segment left open at end of stream.
    pub fn finish(mut self) -> AssembledText {
        let mut implicit_close = None;
        if self.scanner.state() == MarkerState::Inside {
            implicit_close = Some(if self.synthesized_open {
                SegmentOrigin::Synthesized
            } else {
                SegmentOrigin::Model
            });
            self.buffer.push_str(CLOSE_MARKER);
        }
        AssembledText {
            text: self.buffer,
            implicit_close,
        }
    }
}

/// Consume a whole provider stream into an [`AssembledText`].
///
/// An abrupt termination keeps the partial buffer when there is one and only
/// reports [`LlmError::EmptyStream`] when nothing arrived at all.
pub async fn collect(
    stream: DeltaStream,
    cancel: &CancellationToken,
    model: &str,
) -> Result<AssembledText, StageError> {
    let mut acc = StreamAccumulator::new();
    match acc.consume(stream, cancel).await {
        StreamEnd::Completed => {}
        StreamEnd::Cancelled => return Err(StageError::Cancelled),
        StreamEnd::Interrupted(e) => {
            if acc.is_empty() {
                warn!(model, error = %e, "Stream failed before producing any content");
                return Err(LlmError::EmptyStream {
                    model: model.to_string(),
                }
                .into());
            }
            warn!(
                model,
                error = %e,
                bytes = acc.as_str().len(),
                "Stream ended abruptly; keeping partial response"
            );
        }
    }

    if acc.is_empty() {
        return Err(LlmError::EmptyStream {
            model: model.to_string(),
        }
        .into());
    }

    debug!(model, events = acc.events(), bytes = acc.as_str().len(), "Stream assembled");
    Ok(acc.finish())
}

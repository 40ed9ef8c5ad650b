//! Brain module — streaming LLM provider abstraction.
//!
//! Defines the `LlmProvider` trait every stage talks to, and a scripted
//! `MockLlmProvider` for tests and offline runs.

use crate::error::LlmError;
use crate::types::{ChatRequest, DeltaEvent, DeltaStream};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::debug;

/// A chat backend that answers with a lazy stream of deltas.
///
/// The returned stream is finite and cannot be restarted; each call is an
/// independent request.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Start a streaming chat completion.
    async fn chat_stream(&self, request: ChatRequest) -> Result<DeltaStream, LlmError>;

    /// Default model used when a request leaves `model` empty.
    fn model_name(&self) -> &str;

    /// Short provider label for logs.
    fn provider_name(&self) -> &str {
        "llm"
    }
}

/// One scripted reply of a [`MockLlmProvider`].
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Stream these events in order, then end.
    Events(Vec<Result<DeltaEvent, LlmError>>),
    /// Fail before any stream is produced.
    Fail(LlmError),
    /// Produce a stream that never yields.
    Hang,
}

impl MockReply {
    /// Content split into small deltas, as a real provider would send it.
    pub fn text(text: &str) -> Self {
        Self::Events(chunk(text).map(|c| Ok(DeltaEvent::content(c))).collect())
    }

    /// Reasoning on the separate channel followed by content.
    pub fn reasoning_then_text(reasoning: &str, text: &str) -> Self {
        let events = chunk(reasoning)
            .map(|c| Ok(DeltaEvent::reasoning(c)))
            .chain(chunk(text).map(|c| Ok(DeltaEvent::content(c))))
            .collect();
        Self::Events(events)
    }

    /// A stream that terminates immediately without any delta.
    pub fn empty() -> Self {
        Self::Events(Vec::new())
    }
}

fn chunk(text: &str) -> impl Iterator<Item = String> + '_ {
    let chars: Vec<char> = text.chars().collect();
    let pieces: Vec<String> = chars.chunks(12).map(|c| c.iter().collect()).collect();
    pieces.into_iter()
}

/// A provider that replays queued replies in order and records requests.
pub struct MockLlmProvider {
    model: String,
    replies: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock that answers `text` to the next `count` calls.
    pub fn with_response(text: &str, count: usize) -> Self {
        let provider = Self::new();
        for _ in 0..count {
            provider.queue(MockReply::text(text));
        }
        provider
    }

    pub fn queue(&self, reply: MockReply) {
        lock(&self.replies).push_back(reply);
    }

    pub fn queue_text(&self, text: &str) {
        self.queue(MockReply::text(text));
    }

    /// Requests received so far, in call order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        lock(&self.requests).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.replies).len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn chat_stream(&self, request: ChatRequest) -> Result<DeltaStream, LlmError> {
        debug!(
            messages = request.messages.len(),
            strict = request.response_shape.as_ref().is_some_and(|s| s.strict),
            "Mock chat request"
        );
        lock(&self.requests).push(request);

        let reply = lock(&self.replies).pop_front();
        match reply {
            Some(MockReply::Events(events)) => Ok(futures::stream::iter(events).boxed()),
            Some(MockReply::Fail(e)) => Err(e),
            Some(MockReply::Hang) => Ok(futures::stream::pending().boxed()),
            None => Err(LlmError::ApiRequest {
                message: "mock provider has no scripted reply".to_string(),
            }),
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "mock"
    }
}

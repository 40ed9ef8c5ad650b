//! Core type definitions for delve.
//!
//! Chat messages, the request shape sent to a streaming provider, and the
//! delta events a provider yields back.

use crate::error::LlmError;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Represents a participant role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// JSON-schema guidance attached to a request when the provider should be
/// asked for a strictly shaped response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseShape {
    /// Schema name reported to the provider.
    pub name: String,
    /// The JSON schema itself.
    pub schema: serde_json::Value,
    /// Whether the provider should enforce the schema strictly.
    pub strict: bool,
}

/// A streaming chat request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub model: String,
    pub max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
    pub response_shape: Option<ResponseShape>,
}

impl Default for ChatRequest {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            model: String::new(),
            max_tokens: 2000,
            temperature: 1.0,
            top_p: 1.0,
            response_shape: None,
        }
    }
}

/// One incremental fragment of a streamed model response.
///
/// Providers carry either ordinary content or a separate reasoning channel;
/// an event may in principle carry both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_delta: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_delta: Option<String>,
}

impl DeltaEvent {
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content_delta: Some(text.into()),
            reasoning_delta: None,
        }
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        Self {
            content_delta: None,
            reasoning_delta: Some(text.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content_delta.as_deref().is_none_or(str::is_empty)
            && self.reasoning_delta.as_deref().is_none_or(str::is_empty)
    }
}

/// A finite, non-restartable stream of delta events.
///
/// An `Err` item means the provider terminated the stream abruptly.
pub type DeltaStream = BoxStream<'static, Result<DeltaEvent, LlmError>>;

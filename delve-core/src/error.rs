//! Error types for the delve core library.
//!
//! Uses `thiserror` for public API error types. Only [`PipelineError`] aborts a
//! research run; the other families are recovered locally (LLM and extraction
//! errors by the retry policy, agent errors by the subtask dispatcher).

use std::path::PathBuf;

/// Top-level error type for the delve core library.
#[derive(Debug, thiserror::Error)]
pub enum DelveError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the streaming chat provider.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Streaming error: {message}")]
    Streaming { message: String },

    #[error("Model {model} returned an empty stream")]
    EmptyStream { model: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },
}

/// Errors recovering a structured value from model text.
///
/// Snippets are bounded to [`crate::extract::SNIPPET_CHARS`] characters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("malformed structured literal: {reason} (snippet: {snippet:?})")]
    Malformed { reason: String, snippet: String },

    #[error("payload does not match expected shape: {reason} (snippet: {snippet:?})")]
    Shape { reason: String, snippet: String },
}

/// Failure of a single attempt at an LLM-backed stage.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StageError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("response contained no usable payload")]
    EmptyPayload,

    #[error("stage was cancelled")]
    Cancelled,
}

impl StageError {
    /// Every failure except cancellation is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, StageError::Cancelled)
    }
}

/// Errors from an isolated sub-agent invocation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AgentError {
    #[error("Agent execution failed: {message}")]
    ExecutionFailed { message: String },

    #[error("Agent timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Agent run was cancelled")]
    Cancelled,
}

/// Fatal errors that terminate a research run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("planning produced no research plan; a plan is required to continue")]
    EmptyPlan,

    #[error("splitting produced no subtasks; nothing to research")]
    NoSubtasks,

    #[error("split stage produced duplicate subtask id '{id}'")]
    DuplicateSubtaskId { id: String },

    #[error("run cancelled during {stage}")]
    Cancelled { stage: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Environment variable not set: {var}")]
    EnvVarMissing { var: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// A type alias for results using the top-level `DelveError`.
pub type Result<T> = std::result::Result<T, DelveError>;

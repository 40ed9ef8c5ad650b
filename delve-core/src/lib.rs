//! # Delve Core
//!
//! Core library for the Delve research pipeline.
//! Provides the streaming response decoder (accumulator, reasoning stripper,
//! structured extractor), the retry policy, the LLM and agent interfaces,
//! configuration, artifact persistence and the research stages themselves.

pub mod agent;
pub mod brain;
pub mod config;
pub mod error;
pub mod extract;
pub mod marker;
pub mod persistence;
pub mod providers;
pub mod reasoning;
pub mod research;
pub mod retry;
pub mod stream;
pub mod types;

// Re-export commonly used types at the crate root.
pub use agent::{AgentRunner, LlmAgentRunner, MockAgentRunner, ToolSet};
pub use brain::{LlmProvider, MockLlmProvider, MockReply};
pub use config::{DelveConfig, StageConfig};
pub use error::{
    AgentError, DelveError, ExtractionError, LlmError, PipelineError, Result, StageError,
};
pub use extract::RecordShape;
pub use persistence::{ArtifactStore, FsArtifactStore, MemoryArtifactStore, NullArtifactStore};
pub use research::{
    FinalReport, Finding, ResearchEngine, ResearchOutcome, ResearchPhase, ResearchSession,
    Subtask, Suggestion, TopicChoice, TopicSelector,
};
pub use retry::{AttemptProfile, RetryPolicy};
pub use stream::{AssembledText, StreamAccumulator};
pub use types::{ChatRequest, DeltaEvent, DeltaStream, Message, ResponseShape, Role};

//! Research pipeline — turns a vague topic into a synthesized report.
//!
//! Runs five stages in order:
//! 1. **Clarify** — propose sharper directions and let a selector pick one
//! 2. **Plan** — write a free-text research plan
//! 3. **Split** — break the plan into independent subtasks
//! 4. **Dispatch** — research each subtask with an isolated agent
//! 5. **Synthesize** — merge the findings into one report
//!
//! Only an empty plan, an empty or ambiguous subtask list, or cancellation
//! stop a run early.

pub mod clarify;
pub mod decomposition;
pub mod dispatch;
pub mod engine;
pub mod planner;
pub mod prompts;
pub mod session;
pub mod stage;
pub mod synthesis;

pub use clarify::{FirstSuggestion, KeepOriginalTopic, Suggestion, TopicChoice, TopicSelector};
pub use decomposition::Subtask;
pub use dispatch::{Finding, SubtaskDispatcher};
pub use engine::{ResearchEngine, ResearchOutcome};
pub use session::{
    NoOpResearchCallback, ResearchCallback, ResearchPhase, ResearchSession, SessionSummary,
};
pub use stage::{StageRunner, StageSpec};
pub use synthesis::FinalReport;

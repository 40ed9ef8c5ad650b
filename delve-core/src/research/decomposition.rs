//! Plan decomposition into independent subtasks.
//!
//! Subtasks carry their own full context so each can be researched by an
//! isolated agent. Ids must be unique within a plan.

use super::prompts::SPLITTER_DIRECTION;
use super::stage::{StageRunner, StageSpec};
use crate::config::StageConfig;
use crate::error::{PipelineError, StageError};
use crate::extract::RecordShape;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::info;

/// A single unit of research work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtask {
    /// Unique within the plan.
    pub id: String,
    pub title: String,
    /// Self-contained instructions for the agent.
    pub description: String,
}

impl RecordShape for Subtask {
    const CONTAINER_FIELD: &'static str = "subtasks";
    const SCHEMA_NAME: &'static str = "subtask_list";
    const REQUIRED_FIELDS: &'static [&'static str] = &["id", "title", "description"];
}

/// Reject a subtask list in which two entries share an id.
pub fn ensure_unique_ids(subtasks: &[Subtask]) -> Result<(), PipelineError> {
    let mut seen = HashSet::with_capacity(subtasks.len());
    for subtask in subtasks {
        if !seen.insert(subtask.id.as_str()) {
            return Err(PipelineError::DuplicateSubtaskId {
                id: subtask.id.clone(),
            });
        }
    }
    Ok(())
}

/// Ask the model to split `plan` into subtasks. Exhausted retries yield an
/// empty list.
pub async fn split(
    runner: &StageRunner,
    config: &StageConfig,
    topic: &str,
    plan: &str,
) -> Result<Vec<Subtask>, StageError> {
    info!(topic, model = %config.model, "Splitting plan into subtasks");
    let user = format!("Research topic: {topic}\n\nResearch plan:\n{plan}");
    let spec = StageSpec::new("split", config, SPLITTER_DIRECTION, &user);
    runner.ask_structured::<Subtask>(&spec).await
}

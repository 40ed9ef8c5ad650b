//! Research planning — turns the chosen topic into a free-text plan.

use super::prompts::PLANNER_DIRECTION;
use super::stage::{StageRunner, StageSpec};
use crate::config::StageConfig;
use crate::error::StageError;
use tracing::info;

/// Ask the model for a research plan. An empty string means every attempt
/// failed; the caller decides whether that is fatal.
pub async fn plan(
    runner: &StageRunner,
    config: &StageConfig,
    topic: &str,
) -> Result<String, StageError> {
    info!(topic, model = %config.model, "Planning research");
    let spec = StageSpec::new("plan", config, PLANNER_DIRECTION, &format!("Topic: {topic}"));
    runner.ask_text(&spec).await
}

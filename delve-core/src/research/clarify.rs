//! Topic clarification — proposes sharper research directions for a vague
//! topic and lets a [`TopicSelector`] pick one.

use super::prompts::CLARIFIER_DIRECTION;
use super::stage::{StageRunner, StageSpec};
use crate::config::StageConfig;
use crate::error::StageError;
use crate::extract::RecordShape;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// One proposed research direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub title: String,
    pub description: String,
}

impl Suggestion {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
        }
    }

    /// The topic string used downstream when this suggestion is chosen.
    pub fn as_topic(&self) -> String {
        format!("{}: {}", self.title, self.description)
    }
}

impl RecordShape for Suggestion {
    const CONTAINER_FIELD: &'static str = "suggestions";
    const SCHEMA_NAME: &'static str = "suggestion_list";
    const REQUIRED_FIELDS: &'static [&'static str] = &["title", "description"];
}

/// The user's answer to a list of suggestions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicChoice {
    /// Keep the topic as entered.
    Original,
    /// Zero-based index into the suggestion list.
    Suggestion(usize),
    /// A topic typed by the user.
    Custom(String),
}

/// Chooses the final topic from the clarifier's suggestions.
#[async_trait]
pub trait TopicSelector: Send + Sync {
    async fn select(&self, topic: &str, suggestions: &[Suggestion]) -> TopicChoice;
}

/// Always keeps the original topic; used for non-interactive runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepOriginalTopic;

#[async_trait]
impl TopicSelector for KeepOriginalTopic {
    async fn select(&self, _topic: &str, _suggestions: &[Suggestion]) -> TopicChoice {
        TopicChoice::Original
    }
}

/// Always takes the first suggestion.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstSuggestion;

#[async_trait]
impl TopicSelector for FirstSuggestion {
    async fn select(&self, _topic: &str, suggestions: &[Suggestion]) -> TopicChoice {
        if suggestions.is_empty() {
            TopicChoice::Original
        } else {
            TopicChoice::Suggestion(0)
        }
    }
}

/// Turn a selector's answer into the topic string used downstream.
pub fn resolve_topic(original: &str, suggestions: &[Suggestion], choice: &TopicChoice) -> String {
    match choice {
        TopicChoice::Original => original.to_string(),
        TopicChoice::Suggestion(index) => match suggestions.get(*index) {
            Some(s) => s.as_topic(),
            None => {
                warn!(index, count = suggestions.len(), "Selected suggestion does not exist; keeping original topic");
                original.to_string()
            }
        },
        TopicChoice::Custom(text) if !text.trim().is_empty() => text.trim().to_string(),
        TopicChoice::Custom(_) => original.to_string(),
    }
}

/// Ask the model for research directions. An empty list means the topic
/// should be used as-is.
pub async fn clarify(
    runner: &StageRunner,
    config: &StageConfig,
    topic: &str,
) -> Result<Vec<Suggestion>, StageError> {
    info!(topic, model = %config.model, "Clarifying topic");
    let spec = StageSpec::new(
        "clarify",
        config,
        CLARIFIER_DIRECTION,
        &format!("Topic: {topic}"),
    );
    runner.ask_structured::<Suggestion>(&spec).await
}

//! Interactive topic selection with dialoguer.
//!
//! dialoguer blocks on the terminal, so prompts run on the blocking pool.

use async_trait::async_trait;
use delve_core::research::clarify::{Suggestion, TopicChoice, TopicSelector};
use dialoguer::{Input, Select};
use tracing::warn;

/// Offers the clarifier's suggestions in a terminal menu.
pub struct DialoguerSelector;

#[async_trait]
impl TopicSelector for DialoguerSelector {
    async fn select(&self, topic: &str, suggestions: &[Suggestion]) -> TopicChoice {
        let topic = topic.to_string();
        let suggestions = suggestions.to_vec();
        match tokio::task::spawn_blocking(move || prompt_choice(&topic, &suggestions)).await {
            Ok(Ok(choice)) => choice,
            Ok(Err(e)) => {
                warn!(error = %e, "Topic menu failed; keeping the original topic");
                TopicChoice::Original
            }
            Err(e) => {
                warn!(error = %e, "Topic menu task panicked; keeping the original topic");
                TopicChoice::Original
            }
        }
    }
}

/// Ask for a topic when none was given on the command line.
pub async fn prompt_topic() -> anyhow::Result<String> {
    let topic = tokio::task::spawn_blocking(|| {
        Input::<String>::new()
            .with_prompt("What would you like to research?")
            .interact_text()
    })
    .await??;
    let topic = topic.trim().to_string();
    if topic.is_empty() {
        anyhow::bail!("no topic given");
    }
    Ok(topic)
}

/// Menu rows: keep original, one per suggestion, then custom entry.
fn menu_items(topic: &str, suggestions: &[Suggestion]) -> Vec<String> {
    let mut items = Vec::with_capacity(suggestions.len() + 2);
    items.push(format!("Keep original topic: {topic}"));
    items.extend(
        suggestions
            .iter()
            .map(|s| format!("{} - {}", s.title, s.description)),
    );
    items.push("Enter my own topic".to_string());
    items
}

/// Map a menu row back to a choice. `None` means the custom-entry row.
fn choice_for(row: usize, suggestion_count: usize) -> Option<TopicChoice> {
    match row {
        0 => Some(TopicChoice::Original),
        r if r <= suggestion_count => Some(TopicChoice::Suggestion(r - 1)),
        _ => None,
    }
}

fn prompt_choice(topic: &str, suggestions: &[Suggestion]) -> Result<TopicChoice, dialoguer::Error> {
    let row = Select::new()
        .with_prompt("Pick a research direction")
        .items(&menu_items(topic, suggestions))
        .default(0)
        .interact()?;

    match choice_for(row, suggestions.len()) {
        Some(choice) => Ok(choice),
        None => {
            let custom: String = Input::new()
                .with_prompt("Your topic")
                .interact_text()?;
            Ok(TopicChoice::Custom(custom))
        }
    }
}

//! One research run from the command line.

use crate::progress::ConsoleProgress;
use crate::selector::{DialoguerSelector, prompt_topic};
use delve_core::agent::LlmAgentRunner;
use delve_core::config::DelveConfig;
use delve_core::persistence::{ArtifactStore, FsArtifactStore, NullArtifactStore};
use delve_core::research::clarify::{KeepOriginalTopic, TopicSelector};
use delve_core::research::session::{NoOpResearchCallback, ResearchCallback};
use delve_core::research::ResearchEngine;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct RunOptions {
    pub topic: Option<String>,
    pub interactive: bool,
    pub quiet: bool,
}

pub async fn run(options: RunOptions, config: DelveConfig) -> anyhow::Result<()> {
    let topic = match options.topic.filter(|t| !t.trim().is_empty()) {
        Some(topic) => topic,
        None if options.interactive => prompt_topic().await?,
        None => anyhow::bail!("a topic is required when running with --yes"),
    };

    let started = Instant::now();
    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let provider = delve_core::providers::create_provider(&config)?;
    let agent = Arc::new(LlmAgentRunner::new(
        provider.clone(),
        config.subagent.clone(),
        cancel.clone(),
    ));

    let base_dir = config.output.directory.clone();
    let run_dir = run_directory(&base_dir, chrono::Local::now());
    let store: Arc<dyn ArtifactStore> = if config.output.persist {
        info!(dir = %run_dir.display(), "Writing artifacts");
        Arc::new(FsArtifactStore::new(&run_dir))
    } else {
        Arc::new(NullArtifactStore)
    };
    let selector: Arc<dyn TopicSelector> = if options.interactive {
        Arc::new(DialoguerSelector)
    } else {
        Arc::new(KeepOriginalTopic)
    };
    let callback: Arc<dyn ResearchCallback> = if options.quiet {
        Arc::new(NoOpResearchCallback)
    } else {
        Arc::new(ConsoleProgress)
    };
    let persist = config.output.persist;

    let mut engine = ResearchEngine::new(config, provider, agent, cancel)
        .with_store(store)
        .with_selector(selector)
        .with_callback(callback);
    if persist {
        engine = engine.with_session_dir(&base_dir);
    }

    let outcome = engine.run(&topic).await?;

    println!("{}", outcome.report.text);
    if !options.quiet {
        if outcome.report.degraded {
            eprintln!("\nSynthesis failed; the report contains the raw findings.");
        }
        if !outcome.report.failed_subtasks.is_empty() {
            eprintln!(
                "\n{} of {} subtasks failed: {}",
                outcome.report.failed_subtasks.len(),
                outcome.subtasks.len(),
                outcome.report.failed_subtasks.join(", ")
            );
        }
        if persist {
            eprintln!("\nArtifacts written to {}", run_dir.display());
        }
        eprintln!("Completed in {}", format_elapsed(started.elapsed().as_secs()));
    }
    Ok(())
}

/// Cancel the run on the first Ctrl-C.
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted; stopping after the current step...");
            cancel.cancel();
        }
    });
}

fn run_directory<Tz>(base: &Path, now: chrono::DateTime<Tz>) -> PathBuf
where
    Tz: chrono::TimeZone,
    Tz::Offset: std::fmt::Display,
{
    base.join(now.format("%Y%m%d_%H%M%S").to_string())
}

fn format_elapsed(secs: u64) -> String {
    match secs {
        s if s < 60 => format!("{s}s"),
        s if s < 3600 => format!("{}m {:02}s", s / 60, s % 60),
        s => format!("{}h {:02}m {:02}s", s / 3600, (s % 3600) / 60, s % 60),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(42), "42s");
        assert_eq!(format_elapsed(125), "2m 05s");
        assert_eq!(format_elapsed(3725), "1h 02m 05s");
    }

    #[test]
    fn test_run_directory_is_timestamped() {
        let now = chrono::Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap();
        assert_eq!(
            run_directory(Path::new("research_outputs"), now),
            PathBuf::from("research_outputs/20250314_092653")
        );
    }

    #[test]
    fn test_yes_without_topic_is_an_error() {
        let options = RunOptions {
            topic: None,
            interactive: false,
            quiet: true,
        };
        let result = tokio_test::block_on(run(options, DelveConfig::default()));
        assert!(result.unwrap_err().to_string().contains("--yes"));
    }
}

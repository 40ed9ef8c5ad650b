//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use delve_core::config::DelveConfig;
use delve_core::research::session::{ResearchSession, SessionSummary};
use std::path::Path;

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    config: &DelveConfig,
    workspace: &Path,
) -> anyhow::Result<()> {
    match command {
        Commands::Config { action } => handle_config(action, config, workspace),
        Commands::Sessions { limit, json } => handle_sessions(config, limit, json),
    }
}

fn handle_config(action: ConfigAction, config: &DelveConfig, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let toml_str = toml::to_string_pretty(config)?;
            println!("{toml_str}");
            Ok(())
        }
        ConfigAction::Init => {
            let config_dir = workspace.join(".delve");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let toml_str = toml::to_string_pretty(&DelveConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
    }
}

fn handle_sessions(config: &DelveConfig, limit: usize, json: bool) -> anyhow::Result<()> {
    let sessions: Vec<SessionSummary> = ResearchSession::list_sessions(&config.output.directory)
        .into_iter()
        .take(limit)
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }
    if sessions.is_empty() {
        println!(
            "No sessions found in {}",
            config.output.directory.display()
        );
        return Ok(());
    }
    for line in format_sessions(&sessions) {
        println!("{line}");
    }
    Ok(())
}

fn format_sessions(sessions: &[SessionSummary]) -> Vec<String> {
    sessions
        .iter()
        .map(|s| {
            let flag = if s.degraded { " (degraded)" } else { "" };
            format!(
                "{}  {:<12} {:>4.0}%  {}  {}{}",
                &s.id.to_string()[..8],
                s.phase.to_string(),
                s.progress * 100.0,
                s.updated_at.format("%Y-%m-%d %H:%M"),
                s.topic,
                flag
            )
        })
        .collect()
}

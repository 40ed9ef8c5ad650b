//! Configuration system for delve.
//!
//! Uses `figment` for layered configuration: defaults -> config files -> environment -> CLI args.

use crate::retry::RetryPolicy;
use crate::types::ChatRequest;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const REASONING_MODEL: &str = "deepseek-ai/DeepSeek-R1-Distill-Llama-8B";
const REPORT_MODEL: &str = "MiniMaxAI/MiniMax-M1-80k";

/// Top-level configuration for a research run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DelveConfig {
    pub provider: ProviderConfig,
    pub clarifier: StageConfig,
    pub planner: StageConfig,
    pub splitter: StageConfig,
    pub synthesizer: StageConfig,
    pub subagent: StageConfig,
    pub retry: RetryConfig,
    pub dispatch: DispatchConfig,
    pub output: OutputConfig,
}

impl Default for DelveConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            clarifier: StageConfig::new(REASONING_MODEL, 2000, 1.0, 1.0),
            planner: StageConfig::new(REASONING_MODEL, 4000, 1.0, 1.0),
            splitter: StageConfig::new(REASONING_MODEL, 4000, 0.6, 0.95),
            synthesizer: StageConfig::new(REPORT_MODEL, 8000, 0.7, 0.95),
            subagent: StageConfig::new(REPORT_MODEL, 4000, 0.7, 0.95),
            retry: RetryConfig::default(),
            dispatch: DispatchConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl DelveConfig {
    /// Point every stage at the same model.
    pub fn set_model_for_all(&mut self, model: &str) {
        for stage in self.stages_mut() {
            stage.model = model.to_string();
        }
    }

    fn stages_mut(&mut self) -> [&mut StageConfig; 5] {
        [
            &mut self.clarifier,
            &mut self.planner,
            &mut self.splitter,
            &mut self.synthesizer,
            &mut self.subagent,
        ]
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_config(&self.retry)
    }

    /// Validate the configuration and return a list of warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let stages = [
            ("clarifier", &self.clarifier),
            ("planner", &self.planner),
            ("splitter", &self.splitter),
            ("synthesizer", &self.synthesizer),
            ("subagent", &self.subagent),
        ];
        for (name, stage) in stages {
            if stage.model.trim().is_empty() {
                warnings.push(format!("{name}.model is empty; the provider default will be used"));
            }
            if stage.max_tokens == 0 {
                warnings.push(format!("{name}.max_tokens is 0; responses will be empty"));
            }
            if !(0.0..=2.0).contains(&stage.temperature) {
                warnings.push(format!(
                    "{name}.temperature {} is outside 0.0..=2.0",
                    stage.temperature
                ));
            }
            if !(0.0..=1.0).contains(&stage.top_p) || stage.top_p == 0.0 {
                warnings.push(format!("{name}.top_p {} is outside (0.0, 1.0]", stage.top_p));
            }
            if stage.timeout_secs == 0 {
                warnings.push(format!("{name}.timeout_secs is 0; every call will time out"));
            }
        }
        if self.retry.max_attempts == 0 {
            warnings.push("retry.max_attempts is 0; one attempt will still be made".to_string());
        }
        if self.dispatch.max_steps == 0 {
            warnings.push("dispatch.max_steps is 0; one step will still be made".to_string());
        }
        if self.dispatch.tools.is_empty() {
            warnings.push("dispatch.tools is empty; sub-agents can only use model knowledge".to_string());
        }
        if self.provider.base_url.trim().is_empty() {
            warnings.push("provider.base_url is empty".to_string());
        }
        warnings
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    /// OpenAI-compatible chat completions endpoint.
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Checked when `api_key_env` is unset.
    pub fallback_api_key_env: Option<String>,
    pub connect_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://router.huggingface.co/v1".to_string(),
            api_key_env: "HF_TOKEN".to_string(),
            fallback_api_key_env: Some("HF_KEY".to_string()),
            connect_timeout_secs: 30,
        }
    }
}

/// Sampling parameters and limits of one LLM-backed stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StageConfig {
    pub model: String,
    pub max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
    /// Bound on one whole streamed call, first byte to last delta.
    pub timeout_secs: u64,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self::new(REASONING_MODEL, 2000, 1.0, 1.0)
    }
}

impl StageConfig {
    pub fn new(model: &str, max_tokens: usize, temperature: f32, top_p: f32) -> Self {
        Self {
            model: model.to_string(),
            max_tokens,
            temperature,
            top_p,
            timeout_secs: 300,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// A request carrying this stage's sampling parameters and no messages.
    pub fn request(&self) -> ChatRequest {
        ChatRequest {
            messages: Vec::new(),
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            response_shape: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    /// Base backoff unit; the wait after attempt `k` is `2^k` units.
    pub backoff_unit_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_unit_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DispatchConfig {
    /// Step budget handed to every sub-agent.
    pub max_steps: u32,
    /// Capabilities sub-agents may use.
    pub tools: Vec<String>,
    /// Bound on one sub-agent invocation.
    pub agent_timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_steps: 5,
            tools: vec!["web_search".to_string(), "fetch_page".to_string()],
            agent_timeout_secs: 600,
        }
    }
}

impl DispatchConfig {
    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    /// Write stage artifacts to `directory`.
    pub persist: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("research_outputs"),
            persist: true,
        }
    }
}

fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "delve", "delve")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".delve").join("config.toml")
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `DELVE_`)
/// 3. An explicit config file (`--config`)
/// 4. Workspace-local config (`.delve/config.toml`)
/// 5. User config (`~/.config/delve/config.toml`)
/// 6. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
    overrides: Option<&DelveConfig>,
) -> Result<DelveConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(DelveConfig::default()));

    if let Some(user_config) = user_config_path()
        && user_config.exists()
    {
        figment = figment.merge(Toml::file(&user_config));
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // An explicitly named file must exist; Toml::file alone would skip it silently.
    if let Some(path) = config_file {
        figment = figment.merge(Toml::file_exact(path));
    }

    // Environment variables (DELVE_PLANNER__MODEL, DELVE_RETRY__MAX_ATTEMPTS, etc.)
    figment = figment.merge(Env::prefixed("DELVE_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

/// Check whether any delve configuration file exists (user-level or workspace-level).
pub fn config_exists(workspace: Option<&Path>) -> bool {
    if user_config_path().is_some_and(|p| p.exists()) {
        return true;
    }
    workspace.is_some_and(|ws| workspace_config_path(ws).exists())
}

//! Isolated task agents — the capability the subtask dispatcher invokes once
//! per subtask.
//!
//! An agent receives a capability set, a self-contained prompt and a step
//! budget, and returns free text. It never sees other subtasks.

use crate::brain::LlmProvider;
use crate::config::StageConfig;
use crate::error::{AgentError, LlmError, StageError};
use crate::reasoning::strip_assembled;
use crate::stream;
use crate::types::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Named capabilities an agent may use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSet {
    tools: Vec<String>,
}

impl ToolSet {
    pub fn new<I, S>(tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tools: tools.into_iter().map(Into::into).collect(),
        }
    }

    pub fn names(&self) -> &[String] {
        &self.tools
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Bullet list for inclusion in a prompt.
    pub fn describe(&self) -> String {
        if self.tools.is_empty() {
            return "- (none; rely on your own knowledge)".to_string();
        }
        self.tools
            .iter()
            .map(|t| format!("- {t}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Runs one isolated agent invocation.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run_agent(
        &self,
        tools: &ToolSet,
        prompt: &str,
        max_steps: u32,
    ) -> Result<String, AgentError>;
}

const AGENT_SYSTEM: &str = "You are an autonomous research agent working alone on one assignment. \
Answer the assignment completely in a single reply. \
Capabilities available to you:\n{tools}";

/// An agent backed directly by a streaming chat provider.
///
/// Each step is one streamed completion; the first step that yields a
/// non-empty answer ends the run.
pub struct LlmAgentRunner {
    provider: Arc<dyn LlmProvider>,
    stage: StageConfig,
    cancel: CancellationToken,
}

impl LlmAgentRunner {
    pub fn new(provider: Arc<dyn LlmProvider>, stage: StageConfig, cancel: CancellationToken) -> Self {
        Self {
            provider,
            stage,
            cancel,
        }
    }

    async fn step(&self, messages: &[Message]) -> Result<String, AgentError> {
        let mut request = self.stage.request();
        request.messages = messages.to_vec();
        let model = request.model.clone();
        let timeout = self.stage.timeout();

        let call = async {
            let stream = self
                .provider
                .chat_stream(request)
                .await
                .map_err(StageError::from)?;
            stream::collect(stream, &self.cancel, &model).await
        };

        let assembled = match tokio::time::timeout(timeout, call).await {
            Ok(Ok(text)) => text,
            Ok(Err(StageError::Cancelled)) => return Err(AgentError::Cancelled),
            Ok(Err(e)) => {
                return Err(AgentError::ExecutionFailed {
                    message: e.to_string(),
                });
            }
            Err(_) => {
                return Err(AgentError::ExecutionFailed {
                    message: LlmError::Timeout {
                        timeout_secs: self.stage.timeout_secs,
                    }
                    .to_string(),
                });
            }
        };

        Ok(strip_assembled(&assembled).answer.to_string())
    }
}

#[async_trait]
impl AgentRunner for LlmAgentRunner {
    async fn run_agent(
        &self,
        tools: &ToolSet,
        prompt: &str,
        max_steps: u32,
    ) -> Result<String, AgentError> {
        let messages = vec![
            Message::system(AGENT_SYSTEM.replace("{tools}", &tools.describe())),
            Message::user(prompt),
        ];
        let steps = max_steps.max(1);
        let mut last_error = None;

        for step in 1..=steps {
            if self.cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            match self.step(&messages).await {
                Ok(answer) if !answer.is_empty() => {
                    info!(step, chars = answer.len(), "Agent produced an answer");
                    return Ok(answer);
                }
                Ok(_) => {
                    debug!(step, "Agent step produced no answer");
                    last_error = Some("empty answer".to_string());
                }
                Err(AgentError::Cancelled) => return Err(AgentError::Cancelled),
                Err(e) => {
                    warn!(step, max_steps = steps, error = %e, "Agent step failed");
                    last_error = Some(e.to_string());
                }
            }
        }

        Err(AgentError::ExecutionFailed {
            message: format!(
                "no answer after {steps} step(s): {}",
                last_error.unwrap_or_else(|| "unknown error".to_string())
            ),
        })
    }
}

/// An agent that replays scripted results and records prompts.
#[derive(Default)]
pub struct MockAgentRunner {
    results: Mutex<VecDeque<Result<String, AgentError>>>,
    prompts: Mutex<Vec<String>>,
}

impl MockAgentRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&self, result: Result<String, AgentError>) {
        lock(&self.results).push_back(result);
    }

    pub fn queue_text(&self, text: &str) {
        self.queue(Ok(text.to_string()));
    }

    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.prompts).len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl AgentRunner for MockAgentRunner {
    async fn run_agent(
        &self,
        _tools: &ToolSet,
        prompt: &str,
        _max_steps: u32,
    ) -> Result<String, AgentError> {
        lock(&self.prompts).push(prompt.to_string());
        lock(&self.results)
            .pop_front()
            .unwrap_or_else(|| {
                Err(AgentError::ExecutionFailed {
                    message: "mock agent has no scripted result".to_string(),
                })
            })
    }
}

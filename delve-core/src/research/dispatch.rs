//! Subtask dispatcher — runs one isolated agent per subtask.
//!
//! Subtasks run one after another. Each agent call is its own failure
//! boundary: an error or timeout becomes a failed [`Finding`] and the next
//! subtask still runs. Only cancellation stops the loop.

use super::decomposition::{Subtask, ensure_unique_ids};
use super::prompts::{SUBAGENT_DIRECTION, render};
use super::session::{NoOpResearchCallback, ResearchCallback};
use crate::agent::{AgentRunner, ToolSet};
use crate::error::{AgentError, PipelineError};
use crate::persistence::ArtifactStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// The outcome of one subtask.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub subtask_id: String,
    pub title: String,
    /// Agent output, or the error text when `failed`.
    pub text: String,
    pub failed: bool,
}

impl Finding {
    pub fn succeeded(subtask: &Subtask, text: String) -> Self {
        Self {
            subtask_id: subtask.id.clone(),
            title: subtask.title.clone(),
            text,
            failed: false,
        }
    }

    pub fn failed(subtask: &Subtask, error: String) -> Self {
        Self {
            subtask_id: subtask.id.clone(),
            title: subtask.title.clone(),
            text: error,
            failed: true,
        }
    }

    /// Markdown written to the subtask's finding file.
    pub fn to_markdown(&self) -> String {
        if self.failed {
            format!(
                "# {}: {}\n\n> Research for this subtask failed: {}\n",
                self.subtask_id, self.title, self.text
            )
        } else {
            format!("{}\n", self.text.trim_end())
        }
    }
}

/// Dispatches subtasks to an [`AgentRunner`].
pub struct SubtaskDispatcher {
    agent: Arc<dyn AgentRunner>,
    store: Arc<dyn ArtifactStore>,
    tools: ToolSet,
    max_steps: u32,
    agent_timeout: Duration,
    cancel: CancellationToken,
    callback: Arc<dyn ResearchCallback>,
}

impl SubtaskDispatcher {
    pub fn new(
        agent: Arc<dyn AgentRunner>,
        store: Arc<dyn ArtifactStore>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            agent,
            store,
            tools: ToolSet::default(),
            max_steps: 5,
            agent_timeout: Duration::from_secs(600),
            cancel,
            callback: Arc::new(NoOpResearchCallback),
        }
    }

    pub fn with_tools(mut self, tools: ToolSet) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_agent_timeout(mut self, timeout: Duration) -> Self {
        self.agent_timeout = timeout;
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn ResearchCallback>) -> Self {
        self.callback = callback;
        self
    }

    /// Run every subtask and return one finding per subtask, in order.
    pub async fn dispatch(
        &self,
        query: Arc<str>,
        plan: Arc<str>,
        subtasks: &[Subtask],
    ) -> Result<Vec<Finding>, PipelineError> {
        self.dispatch_with(query, plan, subtasks, |_| {}).await
    }

    /// Like [`dispatch`](Self::dispatch), calling `observe` on each finding
    /// as soon as it is stored.
    pub async fn dispatch_with<F>(
        &self,
        query: Arc<str>,
        plan: Arc<str>,
        subtasks: &[Subtask],
        mut observe: F,
    ) -> Result<Vec<Finding>, PipelineError>
    where
        F: FnMut(&Finding) + Send,
    {
        ensure_unique_ids(subtasks)?;

        let total = subtasks.len();
        // Sequential: each finding is stored before the next agent starts.
        let mut findings = Vec::with_capacity(total);
        info!(total, "Dispatching subtasks");

        for (index, subtask) in subtasks.iter().enumerate() {
            self.callback.on_subtask_start(index, total, subtask);
            let prompt = subtask_prompt(&query, &plan, subtask);

            let finding = match self.run_one(&prompt).await {
                Ok(text) => {
                    info!(id = %subtask.id, chars = text.len(), "Subtask finished");
                    Finding::succeeded(subtask, text)
                }
                Err(AgentError::Cancelled) => {
                    return Err(PipelineError::Cancelled {
                        stage: "dispatch".to_string(),
                    });
                }
                Err(e) => {
                    warn!(id = %subtask.id, error = %e, "Subtask failed");
                    Finding::failed(subtask, e.to_string())
                }
            };

            if let Err(e) = self.store.save_finding(&finding) {
                warn!(id = %finding.subtask_id, error = %e, "Failed to save finding");
            }
            self.callback.on_subtask_complete(&finding);
            observe(&finding);
            findings.push(finding);
        }

        let failed = findings.iter().filter(|f| f.failed).count();
        info!(total, failed, "Dispatch finished");
        Ok(findings)
    }

    async fn run_one(&self, prompt: &str) -> Result<String, AgentError> {
        let call = tokio::time::timeout(
            self.agent_timeout,
            self.agent.run_agent(&self.tools, prompt, self.max_steps),
        );
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(AgentError::Cancelled),
            result = call => result.unwrap_or_else(|_| {
                Err(AgentError::Timeout {
                    timeout_secs: self.agent_timeout.as_secs(),
                })
            }),
        }
    }
}

/// The self-contained prompt handed to a subtask's agent.
pub fn subtask_prompt(query: &str, plan: &str, subtask: &Subtask) -> String {
    render(
        SUBAGENT_DIRECTION,
        &[
            ("user_query", query),
            ("research_plan", plan),
            ("subtask_id", &subtask.id),
            ("subtask_title", &subtask.title),
            ("subtask_description", &subtask.description),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::MockAgentRunner;
    use crate::persistence::{MemoryArtifactStore, NullArtifactStore};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    fn subtask(id: &str, title: &str) -> Subtask {
        Subtask {
            id: id.into(),
            title: title.into(),
            description: format!("Investigate {title}"),
        }
    }

    fn context() -> (Arc<str>, Arc<str>) {
        (Arc::from("renewable energy"), Arc::from("1. Costs\n2. Policy"))
    }

    #[test]
    fn test_subtask_prompt_carries_context() {
        let prompt = subtask_prompt("Q", "P", &subtask("A", "Costs"));
        assert!(prompt.contains("Overall query: Q"));
        assert!(prompt.contains("Research plan: P"));
        assert!(prompt.contains("# A: Costs"));
        assert!(prompt.contains("Investigate Costs"));
    }

    #[test]
    fn test_failed_finding_markdown() {
        let finding = Finding::failed(&subtask("B", "Policy"), "timed out".into());
        assert_eq!(
            finding.to_markdown(),
            "# B: Policy\n\n> Research for this subtask failed: timed out\n"
        );
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_going() {
        let agent = Arc::new(MockAgentRunner::new());
        agent.queue_text("# A: Costs\nalpha");
        agent.queue(Err(AgentError::ExecutionFailed {
            message: "search unavailable".into(),
        }));
        agent.queue_text("# C: Grid\ngamma");
        let store = Arc::new(MemoryArtifactStore::new());
        let dispatcher = SubtaskDispatcher::new(agent.clone(), store.clone(), CancellationToken::new());
        let (query, plan) = context();

        let findings = dispatcher
            .dispatch(
                query,
                plan,
                &[subtask("A", "Costs"), subtask("B", "Policy"), subtask("C", "Grid")],
            )
            .await
            .unwrap();

        assert_eq!(findings.len(), 3);
        assert_eq!(
            findings.iter().map(|f| f.failed).collect::<Vec<_>>(),
            vec![false, true, false]
        );
        assert!(findings[1].text.contains("search unavailable"));
        assert_eq!(agent.call_count(), 3);
        assert_eq!(store.entries().len(), 3);
        assert!(store.get("findings/B.md").unwrap().contains("search unavailable"));
    }

    /// Records how many findings the store held when each agent call began.
    struct OrderCheckingAgent {
        store: Arc<MemoryArtifactStore>,
        seen: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl AgentRunner for OrderCheckingAgent {
        async fn run_agent(
            &self,
            _tools: &ToolSet,
            _prompt: &str,
            _max_steps: u32,
        ) -> Result<String, AgentError> {
            let stored = self.store.entries().len();
            self.seen.lock().unwrap().push(stored);
            Ok(format!("finding {stored}"))
        }
    }

    #[tokio::test]
    async fn test_each_finding_stored_before_next_call() {
        let store = Arc::new(MemoryArtifactStore::new());
        let agent = Arc::new(OrderCheckingAgent {
            store: store.clone(),
            seen: Mutex::new(Vec::new()),
        });
        let dispatcher = SubtaskDispatcher::new(agent.clone(), store.clone(), CancellationToken::new());
        let (query, plan) = context();

        dispatcher
            .dispatch(query, plan, &[subtask("A", "a"), subtask("B", "b"), subtask("C", "c")])
            .await
            .unwrap();

        assert_eq!(*agent.seen.lock().unwrap(), vec![0, 1, 2]);
    }

    struct SlowAgent;

    #[async_trait]
    impl AgentRunner for SlowAgent {
        async fn run_agent(
            &self,
            _tools: &ToolSet,
            _prompt: &str,
            _max_steps: u32,
        ) -> Result<String, AgentError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("late".into())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_becomes_failed_finding() {
        let dispatcher = SubtaskDispatcher::new(
            Arc::new(SlowAgent),
            Arc::new(NullArtifactStore),
            CancellationToken::new(),
        )
        .with_agent_timeout(Duration::from_secs(30));
        let (query, plan) = context();

        let findings = dispatcher
            .dispatch(query, plan, &[subtask("A", "a")])
            .await
            .unwrap();

        assert!(findings[0].failed);
        assert_eq!(findings[0].text, "Agent timed out after 30s");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_dispatch() {
        let cancel = CancellationToken::new();
        let dispatcher = SubtaskDispatcher::new(
            Arc::new(SlowAgent),
            Arc::new(NullArtifactStore),
            cancel.clone(),
        );
        let (query, plan) = context();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let result = dispatcher
            .dispatch(query, plan, &[subtask("A", "a"), subtask("B", "b")])
            .await;
        assert_eq!(
            result.unwrap_err(),
            PipelineError::Cancelled {
                stage: "dispatch".into()
            }
        );
    }

    #[tokio::test]
    async fn test_duplicate_ids_rejected_before_any_call() {
        let agent = Arc::new(MockAgentRunner::new());
        let dispatcher = SubtaskDispatcher::new(
            agent.clone(),
            Arc::new(NullArtifactStore),
            CancellationToken::new(),
        );
        let (query, plan) = context();

        let result = dispatcher
            .dispatch(query, plan, &[subtask("A", "a"), subtask("A", "b")])
            .await;
        assert!(matches!(result, Err(PipelineError::DuplicateSubtaskId { .. })));
        assert_eq!(agent.call_count(), 0);
    }

    #[tokio::test]
    async fn test_observer_sees_each_finding() {
        let agent = Arc::new(MockAgentRunner::new());
        agent.queue_text("one");
        agent.queue_text("two");
        let dispatcher = SubtaskDispatcher::new(
            agent,
            Arc::new(NullArtifactStore),
            CancellationToken::new(),
        );
        let (query, plan) = context();

        let mut seen = Vec::new();
        dispatcher
            .dispatch_with(query, plan, &[subtask("A", "a"), subtask("B", "b")], |f| {
                seen.push(f.subtask_id.clone())
            })
            .await
            .unwrap();
        assert_eq!(seen, vec!["A".to_string(), "B".to_string()]);
    }
}

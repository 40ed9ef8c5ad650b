//! Research engine — sequences clarify → plan → split → dispatch → synthesize.
//!
//! Everything a run needs is handed to the engine at construction and scoped
//! to that run: configuration, provider, agent, artifact store, topic
//! selector, callback and cancellation token.

use super::clarify::{self, KeepOriginalTopic, TopicSelector, resolve_topic};
use super::decomposition::{self, Subtask, ensure_unique_ids};
use super::dispatch::{Finding, SubtaskDispatcher};
use super::planner;
use super::session::{NoOpResearchCallback, ResearchCallback, ResearchPhase, ResearchSession};
use super::stage::StageRunner;
use super::synthesis::{self, FinalReport};
use crate::agent::{AgentRunner, ToolSet};
use crate::brain::LlmProvider;
use crate::config::DelveConfig;
use crate::error::{PipelineError, StageError};
use crate::persistence::{ArtifactStore, NullArtifactStore};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Everything a completed run produced.
#[derive(Debug, Clone)]
pub struct ResearchOutcome {
    /// The topic after clarification.
    pub topic: String,
    pub plan: String,
    pub subtasks: Vec<Subtask>,
    pub findings: Vec<Finding>,
    pub report: FinalReport,
    pub session: ResearchSession,
}

/// What the stages produced before the session is closed.
struct Products {
    topic: String,
    plan: String,
    subtasks: Vec<Subtask>,
    findings: Vec<Finding>,
    report: FinalReport,
}

/// The pipeline coordinator.
pub struct ResearchEngine {
    config: DelveConfig,
    runner: StageRunner,
    agent: Arc<dyn AgentRunner>,
    store: Arc<dyn ArtifactStore>,
    selector: Arc<dyn TopicSelector>,
    callback: Arc<dyn ResearchCallback>,
    cancel: CancellationToken,
    session_dir: Option<PathBuf>,
}

impl ResearchEngine {
    pub fn new(
        config: DelveConfig,
        provider: Arc<dyn LlmProvider>,
        agent: Arc<dyn AgentRunner>,
        cancel: CancellationToken,
    ) -> Self {
        let runner = StageRunner::new(provider, config.retry_policy(), cancel.clone());
        Self {
            config,
            runner,
            agent,
            store: Arc::new(NullArtifactStore),
            selector: Arc::new(KeepOriginalTopic),
            callback: Arc::new(NoOpResearchCallback),
            cancel,
            session_dir: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_selector(mut self, selector: Arc<dyn TopicSelector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn ResearchCallback>) -> Self {
        self.callback = callback;
        self
    }

    /// Persist the session record under `dir/sessions/` at every transition.
    pub fn with_session_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.session_dir = Some(dir.into());
        self
    }

    pub fn config(&self) -> &DelveConfig {
        &self.config
    }

    /// Run the whole pipeline for `topic`.
    ///
    /// Fails only on a [`PipelineError`]; the session record is marked failed
    /// and saved before the error is returned.
    pub async fn run(&self, topic: &str) -> Result<ResearchOutcome, PipelineError> {
        let mut session = ResearchSession::new(topic);
        info!(session = %session.id, topic, "Starting research run");
        self.enter(&mut session, ResearchPhase::Clarifying);

        match self.drive(topic, &mut session).await {
            Ok(Products {
                topic,
                plan,
                subtasks,
                findings,
                report,
            }) => {
                session.degraded = report.degraded;
                self.enter(&mut session, ResearchPhase::Complete);
                info!(
                    session = %session.id,
                    degraded = report.degraded,
                    failed_subtasks = report.failed_subtasks.len(),
                    "Research run complete"
                );
                Ok(ResearchOutcome {
                    topic,
                    plan,
                    subtasks,
                    findings,
                    report,
                    session,
                })
            }
            Err(e) => {
                error!(session = %session.id, phase = %session.phase, error = %e, "Research run failed");
                session.fail(e.to_string());
                self.callback.on_phase_change(session.phase, session.progress);
                self.persist_session(&session);
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        topic: &str,
        session: &mut ResearchSession,
    ) -> Result<Products, PipelineError> {
        let config = &self.config;

        let suggestions = clarify::clarify(&self.runner, &config.clarifier, topic)
            .await
            .map_err(stage_failure("clarify"))?;
        let topic = if suggestions.is_empty() {
            info!("No suggestions; keeping the original topic");
            topic.to_string()
        } else {
            self.callback.on_suggestions(&suggestions);
            let choice = self.selector.select(topic, &suggestions).await;
            resolve_topic(topic, &suggestions, &choice)
        };
        info!(topic = %topic, "Topic settled");
        session.final_topic = Some(topic.clone());
        self.callback.on_topic(&topic);
        self.save("topic", self.store.save_topic(&topic));

        self.enter(session, ResearchPhase::Planning);
        let plan = planner::plan(&self.runner, &config.planner, &topic)
            .await
            .map_err(stage_failure("plan"))?;
        if plan.trim().is_empty() {
            return Err(PipelineError::EmptyPlan);
        }
        self.callback.on_plan(&plan);
        self.save("plan", self.store.save_plan(&plan));

        self.enter(session, ResearchPhase::Splitting);
        let subtasks = decomposition::split(&self.runner, &config.splitter, &topic, &plan)
            .await
            .map_err(stage_failure("split"))?;
        if subtasks.is_empty() {
            return Err(PipelineError::NoSubtasks);
        }
        ensure_unique_ids(&subtasks)?;
        self.save("subtasks", self.store.save_subtasks(&subtasks));

        session.subtasks_total = subtasks.len();
        self.enter(session, ResearchPhase::Dispatching);
        let findings = self.dispatch(&topic, &plan, &subtasks, session).await?;

        self.enter(session, ResearchPhase::Synthesizing);
        let report = synthesis::synthesize(&self.runner, &config.synthesizer, &topic, &plan, &findings)
            .await
            .map_err(stage_failure("synthesize"))?;
        self.save("report", self.store.save_report(&report));

        Ok(Products {
            topic,
            plan,
            subtasks,
            findings,
            report,
        })
    }

    async fn dispatch(
        &self,
        topic: &str,
        plan: &str,
        subtasks: &[Subtask],
        session: &mut ResearchSession,
    ) -> Result<Vec<Finding>, PipelineError> {
        let dispatch = &self.config.dispatch;
        let dispatcher = SubtaskDispatcher::new(self.agent.clone(), self.store.clone(), self.cancel.clone())
            .with_tools(ToolSet::new(dispatch.tools.iter().cloned()))
            .with_max_steps(dispatch.max_steps)
            .with_agent_timeout(dispatch.agent_timeout())
            .with_callback(self.callback.clone());

        dispatcher
            .dispatch_with(Arc::from(topic), Arc::from(plan), subtasks, |finding| {
                session.record_finding(finding);
                self.callback.on_phase_change(session.phase, session.progress);
                self.persist_session(session);
            })
            .await
    }

    fn enter(&self, session: &mut ResearchSession, phase: ResearchPhase) {
        session.transition(phase);
        info!(session = %session.id, phase = %phase, progress = session.progress, "Research phase");
        self.callback.on_phase_change(phase, session.progress);
        self.persist_session(session);
    }

    fn persist_session(&self, session: &ResearchSession) {
        if let Some(dir) = &self.session_dir
            && let Err(e) = session.save(dir)
        {
            warn!(session = %session.id, error = %e, "Failed to save session record");
        }
    }

    fn save(&self, artifact: &str, result: std::io::Result<()>) {
        if let Err(e) = result {
            warn!(artifact, error = %e, "Failed to save artifact");
        }
    }
}

/// The stage runner only surfaces cancellation; every other failure is
/// absorbed by the retry policy.
fn stage_failure(stage: &'static str) -> impl Fn(StageError) -> PipelineError {
    move |e| {
        if !matches!(e, StageError::Cancelled) {
            warn!(stage, error = %e, "Unexpected stage error");
        }
        PipelineError::Cancelled {
            stage: stage.to_string(),
        }
    }
}

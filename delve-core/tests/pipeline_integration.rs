//! Integration tests for the research pipeline.
//!
//! These tests drive the whole clarify → plan → split → dispatch → synthesize
//! sequence using MockLlmProvider and MockAgentRunner, writing artifacts to a
//! temporary directory.

use async_trait::async_trait;
use delve_core::agent::MockAgentRunner;
use delve_core::brain::{MockLlmProvider, MockReply};
use delve_core::config::DelveConfig;
use delve_core::error::{AgentError, PipelineError};
use delve_core::persistence::{FsArtifactStore, MemoryArtifactStore, PLAN_FILE, REPORT_FILE};
use delve_core::research::clarify::{self, Suggestion, TopicChoice, TopicSelector};
use delve_core::research::prompts::SPLITTER_DIRECTION;
use delve_core::research::session::{ResearchCallback, ResearchPhase, ResearchSession};
use delve_core::research::{Finding, ResearchEngine, StageRunner};
use delve_core::retry::RetryPolicy;
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const SUGGESTIONS: &str = r#"{"suggestions":[
  {"title":"Grid-scale storage","description":"How battery costs shape renewable adoption."},
  {"title":"Offshore wind","description":"Deployment outlook for offshore wind to 2040."},
  {"title":"Policy incentives","description":"Which subsidies accelerate the transition."}
]}"#;

const SUBTASKS: &str = r#"Here is the split:
```json
{"subtasks":[
  {"id":"costs","title":"Turbine costs","description":"Compare offshore turbine costs per MW."},
  {"id":"grid","title":"Grid connection","description":"Survey grid connection bottlenecks."},
  {"id":"policy","title":"Auction design","description":"Review offshore wind auction outcomes."}
]}
```"#;

/// Picks a fixed suggestion and records what it was offered.
struct PickSecond {
    offered: Mutex<Vec<Suggestion>>,
}

#[async_trait]
impl TopicSelector for PickSecond {
    async fn select(&self, _topic: &str, suggestions: &[Suggestion]) -> TopicChoice {
        *self.offered.lock().unwrap() = suggestions.to_vec();
        TopicChoice::Suggestion(1)
    }
}

/// Records every phase and completed subtask.
#[derive(Default)]
struct RecordingCallback {
    phases: Mutex<Vec<ResearchPhase>>,
    completed: Mutex<Vec<String>>,
}

impl ResearchCallback for RecordingCallback {
    fn on_phase_change(&self, phase: ResearchPhase, _progress: f64) {
        let mut phases = self.phases.lock().unwrap();
        if phases.last() != Some(&phase) {
            phases.push(phase);
        }
    }

    fn on_subtask_complete(&self, finding: &Finding) {
        self.completed.lock().unwrap().push(finding.subtask_id.clone());
    }
}

fn renewable_energy_provider() -> Arc<MockLlmProvider> {
    let provider = Arc::new(MockLlmProvider::new());
    provider.queue(MockReply::reasoning_then_text(
        "The topic is broad; offer three angles.",
        SUGGESTIONS,
    ));
    provider.queue(MockReply::reasoning_then_text(
        "Cover cost, grid and policy.",
        "# Research Plan\n\n## Costs\n## Grid\n## Policy",
    ));
    provider.queue_text(SUBTASKS);
    provider.queue_text("<think>Merge the three findings.</think>\n# Offshore Wind Outlook\n\nCosts are falling.");
    provider
}

#[tokio::test(start_paused = true)]
async fn test_future_of_renewable_energy_end_to_end() {
    let provider = renewable_energy_provider();
    let agent = Arc::new(MockAgentRunner::new());
    agent.queue_text("# costs: Turbine costs\n\n## Summary\nCosts fell 30%.");
    agent.queue(Err(AgentError::Timeout { timeout_secs: 600 }));
    agent.queue_text("# policy: Auction design\n\n## Summary\nCfD auctions dominate.");

    let dir = TempDir::new().unwrap();
    let store = Arc::new(FsArtifactStore::new(dir.path()));
    let selector = Arc::new(PickSecond {
        offered: Mutex::new(Vec::new()),
    });
    let callback = Arc::new(RecordingCallback::default());

    let outcome = ResearchEngine::new(
        DelveConfig::default(),
        provider.clone(),
        agent.clone(),
        CancellationToken::new(),
    )
    .with_store(store.clone())
    .with_selector(selector.clone())
    .with_callback(callback.clone())
    .with_session_dir(dir.path())
    .run("the future of renewable energy")
    .await
    .unwrap();

    assert_eq!(selector.offered.lock().unwrap().len(), 3);
    assert_eq!(
        outcome.topic,
        "Offshore wind: Deployment outlook for offshore wind to 2040."
    );
    assert_eq!(outcome.plan, "# Research Plan\n\n## Costs\n## Grid\n## Policy");
    assert_eq!(
        outcome.subtasks.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
        vec!["costs", "grid", "policy"]
    );
    assert_eq!(outcome.findings.len(), 3);
    assert!(outcome.findings[1].failed);

    // Every subagent prompt carries the chosen topic and plan.
    for prompt in agent.prompts() {
        assert!(prompt.contains("Offshore wind: Deployment outlook"));
        assert!(prompt.contains("## Grid"));
    }

    let report = &outcome.report;
    assert!(!report.degraded);
    assert_eq!(report.failed_subtasks, vec!["grid".to_string()]);
    assert!(report.text.starts_with("# Offshore Wind Outlook"));
    assert!(report.text.contains("## Incomplete Research"));
    assert!(report.text.contains("Agent timed out after 600s"));

    let root = dir.path();
    assert!(root.join("topic.txt").exists());
    assert_eq!(
        std::fs::read_to_string(root.join(PLAN_FILE)).unwrap(),
        outcome.plan
    );
    assert!(root.join("subtasks.json").exists());
    for id in ["costs", "grid", "policy"] {
        assert!(store.finding_path(id).exists(), "missing finding for {id}");
    }
    assert!(
        std::fs::read_to_string(store.finding_path("grid"))
            .unwrap()
            .contains("failed")
    );
    assert_eq!(
        std::fs::read_to_string(root.join(REPORT_FILE)).unwrap(),
        report.text
    );

    assert_eq!(
        *callback.phases.lock().unwrap(),
        vec![
            ResearchPhase::Clarifying,
            ResearchPhase::Planning,
            ResearchPhase::Splitting,
            ResearchPhase::Dispatching,
            ResearchPhase::Synthesizing,
            ResearchPhase::Complete,
        ]
    );
    assert_eq!(
        *callback.completed.lock().unwrap(),
        vec!["costs".to_string(), "grid".to_string(), "policy".to_string()]
    );

    let sessions = ResearchSession::list_sessions(root);
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].phase, ResearchPhase::Complete);
    assert!(!sessions[0].degraded);
}

#[tokio::test(start_paused = true)]
async fn test_empty_plan_never_reaches_split() {
    let provider = Arc::new(MockLlmProvider::new());
    provider.queue_text(SUGGESTIONS);
    // Three planning attempts that only ever reason.
    for _ in 0..3 {
        provider.queue(MockReply::Events(vec![Ok(
            delve_core::types::DeltaEvent::reasoning("still thinking"),
        )]));
    }
    let agent = Arc::new(MockAgentRunner::new());
    let store = Arc::new(MemoryArtifactStore::new());

    let result = ResearchEngine::new(
        DelveConfig::default(),
        provider.clone(),
        agent.clone(),
        CancellationToken::new(),
    )
    .with_store(store.clone())
    .run("the future of renewable energy")
    .await;

    assert_eq!(result.unwrap_err(), PipelineError::EmptyPlan);
    assert_eq!(provider.call_count(), 4);
    assert!(
        provider
            .requests()
            .iter()
            .all(|r| r.messages[0].content != SPLITTER_DIRECTION)
    );
    assert_eq!(agent.call_count(), 0);
    assert!(store.get(PLAN_FILE).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_unterminated_reasoning_yields_one_suggestion() {
    let provider = Arc::new(MockLlmProvider::new());
    provider.queue_text(
        r#"<think>reasoning...<think>more{"suggestions":[{"title":"T","description":"D"}]}"#,
    );
    let runner = StageRunner::new(
        provider.clone(),
        RetryPolicy::default(),
        CancellationToken::new(),
    );

    let suggestions = clarify::clarify(&runner, &DelveConfig::default().clarifier, "energy")
        .await
        .unwrap();

    assert_eq!(
        suggestions,
        vec![Suggestion::new("T", "D")]
    );
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_no_suggestions_keeps_original_topic() {
    let provider = Arc::new(MockLlmProvider::new());
    for _ in 0..3 {
        provider.queue_text("I cannot think of any directions.");
    }
    provider.queue_text("# Plan");
    provider.queue_text(r#"[{"id":"A","title":"Only","description":"Everything"}]"#);
    provider.queue_text("# Report");
    let agent = Arc::new(MockAgentRunner::new());
    agent.queue_text("finding");

    let outcome = ResearchEngine::new(
        DelveConfig::default(),
        provider,
        agent,
        CancellationToken::new(),
    )
    .run("tidal power")
    .await
    .unwrap();

    assert_eq!(outcome.topic, "tidal power");
    assert_eq!(outcome.subtasks.len(), 1);
    assert!(outcome.report.is_complete());
}

#[tokio::test(start_paused = true)]
async fn test_failed_synthesis_degrades_report() {
    let provider = Arc::new(MockLlmProvider::new());
    provider.queue_text(SUGGESTIONS);
    provider.queue_text("# Plan");
    provider.queue_text(SUBTASKS);
    let agent = Arc::new(MockAgentRunner::new());
    agent.queue_text("alpha finding");
    agent.queue_text("beta finding");
    agent.queue(Err(AgentError::ExecutionFailed {
        message: "no sources".into(),
    }));

    let outcome = ResearchEngine::new(
        DelveConfig::default(),
        provider,
        agent,
        CancellationToken::new(),
    )
    .run("energy")
    .await
    .unwrap();

    let report = outcome.report;
    assert!(report.degraded);
    assert!(report.text.contains("alpha finding"));
    assert!(report.text.contains("beta finding"));
    assert!(report.text.contains("synthesis step failed"));
    assert_eq!(report.failed_subtasks, vec!["policy".to_string()]);
    assert!(outcome.session.degraded);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_subtask_ids_abort_before_dispatch() {
    let provider = Arc::new(MockLlmProvider::new());
    provider.queue_text(SUGGESTIONS);
    provider.queue_text("# Plan");
    provider.queue_text(
        r#"{"subtasks":[{"id":"x","title":"a","description":"a"},{"id":"x","title":"b","description":"b"}]}"#,
    );
    let agent = Arc::new(MockAgentRunner::new());

    let result = ResearchEngine::new(
        DelveConfig::default(),
        provider,
        agent.clone(),
        CancellationToken::new(),
    )
    .run("energy")
    .await;

    assert_eq!(
        result.unwrap_err(),
        PipelineError::DuplicateSubtaskId { id: "x".into() }
    );
    assert_eq!(agent.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_report_keeps_successful_finding_and_names_failed_one() {
    let provider = Arc::new(MockLlmProvider::new());
    provider.queue_text(SUGGESTIONS);
    provider.queue_text("# Plan\n\n1. x\n2. y");
    provider.queue_text(
        r#"{"subtasks":[{"id":"A","title":"x","description":"x"},{"id":"B","title":"y","description":"y"}]}"#,
    );
    provider.queue_text("# Report\nSummary of the research.");
    let agent = Arc::new(MockAgentRunner::new());
    agent.queue_text("Solar module prices fell 90% between 2010 and 2020.");
    agent.queue(Err(AgentError::ExecutionFailed {
        message: "boom".into(),
    }));

    let outcome = ResearchEngine::new(
        DelveConfig::default(),
        provider,
        agent,
        CancellationToken::new(),
    )
    .run("future of renewable energy")
    .await
    .unwrap();

    assert_eq!(outcome.subtasks.len(), 2);
    assert_eq!(outcome.findings.len(), 2);
    assert!(!outcome.findings[0].failed);
    assert!(outcome.findings[1].failed);

    let report = &outcome.report;
    assert!(!report.degraded);
    assert!(report.text.starts_with("# Report\nSummary of the research."));
    assert!(
        report
            .text
            .contains("Solar module prices fell 90% between 2010 and 2020.")
    );
    assert!(report.text.contains("## Incomplete Research"));
    assert!(report.text.contains("- **B** (y): "));
    assert!(report.text.contains("boom"));
    assert_eq!(report.failed_subtasks, vec!["B".to_string()]);
}

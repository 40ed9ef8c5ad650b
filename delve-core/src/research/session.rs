//! Research session state machine with persistence.
//!
//! Tracks which stage a run is in, how far dispatch has progressed and how
//! the run ended, and persists that record so past runs can be listed.

use super::clarify::Suggestion;
use super::decomposition::Subtask;
use super::dispatch::Finding;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Current phase of a research session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResearchPhase {
    Clarifying,
    Planning,
    Splitting,
    Dispatching,
    Synthesizing,
    Complete,
    Failed,
}

impl std::fmt::Display for ResearchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ResearchPhase::Clarifying => "clarifying",
            ResearchPhase::Planning => "planning",
            ResearchPhase::Splitting => "splitting",
            ResearchPhase::Dispatching => "dispatching",
            ResearchPhase::Synthesizing => "synthesizing",
            ResearchPhase::Complete => "complete",
            ResearchPhase::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// A persistent record of one research run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchSession {
    pub id: Uuid,
    /// The topic as entered.
    pub topic: String,
    /// The topic after clarification, once chosen.
    pub final_topic: Option<String>,
    pub phase: ResearchPhase,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub subtasks_total: usize,
    pub subtasks_done: usize,
    pub subtasks_failed: usize,
    /// Overall progress (0.0-1.0).
    pub progress: f64,
    /// Whether the final report had to be assembled without synthesis.
    pub degraded: bool,
    /// Error message if failed.
    pub error: Option<String>,
}

impl ResearchSession {
    pub fn new(topic: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            topic: topic.into(),
            final_topic: None,
            phase: ResearchPhase::Clarifying,
            created_at: now,
            updated_at: now,
            subtasks_total: 0,
            subtasks_done: 0,
            subtasks_failed: 0,
            progress: 0.0,
            degraded: false,
            error: None,
        }
    }

    /// Transition to a new phase.
    pub fn transition(&mut self, new_phase: ResearchPhase) {
        self.phase = new_phase;
        self.updated_at = Utc::now();
        self.update_progress();
    }

    /// Record one resolved subtask.
    pub fn record_finding(&mut self, finding: &Finding) {
        self.subtasks_done += 1;
        if finding.failed {
            self.subtasks_failed += 1;
        }
        self.updated_at = Utc::now();
        self.update_progress();
    }

    /// Mark the session as failed.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.phase = ResearchPhase::Failed;
        self.updated_at = Utc::now();
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.phase, ResearchPhase::Complete | ResearchPhase::Failed)
    }

    fn update_progress(&mut self) {
        self.progress = match self.phase {
            ResearchPhase::Clarifying => 0.0,
            ResearchPhase::Planning => 0.1,
            ResearchPhase::Splitting => 0.2,
            ResearchPhase::Dispatching => {
                let total = self.subtasks_total.max(1);
                0.3 + 0.6 * (self.subtasks_done as f64 / total as f64)
            }
            ResearchPhase::Synthesizing => 0.9,
            ResearchPhase::Complete => 1.0,
            ResearchPhase::Failed => self.progress,
        };
    }

    fn sessions_dir(base_dir: &Path) -> PathBuf {
        base_dir.join("sessions")
    }

    /// Persist session to `<base_dir>/sessions/<id>.json`.
    pub fn save(&self, base_dir: &Path) -> Result<PathBuf, std::io::Error> {
        let path = Self::sessions_dir(base_dir).join(format!("{}.json", self.id));
        crate::persistence::atomic_write_json(&path, self)?;
        Ok(path)
    }

    /// Load a session from disk.
    pub fn load(base_dir: &Path, session_id: &Uuid) -> Result<Self, std::io::Error> {
        let path = Self::sessions_dir(base_dir).join(format!("{session_id}.json"));
        crate::persistence::load_json(&path)?.ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no session {session_id}"),
            )
        })
    }

    /// List all saved sessions, most recently updated first.
    pub fn list_sessions(base_dir: &Path) -> Vec<SessionSummary> {
        let Ok(entries) = std::fs::read_dir(Self::sessions_dir(base_dir)) else {
            return Vec::new();
        };

        let mut summaries: Vec<SessionSummary> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|e| e == "json"))
            .filter_map(|path| std::fs::read_to_string(path).ok())
            .filter_map(|data| serde_json::from_str::<ResearchSession>(&data).ok())
            .map(|session| SessionSummary::from(&session))
            .collect();

        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        summaries
    }
}

/// Summary of a research session for listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub topic: String,
    pub phase: ResearchPhase,
    pub progress: f64,
    pub degraded: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&ResearchSession> for SessionSummary {
    fn from(session: &ResearchSession) -> Self {
        Self {
            id: session.id,
            topic: session
                .final_topic
                .clone()
                .unwrap_or_else(|| session.topic.clone()),
            phase: session.phase,
            progress: session.progress,
            degraded: session.degraded,
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}

/// Callback trait for progressive research UI updates.
///
/// Every method has an empty default so surfaces implement only what they show.
pub trait ResearchCallback: Send + Sync {
    /// Called when the research phase changes.
    fn on_phase_change(&self, _phase: ResearchPhase, _progress: f64) {}
    /// Called with the clarifier's suggestions, before selection.
    fn on_suggestions(&self, _suggestions: &[Suggestion]) {}
    /// Called once the topic is settled.
    fn on_topic(&self, _topic: &str) {}
    /// Called with the research plan.
    fn on_plan(&self, _plan: &str) {}
    /// Called before a subtask's agent is invoked. `index` is zero-based.
    fn on_subtask_start(&self, _index: usize, _total: usize, _subtask: &Subtask) {}
    /// Called as soon as a subtask's agent call resolves.
    fn on_subtask_complete(&self, _finding: &Finding) {}
}

/// No-op callback for testing.
pub struct NoOpResearchCallback;

impl ResearchCallback for NoOpResearchCallback {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn finding(failed: bool) -> Finding {
        let subtask = Subtask {
            id: "A".into(),
            title: "t".into(),
            description: "d".into(),
        };
        if failed {
            Finding::failed(&subtask, "boom".into())
        } else {
            Finding::succeeded(&subtask, "ok".into())
        }
    }

    #[test]
    fn test_session_lifecycle() {
        let mut session = ResearchSession::new("renewable energy");
        assert_eq!(session.phase, ResearchPhase::Clarifying);
        assert!(session.is_active());

        session.transition(ResearchPhase::Planning);
        session.transition(ResearchPhase::Splitting);
        session.subtasks_total = 2;
        session.transition(ResearchPhase::Dispatching);
        assert!((session.progress - 0.3).abs() < f64::EPSILON);

        session.record_finding(&finding(false));
        session.record_finding(&finding(true));
        assert_eq!(session.subtasks_failed, 1);
        assert!((session.progress - 0.9).abs() < 1e-9);

        session.transition(ResearchPhase::Complete);
        assert!(!session.is_active());
        assert!((session.progress - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_fail_keeps_progress() {
        let mut session = ResearchSession::new("t");
        session.transition(ResearchPhase::Splitting);
        session.fail("planning produced no research plan");
        assert_eq!(session.phase, ResearchPhase::Failed);
        assert!((session.progress - 0.2).abs() < f64::EPSILON);
        assert!(session.error.is_some());
    }

    #[test]
    fn test_save_load_list() {
        let dir = TempDir::new().unwrap();
        let mut first = ResearchSession::new("first");
        first.save(dir.path()).unwrap();

        let mut second = ResearchSession::new("second");
        second.final_topic = Some("Second: narrowed".into());
        second.transition(ResearchPhase::Complete);
        second.save(dir.path()).unwrap();

        let loaded = ResearchSession::load(dir.path(), &second.id).unwrap();
        assert_eq!(loaded.topic, "second");
        assert_eq!(loaded.phase, ResearchPhase::Complete);

        first.transition(ResearchPhase::Planning);
        first.save(dir.path()).unwrap();
        let list = ResearchSession::list_sessions(dir.path());
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].topic, "first");
        assert_eq!(list[1].topic, "Second: narrowed");
    }

    #[test]
    fn test_list_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(ResearchSession::list_sessions(&dir.path().join("nope")).is_empty());
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = ResearchSession::load(dir.path(), &Uuid::new_v4()).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(ResearchPhase::Dispatching.to_string(), "dispatching");
    }
}

//! Console progress output for a research run.

use delve_core::research::clarify::Suggestion;
use delve_core::research::decomposition::Subtask;
use delve_core::research::dispatch::Finding;
use delve_core::research::session::{ResearchCallback, ResearchPhase};

/// Prints stage progress to stderr so stdout carries only the report.
pub struct ConsoleProgress;

impl ResearchCallback for ConsoleProgress {
    fn on_phase_change(&self, phase: ResearchPhase, progress: f64) {
        if phase == ResearchPhase::Dispatching {
            // Per-subtask lines already show dispatch progress.
            return;
        }
        eprintln!("[{:>3.0}%] {}", progress * 100.0, phase_label(phase));
    }

    fn on_suggestions(&self, suggestions: &[Suggestion]) {
        eprintln!("       {} possible directions:", suggestions.len());
        for (i, s) in suggestions.iter().enumerate() {
            eprintln!("       {}. {}", i + 1, s.title);
        }
    }

    fn on_topic(&self, topic: &str) {
        eprintln!("       Topic: {topic}");
    }

    fn on_plan(&self, plan: &str) {
        eprintln!("{}", plan_preview(plan, 8));
    }

    fn on_subtask_start(&self, index: usize, total: usize, subtask: &Subtask) {
        eprintln!("       [{}/{}] {}: {}", index + 1, total, subtask.id, subtask.title);
    }

    fn on_subtask_complete(&self, finding: &Finding) {
        if finding.failed {
            eprintln!("             failed: {}", finding.text);
        } else {
            eprintln!("             done ({} chars)", finding.text.len());
        }
    }
}

fn phase_label(phase: ResearchPhase) -> &'static str {
    match phase {
        ResearchPhase::Clarifying => "Clarifying topic",
        ResearchPhase::Planning => "Planning research",
        ResearchPhase::Splitting => "Splitting into subtasks",
        ResearchPhase::Dispatching => "Researching subtasks",
        ResearchPhase::Synthesizing => "Synthesizing report",
        ResearchPhase::Complete => "Done",
        ResearchPhase::Failed => "Failed",
    }
}

/// The first `lines` non-empty lines of the plan, indented.
fn plan_preview(plan: &str, lines: usize) -> String {
    let mut shown: Vec<String> = plan
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(lines)
        .map(|l| format!("       | {l}"))
        .collect();
    let total = plan.lines().filter(|l| !l.trim().is_empty()).count();
    if total > lines {
        shown.push(format!("       | ... ({} more lines)", total - lines));
    }
    shown.join("\n")
}

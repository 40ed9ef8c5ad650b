//! Synthesis — merges subtask findings into the final report.
//!
//! A failed synthesis does not lose the research: the report degrades to
//! the raw findings with a note saying so. A synthesized report carries the
//! successful findings verbatim in an appendix, and failed subtasks are
//! always named in a notice at the end.

use super::dispatch::Finding;
use super::prompts::{SYNTHESIZER_DIRECTION, SYNTHESIZER_REQUEST, render};
use super::stage::{StageRunner, StageSpec};
use crate::config::StageConfig;
use crate::error::StageError;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const FINDING_SEPARATOR: &str = "\n\n---\n\n";

/// The final research report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalReport {
    /// Markdown body, including any failure notices.
    pub text: String,
    /// Synthesis failed and `text` holds the unedited findings.
    pub degraded: bool,
    /// Ids of subtasks whose research failed.
    pub failed_subtasks: Vec<String>,
}

impl FinalReport {
    pub fn is_complete(&self) -> bool {
        !self.degraded && self.failed_subtasks.is_empty()
    }
}

/// Merge `findings` into a report.
pub async fn synthesize(
    runner: &StageRunner,
    config: &StageConfig,
    topic: &str,
    plan: &str,
    findings: &[Finding],
) -> Result<FinalReport, StageError> {
    info!(topic, findings = findings.len(), model = %config.model, "Synthesizing report");
    let raw = concatenate(findings);
    let request = render(
        SYNTHESIZER_REQUEST,
        &[
            ("user_query", topic),
            ("research_plan", plan),
            ("findings", &raw),
        ],
    );
    let spec = StageSpec::new("synthesize", config, SYNTHESIZER_DIRECTION, &request);
    let text = runner.ask_text(&spec).await?;

    Ok(assemble_report(topic, text, findings))
}

/// Build the report from synthesized text, falling back to the raw findings
/// when the text is empty.
pub fn assemble_report(topic: &str, synthesized: String, findings: &[Finding]) -> FinalReport {
    let degraded = synthesized.trim().is_empty();
    let mut text = if degraded {
        warn!(topic, "Synthesis produced nothing; reporting raw findings");
        degraded_body(topic, findings)
    } else {
        let mut body = synthesized.trim().to_string();
        let succeeded: Vec<Finding> = findings.iter().filter(|f| !f.failed).cloned().collect();
        if !succeeded.is_empty() {
            body.push_str("\n\n## Findings\n\n");
            body.push_str(&concatenate(&succeeded));
        }
        body
    };

    let failed: Vec<&Finding> = findings.iter().filter(|f| f.failed).collect();
    if !failed.is_empty() {
        text.push_str("\n\n");
        text.push_str(&failure_notice(&failed));
    }
    text.push('\n');

    FinalReport {
        text,
        degraded,
        failed_subtasks: failed.iter().map(|f| f.subtask_id.clone()).collect(),
    }
}

fn concatenate(findings: &[Finding]) -> String {
    findings
        .iter()
        .map(|f| f.to_markdown().trim_end().to_string())
        .collect::<Vec<_>>()
        .join(FINDING_SEPARATOR)
}

fn degraded_body(topic: &str, findings: &[Finding]) -> String {
    let mut body = format!(
        "# Research Report: {topic}\n\n> **Note:** the synthesis step failed. \
         The findings below are presented unedited, one section per subtask."
    );
    if findings.is_empty() {
        body.push_str("\n\n_No findings were produced._");
    } else {
        body.push_str(FINDING_SEPARATOR);
        body.push_str(&concatenate(findings));
    }
    body
}

fn failure_notice(failed: &[&Finding]) -> String {
    let mut notice = String::from(
        "## Incomplete Research\n\nThe following subtasks failed and are not covered by this report:\n",
    );
    for finding in failed {
        notice.push_str(&format!(
            "\n- **{}** ({}): {}",
            finding.subtask_id, finding.title, finding.text
        ));
    }
    notice
}

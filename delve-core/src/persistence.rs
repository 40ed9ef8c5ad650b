//! Shared persistence utilities — atomic file writes, JSON load/save, and the
//! artifact store each research stage hands its output to.
//!
//! Artifact writes happen right after the stage that produced them. The
//! pipeline logs a failed write and carries on.

use crate::research::decomposition::Subtask;
use crate::research::dispatch::Finding;
use crate::research::synthesis::FinalReport;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Atomically write JSON data to a file.
///
/// Serializes `data` to pretty-printed JSON, writes to a `.tmp` sibling file,
/// then renames to the target path. Creates parent directories if needed.
pub fn atomic_write_json<T: serde::Serialize>(path: &Path, data: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(data).map_err(io::Error::other)?;
    atomic_write(path, json.as_bytes())
}

/// Atomically write raw bytes to a file.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Load and deserialize JSON from a file.
///
/// Returns `Ok(None)` if the file doesn't exist.
pub fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> io::Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(path)?;
    let value =
        serde_json::from_str(&data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(Some(value))
}

/// Receives each stage's artifact as soon as the stage completes.
pub trait ArtifactStore: Send + Sync {
    fn save_topic(&self, topic: &str) -> io::Result<()>;
    fn save_plan(&self, plan: &str) -> io::Result<()>;
    fn save_subtasks(&self, subtasks: &[Subtask]) -> io::Result<()>;
    /// One artifact per subtask id.
    fn save_finding(&self, finding: &Finding) -> io::Result<()>;
    fn save_report(&self, report: &FinalReport) -> io::Result<()>;
}

pub const TOPIC_FILE: &str = "topic.txt";
pub const PLAN_FILE: &str = "research_plan.txt";
pub const SUBTASKS_FILE: &str = "subtasks.json";
pub const FINDINGS_DIR: &str = "findings";
pub const REPORT_FILE: &str = "report.md";

/// Writes artifacts as UTF-8 files under one output directory.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn finding_path(&self, subtask_id: &str) -> PathBuf {
        self.root
            .join(FINDINGS_DIR)
            .join(format!("{}.md", file_stem(subtask_id)))
    }
}

/// Map a subtask id onto a file stem. Distinct ids always get distinct stems:
/// anything outside `[A-Za-z0-9-_.~]` is percent-encoded, path separators
/// included, and `%` itself is escaped.
fn file_stem(id: &str) -> String {
    if id.is_empty() {
        // Never produced by encoding, so it cannot shadow a real id.
        return "%".to_string();
    }
    urlencoding::encode(id).into_owned()
}

impl ArtifactStore for FsArtifactStore {
    fn save_topic(&self, topic: &str) -> io::Result<()> {
        atomic_write(&self.root.join(TOPIC_FILE), topic.as_bytes())
    }

    fn save_plan(&self, plan: &str) -> io::Result<()> {
        atomic_write(&self.root.join(PLAN_FILE), plan.as_bytes())
    }

    fn save_subtasks(&self, subtasks: &[Subtask]) -> io::Result<()> {
        atomic_write_json(&self.root.join(SUBTASKS_FILE), &subtasks)
    }

    fn save_finding(&self, finding: &Finding) -> io::Result<()> {
        atomic_write(
            &self.finding_path(&finding.subtask_id),
            finding.to_markdown().as_bytes(),
        )
    }

    fn save_report(&self, report: &FinalReport) -> io::Result<()> {
        atomic_write(&self.root.join(REPORT_FILE), report.text.as_bytes())
    }
}

/// Discards every artifact.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullArtifactStore;

impl ArtifactStore for NullArtifactStore {
    fn save_topic(&self, _topic: &str) -> io::Result<()> {
        Ok(())
    }

    fn save_plan(&self, _plan: &str) -> io::Result<()> {
        Ok(())
    }

    fn save_subtasks(&self, _subtasks: &[Subtask]) -> io::Result<()> {
        Ok(())
    }

    fn save_finding(&self, _finding: &Finding) -> io::Result<()> {
        Ok(())
    }

    fn save_report(&self, _report: &FinalReport) -> io::Result<()> {
        Ok(())
    }
}

/// Keeps artifacts in memory, in the order they were saved.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    entries: Mutex<Vec<(String, String)>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(name, content)` pairs in save order.
    pub fn entries(&self) -> Vec<(String, String)> {
        self.lock().clone()
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.lock()
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(String, String)>> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn push(&self, name: impl Into<String>, content: impl Into<String>) {
        self.lock().push((name.into(), content.into()));
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn save_topic(&self, topic: &str) -> io::Result<()> {
        self.push(TOPIC_FILE, topic);
        Ok(())
    }

    fn save_plan(&self, plan: &str) -> io::Result<()> {
        self.push(PLAN_FILE, plan);
        Ok(())
    }

    fn save_subtasks(&self, subtasks: &[Subtask]) -> io::Result<()> {
        let json = serde_json::to_string_pretty(subtasks).map_err(io::Error::other)?;
        self.push(SUBTASKS_FILE, json);
        Ok(())
    }

    fn save_finding(&self, finding: &Finding) -> io::Result<()> {
        self.push(
            format!("{FINDINGS_DIR}/{}.md", file_stem(&finding.subtask_id)),
            finding.to_markdown(),
        );
        Ok(())
    }

    fn save_report(&self, report: &FinalReport) -> io::Result<()> {
        self.push(REPORT_FILE, report.text.clone());
        Ok(())
    }
}

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use declarative::{ApplyRecord, ExecuteSummary};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths;

const LAST_RUN: &str = "last-run.json";

// ============================================================================
// Run Journal
// ============================================================================

/// What one installer run applied
///
/// Written after every run as an operator checkpoint. Nothing reads it back
/// to skip work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunJournal {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub project: String,
    #[serde(default)]
    pub dry_run: bool,
    /// A foreground failure stopped the run
    #[serde(default)]
    pub aborted: bool,
    pub success: bool,
    /// One entry per resource, in execution order
    #[serde(default)]
    pub records: Vec<ApplyRecord>,
}

impl RunJournal {
    pub fn new(
        project: &str,
        dry_run: bool,
        started_at: DateTime<Utc>,
        summary: &ExecuteSummary,
    ) -> Self {
        Self {
            started_at,
            finished_at: Utc::now(),
            project: project.to_string(),
            dry_run,
            aborted: summary.aborted,
            success: summary.is_success(),
            records: summary.records.clone(),
        }
    }

    /// Journal directory (`<state-dir>/runs`)
    pub fn runs_dir() -> Result<PathBuf> {
        Ok(paths::state_dir()?.join("runs"))
    }

    fn file_name(&self) -> String {
        format!("run-{}.json", self.started_at.format("%Y%m%dT%H%M%SZ"))
    }

    /// Save to the state directory
    pub fn save(&self) -> Result<PathBuf> {
        self.save_to(&Self::runs_dir()?)
    }

    /// Save as a timestamped file in `dir` and as `last-run.json`
    pub fn save_to(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create journal directory: {}", dir.display()))?;

        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize run journal")?;

        let path = dir.join(self.file_name());
        fs::write(&path, &content)
            .with_context(|| format!("Failed to write run journal: {}", path.display()))?;

        let last = dir.join(LAST_RUN);
        fs::write(&last, &content)
            .with_context(|| format!("Failed to write run journal: {}", last.display()))?;

        log::debug!("Saved run journal to {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::ApplyResult;
    use tempfile::TempDir;

    fn summary() -> ExecuteSummary {
        let mut summary = ExecuteSummary::default();
        summary.record(ApplyRecord {
            id: "topic.report2bq-trigger".into(),
            resource_type: "topic".into(),
            background: false,
            result: ApplyResult::Modified,
        });
        summary.record(ApplyRecord {
            id: "function.report2bq-fetcher".into(),
            resource_type: "function".into(),
            background: true,
            result: ApplyResult::Failed {
                error: "deploy failed".into(),
            },
        });
        summary
    }

    #[test]
    fn test_journal_reflects_summary() {
        let journal = RunJournal::new("acme-data", false, Utc::now(), &summary());
        assert!(!journal.success);
        assert!(!journal.aborted);
        assert_eq!(journal.records.len(), 2);
        assert!(journal.records[1].background);
    }

    #[test]
    fn test_save_writes_last_run() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("runs");
        let journal = RunJournal::new("acme-data", true, Utc::now(), &summary());

        let path = journal.save_to(&dir).unwrap();
        assert!(path.exists());
        assert!(
            path.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("run-")
        );

        let last = fs::read_to_string(dir.join(LAST_RUN)).unwrap();
        assert_eq!(last, fs::read_to_string(&path).unwrap());

        let loaded: RunJournal = serde_json::from_str(&last).unwrap();
        assert_eq!(loaded.project, "acme-data");
        assert!(loaded.dry_run);
        assert_eq!(loaded.records, journal.records);
    }
}

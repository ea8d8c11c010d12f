//! Core types for declarative resource management

use serde::{Deserialize, Serialize};

/// Current or desired state of a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceState {
    /// Resource exists/is configured
    Present { details: Option<String> },
    /// Resource does not exist/is not configured
    Absent,
    /// State cannot be determined
    Unknown,
}

impl ResourceState {
    /// Check if state represents presence
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present { .. })
    }

    /// Check if state represents absence
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

/// Result of applying a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyResult {
    /// No changes needed
    NoChange,
    /// Resource was created
    Created,
    /// Resource was modified (replaced or redeployed)
    Modified,
    /// Resource was removed
    Removed,
    /// Apply failed
    Failed { error: String },
    /// Apply was skipped
    Skipped { reason: String },
}

impl ApplyResult {
    /// Check if the result represents success (no failure)
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// Check if the result represents a change
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Created | Self::Modified | Self::Removed)
    }

    /// Short symbol used in progress output
    pub fn symbol(&self) -> &'static str {
        match self {
            ApplyResult::NoChange => "○",
            ApplyResult::Created | ApplyResult::Modified | ApplyResult::Removed => "✓",
            ApplyResult::Failed { .. } => "✗",
            ApplyResult::Skipped { .. } => "⊘",
        }
    }
}

/// Outcome of one resource within a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyRecord {
    /// Resource identifier
    pub id: String,
    /// Resource type
    pub resource_type: String,
    /// Whether it ran in the background batch
    pub background: bool,
    /// What happened
    pub result: ApplyResult,
}

/// Summary of execution results
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub created: usize,
    pub modified: usize,
    pub removed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub no_change: usize,
    /// A foreground failure stopped the run before every resource was applied
    pub aborted: bool,
    /// Per-resource results in the order they completed
    pub records: Vec<ApplyRecord>,
}

impl ExecuteSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.modified + self.removed
    }

    /// Check if execution was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0 && !self.aborted
    }

    /// Total number of resources processed
    pub fn total(&self) -> usize {
        self.created + self.modified + self.removed + self.skipped + self.failed + self.no_change
    }

    /// Merge another summary into this one
    pub fn merge(&mut self, other: &ExecuteSummary) {
        self.created += other.created;
        self.modified += other.modified;
        self.removed += other.removed;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.no_change += other.no_change;
        self.aborted |= other.aborted;
        self.records.extend(other.records.iter().cloned());
    }

    /// Count a result without recording it
    pub fn add_result(&mut self, result: &ApplyResult) {
        match result {
            ApplyResult::NoChange => self.no_change += 1,
            ApplyResult::Created => self.created += 1,
            ApplyResult::Modified => self.modified += 1,
            ApplyResult::Removed => self.removed += 1,
            ApplyResult::Failed { .. } => self.failed += 1,
            ApplyResult::Skipped { .. } => self.skipped += 1,
        }
    }

    /// Count and record a result
    pub fn record(&mut self, record: ApplyRecord) {
        self.add_result(&record.result);
        self.records.push(record);
    }

    /// Records that failed
    pub fn failures(&self) -> impl Iterator<Item = &ApplyRecord> {
        self.records.iter().filter(|r| !r.result.is_success())
    }
}

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Preview mutating calls instead of making them
    pub dry_run: bool,
    /// Number of threads for the background batch
    pub jobs: usize,
    /// Verbose output
    pub verbose: bool,
    /// Stop the foreground batch at the first failure
    pub fail_fast: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 4,
            verbose: false,
            fail_fast: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts_records() {
        let mut summary = ExecuteSummary::default();
        summary.record(ApplyRecord {
            id: "topic.report2bq-trigger".into(),
            resource_type: "topic".into(),
            background: false,
            result: ApplyResult::Modified,
        });
        summary.record(ApplyRecord {
            id: "bucket.acme-report2bq".into(),
            resource_type: "bucket".into(),
            background: false,
            result: ApplyResult::NoChange,
        });

        assert_eq!(summary.total(), 2);
        assert_eq!(summary.total_changes(), 1);
        assert!(summary.is_success());
        assert_eq!(summary.failures().count(), 0);
    }

    #[test]
    fn test_aborted_summary_is_not_success() {
        let summary = ExecuteSummary {
            aborted: true,
            ..Default::default()
        };
        assert!(!summary.is_success());
    }
}

//! Resource reconciliation.
//!
//! Converges one declaration at a time. "Already exists" on create and
//! "not found" on delete are treated as success. There is no retry and no
//! rollback: the first hard error is returned to the caller.

use crate::backend::Provider;
use crate::error::Result;
use crate::types::{ObservedState, Outcome, ResourceDeclaration, ResourceKind, Strategy};

/// Converges declarations through a provider.
pub struct Reconciler<'a> {
    provider: &'a dyn Provider,
}

impl<'a> Reconciler<'a> {
    /// Create a reconciler over `provider`.
    pub fn new(provider: &'a dyn Provider) -> Self {
        Self { provider }
    }

    /// Observe the current state of a declared resource.
    pub fn observe(&self, declaration: &ResourceDeclaration) -> Result<ObservedState> {
        self.provider.describe(declaration.kind, &declaration.name)
    }

    /// Converge a single declaration.
    pub fn reconcile(&self, declaration: &ResourceDeclaration) -> Result<Outcome> {
        match declaration.kind.strategy() {
            Strategy::Recreate => {
                self.delete_if_present(declaration.kind, &declaration.name)?;
                self.create(declaration)?;
                Ok(Outcome::Recreated)
            }
            Strategy::EnsureExists => {
                if self.observe(declaration)?.is_present() {
                    if let (ResourceKind::Secret, Some(data)) =
                        (declaration.kind, declaration.get("data"))
                    {
                        return self.update_secret(declaration, data);
                    }
                    log::info!("{} already exists", declaration.id());
                    return Ok(Outcome::Unchanged);
                }
                self.create(declaration)?;
                Ok(Outcome::Created)
            }
            Strategy::Overwrite => {
                self.create(declaration)?;
                Ok(Outcome::Deployed)
            }
        }
    }

    /// Delete a resource; returns `false` when it was already absent.
    pub fn delete_if_present(&self, kind: ResourceKind, name: &str) -> Result<bool> {
        log::info!("Deleting {kind} {name}");
        match self.provider.delete(kind, name) {
            Ok(()) => Ok(true),
            Err(e) if e.is_ignorable_on_delete() => {
                log::debug!("{kind} {name} was already absent");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Delete every resource of `kind` whose name contains `name`.
    ///
    /// Linear scan over the provider's list; returns the names deleted.
    pub fn cleanup(&self, kind: ResourceKind, name: &str) -> Result<Vec<String>> {
        let matches: Vec<String> = self
            .provider
            .list(kind)?
            .into_iter()
            .filter(|existing| existing.contains(name))
            .collect();

        let mut deleted = Vec::with_capacity(matches.len());
        for existing in matches {
            if self.delete_if_present(kind, &existing)? {
                deleted.push(existing);
            }
        }
        Ok(deleted)
    }

    /// Add a secret version when the latest one holds different data.
    fn update_secret(&self, declaration: &ResourceDeclaration, data: &str) -> Result<Outcome> {
        if self.provider.read_secret(&declaration.name)?.as_deref() == Some(data) {
            log::info!("{} is up to date", declaration.id());
            return Ok(Outcome::Unchanged);
        }
        log::info!("Adding a version to {}", declaration.id());
        self.provider.add_secret_version(&declaration.name, data)?;
        Ok(Outcome::Updated)
    }

    fn create(&self, declaration: &ResourceDeclaration) -> Result<()> {
        log::info!("Creating {}", declaration.id());
        match self.provider.create(declaration) {
            Ok(()) => Ok(()),
            Err(e) if e.is_ignorable_on_create() => {
                log::debug!("{} appeared concurrently", declaration.id());
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::gcloud::GcloudProvider;
    use crate::backend::memory::MemoryProvider;
    use crate::command::{CommandOutput, RecordingRunner};
    use crate::error::ErrorCategory;
    use std::sync::Arc;

    fn job_monitor() -> ResourceDeclaration {
        ResourceDeclaration::scheduler_job(
            "report2bq-job-monitor",
            "*/5 * * * *",
            "report2bq-job-monitor",
            "RUN",
        )
    }

    #[test]
    fn test_delete_of_absent_is_not_fatal() {
        let provider = MemoryProvider::new("acme");
        let reconciler = Reconciler::new(&provider);

        for kind in [ResourceKind::Topic, ResourceKind::SchedulerJob] {
            let deleted = reconciler.delete_if_present(kind, "report2bq-missing").unwrap();
            assert!(!deleted);
        }
        assert_eq!(provider.mutations(), 0);
    }

    #[test]
    fn test_recreate_absent_topic() {
        let provider = MemoryProvider::new("acme");
        let outcome = Reconciler::new(&provider)
            .reconcile(&ResourceDeclaration::topic("report2bq-trigger"))
            .unwrap();

        assert_eq!(outcome, Outcome::Recreated);
        assert!(provider.contains(ResourceKind::Topic, "report2bq-trigger"));
    }

    #[test]
    fn test_ensure_exists_skips_present_bucket_and_dataset() {
        let provider = MemoryProvider::new("acme");
        provider.insert(&ResourceDeclaration::bucket("acme-report2bq"));
        provider.insert(&ResourceDeclaration::dataset("report2bq"));
        let reconciler = Reconciler::new(&provider);

        let bucket = reconciler
            .reconcile(&ResourceDeclaration::bucket("acme-report2bq").with("location", "EU"))
            .unwrap();
        let dataset = reconciler
            .reconcile(&ResourceDeclaration::dataset("report2bq"))
            .unwrap();

        assert_eq!(bucket, Outcome::Unchanged);
        assert_eq!(dataset, Outcome::Unchanged);
        assert_eq!(provider.mutations(), 0);
        // drift on an existing bucket is ignored
        assert_eq!(
            provider.config(ResourceKind::Bucket, "acme-report2bq").unwrap().get("location"),
            None
        );
    }

    #[test]
    fn test_ensure_exists_issues_no_mutating_command_for_present_bucket() {
        let runner = Arc::new(RecordingRunner::new().reply(
            "gsutil ls -b gs://acme-report2bq",
            CommandOutput::ok("gs://acme-report2bq/\n"),
        ));
        let provider = GcloudProvider::new("acme", "us-central1", runner.clone());

        let outcome = Reconciler::new(&provider)
            .reconcile(&ResourceDeclaration::bucket("acme-report2bq"))
            .unwrap();

        assert_eq!(outcome, Outcome::Unchanged);
        assert!(runner.mutating_calls().is_empty());
    }

    #[test]
    fn test_repeated_job_monitor_converges() {
        let provider = MemoryProvider::new("acme");
        let reconciler = Reconciler::new(&provider);

        reconciler.reconcile(&job_monitor()).unwrap();
        let first = provider.config(ResourceKind::SchedulerJob, "report2bq-job-monitor");
        reconciler.reconcile(&job_monitor()).unwrap();
        let second = provider.config(ResourceKind::SchedulerJob, "report2bq-job-monitor");

        assert_eq!(first, second);
        assert_eq!(provider.count(ResourceKind::SchedulerJob), 1);
        let observed = reconciler.observe(&job_monitor()).unwrap();
        assert_eq!(observed.field("schedule"), Some("*/5 * * * *"));
        assert_eq!(observed.field("topic"), Some("report2bq-job-monitor"));
    }

    #[test]
    fn test_changed_secret_data_adds_version() {
        let provider = MemoryProvider::new("acme");
        provider.insert(&ResourceDeclaration::secret("report2bq-client-secrets").with("data", "OLD"));
        let reconciler = Reconciler::new(&provider);
        let rotated = ResourceDeclaration::secret("report2bq-client-secrets").with("data", "NEW");

        assert_eq!(reconciler.reconcile(&rotated).unwrap(), Outcome::Updated);
        assert_eq!(
            provider.config(ResourceKind::Secret, "report2bq-client-secrets").unwrap()["data"],
            "NEW"
        );

        let mutations = provider.mutations();
        assert_eq!(reconciler.reconcile(&rotated).unwrap(), Outcome::Unchanged);
        assert_eq!(provider.mutations(), mutations);
    }

    #[test]
    fn test_create_failure_is_returned() {
        let provider = MemoryProvider::new("acme");
        provider.fail_create(ResourceKind::Topic, "report2bq-trigger");

        let err = Reconciler::new(&provider)
            .reconcile(&ResourceDeclaration::topic("report2bq-trigger"))
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Permission);
    }

    #[test]
    fn test_recreate_tolerates_not_found_from_cli() {
        let runner = Arc::new(RecordingRunner::new().reply(
            "topics delete",
            CommandOutput::failed("ERROR: NOT_FOUND: Resource not found (resource=report2bq-trigger)."),
        ));
        let provider = GcloudProvider::new("acme", "us-central1", runner.clone());

        let outcome = Reconciler::new(&provider)
            .reconcile(&ResourceDeclaration::topic("report2bq-trigger"))
            .unwrap();

        assert_eq!(outcome, Outcome::Recreated);
        let lines = runner.command_lines();
        assert!(lines[0].starts_with("gcloud pubsub topics delete report2bq-trigger"));
        assert!(lines[1].starts_with("gcloud pubsub topics create report2bq-trigger"));
    }

    #[test]
    fn test_cleanup_deletes_matching_entries_only() {
        let provider = MemoryProvider::new("acme");
        for name in ["report2bq-fetcher", "report2bq-fetcher-old", "report2bq-loader", "other"] {
            provider.insert(&ResourceDeclaration::function(name, "main"));
        }

        let mut deleted = Reconciler::new(&provider)
            .cleanup(ResourceKind::Function, "report2bq-fetcher")
            .unwrap();
        deleted.sort();

        assert_eq!(deleted, vec!["report2bq-fetcher", "report2bq-fetcher-old"]);
        assert!(provider.contains(ResourceKind::Function, "report2bq-loader"));
        assert!(provider.contains(ResourceKind::Function, "other"));
    }

    #[test]
    fn test_dry_run_reconcile_has_no_mutating_calls() {
        let runner = Arc::new(RecordingRunner::new().reply(
            "gsutil ls -b",
            CommandOutput::failed("BucketNotFoundException: 404"),
        ));
        let provider = GcloudProvider::new("acme", "us-central1", runner.clone()).dry_run(true);
        let reconciler = Reconciler::new(&provider);

        reconciler.reconcile(&ResourceDeclaration::bucket("acme-report2bq")).unwrap();
        reconciler.reconcile(&job_monitor()).unwrap();

        assert!(runner.mutating_calls().is_empty());
    }
}

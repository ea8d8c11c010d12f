//! Provider abstraction over Google Cloud.
//!
//! The [`Provider`] trait is the handle the reconciler converges
//! resources through:
//! - [`gcloud::GcloudProvider`] drives the real `gcloud`, `gsutil` and `bq` CLIs
//! - [`memory::MemoryProvider`] keeps resources in memory for tests and previews

pub mod gcloud;
pub mod memory;

use crate::error::Result;
use crate::types::{ObservedState, ResourceDeclaration, ResourceKind};

/// Operations every backend supports.
///
/// Errors follow the [`crate::Error`] taxonomy: a missing resource is
/// reported as [`crate::Error::NotFound`] by `delete` and as
/// [`ObservedState::Absent`] by `describe`.
pub trait Provider: Send + Sync {
    /// Project the provider operates on.
    fn project(&self) -> &str;

    /// Observe the current state of a named resource.
    fn describe(&self, kind: ResourceKind, name: &str) -> Result<ObservedState>;

    /// Create the resource, or replace it for kinds whose create call overwrites.
    fn create(&self, declaration: &ResourceDeclaration) -> Result<()>;

    /// Delete a named resource.
    fn delete(&self, kind: ResourceKind, name: &str) -> Result<()>;

    /// Names of all resources of a kind in the project.
    fn list(&self, kind: ResourceKind) -> Result<Vec<String>>;

    /// Read a Cloud Storage object, `None` when it does not exist.
    fn read_object(&self, url: &str) -> Result<Option<String>>;

    /// Latest value of a secret, `None` when it has no version yet.
    fn read_secret(&self, name: &str) -> Result<Option<String>>;

    /// Store `data` as a new version of an existing secret.
    fn add_secret_version(&self, name: &str, data: &str) -> Result<()>;

    /// APIs currently enabled in the project.
    fn enabled_services(&self) -> Result<Vec<String>> {
        self.list(ResourceKind::Service)
    }

    /// Whether mutating calls are only previewed.
    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Last `/`-separated segment of a fully qualified resource name.
///
/// `projects/p/locations/us-central1/jobs/report2bq-job-monitor` becomes
/// `report2bq-job-monitor`.
pub fn short_name(full: &str) -> &str {
    full.trim_end_matches('/').rsplit('/').next().unwrap_or(full)
}

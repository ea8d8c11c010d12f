//! Core types for declaring Google Cloud resources.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kind of cloud resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Pub/Sub topic
    Topic,
    /// Cloud Scheduler job
    SchedulerJob,
    /// Cloud Storage bucket
    Bucket,
    /// Cloud Function
    Function,
    /// BigQuery dataset
    Dataset,
    /// Secret Manager secret
    Secret,
    /// IAM service account
    ServiceAccount,
    /// Enabled Google API (`gcloud services`)
    Service,
    /// Cloud Storage object
    Object,
}

impl ResourceKind {
    /// All kinds, in the order a deployment creates them.
    pub const ALL: [ResourceKind; 9] = [
        ResourceKind::Service,
        ResourceKind::ServiceAccount,
        ResourceKind::Bucket,
        ResourceKind::Dataset,
        ResourceKind::Secret,
        ResourceKind::Object,
        ResourceKind::Topic,
        ResourceKind::Function,
        ResourceKind::SchedulerJob,
    ];

    /// Stable snake_case name, used in resource ids and target filters.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Topic => "topic",
            ResourceKind::SchedulerJob => "scheduler_job",
            ResourceKind::Bucket => "bucket",
            ResourceKind::Function => "function",
            ResourceKind::Dataset => "dataset",
            ResourceKind::Secret => "secret",
            ResourceKind::ServiceAccount => "service_account",
            ResourceKind::Service => "service",
            ResourceKind::Object => "object",
        }
    }

    /// Parse a kind from its snake_case name.
    pub fn from_name(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    /// How this kind converges.
    pub fn strategy(&self) -> Strategy {
        match self {
            ResourceKind::Topic | ResourceKind::SchedulerJob => Strategy::Recreate,
            ResourceKind::Bucket
            | ResourceKind::Dataset
            | ResourceKind::Secret
            | ResourceKind::ServiceAccount
            | ResourceKind::Service => Strategy::EnsureExists,
            ResourceKind::Function | ResourceKind::Object => Strategy::Overwrite,
        }
    }

    /// Whether `cleanup` can list and delete resources of this kind.
    pub fn supports_cleanup(&self) -> bool {
        matches!(
            self,
            ResourceKind::Topic | ResourceKind::SchedulerJob | ResourceKind::Function
        )
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Convergence strategy for a resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    /// Delete (ignoring "not found"), then create
    Recreate,
    /// Describe; create only when absent. Drift on a present resource is
    /// ignored, except for secret data, which gets a new version when it
    /// differs.
    EnsureExists,
    /// The create call itself replaces any existing resource
    Overwrite,
}

/// A named resource and the configuration it should have.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDeclaration {
    /// Kind of resource
    pub kind: ResourceKind,
    /// Provider-side name (topic id, bucket name, `gs://` URL for objects, ...)
    pub name: String,
    /// Desired configuration, kind-specific keys
    pub config: BTreeMap<String, String>,
}

impl ResourceDeclaration {
    /// Create a declaration with empty configuration.
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            config: BTreeMap::new(),
        }
    }

    /// Pub/Sub topic.
    pub fn topic(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Topic, name)
    }

    /// Cloud Storage bucket.
    pub fn bucket(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Bucket, name)
    }

    /// BigQuery dataset.
    pub fn dataset(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Dataset, name)
    }

    /// Cloud Scheduler job publishing `body` to `topic` on `schedule`.
    pub fn scheduler_job(name: impl Into<String>, schedule: &str, topic: &str, body: &str) -> Self {
        Self::new(ResourceKind::SchedulerJob, name)
            .with("schedule", schedule)
            .with("topic", topic)
            .with("message_body", body)
    }

    /// Cloud Function with the given entry point.
    pub fn function(name: impl Into<String>, entry_point: &str) -> Self {
        Self::new(ResourceKind::Function, name).with("entry_point", entry_point)
    }

    /// Secret Manager secret.
    pub fn secret(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Secret, name)
    }

    /// Service account, named by its email.
    pub fn service_account(email: impl Into<String>) -> Self {
        Self::new(ResourceKind::ServiceAccount, email)
    }

    /// Google API such as `pubsub.googleapis.com`.
    pub fn service(api: impl Into<String>) -> Self {
        Self::new(ResourceKind::Service, api)
    }

    /// Cloud Storage object at `gs://bucket/path`.
    pub fn object(url: impl Into<String>) -> Self {
        Self::new(ResourceKind::Object, url)
    }

    /// Set a configuration value.
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.config.insert(key.to_string(), value.into());
        self
    }

    /// Get a configuration value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.config.get(key).map(String::as_str)
    }

    /// Get a required configuration value.
    pub fn require(&self, key: &str) -> crate::Result<&str> {
        self.get(key).ok_or_else(|| {
            crate::Error::Config(format!("{} {} is missing '{}'", self.kind, self.name, key))
        })
    }

    /// Identifier unique across kinds, e.g. `topic.report2bq-trigger`.
    pub fn id(&self) -> String {
        format!("{}.{}", self.kind, self.name)
    }
}

/// What the provider reports for a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObservedState {
    /// Resource does not exist
    Absent,
    /// Resource exists; `fields` holds the attributes the reconciler compares
    Present { fields: BTreeMap<String, String> },
}

impl ObservedState {
    /// Present with no recorded fields.
    pub fn present() -> Self {
        Self::Present {
            fields: BTreeMap::new(),
        }
    }

    /// Check if the resource exists.
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present { .. })
    }

    /// Get an observed field.
    pub fn field(&self, key: &str) -> Option<&str> {
        match self {
            Self::Present { fields } => fields.get(key).map(String::as_str),
            Self::Absent => None,
        }
    }
}

/// Result of reconciling one declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// Resource was absent and has been created
    Created,
    /// Resource was deleted (or already absent) and created again
    Recreated,
    /// Create-or-replace call issued
    Deployed,
    /// Resource was present; nothing was changed
    Unchanged,
    /// Resource was present and its stored value was replaced
    Updated,
}

impl Outcome {
    /// Whether a mutating call was made.
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_per_kind() {
        assert_eq!(ResourceKind::Topic.strategy(), Strategy::Recreate);
        assert_eq!(ResourceKind::SchedulerJob.strategy(), Strategy::Recreate);
        assert_eq!(ResourceKind::Bucket.strategy(), Strategy::EnsureExists);
        assert_eq!(ResourceKind::Dataset.strategy(), Strategy::EnsureExists);
        assert_eq!(ResourceKind::Function.strategy(), Strategy::Overwrite);
    }

    #[test]
    fn test_kind_name_round_trip() {
        for kind in ResourceKind::ALL {
            assert_eq!(ResourceKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(ResourceKind::from_name("vm"), None);
    }

    #[test]
    fn test_declaration_builder() {
        let job = ResourceDeclaration::scheduler_job(
            "report2bq-job-monitor",
            "*/5 * * * *",
            "report2bq-job-monitor",
            "RUN",
        );
        assert_eq!(job.id(), "scheduler_job.report2bq-job-monitor");
        assert_eq!(job.get("schedule"), Some("*/5 * * * *"));
        assert!(job.require("topic").is_ok());
        assert!(job.require("region").is_err());
    }

    #[test]
    fn test_observed_state_fields() {
        let mut fields = BTreeMap::new();
        fields.insert("schedule".to_string(), "*/5 * * * *".to_string());
        let state = ObservedState::Present { fields };
        assert!(state.is_present());
        assert_eq!(state.field("schedule"), Some("*/5 * * * *"));
        assert_eq!(ObservedState::Absent.field("schedule"), None);
    }
}

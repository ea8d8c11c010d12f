//! Error types for Google Cloud SDK operations.
//!
//! The SDK tools report almost every failure as a non-zero exit code plus a
//! line of text on stderr. Errors are categorized from that text so the
//! reconciler can tell an idempotent no-op ("already exists", "not found")
//! apart from a real failure, and so the operator gets advice that matches
//! the cause.

use thiserror::Error;

/// Categories of provider errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The named resource does not exist
    NotFound,
    /// The named resource already exists
    AlreadyExists,
    /// Caller lacks an IAM permission
    Permission,
    /// The Google API backing the resource is not enabled
    ApiDisabled,
    /// Project quota exhausted
    Quota,
    /// Network-related errors (DNS, TLS, timeouts)
    Network,
    /// gcloud, gsutil or bq is not installed
    ToolNotFound,
    /// Invalid local configuration or arguments
    Config,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether a delete that failed this way already reached the desired state.
    pub fn is_ignorable_on_delete(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Whether a create that failed this way already reached the desired state.
    pub fn is_ignorable_on_create(&self) -> bool {
        matches!(self, Self::AlreadyExists)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NotFound => "Resource not found",
            Self::AlreadyExists => "Resource already exists",
            Self::Permission => "Permission denied",
            Self::ApiDisabled => "API not enabled",
            Self::Quota => "Quota exceeded",
            Self::Network => "Network connectivity issue",
            Self::ToolNotFound => "Google Cloud SDK not installed",
            Self::Config => "Invalid configuration",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::NotFound => "Check the resource name and project",
            Self::AlreadyExists => "No action needed - the resource is already there",
            Self::Permission => "Grant the deploying account the required IAM role",
            Self::ApiDisabled => "Re-run with --activate-apis or enable the API in the console",
            Self::Quota => "Request a quota increase or remove unused resources",
            Self::Network => "Check your internet connection and try again",
            Self::ToolNotFound => "Install the Google Cloud SDK from https://cloud.google.com/sdk",
            Self::Config => "Check the flags and configuration file",
            Self::Other => "Check the error details for more information",
        }
    }
}

/// Errors that can occur while talking to Google Cloud.
#[derive(Debug, Error)]
pub enum Error {
    /// The named resource does not exist
    #[error("not found: {name}")]
    NotFound {
        /// Resource that could not be found
        name: String,
    },

    /// The named resource already exists
    #[error("already exists: {name}")]
    AlreadyExists {
        /// Resource that is already present
        name: String,
    },

    /// IAM permission denied
    #[error("permission denied: {message}")]
    Permission {
        /// Details from the SDK
        message: String,
    },

    /// Backing API is disabled for the project
    #[error("API not enabled: {message}")]
    ApiDisabled {
        /// Details from the SDK
        message: String,
    },

    /// Quota exhausted
    #[error("quota exceeded: {message}")]
    Quota {
        /// Details from the SDK
        message: String,
    },

    /// Network-related error
    #[error("network error: {message}")]
    Network {
        /// Details from the SDK
        message: String,
    },

    /// An SDK executable is missing from PATH
    #[error("{tool} not found. Install the Google Cloud SDK from https://cloud.google.com/sdk")]
    ToolNotFound {
        /// Executable name
        tool: String,
    },

    /// Invalid declaration or configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Command execution failed for an uncategorized reason
    #[error("command failed: {message}")]
    CommandFailed {
        /// Which command failed
        message: String,
        /// Standard error output from the failed command
        stderr: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::NotFound { .. } => ErrorCategory::NotFound,
            Error::AlreadyExists { .. } => ErrorCategory::AlreadyExists,
            Error::Permission { .. } => ErrorCategory::Permission,
            Error::ApiDisabled { .. } => ErrorCategory::ApiDisabled,
            Error::Quota { .. } => ErrorCategory::Quota,
            Error::Network { .. } => ErrorCategory::Network,
            Error::ToolNotFound { .. } => ErrorCategory::ToolNotFound,
            Error::Config(_) => ErrorCategory::Config,
            _ => ErrorCategory::Other,
        }
    }

    /// Whether this error means a delete had nothing to do.
    pub fn is_ignorable_on_delete(&self) -> bool {
        self.category().is_ignorable_on_delete()
    }

    /// Whether this error means a create had nothing to do.
    pub fn is_ignorable_on_create(&self) -> bool {
        self.category().is_ignorable_on_create()
    }

    /// Create an error from SDK command output.
    ///
    /// `gcloud`, `gsutil` and `bq` each phrase things differently, so this
    /// matches on the status codes and phrases all three use.
    pub fn from_sdk_output(output: &str, resource: &str) -> Self {
        let lower = output.to_lowercase();
        let message = output.trim().to_string();

        // SERVICE_DISABLED responses also carry PERMISSION_DENIED, check first
        if lower.contains("service_disabled")
            || lower.contains("has not been used in project")
            || lower.contains("api has not been enabled")
            || lower.contains("it is disabled")
        {
            return Error::ApiDisabled { message };
        }

        if lower.contains("already_exists")
            || lower.contains("already exists")
            || lower.contains("alreadyexists")
            || lower.contains("you already own this bucket")
        {
            return Error::AlreadyExists {
                name: resource.to_string(),
            };
        }

        if lower.contains("not_found")
            || lower.contains("not found")
            || lower.contains("notfound")
            || lower.contains("does not exist")
            || lower.contains("no urls matched")
        {
            return Error::NotFound {
                name: resource.to_string(),
            };
        }

        if lower.contains("permission_denied")
            || lower.contains("permission denied")
            || lower.contains("does not have permission")
            || lower.contains("accessdeniedexception")
            || lower.contains("403")
        {
            return Error::Permission { message };
        }

        if lower.contains("resource_exhausted") || lower.contains("quota") {
            return Error::Quota { message };
        }

        if lower.contains("could not resolve")
            || lower.contains("connection refused")
            || lower.contains("connection reset")
            || lower.contains("timed out")
            || lower.contains("network is unreachable")
            || lower.contains("ssl")
        {
            return Error::Network { message };
        }

        Error::CommandFailed {
            message: format!("operation on {resource} failed"),
            stderr: message,
        }
    }
}

/// Result type for provider operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_ignorable() {
        assert!(ErrorCategory::NotFound.is_ignorable_on_delete());
        assert!(!ErrorCategory::NotFound.is_ignorable_on_create());
        assert!(ErrorCategory::AlreadyExists.is_ignorable_on_create());
        assert!(!ErrorCategory::Permission.is_ignorable_on_delete());
    }

    #[test]
    fn test_from_sdk_output_not_found() {
        let err = Error::from_sdk_output(
            "ERROR: (gcloud.pubsub.topics.delete) NOT_FOUND: Resource not found (resource=report2bq-trigger).",
            "report2bq-trigger",
        );
        assert_eq!(err.category(), ErrorCategory::NotFound);
        assert!(err.is_ignorable_on_delete());
    }

    #[test]
    fn test_from_sdk_output_already_exists() {
        let err = Error::from_sdk_output(
            "ServiceException: 409 A Cloud Storage bucket named 'p-report2bq' already exists.",
            "p-report2bq",
        );
        assert_eq!(err.category(), ErrorCategory::AlreadyExists);
        assert!(err.is_ignorable_on_create());
    }

    #[test]
    fn test_from_sdk_output_api_disabled_wins_over_permission() {
        let err = Error::from_sdk_output(
            "PERMISSION_DENIED: Cloud Scheduler API has not been used in project 123 before or it is disabled. reason: SERVICE_DISABLED",
            "report2bq-job-monitor",
        );
        assert_eq!(err.category(), ErrorCategory::ApiDisabled);
    }

    #[test]
    fn test_from_sdk_output_permission() {
        let err = Error::from_sdk_output(
            "AccessDeniedException: 403 user@example.com does not have storage.buckets.create access",
            "bucket",
        );
        assert_eq!(err.category(), ErrorCategory::Permission);
    }

    #[test]
    fn test_from_sdk_output_quota_and_network() {
        assert_eq!(
            Error::from_sdk_output("RESOURCE_EXHAUSTED: Quota exceeded", "f").category(),
            ErrorCategory::Quota
        );
        assert_eq!(
            Error::from_sdk_output("Could not resolve host: oauth2.googleapis.com", "f").category(),
            ErrorCategory::Network
        );
    }

    #[test]
    fn test_from_sdk_output_unknown() {
        let err = Error::from_sdk_output("something odd happened", "report2bq-fetcher");
        assert_eq!(err.category(), ErrorCategory::Other);
        assert!(err.to_string().contains("report2bq-fetcher"));
    }
}

use clap::{ArgAction, Parser};
use clap_complete::Shell;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Parser, Debug)]
#[command(name = "report2bq-install")]
#[command(version)]
#[command(about = "Install Report2BQ into a Google Cloud project", long_about = None)]
#[command(after_help = "\
Exit status: 0 on success, 1 when a resource failed to converge (see the run \
journal), 2 on a usage error.")]
pub struct Cli {
    /// Show usage and exit
    #[arg(long, action = ArgAction::Help)]
    pub usage: Option<bool>,

    /// Google Cloud project id (domain-scoped ids such as
    /// `example.com:my-project` are not supported)
    #[arg(long, env = "GCP_PROJECT", required_unless_present = "completions")]
    pub project: Option<String>,

    /// Region for functions and scheduler jobs [default: us-central1]
    #[arg(long)]
    pub region: Option<String>,

    /// BigQuery dataset [default: report2bq]
    #[arg(long)]
    pub dataset: Option<String>,

    /// Print mutating commands instead of running them
    #[arg(long)]
    pub dry_run: bool,

    // ------------------------------------------------------------------
    // Deployment selectors
    // ------------------------------------------------------------------
    /// Deploy every component
    #[arg(long, help_heading = "Deployment")]
    pub deploy_all: bool,

    /// Deploy the report fetcher function
    #[arg(long, help_heading = "Deployment")]
    pub deploy_fetcher: bool,

    /// Deploy the report loader function
    #[arg(long, help_heading = "Deployment")]
    pub deploy_loader: bool,

    /// Deploy the job monitor function and its scheduler job
    #[arg(long, help_heading = "Deployment")]
    pub deploy_job_monitor: bool,

    /// Deploy the runner and run monitor functions and the run monitor job
    #[arg(long, help_heading = "Deployment")]
    pub deploy_runner: bool,

    /// Create the storage buckets
    #[arg(long, help_heading = "Deployment")]
    pub deploy_storage: bool,

    /// Create the BigQuery dataset
    #[arg(long, help_heading = "Deployment")]
    pub deploy_bigquery: bool,

    /// Create the Pub/Sub topics
    #[arg(long, help_heading = "Deployment")]
    pub deploy_trigger: bool,

    /// Deploy the OAuth HTTP functions
    #[arg(long, help_heading = "Deployment")]
    pub deploy_oauth: bool,

    /// Deploy the job manager functions
    #[arg(long, help_heading = "Deployment")]
    pub deploy_job_manager: bool,

    /// Deploy the postprocessor function
    #[arg(long, help_heading = "Deployment")]
    pub deploy_postprocessor: bool,

    /// Deploy the SA360 report manager function
    #[arg(long, help_heading = "Deployment")]
    pub deploy_sa360_manager: bool,

    /// Deploy the GA360 report manager function
    #[arg(long, help_heading = "Deployment")]
    pub deploy_ga360_manager: bool,

    // ------------------------------------------------------------------
    // Provisioning
    // ------------------------------------------------------------------
    /// Create the report2bq service account
    #[arg(long, help_heading = "Provisioning")]
    pub create_service_account: bool,

    /// Run functions as this service account
    #[arg(long, value_name = "EMAIL", help_heading = "Provisioning")]
    pub service_account: Option<String>,

    /// Enable the Google APIs Report2BQ needs
    #[arg(long, help_heading = "Provisioning")]
    pub activate_apis: bool,

    /// Store the API key in the tokens bucket
    #[arg(long, requires = "api_key", help_heading = "Provisioning")]
    pub store_api_key: bool,

    /// API key passed to the functions
    #[arg(long, value_name = "KEY", help_heading = "Provisioning")]
    pub api_key: Option<String>,

    /// Store the OAuth client in the tokens bucket and Secret Manager
    #[arg(
        long,
        requires_all = ["client_id", "client_secret"],
        help_heading = "Provisioning"
    )]
    pub store_client: bool,

    /// OAuth client id
    #[arg(long, value_name = "ID", help_heading = "Provisioning")]
    pub client_id: Option<String>,

    /// OAuth client secret
    #[arg(long, value_name = "SECRET", help_heading = "Provisioning")]
    pub client_secret: Option<String>,

    /// Administrator email passed to the functions
    #[arg(long, value_name = "EMAIL", help_heading = "Provisioning")]
    pub administrator: Option<String>,

    /// Do not activate the Ads Data Hub API
    #[arg(long, help_heading = "Products")]
    pub no_adh: bool,

    /// Do not activate the Campaign Manager API
    #[arg(long, help_heading = "Products")]
    pub no_cm: bool,

    /// Do not activate the DV360 API
    #[arg(long, help_heading = "Products")]
    pub no_dv360: bool,

    /// Do not activate the GA360 API
    #[arg(long, help_heading = "Products")]
    pub no_ga360: bool,

    /// Do not activate the SA360 API
    #[arg(long, help_heading = "Products")]
    pub no_sa360: bool,

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------
    /// Deploy functions concurrently, each logging to its own file
    #[arg(long, help_heading = "Execution")]
    pub background: bool,

    /// Number of concurrent background deployments
    #[arg(short, long, default_value = "4", help_heading = "Execution")]
    pub jobs: usize,

    /// Directory for background deployment logs
    #[arg(long, value_name = "DIR", default_value = "./logs", help_heading = "Execution")]
    pub log_dir: String,

    /// Directory holding the Report2BQ Python application
    #[arg(long, value_name = "DIR", default_value = ".", help_heading = "Execution")]
    pub source_dir: String,

    /// Delete existing functions, topics and jobs matching the plan first
    #[arg(long, help_heading = "Execution")]
    pub cleanup: bool,

    /// Only apply matching resources: "kind" or "kind.name"
    #[arg(long, value_name = "TARGET", help_heading = "Execution")]
    pub target: Option<String>,

    /// Configuration file [default: <config dir>/config.toml]
    #[arg(long, value_name = "FILE", help_heading = "Execution")]
    pub config: Option<PathBuf>,

    /// Verbosity level
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate shell completions and exit
    #[arg(long, value_enum, value_name = "SHELL")]
    pub completions: Option<Shell>,
}

/// A problem with how the installer was invoked
///
/// Reported with exit status 2, unlike resource failures.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct UsageError(pub String);

impl UsageError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

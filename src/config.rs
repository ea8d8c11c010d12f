//! Configuration file and resolved run settings
//!
//! The optional TOML file supplies defaults; command-line flags always win.
//!
//! ```toml
//! region = "europe-west1"
//! dataset = "report2bq_eu"
//!
//! [functions]
//! runtime = "python310"
//! memory = "2048MB"
//! timeout = "540s"
//!
//! [schedules]
//! job_monitor = "*/5 * * * *"
//! run_monitor = "*/10 * * * *"
//! time_zone = "Europe/London"
//! ```

use anyhow::{Context, Result, bail};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::cli::Cli;
use crate::package;
use crate::paths;
use crate::products::{Product, ProductSet};

pub const DEFAULT_REGION: &str = "us-central1";
pub const DEFAULT_DATASET: &str = "report2bq";
pub const DEFAULT_RUNTIME: &str = "python310";
pub const DEFAULT_JOB_MONITOR_SCHEDULE: &str = "*/5 * * * *";
pub const DEFAULT_RUN_MONITOR_SCHEDULE: &str = "*/10 * * * *";

static PROJECT_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z][a-z0-9-]{4,28}[a-z0-9]$").expect("Invalid project id regex")
});

static DATASET_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]{1,1024}$").expect("Invalid dataset regex"));

// ============================================================================
// File Config
// ============================================================================

/// Contents of `config.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub dataset: Option<String>,
    /// Location for buckets and the dataset, e.g. "US" or "EU"
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub functions: FunctionDefaults,
    #[serde(default)]
    pub schedules: ScheduleDefaults,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FunctionDefaults {
    #[serde(default)]
    pub runtime: Option<String>,
    #[serde(default)]
    pub memory: Option<String>,
    #[serde(default)]
    pub timeout: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleDefaults {
    #[serde(default)]
    pub job_monitor: Option<String>,
    #[serde(default)]
    pub run_monitor: Option<String>,
    #[serde(default)]
    pub time_zone: Option<String>,
}

impl FileConfig {
    /// Load the configuration file
    ///
    /// An explicitly named file must exist. The default file is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(p) => paths::expand(&p.to_string_lossy()),
            None => {
                let default = paths::config_file()?;
                if !default.exists() {
                    log::debug!("No config file at {}, using defaults", default.display());
                    return Ok(Self::default());
                }
                default
            }
        };
        Self::load_from(&path)
    }

    /// Parse a configuration file at `path`
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read config file {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }
}

// ============================================================================
// Resolved Settings
// ============================================================================

/// OAuth client credentials stored by `--store-client`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: String,
}

/// Everything one run needs, with flags applied over the config file
#[derive(Debug, Clone)]
pub struct Settings {
    pub project: String,
    pub region: String,
    pub dataset: String,
    pub location: Option<String>,
    pub runtime: String,
    pub memory: Option<String>,
    pub timeout: Option<String>,
    pub job_monitor_schedule: String,
    pub run_monitor_schedule: String,
    pub time_zone: Option<String>,
    pub dry_run: bool,
    pub service_account: Option<String>,
    pub administrator: Option<String>,
    pub api_key: Option<String>,
    pub client: Option<OAuthClient>,
    /// Products whose API must not be activated
    pub disabled_products: ProductSet,
    pub background: bool,
    pub jobs: usize,
    pub log_dir: PathBuf,
    pub source_dir: PathBuf,
    /// Where the function source archive is written before upload
    pub archive_path: PathBuf,
    pub cleanup: bool,
    pub target: Option<String>,
    pub verbose: bool,
}

impl Settings {
    /// Merge flags over the config file and validate the result
    pub fn resolve(cli: &Cli, file: FileConfig) -> Result<Self> {
        let project = cli
            .project
            .clone()
            .context("--project is required")?;
        validate_project(&project)?;

        let dataset = cli
            .dataset
            .clone()
            .or(file.dataset)
            .unwrap_or_else(|| DEFAULT_DATASET.to_string());
        if !DATASET_ID.is_match(&dataset) {
            bail!("Invalid dataset name '{dataset}': use letters, digits and underscores");
        }

        let client = match (&cli.client_id, &cli.client_secret) {
            (Some(id), Some(secret)) => Some(OAuthClient {
                client_id: id.clone(),
                client_secret: secret.clone(),
            }),
            _ => None,
        };

        let mut disabled_products = ProductSet::new();
        for (flag, product) in [
            (cli.no_adh, Product::Adh),
            (cli.no_cm, Product::Cm),
            (cli.no_dv360, Product::Dv360),
            (cli.no_ga360, Product::Ga360),
            (cli.no_sa360, Product::Sa360),
        ] {
            if flag {
                disabled_products.insert(product);
            }
        }

        Ok(Self {
            project,
            region: cli
                .region
                .clone()
                .or(file.region)
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            dataset,
            location: file.location,
            runtime: file
                .functions
                .runtime
                .unwrap_or_else(|| DEFAULT_RUNTIME.to_string()),
            memory: file.functions.memory,
            timeout: file.functions.timeout,
            job_monitor_schedule: file
                .schedules
                .job_monitor
                .unwrap_or_else(|| DEFAULT_JOB_MONITOR_SCHEDULE.to_string()),
            run_monitor_schedule: file
                .schedules
                .run_monitor
                .unwrap_or_else(|| DEFAULT_RUN_MONITOR_SCHEDULE.to_string()),
            time_zone: file.schedules.time_zone,
            dry_run: cli.dry_run,
            service_account: cli.service_account.clone(),
            administrator: cli.administrator.clone(),
            api_key: cli.api_key.clone(),
            client,
            disabled_products,
            background: cli.background,
            jobs: cli.jobs.max(1),
            log_dir: paths::expand(&cli.log_dir),
            source_dir: paths::expand(&cli.source_dir),
            archive_path: PathBuf::from(package::ARCHIVE_NAME),
            cleanup: cli.cleanup,
            target: cli.target.clone(),
            verbose: cli.verbose > 0,
        })
    }

    /// Default service account email for this project
    pub fn default_service_account(&self) -> String {
        format!("report2bq@{}.iam.gserviceaccount.com", self.project)
    }

    /// Name of a project bucket, `<project>-report2bq[-suffix]`
    pub fn bucket(&self, suffix: Option<&str>) -> String {
        match suffix {
            Some(s) => format!("{}-report2bq-{s}", self.project),
            None => format!("{}-report2bq", self.project),
        }
    }

    /// The tokens bucket holding the side-channel objects
    pub fn tokens_bucket(&self) -> String {
        self.bucket(Some("tokens"))
    }
}

/// Check a Google Cloud project id
pub fn validate_project(project: &str) -> Result<()> {
    if !PROJECT_ID.is_match(project) {
        if project.contains(':') {
            bail!(
                "Domain-scoped project id '{project}' is not supported: its bucket names \
                 would not be valid"
            );
        }
        bail!(
            "Invalid project id '{project}': 6-30 characters, lowercase letters, digits \
             and hyphens, starting with a letter"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{CommandFactory, Parser};
    use tempfile::TempDir;

    fn cli(args: &[&str]) -> Cli {
        let mut all = vec!["report2bq-install"];
        all.extend_from_slice(args);
        Cli::try_parse_from(all).unwrap()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::resolve(&cli(&["--project=acme-data"]), FileConfig::default())
            .unwrap();
        assert_eq!(settings.region, DEFAULT_REGION);
        assert_eq!(settings.dataset, DEFAULT_DATASET);
        assert_eq!(settings.runtime, DEFAULT_RUNTIME);
        assert_eq!(settings.job_monitor_schedule, "*/5 * * * *");
        assert_eq!(settings.tokens_bucket(), "acme-data-report2bq-tokens");
        assert_eq!(
            settings.default_service_account(),
            "report2bq@acme-data.iam.gserviceaccount.com"
        );
    }

    #[test]
    fn test_flags_win_over_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            r#"
region = "europe-west1"
dataset = "from_file"

[functions]
memory = "2048MB"

[schedules]
run_monitor = "*/15 * * * *"
"#,
        )
        .unwrap();

        let file = FileConfig::load(Some(&path)).unwrap();
        let settings =
            Settings::resolve(&cli(&["--project=acme-data", "--dataset=from_flag"]), file).unwrap();

        assert_eq!(settings.region, "europe-west1");
        assert_eq!(settings.dataset, "from_flag");
        assert_eq!(settings.memory.as_deref(), Some("2048MB"));
        assert_eq!(settings.run_monitor_schedule, "*/15 * * * *");
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "regoin = \"typo\"\n").unwrap();
        assert!(FileConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let temp = TempDir::new().unwrap();
        assert!(FileConfig::load(Some(&temp.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_project_validation() {
        assert!(validate_project("acme-data").is_ok());
        assert!(validate_project("Acme").is_err());
        assert!(validate_project("acme_data").is_err());
        assert!(validate_project("ab").is_err());
        assert!(validate_project("acme-").is_err());
    }

    #[test]
    fn test_domain_scoped_project_is_rejected_with_reason() {
        let err = validate_project("example.com:my-project").unwrap_err();
        assert!(err.to_string().contains("Domain-scoped"));

        let help = Cli::command().render_long_help().to_string();
        assert!(help.contains("domain-scoped"));
    }

    #[test]
    fn test_product_toggles() {
        let settings = Settings::resolve(
            &cli(&["--project=acme-data", "--no-ga360", "--no-adh"]),
            FileConfig::default(),
        )
        .unwrap();
        assert!(settings.disabled_products.contains(&Product::Ga360));
        assert!(settings.disabled_products.contains(&Product::Adh));
        assert!(!settings.disabled_products.contains(&Product::Cm));
    }
}

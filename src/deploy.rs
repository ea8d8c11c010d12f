//! Deployment catalogue: which cloud resources each selector flag declares
//!
//! Every selector adds declarations to a [`Catalogue`]. The catalogue drops
//! duplicates and hands the declarations back in deployment order: APIs,
//! service account, buckets, dataset, secrets, objects (side channel values,
//! then the source archive), topics, functions and finally scheduler jobs.

use anyhow::Result;
use gcloudkit::{ResourceDeclaration, ResourceKind};
use std::collections::HashSet;
use std::path::Path;

use crate::cli::Cli;
use crate::config::Settings;
use crate::environment::FunctionEnv;
use crate::package::ARCHIVE_NAME;
use crate::products::apis_to_activate;

/// Buckets created by `--deploy-storage`, as suffixes of `<project>-report2bq`
pub const BUCKET_SUFFIXES: [Option<&str>; 6] = [
    None,
    Some("upload"),
    Some("tokens"),
    Some("postprocessor"),
    Some("sa360-manager"),
    Some("ga360-manager"),
];

/// Topics created by `--deploy-trigger`
pub const TOPICS: [&str; 7] = [
    "report2bq-trigger",
    "report2bq-fetcher",
    "report2bq-runner",
    "report2bq-job-monitor",
    "report2bq-run-monitor",
    "report2bq-postprocessor",
    "report2bq-job-manager",
];

pub const CLIENT_SECRET_NAME: &str = "report2bq-client-secrets";

/// What starts a function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// A Pub/Sub topic
    Topic(&'static str),
    /// Object finalize on a project bucket, given by suffix
    Bucket(&'static str),
    /// Unauthenticated HTTP
    Http,
}

/// A Cloud Function Report2BQ deploys
#[derive(Debug, Clone, Copy)]
pub struct FunctionSpec {
    pub name: &'static str,
    pub entry_point: &'static str,
    pub trigger: Trigger,
}

const fn function(name: &'static str, entry_point: &'static str, trigger: Trigger) -> FunctionSpec {
    FunctionSpec {
        name,
        entry_point,
        trigger,
    }
}

pub const FETCHER: FunctionSpec = function(
    "report2bq-fetcher",
    "report_fetch",
    Trigger::Topic("report2bq-fetcher"),
);
pub const LOADER: FunctionSpec = function("report2bq-loader", "report_upload", Trigger::Bucket("upload"));
pub const JOB_MONITOR: FunctionSpec = function(
    "report2bq-job-monitor",
    "job_monitor",
    Trigger::Topic("report2bq-job-monitor"),
);
pub const RUNNER: FunctionSpec = function(
    "report2bq-runner",
    "report_runner",
    Trigger::Topic("report2bq-runner"),
);
pub const RUN_MONITOR: FunctionSpec = function(
    "report2bq-run-monitor",
    "run_monitor",
    Trigger::Topic("report2bq-run-monitor"),
);
pub const POSTPROCESSOR: FunctionSpec = function(
    "report2bq-postprocessor",
    "post_processor",
    Trigger::Topic("report2bq-postprocessor"),
);
pub const OAUTH_START: FunctionSpec = function("report2bq-oauth-start", "oauth_request", Trigger::Http);
pub const OAUTH_COMPLETE: FunctionSpec =
    function("report2bq-oauth-complete", "oauth_complete", Trigger::Http);
pub const JOB_MANAGER: FunctionSpec = function(
    "report2bq-job-manager",
    "job_manager",
    Trigger::Topic("report2bq-job-manager"),
);
pub const JOB_MANAGER_HTTP: FunctionSpec =
    function("report2bq-job-manager-http", "job_manager_http", Trigger::Http);
pub const SA360_MANAGER: FunctionSpec = function(
    "report2bq-sa360-manager",
    "sa360_report_manager",
    Trigger::Bucket("sa360-manager"),
);
pub const GA360_MANAGER: FunctionSpec = function(
    "report2bq-ga360-manager",
    "report_manager",
    Trigger::Bucket("ga360-manager"),
);

// ============================================================================
// Selection
// ============================================================================

/// The selector flags of one run, with `--deploy-all` expanded
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub activate_apis: bool,
    pub create_service_account: bool,
    pub storage: bool,
    pub bigquery: bool,
    pub trigger: bool,
    pub fetcher: bool,
    pub loader: bool,
    pub job_monitor: bool,
    pub runner: bool,
    pub postprocessor: bool,
    pub oauth: bool,
    pub job_manager: bool,
    pub sa360_manager: bool,
    pub ga360_manager: bool,
    pub store_api_key: bool,
    pub store_client: bool,
}

impl Selection {
    pub fn from_cli(cli: &Cli) -> Self {
        let all = cli.deploy_all;
        Self {
            activate_apis: cli.activate_apis,
            create_service_account: cli.create_service_account,
            storage: all || cli.deploy_storage,
            bigquery: all || cli.deploy_bigquery,
            trigger: all || cli.deploy_trigger,
            fetcher: all || cli.deploy_fetcher,
            loader: all || cli.deploy_loader,
            job_monitor: all || cli.deploy_job_monitor,
            runner: all || cli.deploy_runner,
            postprocessor: all || cli.deploy_postprocessor,
            oauth: all || cli.deploy_oauth,
            job_manager: all || cli.deploy_job_manager,
            sa360_manager: all || cli.deploy_sa360_manager,
            ga360_manager: all || cli.deploy_ga360_manager,
            store_api_key: cli.store_api_key,
            store_client: cli.store_client,
        }
    }

    /// Functions selected, in deployment order
    pub fn functions(&self) -> Vec<FunctionSpec> {
        let groups: [(bool, &[FunctionSpec]); 9] = [
            (self.fetcher, &[FETCHER]),
            (self.loader, &[LOADER]),
            (self.job_monitor, &[JOB_MONITOR]),
            (self.runner, &[RUNNER, RUN_MONITOR]),
            (self.postprocessor, &[POSTPROCESSOR]),
            (self.oauth, &[OAUTH_START, OAUTH_COMPLETE]),
            (self.job_manager, &[JOB_MANAGER, JOB_MANAGER_HTTP]),
            (self.sa360_manager, &[SA360_MANAGER]),
            (self.ga360_manager, &[GA360_MANAGER]),
        ];
        groups
            .into_iter()
            .filter(|(selected, _)| *selected)
            .flat_map(|(_, specs)| specs.iter().copied())
            .collect()
    }

    /// Whether any function will be deployed
    pub fn deploys_functions(&self) -> bool {
        !self.functions().is_empty()
    }

    /// Whether nothing at all was selected
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// ============================================================================
// Catalogue
// ============================================================================

/// Inputs needed only when functions are deployed
#[derive(Debug, Clone, Copy)]
pub struct FunctionInputs<'a> {
    pub env: &'a FunctionEnv,
    /// Local path of the packaged source archive
    pub archive: &'a Path,
}

/// Ordered, de-duplicated declarations for one run
#[derive(Debug, Default)]
pub struct Catalogue {
    declarations: Vec<ResourceDeclaration>,
    seen: HashSet<(ResourceKind, String)>,
}

impl Catalogue {
    /// Build the catalogue for a selection
    pub fn build(
        settings: &Settings,
        selection: &Selection,
        functions: Option<FunctionInputs<'_>>,
    ) -> Result<Self> {
        let mut catalogue = Self::default();

        if selection.activate_apis {
            for api in apis_to_activate(&settings.disabled_products) {
                catalogue.push(ResourceDeclaration::service(api));
            }
        }

        if selection.create_service_account {
            let email = settings.default_service_account();
            catalogue.push(
                ResourceDeclaration::service_account(email.clone())
                    .with("display_name", "Report2BQ"),
            );
            catalogue.push(
                ResourceDeclaration::object(format!(
                    "gs://{}/service_account",
                    settings.tokens_bucket()
                ))
                .with("content", email),
            );
        }

        if selection.storage {
            for suffix in BUCKET_SUFFIXES {
                let mut bucket = ResourceDeclaration::bucket(settings.bucket(suffix));
                if let Some(location) = &settings.location {
                    bucket = bucket.with("location", location.as_str());
                }
                catalogue.push(bucket);
            }
        }

        if selection.bigquery {
            let mut dataset = ResourceDeclaration::dataset(settings.dataset.as_str());
            if let Some(location) = &settings.location {
                dataset = dataset.with("location", location.as_str());
            }
            catalogue.push(dataset);
        }

        if selection.store_api_key {
            let key = settings
                .api_key
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("--store-api-key needs --api-key"))?;
            catalogue.push(
                ResourceDeclaration::object(format!("gs://{}/api.key", settings.tokens_bucket()))
                    .with("content", key),
            );
        }

        if selection.store_client {
            let client = settings.client.as_ref().ok_or_else(|| {
                anyhow::anyhow!("--store-client needs --client-id and --client-secret")
            })?;
            let secrets = client_secrets_json(&client.client_id, &client.client_secret)?;
            catalogue.push(
                ResourceDeclaration::object(format!(
                    "gs://{}/client_secrets.json",
                    settings.tokens_bucket()
                ))
                .with("content", secrets.as_str()),
            );
            catalogue.push(ResourceDeclaration::secret(CLIENT_SECRET_NAME).with("data", secrets));
        }

        if selection.trigger {
            for topic in TOPICS {
                catalogue.push(ResourceDeclaration::topic(topic));
            }
        }

        let specs = selection.functions();
        if !specs.is_empty() {
            let inputs = functions.ok_or_else(|| {
                anyhow::anyhow!("function deployment needs an environment and a source archive")
            })?;
            let source_url = format!("gs://{}/{ARCHIVE_NAME}", settings.bucket(None));
            catalogue.push(
                ResourceDeclaration::object(source_url.as_str())
                    .with("source", inputs.archive.to_string_lossy()),
            );

            if selection.job_monitor {
                catalogue.push(ResourceDeclaration::topic(JOB_MONITOR.name));
            }

            for spec in &specs {
                catalogue.push(function_declaration(
                    settings,
                    selection,
                    spec,
                    &source_url,
                    inputs.env,
                ));
            }

            if selection.job_monitor {
                catalogue.push(scheduler_job(
                    settings,
                    JOB_MONITOR.name,
                    &settings.job_monitor_schedule,
                ));
            }
            if selection.runner {
                catalogue.push(scheduler_job(
                    settings,
                    RUN_MONITOR.name,
                    &settings.run_monitor_schedule,
                ));
            }
        }

        catalogue.sort();
        Ok(catalogue)
    }

    /// Add a declaration unless one with the same kind and name exists
    pub fn push(&mut self, declaration: ResourceDeclaration) -> bool {
        if !self.seen.insert((declaration.kind, declaration.name.clone())) {
            log::debug!("{} declared twice, keeping the first", declaration.id());
            return false;
        }
        self.declarations.push(declaration);
        true
    }

    /// Stable sort into deployment order
    fn sort(&mut self) {
        self.declarations.sort_by_key(|d| kind_rank(d.kind));
    }

    pub fn into_declarations(self) -> Vec<ResourceDeclaration> {
        self.declarations
    }
}

fn kind_rank(kind: ResourceKind) -> usize {
    ResourceKind::ALL
        .iter()
        .position(|k| *k == kind)
        .unwrap_or(ResourceKind::ALL.len())
}

fn function_declaration(
    settings: &Settings,
    selection: &Selection,
    spec: &FunctionSpec,
    source_url: &str,
    env: &FunctionEnv,
) -> ResourceDeclaration {
    let mut decl = ResourceDeclaration::function(spec.name, spec.entry_point)
        .with("runtime", settings.runtime.as_str())
        .with("source", source_url)
        .with("env", env.to_flag_value());

    decl = match spec.trigger {
        Trigger::Topic(topic) => decl.with("trigger_topic", topic),
        Trigger::Bucket(suffix) => decl.with("trigger_bucket", settings.bucket(Some(suffix))),
        Trigger::Http => decl.with("trigger_http", "true"),
    };

    if let Some(memory) = &settings.memory {
        decl = decl.with("memory", memory.as_str());
    }
    if let Some(timeout) = &settings.timeout {
        decl = decl.with("timeout", timeout.as_str());
    }

    let account = settings.service_account.clone().or_else(|| {
        selection
            .create_service_account
            .then(|| settings.default_service_account())
    });
    if let Some(account) = account {
        decl = decl.with("service_account", account);
    }

    decl
}

fn scheduler_job(settings: &Settings, name: &str, schedule: &str) -> ResourceDeclaration {
    let job = ResourceDeclaration::scheduler_job(name, schedule, name, "RUN");
    match &settings.time_zone {
        Some(tz) => job.with("time_zone", tz.as_str()),
        None => job,
    }
}

/// The OAuth client file the functions read from the tokens bucket
fn client_secrets_json(client_id: &str, client_secret: &str) -> Result<String> {
    let value = serde_json::json!({
        "web": {
            "client_id": client_id,
            "client_secret": client_secret,
            "auth_uri": "https://accounts.google.com/o/oauth2/auth",
            "token_uri": "https://oauth2.googleapis.com/token",
        }
    });
    Ok(serde_json::to_string_pretty(&value)?)
}

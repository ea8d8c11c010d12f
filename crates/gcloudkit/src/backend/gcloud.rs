//! Google Cloud SDK backend using `gcloud`, `gsutil` and `bq` commands.

use crate::backend::{Provider, short_name};
use crate::command::{CommandOutput, CommandRunner, Invocation};
use crate::error::{Error, Result};
use crate::types::{ObservedState, ResourceDeclaration, ResourceKind};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Backend that shells out to the Google Cloud SDK.
pub struct GcloudProvider {
    project: String,
    region: String,
    runner: Arc<dyn CommandRunner>,
    dry_run: bool,
}

impl GcloudProvider {
    /// Create a provider for `project` in `region`.
    pub fn new(
        project: impl Into<String>,
        region: impl Into<String>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            project: project.into(),
            region: region.into(),
            runner,
            dry_run: false,
        }
    }

    /// Print mutating commands instead of running them.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Region used for functions and scheduler jobs.
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Run a read-only command; always executed, even in dry-run.
    fn query(&self, invocation: &Invocation) -> Result<CommandOutput> {
        self.runner.run(invocation)
    }

    /// Run a mutating command, or preview it in dry-run mode.
    fn execute(&self, invocation: &Invocation, resource: &str) -> Result<()> {
        if self.dry_run {
            log::info!("dry-run: {invocation}");
            println!("echo {invocation}");
            return Ok(());
        }

        log::info!("{invocation}");
        let output = self.runner.run(invocation)?;
        if output.success {
            Ok(())
        } else {
            Err(Error::from_sdk_output(&output.diagnostics(), resource))
        }
    }

    /// Run a read command that must succeed and return its stdout.
    fn query_checked(&self, invocation: &Invocation, resource: &str) -> Result<String> {
        let output = self.query(invocation)?;
        if output.success {
            Ok(output.stdout)
        } else {
            Err(Error::from_sdk_output(&output.diagnostics(), resource))
        }
    }

    fn project_flag(&self) -> String {
        format!("--project={}", self.project)
    }

    fn region_flag(&self, flag: &str) -> String {
        format!("--{flag}={}", self.region)
    }

    fn dataset_ref(&self, name: &str) -> String {
        format!("{}:{}", self.project, name)
    }

    fn bq(&self, args: &[&str]) -> Vec<String> {
        let mut all = vec![format!("--project_id={}", self.project)];
        all.extend(args.iter().map(|a| (*a).to_string()));
        all
    }

    fn describe_invocation(&self, kind: ResourceKind, name: &str) -> Result<Invocation> {
        let inv = match kind {
            ResourceKind::Topic => Invocation::read(
                "gcloud",
                ["pubsub", "topics", "describe", name, "--format=json"],
            )
            .arg(self.project_flag()),
            ResourceKind::SchedulerJob => Invocation::read(
                "gcloud",
                ["scheduler", "jobs", "describe", name, "--format=json"],
            )
            .arg(self.project_flag())
            .arg(self.region_flag("location")),
            ResourceKind::Function => Invocation::read(
                "gcloud",
                ["functions", "describe", name, "--format=json"],
            )
            .arg(self.project_flag())
            .arg(self.region_flag("region")),
            ResourceKind::Secret => Invocation::read(
                "gcloud",
                ["secrets", "describe", name, "--format=json"],
            )
            .arg(self.project_flag()),
            ResourceKind::ServiceAccount => Invocation::read(
                "gcloud",
                ["iam", "service-accounts", "describe", name, "--format=json"],
            )
            .arg(self.project_flag()),
            ResourceKind::Bucket => {
                Invocation::read("gsutil", ["ls", "-b", format!("gs://{name}").as_str()])
            }
            ResourceKind::Object => Invocation::read("gsutil", ["ls", name]),
            ResourceKind::Dataset => Invocation::read(
                "bq",
                self.bq(&["show", "--format=json", self.dataset_ref(name).as_str()]),
            ),
            ResourceKind::Service => {
                return Err(Error::Config(
                    "services are described through the enabled list".to_string(),
                ));
            }
        };
        Ok(inv)
    }

    fn create_invocation(&self, decl: &ResourceDeclaration) -> Result<Invocation> {
        let name = decl.name.as_str();
        let inv = match decl.kind {
            ResourceKind::Topic => {
                Invocation::mutate("gcloud", ["pubsub", "topics", "create", name])
                    .arg(self.project_flag())
            }
            ResourceKind::SchedulerJob => {
                let mut inv =
                    Invocation::mutate("gcloud", ["scheduler", "jobs", "create", "pubsub", name])
                        .arg(self.project_flag())
                        .arg(self.region_flag("location"))
                        .arg(format!("--schedule={}", decl.require("schedule")?))
                        .arg(format!("--topic={}", decl.require("topic")?))
                        .arg(format!(
                            "--message-body={}",
                            decl.get("message_body").unwrap_or("RUN")
                        ));
                if let Some(tz) = decl.get("time_zone") {
                    inv = inv.arg(format!("--time-zone={tz}"));
                }
                inv
            }
            ResourceKind::Function => self.deploy_invocation(decl)?,
            ResourceKind::Bucket => {
                let mut inv = Invocation::mutate("gsutil", ["mb", "-p", self.project.as_str()]);
                if let Some(location) = decl.get("location") {
                    inv = inv.arg("-l").arg(location);
                }
                inv.arg(format!("gs://{name}"))
            }
            ResourceKind::Dataset => {
                let mut args = vec!["mk".to_string(), "--dataset".to_string()];
                if let Some(location) = decl.get("location") {
                    args.push(format!("--location={location}"));
                }
                args.push(self.dataset_ref(name));
                let args: Vec<&str> = args.iter().map(String::as_str).collect();
                Invocation::mutate("bq", self.bq(&args))
            }
            ResourceKind::Secret => {
                let inv = Invocation::mutate("gcloud", ["secrets", "create", name])
                    .arg(self.project_flag())
                    .arg("--replication-policy=automatic");
                match decl.get("data") {
                    Some(data) => inv.arg("--data-file=-").with_stdin(data),
                    None => inv,
                }
            }
            ResourceKind::ServiceAccount => {
                let account_id = name.split('@').next().unwrap_or(name);
                Invocation::mutate("gcloud", ["iam", "service-accounts", "create", account_id])
                    .arg(self.project_flag())
                    .arg(format!(
                        "--display-name={}",
                        decl.get("display_name").unwrap_or(account_id)
                    ))
            }
            ResourceKind::Service => {
                Invocation::mutate("gcloud", ["services", "enable", name]).arg(self.project_flag())
            }
            ResourceKind::Object => match (decl.get("source"), decl.get("content")) {
                (Some(source), _) => Invocation::mutate("gsutil", ["cp", source, name]),
                (None, Some(content)) => {
                    Invocation::mutate("gsutil", ["cp", "-", name]).with_stdin(content)
                }
                (None, None) => {
                    return Err(Error::Config(format!(
                        "object {name} needs either 'source' or 'content'"
                    )));
                }
            },
        };
        Ok(inv)
    }

    fn deploy_invocation(&self, decl: &ResourceDeclaration) -> Result<Invocation> {
        let mut inv = Invocation::mutate("gcloud", ["functions", "deploy", decl.name.as_str()])
            .arg(self.project_flag())
            .arg(self.region_flag("region"))
            .arg(format!("--entry-point={}", decl.require("entry_point")?))
            .arg(format!("--runtime={}", decl.get("runtime").unwrap_or("python310")))
            .arg(format!("--source={}", decl.require("source")?));

        if let Some(memory) = decl.get("memory") {
            inv = inv.arg(format!("--memory={memory}"));
        }
        if let Some(timeout) = decl.get("timeout") {
            inv = inv.arg(format!("--timeout={timeout}"));
        }

        match (
            decl.get("trigger_topic"),
            decl.get("trigger_bucket"),
            decl.get("trigger_http"),
        ) {
            (Some(topic), _, _) => inv = inv.arg(format!("--trigger-topic={topic}")),
            (None, Some(bucket), _) => {
                inv = inv
                    .arg(format!("--trigger-resource={bucket}"))
                    .arg("--trigger-event=google.storage.object.finalize");
            }
            (None, None, Some(_)) => inv = inv.arg("--trigger-http").arg("--allow-unauthenticated"),
            (None, None, None) => {
                return Err(Error::Config(format!(
                    "function {} has no trigger",
                    decl.name
                )));
            }
        }

        if let Some(account) = decl.get("service_account") {
            inv = inv.arg(format!("--service-account={account}"));
        }
        if let Some(env) = decl.get("env").filter(|e| !e.is_empty()) {
            inv = inv.arg(format!("--set-env-vars={env}"));
        }

        Ok(inv.arg("--quiet"))
    }

    fn delete_invocation(&self, kind: ResourceKind, name: &str) -> Invocation {
        match kind {
            ResourceKind::Topic => {
                Invocation::mutate("gcloud", ["pubsub", "topics", "delete", name, "--quiet"])
                    .arg(self.project_flag())
            }
            ResourceKind::SchedulerJob => {
                Invocation::mutate("gcloud", ["scheduler", "jobs", "delete", name, "--quiet"])
                    .arg(self.project_flag())
                    .arg(self.region_flag("location"))
            }
            ResourceKind::Function => {
                Invocation::mutate("gcloud", ["functions", "delete", name, "--quiet"])
                    .arg(self.project_flag())
                    .arg(self.region_flag("region"))
            }
            ResourceKind::Secret => {
                Invocation::mutate("gcloud", ["secrets", "delete", name, "--quiet"])
                    .arg(self.project_flag())
            }
            ResourceKind::ServiceAccount => Invocation::mutate(
                "gcloud",
                ["iam", "service-accounts", "delete", name, "--quiet"],
            )
            .arg(self.project_flag()),
            ResourceKind::Service => {
                Invocation::mutate("gcloud", ["services", "disable", name]).arg(self.project_flag())
            }
            ResourceKind::Bucket => Invocation::mutate("gsutil", ["rb", format!("gs://{name}").as_str()]),
            ResourceKind::Object => Invocation::mutate("gsutil", ["rm", name]),
            ResourceKind::Dataset => Invocation::mutate(
                "bq",
                self.bq(&["rm", "-r", "-f", "-d", self.dataset_ref(name).as_str()]),
            ),
        }
    }

    fn list_invocation(&self, kind: ResourceKind) -> Result<Invocation> {
        let inv = match kind {
            ResourceKind::Topic => Invocation::read(
                "gcloud",
                ["pubsub", "topics", "list", "--format=value(name)"],
            )
            .arg(self.project_flag()),
            ResourceKind::SchedulerJob => Invocation::read(
                "gcloud",
                ["scheduler", "jobs", "list", "--format=value(name)"],
            )
            .arg(self.project_flag())
            .arg(self.region_flag("location")),
            ResourceKind::Function => Invocation::read(
                "gcloud",
                ["functions", "list", "--format=value(name)"],
            )
            .arg(self.project_flag()),
            ResourceKind::Secret => {
                Invocation::read("gcloud", ["secrets", "list", "--format=value(name)"])
                    .arg(self.project_flag())
            }
            ResourceKind::ServiceAccount => Invocation::read(
                "gcloud",
                ["iam", "service-accounts", "list", "--format=value(email)"],
            )
            .arg(self.project_flag()),
            ResourceKind::Service => Invocation::read(
                "gcloud",
                ["services", "list", "--enabled", "--format=value(config.name)"],
            )
            .arg(self.project_flag()),
            ResourceKind::Bucket => Invocation::read("gsutil", ["ls", "-p", self.project.as_str()]),
            ResourceKind::Dataset => Invocation::read("bq", self.bq(&["ls", "--format=json"])),
            ResourceKind::Object => {
                return Err(Error::Config(
                    "objects are listed per bucket, not per project".to_string(),
                ));
            }
        };
        Ok(inv)
    }
}

impl Provider for GcloudProvider {
    fn project(&self) -> &str {
        &self.project
    }

    fn describe(&self, kind: ResourceKind, name: &str) -> Result<ObservedState> {
        if kind == ResourceKind::Service {
            let enabled = self.enabled_services()?;
            return Ok(if enabled.iter().any(|s| s == name) {
                ObservedState::present()
            } else {
                ObservedState::Absent
            });
        }

        let output = self.query(&self.describe_invocation(kind, name)?)?;
        if !output.success {
            let err = Error::from_sdk_output(&output.diagnostics(), name);
            return if err.is_ignorable_on_delete() {
                Ok(ObservedState::Absent)
            } else {
                Err(err)
            };
        }

        Ok(ObservedState::Present {
            fields: parse_fields(kind, &output.stdout),
        })
    }

    fn create(&self, declaration: &ResourceDeclaration) -> Result<()> {
        let invocation = self.create_invocation(declaration)?;
        self.execute(&invocation, &declaration.name)
    }

    fn delete(&self, kind: ResourceKind, name: &str) -> Result<()> {
        self.execute(&self.delete_invocation(kind, name), name)
    }

    fn list(&self, kind: ResourceKind) -> Result<Vec<String>> {
        let stdout = self.query_checked(&self.list_invocation(kind)?, kind.as_str())?;

        if kind == ResourceKind::Dataset {
            return parse_dataset_list(&stdout);
        }

        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|l| short_name(l).to_string())
            .collect())
    }

    fn read_object(&self, url: &str) -> Result<Option<String>> {
        let output = self.query(&Invocation::read("gsutil", ["cat", url]))?;
        if output.success {
            return Ok(Some(output.stdout));
        }
        let err = Error::from_sdk_output(&output.diagnostics(), url);
        if err.is_ignorable_on_delete() {
            Ok(None)
        } else {
            Err(err)
        }
    }

    fn read_secret(&self, name: &str) -> Result<Option<String>> {
        let invocation = Invocation::read("gcloud", ["secrets", "versions", "access", "latest"])
            .arg(format!("--secret={name}"))
            .arg(self.project_flag());
        let output = self.query(&invocation)?;
        if output.success {
            return Ok(Some(output.stdout));
        }
        let err = Error::from_sdk_output(&output.diagnostics(), name);
        if err.is_ignorable_on_delete() {
            Ok(None)
        } else {
            Err(err)
        }
    }

    fn add_secret_version(&self, name: &str, data: &str) -> Result<()> {
        let invocation = Invocation::mutate("gcloud", ["secrets", "versions", "add", name])
            .arg(self.project_flag())
            .arg("--data-file=-")
            .with_stdin(data);
        self.execute(&invocation, name)
    }

    fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

/// Extract the fields the reconciler reports from `describe --format=json`.
fn parse_fields(kind: ResourceKind, stdout: &str) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    let Ok(json) = serde_json::from_str::<serde_json::Value>(stdout) else {
        return fields;
    };

    let mut put = |key: &str, value: Option<&str>| {
        if let Some(v) = value {
            fields.insert(key.to_string(), v.to_string());
        }
    };

    match kind {
        ResourceKind::SchedulerJob => {
            put("schedule", json["schedule"].as_str());
            put(
                "topic",
                json["pubsubTarget"]["topicName"].as_str().map(short_name),
            );
            put("time_zone", json["timeZone"].as_str());
            put("state", json["state"].as_str());
        }
        ResourceKind::Function => {
            put("entry_point", json["entryPoint"].as_str());
            put("runtime", json["runtime"].as_str());
            put("status", json["status"].as_str());
        }
        ResourceKind::Dataset => {
            put("location", json["location"].as_str());
        }
        ResourceKind::ServiceAccount => {
            put("display_name", json["displayName"].as_str());
        }
        _ => {}
    }

    fields
}

/// Dataset ids from `bq ls --format=json`; `bq` prints nothing for an empty project.
fn parse_dataset_list(stdout: &str) -> Result<Vec<String>> {
    if stdout.trim().is_empty() {
        return Ok(Vec::new());
    }
    let json: serde_json::Value = serde_json::from_str(stdout)?;
    Ok(json
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|d| d["datasetReference"]["datasetId"].as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default())
}

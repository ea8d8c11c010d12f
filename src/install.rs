//! One installer run: settings to declarations to an applied plan

use anyhow::{Context as _, Result};
use chrono::Utc;
use declarative::{ExecuteOptions, ExecuteSummary};
use gcloudkit::{GcloudProvider, Provider, Reconciler, ResourceDeclaration, SystemRunner};
use std::fs;
use std::sync::Arc;

use crate::Context;
use crate::cli::{Cli, UsageError};
use crate::config::{FileConfig, Settings};
use crate::deploy::{Catalogue, FunctionInputs, Selection};
use crate::engine;
use crate::environment::{self, FunctionEnv};
use crate::package;
use crate::progress;
use crate::state::RunJournal;
use crate::ui;

/// Run the installer for parsed flags
///
/// Invocation problems come back as [`UsageError`]; everything after the
/// settings are resolved is reported through the summary and the journal.
pub fn run(ctx: &Context, cli: &Cli) -> Result<ExecuteSummary> {
    let file = FileConfig::load(cli.config.as_deref())
        .map_err(|e| UsageError::new(format!("{e:#}")))?;
    let settings = Settings::resolve(cli, file).map_err(|e| UsageError::new(format!("{e:#}")))?;
    let selection = Selection::from_cli(cli);
    if selection.is_empty() {
        return Err(UsageError::new(
            "Nothing selected: pass --deploy-all, a --deploy-* flag or another action",
        )
        .into());
    }

    if !ctx.quiet {
        ui::header("Report2BQ Installer");
        ui::kv("Project", &settings.project);
        ui::kv("Region", &settings.region);
        ui::kv("Dataset", &settings.dataset);
        if settings.dry_run {
            ui::kv("Mode", "dry run");
        }
        if ctx.verbose > 0 {
            ui::kv("Source", &settings.source_dir.display().to_string());
            ui::kv("Jobs", &settings.jobs.to_string());
            if settings.background {
                ui::kv("Logs", &settings.log_dir.display().to_string());
            }
        }
    }

    let provider: Arc<dyn Provider> = Arc::new(
        GcloudProvider::new(
            settings.project.as_str(),
            settings.region.as_str(),
            Arc::new(SystemRunner::new()),
        )
        .dry_run(settings.dry_run),
    );

    let background_provider = |declaration: &ResourceDeclaration| -> Result<Arc<dyn Provider>> {
        let log_file = settings.log_dir.join(format!("{}.log", declaration.name));
        let runner = SystemRunner::logging_to(log_file);
        Ok(Arc::new(
            GcloudProvider::new(
                settings.project.as_str(),
                settings.region.as_str(),
                Arc::new(runner),
            )
            .dry_run(settings.dry_run),
        ))
    };

    let started_at = Utc::now();
    let summary = install(&settings, &selection, &provider, background_provider, ctx.quiet)?;

    let journal = RunJournal::new(&settings.project, settings.dry_run, started_at, &summary);
    match journal.save() {
        Ok(path) => log::info!("Run journal written to {}", path.display()),
        Err(e) => ui::warn(&format!("Could not save run journal: {e:#}")),
    }

    Ok(summary)
}

/// Declare, plan and apply everything a selection asks for
pub fn install<F>(
    settings: &Settings,
    selection: &Selection,
    provider: &Arc<dyn Provider>,
    background_provider: F,
    quiet: bool,
) -> Result<ExecuteSummary>
where
    F: FnMut(&ResourceDeclaration) -> Result<Arc<dyn Provider>>,
{
    let env = if selection.deploys_functions() {
        Some(prepare_functions(settings, selection, provider.as_ref(), quiet)?)
    } else {
        None
    };
    let inputs = env.as_ref().map(|env| FunctionInputs {
        env,
        archive: &settings.archive_path,
    });

    let declarations = Catalogue::build(settings, selection, inputs)?.into_declarations();
    log::info!("Declared {} resources", declarations.len());
    let declarations = engine::select_target(declarations, settings.target.as_deref());

    if settings.cleanup {
        cleanup(provider.as_ref(), &declarations, quiet)?;
    }

    if settings.background {
        fs::create_dir_all(&settings.log_dir).with_context(|| {
            format!("Failed to create log directory: {}", settings.log_dir.display())
        })?;
    }

    let plan = engine::build_plan(
        declarations,
        provider,
        settings.background,
        background_provider,
    )?;

    let opts = ExecuteOptions {
        dry_run: settings.dry_run,
        jobs: settings.jobs,
        verbose: settings.verbose,
        fail_fast: true,
    };
    engine::execute(plan, opts, quiet)
}

/// Resolve the function environment and package the source archive
fn prepare_functions(
    settings: &Settings,
    selection: &Selection,
    provider: &dyn Provider,
    quiet: bool,
) -> Result<FunctionEnv> {
    let api_key = environment::resolve_api_key(provider, settings)?.ok_or_else(|| {
        UsageError::new(format!(
            "Deploying functions needs an API key: pass --api-key or store one in gs://{}/api.key",
            settings.tokens_bucket()
        ))
    })?;

    let active = environment::active_apis(provider, settings, selection.activate_apis)?;
    let env = FunctionEnv::derive(settings, &api_key, &active);
    log::debug!("{} APIs active for the function environment", active.len());

    let pb = (!quiet).then(|| progress::spinner("Packaging function source..."));
    match package::build(&settings.source_dir, &settings.archive_path) {
        Ok(built) => {
            let msg = format!(
                "Packaged {} files into {} ({})",
                built.files.len(),
                built.path.display(),
                ui::format_size(built.size)
            );
            match &pb {
                Some(pb) => progress::finish_success(pb, &msg),
                None => log::info!("{msg}"),
            }
        }
        Err(e) => {
            if let Some(pb) = &pb {
                progress::finish_error(pb, "Packaging failed");
            }
            return Err(UsageError::new(format!("{e:#}")).into());
        }
    }

    Ok(env)
}

/// Delete leftovers whose names contain a declared function, topic or job
fn cleanup(
    provider: &dyn Provider,
    declarations: &[ResourceDeclaration],
    quiet: bool,
) -> Result<()> {
    if !quiet {
        ui::section("Cleanup");
    }
    let reconciler = Reconciler::new(provider);
    for declaration in declarations.iter().filter(|d| d.kind.supports_cleanup()) {
        let deleted = reconciler
            .cleanup(declaration.kind, &declaration.name)
            .with_context(|| format!("Cleanup of {} failed", declaration.id()))?;
        for name in deleted {
            if !quiet {
                ui::dim(&format!("removed {} {name}", declaration.kind.as_str()));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::{CLIENT_SECRET_NAME, TOPICS};
    use clap::Parser;
    use gcloudkit::{CommandOutput, MemoryProvider, RecordingRunner, ResourceKind};
    use std::path::Path;
    use tempfile::TempDir;

    fn setup(args: &[&str], temp: &Path) -> (Settings, Selection) {
        let mut all = vec!["report2bq-install", "--project=acme-data", "--api-key=k3y"];
        all.extend_from_slice(args);
        let cli = Cli::try_parse_from(all).unwrap();
        let mut settings = Settings::resolve(&cli, FileConfig::default()).unwrap();
        settings.source_dir = temp.join("src");
        settings.archive_path = temp.join(package::ARCHIVE_NAME);
        settings.log_dir = temp.join("logs");
        (settings, Selection::from_cli(&cli))
    }

    fn write_sources(temp: &Path) {
        let src = temp.join("src");
        fs::create_dir_all(src.join("classes")).unwrap();
        fs::write(src.join("main.py"), "def job_monitor(event, context): pass\n").unwrap();
        fs::write(src.join("requirements.txt"), "google-cloud-bigquery\n").unwrap();
        fs::write(src.join("classes").join("report2bq.py"), "class Report2BQ: pass\n").unwrap();
    }

    fn no_background(_: &ResourceDeclaration) -> Result<Arc<dyn Provider>> {
        unreachable!("no background providers without --background")
    }

    #[test]
    fn test_job_monitor_converges() {
        let temp = TempDir::new().unwrap();
        write_sources(temp.path());
        let (settings, selection) = setup(&["--deploy-job-monitor", "-q"], temp.path());
        let memory = Arc::new(MemoryProvider::new("acme-data"));
        let provider: Arc<dyn Provider> = memory.clone();

        for _ in 0..2 {
            let summary = install(&settings, &selection, &provider, no_background, true).unwrap();
            assert!(summary.is_success());
        }

        assert_eq!(memory.count(ResourceKind::SchedulerJob), 1);
        assert_eq!(memory.count(ResourceKind::Topic), 1);
        let job = memory
            .config(ResourceKind::SchedulerJob, "report2bq-job-monitor")
            .unwrap();
        assert_eq!(job.get("schedule").map(String::as_str), Some("*/5 * * * *"));
        assert_eq!(job.get("topic").map(String::as_str), Some("report2bq-job-monitor"));
        assert!(temp.path().join(package::ARCHIVE_NAME).exists());
    }

    #[test]
    fn test_missing_api_key_is_usage_error() {
        let temp = TempDir::new().unwrap();
        write_sources(temp.path());
        let (mut settings, selection) = setup(&["--deploy-fetcher"], temp.path());
        settings.api_key = None;
        let provider: Arc<dyn Provider> = Arc::new(MemoryProvider::new("acme-data"));

        let err = install(&settings, &selection, &provider, no_background, true).unwrap_err();
        assert!(err.downcast_ref::<UsageError>().is_some());
    }

    #[test]
    fn test_missing_main_is_usage_error() {
        let temp = TempDir::new().unwrap();
        let (settings, selection) = setup(&["--deploy-fetcher"], temp.path());
        let provider: Arc<dyn Provider> = Arc::new(MemoryProvider::new("acme-data"));

        let err = install(&settings, &selection, &provider, no_background, true).unwrap_err();
        assert!(err.downcast_ref::<UsageError>().is_some());
    }

    #[test]
    fn test_foreground_failure_aborts() {
        let temp = TempDir::new().unwrap();
        let (settings, selection) = setup(&["--deploy-trigger"], temp.path());
        let memory = Arc::new(MemoryProvider::new("acme-data"));
        memory.fail_create(ResourceKind::Topic, "report2bq-fetcher");
        let provider: Arc<dyn Provider> = memory.clone();

        let summary = install(&settings, &selection, &provider, no_background, true).unwrap();
        assert!(summary.aborted);
        assert_eq!(summary.failed, 1);
        assert!(!memory.contains(ResourceKind::Topic, "report2bq-runner"));
    }

    #[test]
    fn test_cleanup_removes_matching_leftovers() {
        let temp = TempDir::new().unwrap();
        let (settings, selection) = setup(&["--deploy-trigger", "--cleanup"], temp.path());
        let memory = Arc::new(MemoryProvider::new("acme-data"));
        memory.insert(&ResourceDeclaration::topic("old-report2bq-trigger-v1"));
        memory.insert(&ResourceDeclaration::topic("unrelated"));
        let provider: Arc<dyn Provider> = memory.clone();

        let summary = install(&settings, &selection, &provider, no_background, true).unwrap();
        assert!(summary.is_success());
        assert!(!memory.contains(ResourceKind::Topic, "old-report2bq-trigger-v1"));
        assert!(memory.contains(ResourceKind::Topic, "unrelated"));
        assert!(memory.contains(ResourceKind::Topic, "report2bq-trigger"));
    }

    #[test]
    fn test_background_functions_are_joined() {
        let temp = TempDir::new().unwrap();
        write_sources(temp.path());
        let (settings, selection) =
            setup(&["--deploy-runner", "--background", "-j", "2"], temp.path());
        let memory = Arc::new(MemoryProvider::new("acme-data"));
        let provider: Arc<dyn Provider> = memory.clone();
        let shared = Arc::clone(&provider);

        let summary = install(
            &settings,
            &selection,
            &provider,
            |_| Ok(Arc::clone(&shared)),
            true,
        )
        .unwrap();

        assert!(summary.is_success());
        assert_eq!(summary.records.iter().filter(|r| r.background).count(), 2);
        assert_eq!(memory.count(ResourceKind::Function), 2);
        assert!(temp.path().join("logs").is_dir());
    }

    #[test]
    fn test_cleanup_honours_target() {
        let temp = TempDir::new().unwrap();
        let (settings, selection) = setup(
            &["--deploy-trigger", "--cleanup", "--target=topic.report2bq-fetcher"],
            temp.path(),
        );
        let memory = Arc::new(MemoryProvider::new("acme-data"));
        for topic in TOPICS {
            memory.insert(&ResourceDeclaration::topic(topic));
        }
        let provider: Arc<dyn Provider> = memory.clone();

        let summary = install(&settings, &selection, &provider, no_background, true).unwrap();
        assert!(summary.is_success());
        assert_eq!(summary.records.len(), 1);
        assert_eq!(summary.records[0].id, "topic.report2bq-fetcher");
        assert_eq!(memory.count(ResourceKind::Topic), TOPICS.len());
    }

    #[test]
    fn test_store_client_replaces_secret_data() {
        let temp = TempDir::new().unwrap();
        let (settings, selection) = setup(
            &["--store-client", "--client-id=cid", "--client-secret=NEW"],
            temp.path(),
        );
        let memory = Arc::new(MemoryProvider::new("acme-data"));
        memory.insert(&ResourceDeclaration::secret(CLIENT_SECRET_NAME).with("data", "OLD"));
        let provider: Arc<dyn Provider> = memory.clone();

        let summary = install(&settings, &selection, &provider, no_background, true).unwrap();
        assert!(summary.is_success());
        let secret = memory.config(ResourceKind::Secret, CLIENT_SECRET_NAME).unwrap();
        let data = secret.get("data").unwrap();
        assert!(data.contains("NEW"));
        assert!(!data.contains("OLD"));
    }

    #[test]
    fn test_dry_run_deploy_all_with_cleanup_mutates_nothing() {
        let temp = TempDir::new().unwrap();
        write_sources(temp.path());
        let (settings, selection) = setup(
            &[
                "--dry-run",
                "--deploy-all",
                "--cleanup",
                "--activate-apis",
                "--create-service-account",
            ],
            temp.path(),
        );
        let not_found = CommandOutput::failed("ERROR: (gcloud) NOT_FOUND: resource not found");
        let runner = Arc::new(
            RecordingRunner::new()
                .reply(
                    "functions list",
                    CommandOutput::ok(
                        "projects/acme-data/locations/us-central1/functions/report2bq-fetcher\n",
                    ),
                )
                .reply(
                    "topics list",
                    CommandOutput::ok("projects/acme-data/topics/old-report2bq-trigger\n"),
                )
                .reply(
                    "jobs list",
                    CommandOutput::ok(
                        "projects/acme-data/locations/us-central1/jobs/report2bq-job-monitor\n",
                    ),
                )
                .reply("topics describe", not_found.clone())
                .reply("jobs describe", not_found.clone())
                .reply("functions describe", not_found),
        );
        let provider: Arc<dyn Provider> = Arc::new(
            GcloudProvider::new("acme-data", "us-central1", runner.clone()).dry_run(true),
        );

        let summary = install(&settings, &selection, &provider, no_background, true).unwrap();

        assert!(summary.is_success());
        assert!(summary.skipped > 0);
        assert!(runner.mutating_calls().is_empty());
        assert!(
            runner
                .command_lines()
                .iter()
                .any(|line| line.contains("functions list"))
        );
    }
}

//! Execution engine - applies the foreground batch in order, then the
//! background batch on a thread pool

use crate::context::{ApplyContext, NoProgress, ProgressCallback};
use crate::planner::ExecutionPlan;
use crate::resource::Resource;
use crate::types::{ApplyRecord, ApplyResult, ExecuteOptions, ExecuteSummary};
use anyhow::Result;
use rayon::prelude::*;
use std::sync::{Mutex, PoisonError};

/// Execute a plan with the given options and progress callback
///
/// Every planned resource is applied, even when its current state already
/// matches: resources decide for themselves whether anything needs doing.
///
/// The foreground batch runs sequentially in plan order. With
/// `fail_fast`, the first foreground failure stops the run: the rest of the
/// plan is recorded as skipped and the summary is marked `aborted`.
///
/// The background batch starts once the foreground batch is done and is
/// always joined before this function returns. A failing background
/// resource never cancels its siblings.
///
/// # Errors
///
/// Returns an error only if the background thread pool cannot be built.
/// Resource failures are reported in the summary.
pub fn execute<P>(plan: ExecutionPlan, opts: ExecuteOptions, progress: &mut P) -> Result<ExecuteSummary>
where
    P: ProgressCallback,
{
    let mut summary = ExecuteSummary::default();
    let ctx = ApplyContext::new(opts.dry_run, opts.verbose);

    if !plan.foreground.is_empty() {
        progress.on_batch_start(plan.foreground.len(), false);
        execute_foreground(&plan.foreground, ctx, opts.fail_fast, progress, &mut summary);
        progress.on_batch_complete();
    }

    if summary.aborted {
        for resource in &plan.background {
            summary.record(skipped(resource.as_ref(), true, "run aborted"));
        }
        return Ok(summary);
    }

    if !plan.background.is_empty() {
        progress.on_batch_start(plan.background.len(), true);
        let records = execute_background(&plan.background, opts.jobs, ctx.in_background())?;
        for record in records {
            progress.on_resource_complete(&record.id, &record.result);
            summary.record(record);
        }
        progress.on_batch_complete();
    }

    Ok(summary)
}

/// Apply resources one at a time, stopping at the first failure if asked
fn execute_foreground<P: ProgressCallback>(
    resources: &[Box<dyn Resource>],
    ctx: ApplyContext,
    fail_fast: bool,
    progress: &mut P,
    summary: &mut ExecuteSummary,
) {
    let mut remaining = resources.iter();

    for resource in remaining.by_ref() {
        let id = resource.id();
        progress.on_resource_start(&id, &resource.description());
        let result = apply_resource(resource.as_ref(), ctx);
        progress.on_resource_complete(&id, &result);

        let failed = !result.is_success();
        summary.record(ApplyRecord {
            id,
            resource_type: resource.resource_type().to_string(),
            background: false,
            result,
        });

        if failed && fail_fast {
            summary.aborted = true;
            break;
        }
    }

    if summary.aborted {
        for resource in remaining {
            summary.record(skipped(resource.as_ref(), false, "run aborted"));
        }
    }
}

/// Apply resources concurrently on a pool of `jobs` threads and wait for all
/// of them
fn execute_background(
    resources: &[Box<dyn Resource>],
    jobs: usize,
    ctx: ApplyContext,
) -> Result<Vec<ApplyRecord>> {
    let results: Mutex<Vec<ApplyRecord>> = Mutex::new(Vec::with_capacity(resources.len()));

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create thread pool: {e}"))?;

    pool.install(|| {
        resources.par_iter().for_each(|resource| {
            log::debug!("Background apply of {} started", resource.id());
            let result = apply_resource(resource.as_ref(), ctx);
            log::debug!("Background apply of {} finished: {:?}", resource.id(), result);
            results
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(ApplyRecord {
                    id: resource.id(),
                    resource_type: resource.resource_type().to_string(),
                    background: true,
                    result,
                });
        });
    });

    Ok(results.into_inner().unwrap_or_else(PoisonError::into_inner))
}

/// Apply a single resource, turning errors into a failed result
fn apply_resource(resource: &dyn Resource, ctx: ApplyContext) -> ApplyResult {
    let mut ctx = ctx;
    match resource.apply(&mut ctx) {
        Ok(result) => result,
        Err(e) => ApplyResult::Failed {
            error: format!("{e:#}"),
        },
    }
}

fn skipped(resource: &dyn Resource, background: bool, reason: &str) -> ApplyRecord {
    ApplyRecord {
        id: resource.id(),
        resource_type: resource.resource_type().to_string(),
        background,
        result: ApplyResult::Skipped {
            reason: reason.to_string(),
        },
    }
}

/// Simple execution without progress reporting
pub fn execute_simple(plan: ExecutionPlan, opts: ExecuteOptions) -> Result<ExecuteSummary> {
    execute(plan, opts, &mut NoProgress)
}

//! Execution engine - executor with terminal UI

use anyhow::Result;
use colored::Colorize;
use declarative::{
    ApplyResult, ExecuteOptions, ExecuteSummary, ExecutionPlan, ProgressCallback, compute_diffs,
};
use indicatif::ProgressBar;

use crate::progress;

use super::differ::display_diff;

/// Progress output for the terminal
///
/// Foreground resources get a progress bar. In dry-run the previewed
/// commands are printed as they happen, so a plain line per resource is
/// used instead of a bar.
struct TerminalProgress {
    bar: Option<ProgressBar>,
    dry_run: bool,
    quiet: bool,
}

impl TerminalProgress {
    fn new(dry_run: bool, quiet: bool) -> Self {
        Self {
            bar: None,
            dry_run,
            quiet,
        }
    }

    fn line(&self, msg: &str) {
        match &self.bar {
            Some(bar) => bar.println(msg),
            None => println!("{msg}"),
        }
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_batch_start(&mut self, count: usize, background: bool) {
        if self.quiet {
            return;
        }
        println!();
        if background {
            println!(
                "  {} Deploying {} functions in the background...",
                "→".cyan(),
                count
            );
        } else {
            println!("  {} Applying {} resources...", "→".cyan(), count);
        }
        if !self.dry_run {
            let prefix = if background { "Deploying" } else { "Applying" };
            self.bar = Some(progress::bar(count as u64, prefix));
        }
    }

    fn on_resource_start(&mut self, id: &str, _description: &str) {
        match &self.bar {
            Some(bar) => bar.set_message(id.to_string()),
            None if self.dry_run && !self.quiet => println!("  {} {}", "#".dimmed(), id.dimmed()),
            None => {}
        }
    }

    fn on_resource_complete(&mut self, id: &str, result: &ApplyResult) {
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }

        let symbol = match result {
            ApplyResult::NoChange => result.symbol().dimmed(),
            ApplyResult::Failed { .. } => result.symbol().red(),
            ApplyResult::Skipped { .. } => result.symbol().yellow(),
            _ => result.symbol().green(),
        };
        match result {
            ApplyResult::Failed { error } => {
                self.line(&format!("    {symbol} {id}"));
                self.line(&format!("      {}", error.red()));
            }
            _ if !self.quiet => self.line(&format!("    {symbol} {id}")),
            _ => {}
        }
    }

    fn on_batch_complete(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

/// Preview and execute the plan
pub fn execute(plan: ExecutionPlan, opts: ExecuteOptions, quiet: bool) -> Result<ExecuteSummary> {
    if plan.is_empty() {
        println!();
        println!("  {} Nothing to apply", "ℹ".blue());
        return Ok(ExecuteSummary::default());
    }

    if !quiet {
        let diffs: Vec<_> = compute_diffs(&plan.foreground)
            .into_iter()
            .chain(compute_diffs(&plan.background))
            .collect();
        display_diff(&diffs, plan.total_resources());
    }

    let dry_run = opts.dry_run;
    let mut progress = TerminalProgress::new(dry_run, quiet);
    let summary = declarative::execute(plan, opts, &mut progress)?;

    if dry_run && !quiet {
        println!();
        println!("  {} Dry run - commands above were printed, not run", "ℹ".blue());
    }

    Ok(summary)
}

/// Print final summary
pub fn print_summary(summary: &ExecuteSummary) {
    println!();
    if summary.is_success() {
        println!("  {} Report2BQ installed successfully!", "✓".green().bold());
    } else if summary.aborted {
        println!(
            "  {} Installation stopped at the first failure",
            "✗".red().bold()
        );
    } else {
        println!("  {} Installation finished with errors", "⚠".yellow().bold());
    }

    if summary.created > 0 {
        println!("    • {} resources created", summary.created);
    }
    if summary.modified > 0 {
        println!("    • {} resources recreated or redeployed", summary.modified);
    }
    if summary.no_change > 0 {
        println!("    • {} resources already present", summary.no_change);
    }
    if summary.skipped > 0 {
        println!("    • {} resources skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "resources".red());
        for record in summary.failures() {
            let place = if record.background { " (background)" } else { "" };
            println!("      - {}{}", record.id, place);
        }
    }
}

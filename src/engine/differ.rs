//! Diff display

use colored::Colorize;
use declarative::{DiffSummary, ResourceDiff, ResourceState, group_by_type};

fn type_name(resource_type: &str) -> &str {
    match resource_type {
        "service" => "APIs",
        "service_account" => "Service accounts",
        "bucket" => "Buckets",
        "dataset" => "BigQuery datasets",
        "secret" => "Secrets",
        "object" => "Storage objects",
        "topic" => "Pub/Sub topics",
        "function" => "Cloud Functions",
        "scheduler_job" => "Scheduler jobs",
        other => other,
    }
}

/// Display a list of diffs in a user-friendly format
///
/// `planned` is the number of resources in the plan. Resources without a
/// diff are still applied: topics and jobs are recreated and functions
/// redeployed on every run.
pub fn display_diff(diffs: &[ResourceDiff], planned: usize) {
    if diffs.is_empty() {
        println!();
        println!(
            "  {} All {} resources present, converging anyway",
            "✓".green(),
            planned
        );
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Deployment Diff".bold()
    );
    println!("│");

    for (resource_type, type_diffs) in group_by_type(diffs) {
        println!("│ {}", type_name(&resource_type).bold());

        for diff in type_diffs {
            let symbol = match (&diff.current, &diff.desired) {
                (ResourceState::Absent, ResourceState::Present { .. }) => "+".green(),
                (ResourceState::Present { .. }, ResourceState::Absent) => "-".red(),
                (ResourceState::Unknown, _) => "?".dimmed(),
                _ => "~".yellow(),
            };

            let state_desc = match (&diff.current, &diff.desired) {
                (ResourceState::Absent, ResourceState::Present { details }) => format!(
                    "(not created){}",
                    details
                        .as_ref()
                        .map(|d| format!(" → {d}"))
                        .unwrap_or_default()
                ),
                (
                    ResourceState::Present { details: from },
                    ResourceState::Present { details: to },
                ) => format!(
                    "{} → {}",
                    from.as_deref().unwrap_or("current"),
                    to.as_deref().unwrap_or("desired")
                ),
                (ResourceState::Unknown, _) => "(state unavailable)".to_string(),
                _ => String::new(),
            };

            println!(
                "│   {} {:<40} {}",
                symbol,
                diff.resource_id,
                state_desc.dimmed()
            );
        }
        println!("│");
    }

    let summary = DiffSummary::from_diffs(diffs);
    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} of {} resources differ ({} new, {} changed)",
        summary.total().to_string().bold(),
        planned,
        summary.additions.to_string().green(),
        summary.modifications.to_string().yellow()
    );
    println!("└─────────────────────────────────────────────────────┘");
}

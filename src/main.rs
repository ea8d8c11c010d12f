mod cli;
mod config;
mod deploy;
mod engine;
mod environment;
mod install;
mod package;
mod paths;
mod products;
mod progress;
mod resource;
mod state;
mod ui;

use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, UsageError};
use std::io;
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    if let Some(shell) = cli.completions {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "report2bq-install", &mut io::stdout());
        return ExitCode::SUCCESS;
    }

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    match install::run(&ctx, &cli) {
        Ok(summary) => {
            if !ctx.quiet || !summary.is_success() {
                engine::print_summary(&summary);
            }
            if summary.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            }
        }
        Err(e) if e.downcast_ref::<UsageError>().is_some() => {
            ui::error(&format!("{e:#}"));
            eprintln!();
            eprintln!("For more information, try '--help'.");
            ExitCode::from(2)
        }
        Err(e) => {
            ui::error(&format!("{e:#}"));
            ExitCode::from(1)
        }
    }
}

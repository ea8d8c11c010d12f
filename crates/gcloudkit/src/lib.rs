//! # gcloudkit
//!
//! Idempotent Google Cloud resource management on top of the Cloud SDK
//! command-line tools.
//!
//! This crate provides:
//! - Typed resource declarations ([`ResourceDeclaration`], [`ResourceKind`])
//! - Command invocations that can be run, recorded or previewed
//! - A [`Provider`] trait with a `gcloud`/`gsutil`/`bq` backend and an
//!   in-memory backend
//! - The [`Reconciler`], which converges a declaration using the strategy
//!   of its kind
//!
//! ## Example
//!
//! ```no_run
//! use gcloudkit::{GcloudProvider, Reconciler, ResourceDeclaration, SystemRunner};
//! use std::sync::Arc;
//!
//! let provider = GcloudProvider::new("my-project", "us-central1", Arc::new(SystemRunner::new()));
//! let reconciler = Reconciler::new(&provider);
//!
//! // Pub/Sub topics are deleted and created again
//! reconciler.reconcile(&ResourceDeclaration::topic("report2bq-trigger")).unwrap();
//!
//! // Buckets are only created when missing
//! reconciler.reconcile(&ResourceDeclaration::bucket("my-project-report2bq")).unwrap();
//! ```
//!
//! ## Dry runs
//!
//! [`GcloudProvider::dry_run`] prints every mutating command prefixed with
//! `echo` instead of running it. Read-only commands still run so the
//! preview reflects the real project.

pub mod backend;
pub mod command;
pub mod error;
pub mod reconcile;
pub mod types;

pub use backend::gcloud::GcloudProvider;
pub use backend::memory::MemoryProvider;
pub use backend::{Provider, short_name};
pub use command::{CommandOutput, CommandRunner, Invocation, RecordingRunner, SystemRunner};
pub use error::{Error, ErrorCategory, Result};
pub use reconcile::Reconciler;
pub use types::{ObservedState, Outcome, ResourceDeclaration, ResourceKind, Strategy};

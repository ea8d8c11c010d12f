//! Execution engine for the installer
//!
//! The engine orchestrates:
//! 1. Planning - Narrow declarations to the target, then split them into a
//!    foreground and a background batch
//! 2. Diffing - Preview current vs desired state
//! 3. Executing - Apply the plan with progress output and a summary

pub mod differ;
pub mod executor;
pub mod planner;

pub use executor::{execute, print_summary};
pub use planner::{build_plan, select_target};

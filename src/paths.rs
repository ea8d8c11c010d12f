//! Centralized path resolution for report2bq-install
//!
//! # Environment Variables
//!
//! - `REPORT2BQ_CONFIG_DIR` - Override config directory
//! - `REPORT2BQ_STATE_DIR` - Override state directory (run journals)
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `REPORT2BQ_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/report2bq` (if set)
//! 3. `~/.config/report2bq`
//!
//! For state_dir():
//! 1. `REPORT2BQ_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/report2bq` (if set)
//! 3. `~/.local/state/report2bq`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "REPORT2BQ_CONFIG_DIR";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "REPORT2BQ_STATE_DIR";

const APP_DIR: &str = "report2bq";

/// Get the config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join(APP_DIR);
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join(APP_DIR);
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Default configuration file, `<config dir>/config.toml`
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Get the state directory path
pub fn state_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_STATE_DIR) {
        let path = expand(&dir);
        log::debug!("Using state dir from {}: {}", ENV_STATE_DIR, path.display());
        return Ok(path);
    }

    if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME") {
        let path = PathBuf::from(xdg_state).join(APP_DIR);
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".local").join("state").join(APP_DIR);
    log::debug!("Using default state dir: {}", path.display());
    Ok(path)
}

/// Expand ~ and environment variables in a path string.
///
/// Unknown variables are left as written.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

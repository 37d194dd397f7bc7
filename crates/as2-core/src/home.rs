//! Home directory resolution for as2-server
//!
//! The home directory is only used to locate the default global configuration
//! file (`<home>/.config/as2/config.toml`). Deployments and tests can redirect
//! it with the `AS2_HOME` environment variable.
//!
//! # Precedence
//!
//! 1. `AS2_HOME` environment variable (if set and non-empty)
//! 2. `dirs::home_dir()` platform default

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Get the home directory used for configuration discovery
///
/// # Errors
///
/// Returns an error if `AS2_HOME` is not set AND the platform home directory
/// cannot be determined via `dirs::home_dir()`.
pub fn get_home_dir() -> Result<PathBuf> {
    if let Ok(home) = std::env::var("AS2_HOME") {
        let trimmed = home.trim();
        if !trimmed.is_empty() {
            return Ok(PathBuf::from(trimmed));
        }
    }

    dirs::home_dir().context("Could not determine home directory")
}

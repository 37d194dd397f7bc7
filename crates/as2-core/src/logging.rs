//! Process-wide tracing setup for the server binary.
//!
//! Level resolution, highest first: `--verbose` (DEBUG), `AS2_LOG`, INFO.

use std::sync::OnceLock;
use tracing::Level;

/// Environment variable holding the log level name
pub const LOG_ENV: &str = "AS2_LOG";

static INSTALLED: OnceLock<Level> = OnceLock::new();

/// Pick the log level from the verbose flag and the raw `AS2_LOG` value.
///
/// Unrecognized `AS2_LOG` values fall back to INFO rather than failing
/// startup.
pub fn resolve_level(verbose: bool, env_value: Option<&str>) -> Level {
    if verbose {
        return Level::DEBUG;
    }
    env_value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<Level>().ok())
        .unwrap_or(Level::INFO)
}

/// Install the fmt subscriber once per process and return the level in
/// effect. Later calls keep the first level.
pub fn init(verbose: bool) -> Level {
    *INSTALLED.get_or_init(|| {
        let level = resolve_level(verbose, std::env::var(LOG_ENV).ok().as_deref());
        // Another subscriber may already be global, e.g. under a test harness
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_target(false)
            .try_init();
        level
    })
}

//! Configuration resolution
//!
//! Resolves the server configuration from multiple sources with priority:
//! 1. Command-line flags (passed as parameters)
//! 2. Environment variables (`AS2_CONFIG`, `AS2_BASE_DIR`)
//! 3. Global config (~/.config/as2/config.toml)
//! 4. Defaults
//!
//! Partnership entries may live in the main file or in separate files listed
//! under `server.partnership_files`; every entry remembers which file it came
//! from so conflicts can be reported against the right source.

mod discovery;
mod types;

pub use discovery::{resolve_config, ConfigError, ConfigOverrides, PartnershipEntry, ResolvedConfig};
pub use types::{Config, ModuleSpec, PartnershipConfig, PollerErrorPolicy, ServerConfig};

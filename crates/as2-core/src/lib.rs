//! Core types for as2-server
//!
//! This crate holds everything the server binary needs before a session
//! exists: configuration discovery and parsing, base-directory resolution,
//! `%home%` path substitution and process-wide logging setup.

pub mod config;
pub mod home;
pub mod logging;
pub mod paths;

pub use config::{
    resolve_config, Config, ConfigError, ConfigOverrides, ModuleSpec, PartnershipConfig,
    PartnershipEntry, PollerErrorPolicy, ResolvedConfig, ServerConfig,
};

// Re-export toml for module spec access
pub use toml;

//! Configuration discovery and resolution

use super::types::{Config, ModuleSpec, PartnershipConfig, ServerConfig};
use crate::paths::{resolve_against, substitute_home};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error while reading a config file
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error
    #[error("failed to parse config file {path}: {source}")]
    TomlParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// An explicitly requested config file does not exist
    #[error("configuration not found: {0}")]
    NotFound(PathBuf),

    /// The same partnership name is declared twice
    #[error("partnership {name} declared in {first_source} is declared again in {second_source}")]
    DuplicatePartnership {
        name: String,
        first_source: String,
        second_source: String,
    },
}

/// Command-line overrides for configuration
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    /// Path to config file override
    pub config_path: Option<PathBuf>,
    /// Override base directory
    pub base_dir: Option<PathBuf>,
}

/// One partnership together with the file it was declared in
#[derive(Debug, Clone)]
pub struct PartnershipEntry {
    pub partnership: PartnershipConfig,
    /// Diagnostic origin, the declaring file's path
    pub source: String,
}

/// Fully resolved configuration, ready for the session loader
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub server: ServerConfig,
    /// Absolute base directory after all overrides
    pub base_dir: PathBuf,
    /// Partnerships in declaration order: main file first, then each
    /// partnership file in the order listed
    pub partnerships: Vec<PartnershipEntry>,
    /// Main config file, if one was found
    pub config_path: Option<PathBuf>,
}

/// Layout of a standalone partnership file
#[derive(Debug, Default, Deserialize)]
struct PartnershipFile {
    #[serde(default)]
    partnerships: Vec<PartnershipConfig>,
}

/// Resolve configuration from all sources
///
/// Priority (highest to lowest):
/// 1. Command-line overrides
/// 2. Environment variables
/// 3. Global config (~/.config/as2/config.toml)
/// 4. Defaults
///
/// `%home%` tokens in poller parameters are replaced with the resolved base
/// directory before the result is returned.
pub fn resolve_config(
    overrides: &ConfigOverrides,
    current_dir: &Path,
    home_dir: &Path,
) -> Result<ResolvedConfig, ConfigError> {
    let config_path = locate_config_file(overrides, current_dir, home_dir)?;

    let config = match &config_path {
        Some(path) => {
            info!("Loading config from {}", path.display());
            load_toml::<Config>(path)?
        }
        None => {
            debug!("No config file found, using defaults");
            Config::default()
        }
    };

    let config_dir = config_path
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| current_dir.to_path_buf());

    let base_dir = resolve_base_dir(overrides, &config.server, &config_dir, current_dir);

    let main_source = config_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<defaults>".to_string());

    let mut partnerships: Vec<PartnershipEntry> = config
        .partnerships
        .into_iter()
        .map(|partnership| PartnershipEntry {
            partnership,
            source: main_source.clone(),
        })
        .collect();

    for file in &config.server.partnership_files {
        let path = resolve_against(&config_dir, file);
        let parsed = load_toml::<PartnershipFile>(&path)?;
        debug!(
            "Loaded {} partnership(s) from {}",
            parsed.partnerships.len(),
            path.display()
        );
        let source = path.display().to_string();
        partnerships.extend(parsed.partnerships.into_iter().map(|partnership| {
            PartnershipEntry {
                partnership,
                source: source.clone(),
            }
        }));
    }

    check_unique_names(&partnerships)?;

    for entry in &mut partnerships {
        if let Some(spec) = entry.partnership.poller.as_mut() {
            apply_home_substitution(spec, &base_dir);
        }
    }

    Ok(ResolvedConfig {
        server: config.server,
        base_dir,
        partnerships,
        config_path,
    })
}

/// Find the main config file.
///
/// An explicitly named file (flag or `AS2_CONFIG`) must exist; the global
/// default location is optional.
fn locate_config_file(
    overrides: &ConfigOverrides,
    current_dir: &Path,
    home_dir: &Path,
) -> Result<Option<PathBuf>, ConfigError> {
    let explicit = overrides.config_path.clone().or_else(|| {
        std::env::var("AS2_CONFIG")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
    });

    if let Some(path) = explicit {
        let path = resolve_against(current_dir, path);
        if !path.is_file() {
            return Err(ConfigError::NotFound(path));
        }
        return Ok(Some(path));
    }

    let global = home_dir.join(".config/as2/config.toml");
    Ok(global.is_file().then_some(global))
}

fn resolve_base_dir(
    overrides: &ConfigOverrides,
    server: &ServerConfig,
    config_dir: &Path,
    current_dir: &Path,
) -> PathBuf {
    if let Some(dir) = &overrides.base_dir {
        return resolve_against(current_dir, dir);
    }

    if let Some(dir) = std::env::var("AS2_BASE_DIR")
        .ok()
        .filter(|v| !v.trim().is_empty())
    {
        return resolve_against(current_dir, dir.trim());
    }

    match &server.base_dir {
        Some(dir) => resolve_against(config_dir, dir),
        None => config_dir.to_path_buf(),
    }
}

fn check_unique_names(entries: &[PartnershipEntry]) -> Result<(), ConfigError> {
    for (i, entry) in entries.iter().enumerate() {
        if let Some(first) = entries[..i]
            .iter()
            .find(|e| e.partnership.name == entry.partnership.name)
        {
            return Err(ConfigError::DuplicatePartnership {
                name: entry.partnership.name.clone(),
                first_source: first.source.clone(),
                second_source: entry.source.clone(),
            });
        }
    }
    Ok(())
}

fn apply_home_substitution(spec: &mut ModuleSpec, base_dir: &Path) {
    for (_, value) in spec.parameters.iter_mut() {
        if let toml::Value::String(s) = value {
            *s = substitute_home(s, base_dir);
        }
    }
}

fn load_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::TomlParse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PollerErrorPolicy;
    use serial_test::serial;
    use std::env;
    use tempfile::TempDir;

    fn clear_env() {
        unsafe {
            env::remove_var("AS2_CONFIG");
            env::remove_var("AS2_BASE_DIR");
        }
    }

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    #[serial]
    fn test_defaults_without_any_file() {
        clear_env();
        let home = TempDir::new().unwrap();
        let cwd = TempDir::new().unwrap();

        let resolved =
            resolve_config(&ConfigOverrides::default(), cwd.path(), home.path()).unwrap();

        assert!(resolved.config_path.is_none());
        assert_eq!(resolved.base_dir, cwd.path());
        assert!(resolved.partnerships.is_empty());
        assert_eq!(resolved.server.on_poller_error, PollerErrorPolicy::Abort);
    }

    #[test]
    #[serial]
    fn test_global_config_discovered() {
        clear_env();
        let home = TempDir::new().unwrap();
        let cwd = TempDir::new().unwrap();
        let cfg_dir = home.path().join(".config/as2");
        std::fs::create_dir_all(&cfg_dir).unwrap();
        write(
            &cfg_dir,
            "config.toml",
            r#"
[[partnerships]]
name = "acme"
"#,
        );

        let resolved =
            resolve_config(&ConfigOverrides::default(), cwd.path(), home.path()).unwrap();

        assert_eq!(resolved.config_path, Some(cfg_dir.join("config.toml")));
        assert_eq!(resolved.base_dir, cfg_dir);
        assert_eq!(resolved.partnerships.len(), 1);
    }

    #[test]
    #[serial]
    fn test_explicit_missing_config_is_an_error() {
        clear_env();
        let home = TempDir::new().unwrap();
        let cwd = TempDir::new().unwrap();
        let overrides = ConfigOverrides {
            config_path: Some(cwd.path().join("missing.toml")),
            ..Default::default()
        };

        let err = resolve_config(&overrides, cwd.path(), home.path()).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    #[serial]
    fn test_env_config_path_used() {
        clear_env();
        let home = TempDir::new().unwrap();
        let cwd = TempDir::new().unwrap();
        let path = write(cwd.path(), "server.toml", "[server]\non_poller_error = \"skip\"\n");
        unsafe { env::set_var("AS2_CONFIG", &path) };

        let resolved =
            resolve_config(&ConfigOverrides::default(), cwd.path(), home.path()).unwrap();
        clear_env();

        assert_eq!(resolved.config_path, Some(path));
        assert_eq!(resolved.server.on_poller_error, PollerErrorPolicy::Skip);
    }

    #[test]
    #[serial]
    fn test_base_dir_priority() {
        clear_env();
        let home = TempDir::new().unwrap();
        let cwd = TempDir::new().unwrap();
        let path = write(cwd.path(), "server.toml", "[server]\nbase_dir = \"data\"\n");
        let mut overrides = ConfigOverrides {
            config_path: Some(path),
            ..Default::default()
        };

        // From config, relative to the config file
        let resolved = resolve_config(&overrides, cwd.path(), home.path()).unwrap();
        assert_eq!(resolved.base_dir, cwd.path().join("data"));

        // Environment beats config
        unsafe { env::set_var("AS2_BASE_DIR", "/srv/env") };
        let resolved = resolve_config(&overrides, cwd.path(), home.path()).unwrap();
        assert_eq!(resolved.base_dir, PathBuf::from("/srv/env"));

        // Flag beats environment
        overrides.base_dir = Some(PathBuf::from("/srv/flag"));
        let resolved = resolve_config(&overrides, cwd.path(), home.path()).unwrap();
        assert_eq!(resolved.base_dir, PathBuf::from("/srv/flag"));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_partnership_files_keep_their_source() {
        clear_env();
        let home = TempDir::new().unwrap();
        let cwd = TempDir::new().unwrap();
        let main = write(
            cwd.path(),
            "server.toml",
            r#"
[server]
partnership_files = ["partners.toml"]

[[partnerships]]
name = "inline"
"#,
        );
        let partners = write(
            cwd.path(),
            "partners.toml",
            r#"
[[partnerships]]
name = "external"

[partnerships.poller]
type = "directory_poller"
outboxdir = "%home%/outbox/external"
"#,
        );
        let overrides = ConfigOverrides {
            config_path: Some(main.clone()),
            ..Default::default()
        };

        let resolved = resolve_config(&overrides, cwd.path(), home.path()).unwrap();

        assert_eq!(resolved.partnerships.len(), 2);
        assert_eq!(resolved.partnerships[0].partnership.name, "inline");
        assert_eq!(resolved.partnerships[0].source, main.display().to_string());
        assert_eq!(resolved.partnerships[1].partnership.name, "external");
        assert_eq!(resolved.partnerships[1].source, partners.display().to_string());

        let params = resolved.partnerships[1]
            .partnership
            .poller
            .as_ref()
            .unwrap()
            .string_parameters();
        let expected = cwd.path().join("outbox/external");
        assert_eq!(params["outboxdir"], expected.display().to_string());
    }

    #[test]
    #[serial]
    fn test_duplicate_partnership_names_rejected() {
        clear_env();
        let home = TempDir::new().unwrap();
        let cwd = TempDir::new().unwrap();
        let main = write(
            cwd.path(),
            "server.toml",
            r#"
[[partnerships]]
name = "acme"

[[partnerships]]
name = "acme"
"#,
        );
        let overrides = ConfigOverrides {
            config_path: Some(main),
            ..Default::default()
        };

        let err = resolve_config(&overrides, cwd.path(), home.path()).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicatePartnership { ref name, .. } if name == "acme"));
    }

    #[test]
    #[serial]
    fn test_malformed_config_reports_path() {
        clear_env();
        let home = TempDir::new().unwrap();
        let cwd = TempDir::new().unwrap();
        let main = write(cwd.path(), "server.toml", "[server\nbroken");
        let overrides = ConfigOverrides {
            config_path: Some(main.clone()),
            ..Default::default()
        };

        let err = resolve_config(&overrides, cwd.path(), home.path()).unwrap_err();
        match err {
            ConfigError::TomlParse { path, .. } => assert_eq!(path, main),
            other => panic!("expected TomlParse, got {other:?}"),
        }
    }

    #[test]
    fn test_home_substitution_only_touches_strings() {
        let mut spec = ModuleSpec::new("directory_poller")
            .with_param("outboxdir", "%home%/outbox/acme")
            .with_param("archive", "/var/archive");
        spec.parameters
            .insert("interval".to_string(), toml::Value::Integer(10));

        apply_home_substitution(&mut spec, Path::new("/srv/as2"));

        let params = spec.string_parameters();
        assert_eq!(params["outboxdir"], "/srv/as2/outbox/acme");
        assert_eq!(params["archive"], "/var/archive");
        assert_eq!(params["interval"], "10");
    }
}

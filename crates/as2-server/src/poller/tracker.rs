//! Partnership poller tracking.
//!
//! Every poller claims exactly one outbox directory. The tracker refuses a
//! second claim on the same directory and reports who holds it, and it owns
//! the pollers for teardown.
//!
//! ## Invariants
//!
//! - No two live records share an output directory (compared after lexical
//!   normalization, so `/out/A` and `/out/A/` collide).
//! - Records are only added after a successful claim and only removed by
//!   [`PollerLifecycleTracker::teardown_all`].

use super::directory::PARAM_OUTBOX_DIRECTORY;
use super::factory::{ModuleContext, ModuleFactories};
use crate::component::{
    ComponentError, Processor, ProcessorModule, TeardownError, destroy_isolated,
};
use as2_core::ModuleSpec;
use as2_core::paths::normalize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// A directory is already claimed by another partnership's poller
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "{} is already polled by partnership {existing_partnership} (configured in {existing_config_source})",
    .directory.display()
)]
pub struct DuplicateDirectoryError {
    pub directory: PathBuf,
    pub existing_partnership: String,
    pub existing_config_source: String,
}

/// A poller was rejected because of a directory conflict.
///
/// The conflict is the error source. If destroying the rejected poller also
/// failed, that failure travels alongside instead of being dropped.
#[derive(Debug, Error)]
#[error(
    "partnership {partnership} cannot be loaded because there is a configuration error{}",
    cleanup_note(.cleanup_failure)
)]
pub struct PollerConfigError {
    pub partnership: String,
    pub config_source: String,
    #[source]
    pub conflict: DuplicateDirectoryError,
    pub cleanup_failure: Option<ComponentError>,
}

fn cleanup_note(cleanup: &Option<ComponentError>) -> String {
    match cleanup {
        Some(e) => format!(" (destroying the rejected poller also failed: {e})"),
        None => String::new(),
    }
}

/// Why a poller could not be loaded
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to construct {module_type} module for partnership {partnership}")]
    Construct {
        partnership: String,
        module_type: String,
        #[source]
        source: ComponentError,
    },

    #[error("{module_type} module for partnership {partnership} has no `outboxdir` parameter")]
    MissingOutputDirectory {
        partnership: String,
        module_type: String,
    },

    #[error(transparent)]
    Config(#[from] PollerConfigError),
}

/// Tracking metadata for one running poller
pub struct PollerRecord {
    pub output_directory: PathBuf,
    pub partnership_name: String,
    /// Where the poller's configuration came from, for diagnostics
    pub config_source: String,
    pub poller: Arc<dyn ProcessorModule>,
}

impl std::fmt::Debug for PollerRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollerRecord")
            .field("output_directory", &self.output_directory)
            .field("partnership_name", &self.partnership_name)
            .field("config_source", &self.config_source)
            .field("poller", &self.poller.name())
            .finish()
    }
}

/// Maps claimed output directories to the pollers watching them
#[derive(Debug, Default)]
pub struct PollerLifecycleTracker {
    records: BTreeMap<PathBuf, PollerRecord>,
}

impl PollerLifecycleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check that `directory` is free. Never mutates the table.
    ///
    /// # Errors
    ///
    /// Returns the original claimant's partnership and config source if the
    /// directory is already tracked.
    pub fn claim(
        &self,
        directory: &Path,
        partnership: &str,
        config_source: &str,
    ) -> Result<(), DuplicateDirectoryError> {
        let key = normalize(directory);
        match self.records.get(&key) {
            Some(existing) => Err(DuplicateDirectoryError {
                directory: key,
                existing_partnership: existing.partnership_name.clone(),
                existing_config_source: existing.config_source.clone(),
            }),
            None => {
                debug!(
                    "Directory {} is free for partnership {} ({})",
                    key.display(),
                    partnership,
                    config_source
                );
                Ok(())
            }
        }
    }

    /// Construct a poller from `spec`, claim its outbox and hand it to the
    /// processor.
    ///
    /// On any failure after construction the new poller is destroyed before
    /// the error is returned. The caller decides whether the failure aborts
    /// the surrounding configuration load.
    pub fn load_poller(
        &mut self,
        spec: &ModuleSpec,
        partnership: &str,
        config_source: &str,
        processor: &dyn Processor,
        factories: &ModuleFactories,
        ctx: &ModuleContext,
    ) -> Result<(), LoadError> {
        let poller = factories
            .create(spec, ctx)
            .map_err(|source| LoadError::Construct {
                partnership: partnership.to_string(),
                module_type: spec.module_type.clone(),
                source,
            })?;

        let Some(raw_dir) = poller.parameter(PARAM_OUTBOX_DIRECTORY) else {
            if let Err(e) = destroy_isolated(poller.as_ref()) {
                warn!("Failed to destroy poller {} without outbox: {}", poller.name(), e);
            }
            return Err(LoadError::MissingOutputDirectory {
                partnership: partnership.to_string(),
                module_type: spec.module_type.clone(),
            });
        };
        let directory = normalize(raw_dir);

        if let Err(conflict) = self.claim(&directory, partnership, config_source) {
            let cleanup_failure = destroy_isolated(poller.as_ref()).err();
            let err = PollerConfigError {
                partnership: partnership.to_string(),
                config_source: config_source.to_string(),
                conflict,
                cleanup_failure,
            };
            error!("{}", err);
            return Err(err.into());
        }

        processor.add_module(Arc::clone(&poller));
        info!(
            "Tracking poller {} for partnership {} on {} (from {})",
            poller.name(),
            partnership,
            directory.display(),
            config_source
        );
        self.records.insert(
            directory.clone(),
            PollerRecord {
                output_directory: directory,
                partnership_name: partnership.to_string(),
                config_source: config_source.to_string(),
                poller,
            },
        );
        Ok(())
    }

    /// Destroy every tracked poller and empty the table.
    ///
    /// Each failure is collected and the loop moves on; a failing poller never
    /// prevents attempts on the rest. Each `destroy()` runs to completion with
    /// no timeout.
    pub fn teardown_all(&mut self) -> Vec<TeardownError> {
        let records = std::mem::take(&mut self.records);
        info!("Stopping {} partnership poller(s)", records.len());

        let mut failures = Vec::new();
        for (directory, record) in records {
            match destroy_isolated(record.poller.as_ref()) {
                Ok(()) => debug!(
                    "Stopped poller for {} on {}",
                    record.partnership_name,
                    directory.display()
                ),
                Err(cause) => {
                    error!(
                        "Failed to stop a partnership poller for directory {}: {:?}: {}",
                        directory.display(),
                        record,
                        cause
                    );
                    failures.push(TeardownError::Poller {
                        directory,
                        partnership: record.partnership_name,
                        cause,
                    });
                }
            }
        }
        failures
    }

    /// Tracked records in sorted directory order
    pub fn records(&self) -> impl Iterator<Item = &PollerRecord> {
        self.records.values()
    }

    pub fn get(&self, directory: &Path) -> Option<&PollerRecord> {
        self.records.get(&normalize(directory))
    }

    /// Claimed directories in sorted order
    pub fn directories(&self) -> Vec<&Path> {
        self.records.keys().map(PathBuf::as_path).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

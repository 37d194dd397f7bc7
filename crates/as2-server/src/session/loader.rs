//! Builds a ready-to-start session from resolved configuration.

use super::lifecycle::{InitError, Session, SessionError};
use crate::component::PROCESSOR_ID;
use crate::poller::{ModuleFactories, OutboundSender};
use crate::processor::DefaultProcessor;
use as2_core::{PollerErrorPolicy, ResolvedConfig};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Configuration load errors
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("failed to initialize session")]
    Init(#[from] InitError),

    #[error("failed to load poller for partnership {partnership} from {config_source}")]
    Poller {
        partnership: String,
        config_source: String,
        #[source]
        source: SessionError,
    },
}

/// Construct a session, register the default processor and load every
/// configured partnership poller in declaration order.
///
/// With [`PollerErrorPolicy::Abort`] the first failing entry stops the load;
/// everything loaded so far is torn down before the error is returned. With
/// [`PollerErrorPolicy::Skip`] the entry is logged and left out.
pub fn load_session(
    config: &ResolvedConfig,
    factories: ModuleFactories,
    outbound: Option<OutboundSender>,
) -> Result<Session, LoaderError> {
    let mut session = Session::builder(&config.base_dir)
        .factories(factories)
        .outbound(outbound)
        .build()?;

    session.register_component(PROCESSOR_ID, Arc::new(DefaultProcessor::new()));

    let mut skipped = 0;
    for entry in &config.partnerships {
        let Some(spec) = &entry.partnership.poller else {
            continue;
        };
        let name = &entry.partnership.name;

        if let Err(e) = session.load_poller(spec, name, &entry.source) {
            match config.server.on_poller_error {
                PollerErrorPolicy::Skip => {
                    warn!("Skipping poller for partnership {}: {}", name, e);
                    skipped += 1;
                }
                PollerErrorPolicy::Abort => {
                    error!("Aborting configuration load at partnership {}: {}", name, e);
                    match session.stop() {
                        Ok(report) if !report.is_clean() => warn!(
                            "{} failure(s) while unwinding the aborted load",
                            report.failures.len()
                        ),
                        Ok(_) => {}
                        Err(stop_err) => warn!("Could not unwind aborted load: {}", stop_err),
                    }
                    return Err(LoaderError::Poller {
                        partnership: name.clone(),
                        config_source: entry.source.clone(),
                        source: e,
                    });
                }
            }
        }
    }

    info!(
        "Loaded {} partnership poller(s), skipped {}",
        session.pollers().len(),
        skipped
    );
    Ok(session)
}

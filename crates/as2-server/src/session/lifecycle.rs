//! Session lifecycle: init, start, stop.
//!
//! ```text
//! Uninitialized → Initialized → Running → Stopped
//!                      └──────────────────────┘ (abnormal shutdown)
//! ```
//!
//! There is no way back to an earlier state. `start()` is only accepted from
//! `Initialized`, and `stop()` from `Initialized` or `Running`; a second
//! `stop()` is rejected with [`SessionError::InvalidState`].

use super::content_types::{self, ContentTypeError};
use crate::component::{
    CERTIFICATE_FACTORY_ID, Component, ComponentError, ComponentRegistry, PARTNERSHIP_FACTORY_ID,
    Processor, RegistryError, TeardownError, destroy_isolated,
};
use crate::poller::{LoadError, ModuleContext, ModuleFactories, OutboundSender, PollerLifecycleTracker};
use as2_core::ModuleSpec;
use as2_core::paths::resolve_against;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initialized,
    Running,
    Stopped,
}

/// Fatal errors while constructing a session
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("failed to register content type handlers: {0}")]
    ContentTypes(#[from] ContentTypeError),

    #[error("base directory {} is not accessible: {source}", .path.display())]
    BaseDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("base directory {} is not a directory", .0.display())]
    NotADirectory(PathBuf),
}

/// Session operation errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("cannot {operation} a session in state {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("failed to start active modules")]
    Start(#[source] ComponentError),

    #[error(transparent)]
    Load(#[from] LoadError),
}

/// Outcome of [`Session::stop`]
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// Pollers whose `destroy()` succeeded
    pub pollers_stopped: usize,
    /// Registry components whose `destroy()` succeeded
    pub components_destroyed: usize,
    /// Every failure from both teardown phases, pollers first
    pub failures: Vec<TeardownError>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Builder for [`Session`]
pub struct SessionBuilder {
    base_dir: PathBuf,
    factories: ModuleFactories,
    outbound: Option<OutboundSender>,
}

impl SessionBuilder {
    /// Module factory table used by [`Session::load_poller`].
    /// Defaults to [`ModuleFactories::with_builtins`].
    pub fn factories(mut self, factories: ModuleFactories) -> Self {
        self.factories = factories;
        self
    }

    /// Channel that receives files pollers find ready to send
    pub fn outbound(mut self, outbound: Option<OutboundSender>) -> Self {
        self.outbound = outbound;
        self
    }

    /// Construct the session and run `init()`.
    ///
    /// # Errors
    ///
    /// Any [`InitError`] is fatal: no session is returned.
    pub fn build(self) -> Result<Session, InitError> {
        let mut session = Session {
            state: SessionState::Uninitialized,
            base_dir: self.base_dir,
            registry: ComponentRegistry::new(),
            pollers: PollerLifecycleTracker::new(),
            factories: self.factories,
            outbound: self.outbound,
        };
        session.init()?;
        Ok(session)
    }
}

/// Owns the component registry and the poller table of one server process
pub struct Session {
    state: SessionState,
    base_dir: PathBuf,
    registry: ComponentRegistry,
    pollers: PollerLifecycleTracker,
    factories: ModuleFactories,
    outbound: Option<OutboundSender>,
}

impl Session {
    pub fn builder(base_dir: impl Into<PathBuf>) -> SessionBuilder {
        SessionBuilder {
            base_dir: base_dir.into(),
            factories: ModuleFactories::with_builtins(),
            outbound: None,
        }
    }

    /// Shorthand for `Session::builder(base_dir).build()`
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self, InitError> {
        Self::builder(base_dir).build()
    }

    fn init(&mut self) -> Result<(), InitError> {
        content_types::register_defaults()?;

        let metadata = std::fs::metadata(&self.base_dir).map_err(|source| {
            InitError::BaseDirectory {
                path: self.base_dir.clone(),
                source,
            }
        })?;
        if !metadata.is_dir() {
            return Err(InitError::NotADirectory(self.base_dir.clone()));
        }
        self.base_dir = std::fs::canonicalize(&self.base_dir).map_err(|source| {
            InitError::BaseDirectory {
                path: self.base_dir.clone(),
                source,
            }
        })?;

        self.state = SessionState::Initialized;
        info!("Session initialized (base directory {})", self.base_dir.display());
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Canonical base directory
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolve a configured path against the base directory
    pub fn resolve_path(&self, path: impl AsRef<Path>) -> PathBuf {
        resolve_against(&self.base_dir, path)
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ComponentRegistry {
        &mut self.registry
    }

    pub fn pollers(&self) -> &PollerLifecycleTracker {
        &self.pollers
    }

    /// Register a component; see [`ComponentRegistry::register`]
    pub fn register_component(
        &mut self,
        id: impl Into<String>,
        component: Arc<dyn Component>,
    ) -> Option<Arc<dyn Component>> {
        self.registry.register(id, component)
    }

    pub fn component(&self, id: &str) -> Result<Arc<dyn Component>, RegistryError> {
        self.registry.get(id)
    }

    pub fn certificate_factory(&self) -> Result<Arc<dyn Component>, RegistryError> {
        self.registry.get(CERTIFICATE_FACTORY_ID)
    }

    pub fn partnership_factory(&self) -> Result<Arc<dyn Component>, RegistryError> {
        self.registry.get(PARTNERSHIP_FACTORY_ID)
    }

    pub fn processor(&self) -> Result<Arc<dyn Processor>, RegistryError> {
        self.registry.processor()
    }

    /// Load one partnership poller. Only valid before `start()`.
    ///
    /// The processor is looked up first so that nothing is constructed when
    /// it is missing.
    pub fn load_poller(
        &mut self,
        spec: &ModuleSpec,
        partnership: &str,
        config_source: &str,
    ) -> Result<(), SessionError> {
        self.expect_state("load a poller into", &[SessionState::Initialized])?;
        let processor = self.registry.processor()?;
        let ctx = ModuleContext {
            base_dir: self.base_dir.clone(),
            partnership: partnership.to_string(),
            outbound: self.outbound.clone(),
        };
        self.pollers.load_poller(
            spec,
            partnership,
            config_source,
            processor.as_ref(),
            &self.factories,
            &ctx,
        )?;
        Ok(())
    }

    /// Activate every registered module through the processor.
    pub fn start(&mut self) -> Result<(), SessionError> {
        self.expect_state("start", &[SessionState::Initialized])?;
        let processor = self.registry.processor()?;
        processor.start_active_modules().map_err(|e| {
            error!("Session start failed: {}", e);
            SessionError::Start(e)
        })?;
        self.state = SessionState::Running;
        info!(
            "Session running: {} component(s), {} poller(s)",
            self.registry.len(),
            self.pollers.len()
        );
        Ok(())
    }

    /// Tear everything down: pollers first, then every registered component.
    ///
    /// Pollers are detached from the processor before the poller table tears
    /// them down, so each one is destroyed exactly once. Failures are
    /// collected into the report and never interrupt the teardown; only an
    /// out-of-order call is an error.
    pub fn stop(&mut self) -> Result<ShutdownReport, SessionError> {
        self.expect_state("stop", &[SessionState::Initialized, SessionState::Running])?;
        info!("Session stopping");

        if let Ok(processor) = self.registry.processor() {
            for record in self.pollers.records() {
                processor.remove_module(&record.poller);
            }
        }

        let poller_count = self.pollers.len();
        let mut failures = self.pollers.teardown_all();
        let pollers_stopped = poller_count - failures.len();

        let components = self.registry.drain();
        let mut components_destroyed = 0;
        for (id, component) in components {
            match destroy_isolated(component.as_ref()) {
                Ok(()) => components_destroyed += 1,
                Err(cause) => {
                    error!("Failed to destroy component {}: {}", id, cause);
                    failures.push(TeardownError::Component { id, cause });
                }
            }
        }

        self.state = SessionState::Stopped;

        let report = ShutdownReport {
            pollers_stopped,
            components_destroyed,
            failures,
        };
        if report.is_clean() {
            info!(
                "Session stopped: {} poller(s), {} component(s)",
                report.pollers_stopped, report.components_destroyed
            );
        } else {
            warn!(
                "Session stopped with {} failure(s): {} poller(s), {} component(s)",
                report.failures.len(),
                report.pollers_stopped,
                report.components_destroyed
            );
        }
        Ok(report)
    }

    fn expect_state(
        &self,
        operation: &'static str,
        allowed: &[SessionState],
    ) -> Result<(), SessionError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("base_dir", &self.base_dir)
            .field("registry", &self.registry)
            .field("pollers", &self.pollers)
            .finish()
    }
}

//! Default processor: owns the module collection and activates it.

use crate::component::{
    Component, ComponentError, PROCESSOR_ID, Processor, ProcessorModule, destroy_isolated,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{error, info};

/// Processor holding modules in insertion order.
#[derive(Default)]
pub struct DefaultProcessor {
    modules: Mutex<Vec<Arc<dyn ProcessorModule>>>,
}

impl DefaultProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<dyn ProcessorModule>>> {
        // A panic while holding the lock leaves the Vec itself intact.
        self.modules.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Component for DefaultProcessor {
    fn name(&self) -> &str {
        PROCESSOR_ID
    }

    /// Destroys every module, continuing past failures, then empties the
    /// collection. The first failure is reported with the total count.
    fn destroy(&self) -> Result<(), ComponentError> {
        let modules: Vec<_> = self.lock().drain(..).collect();
        let total = modules.len();
        let mut failures = Vec::new();

        for module in modules {
            if let Err(e) = destroy_isolated(module.as_ref()) {
                error!("Module {} failed to stop: {}", module.name(), e);
                failures.push(e);
            }
        }

        info!(
            "Processor destroyed {} module(s), {} failure(s)",
            total,
            failures.len()
        );

        let count = failures.len();
        match failures.into_iter().next() {
            None => Ok(()),
            Some(first) => Err(ComponentError::Destroy {
                component: PROCESSOR_ID.to_string(),
                message: format!("{count} of {total} module(s) failed to stop"),
                source: Some(Box::new(first)),
            }),
        }
    }

    fn into_processor(self: Arc<Self>) -> Option<Arc<dyn Processor>> {
        Some(self)
    }
}

impl Processor for DefaultProcessor {
    fn add_module(&self, module: Arc<dyn ProcessorModule>) {
        self.lock().push(module);
    }

    fn modules(&self) -> Vec<Arc<dyn ProcessorModule>> {
        self.lock().clone()
    }

    fn remove_module(&self, module: &Arc<dyn ProcessorModule>) -> bool {
        let mut modules = self.lock();
        let before = modules.len();
        modules.retain(|m| !std::ptr::addr_eq(Arc::as_ptr(m), Arc::as_ptr(module)));
        modules.len() != before
    }

    /// Starts active modules in insertion order and stops at the first
    /// failure. Modules already started stay running; session stop tears
    /// them down.
    fn start_active_modules(&self) -> Result<(), ComponentError> {
        let modules = self.modules();
        let active: Vec<_> = modules.iter().filter(|m| m.is_active()).collect();
        info!("Starting {} active module(s)", active.len());

        for module in active {
            module.start().map_err(|e| ComponentError::Start {
                component: module.name().to_string(),
                message: "active module failed to start".to_string(),
                source: Some(Box::new(e)),
            })?;
            info!("Module {} started", module.name());
        }
        Ok(())
    }
}

use super::ComponentError;
use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// A named, independently lifecycled unit held by the session registry.
///
/// Lifecycle: registered → (used) → destroy()
pub trait Component: Send + Sync {
    /// Human-readable name used in logs and errors.
    fn name(&self) -> &str;

    /// Release every resource the component holds.
    ///
    /// Must be synchronous: background activity has stopped when this
    /// returns. Implementations must tolerate being called more than once.
    fn destroy(&self) -> Result<(), ComponentError>;

    /// Typed view used for processor lookups. Default: not a processor.
    fn into_processor(self: Arc<Self>) -> Option<Arc<dyn Processor>> {
        None
    }
}

/// A module owned by the processor, e.g. a directory poller.
pub trait ProcessorModule: Component {
    /// Configuration parameters, already flattened to strings.
    fn parameters(&self) -> &BTreeMap<String, String>;

    fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters().get(key).map(String::as_str)
    }

    /// Active modules run background work once started.
    fn is_active(&self) -> bool {
        false
    }

    /// Begin background activity. Only called for active modules.
    fn start(&self) -> Result<(), ComponentError> {
        Ok(())
    }
}

/// The component that owns every processor module and activates them.
pub trait Processor: Component {
    /// Append a module to the ordered module collection.
    fn add_module(&self, module: Arc<dyn ProcessorModule>);

    /// Snapshot of the module collection in insertion order.
    fn modules(&self) -> Vec<Arc<dyn ProcessorModule>>;

    /// Drop `module` from the collection without destroying it. Returns
    /// whether it was present.
    fn remove_module(&self, module: &Arc<dyn ProcessorModule>) -> bool;

    /// Start every active module, in order.
    fn start_active_modules(&self) -> Result<(), ComponentError>;
}

/// Call `destroy()` and turn a panic into a [`ComponentError::Panicked`],
/// so one misbehaving component cannot abort a teardown loop.
pub fn destroy_isolated<C: Component + ?Sized>(component: &C) -> Result<(), ComponentError> {
    match catch_unwind(AssertUnwindSafe(|| component.destroy())) {
        Ok(result) => result,
        Err(_) => Err(ComponentError::Panicked(format!(
            "{} during destroy",
            component.name()
        ))),
    }
}

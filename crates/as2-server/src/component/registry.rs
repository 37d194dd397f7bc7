use super::{Component, PROCESSOR_ID, Processor};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry lookup errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("component not found: {0}")]
    ComponentNotFound(String),

    #[error("component {id} is not a {expected}")]
    ComponentTypeMismatch { id: String, expected: &'static str },
}

/// Maps component ids to component instances.
///
/// Once registered, a component belongs to the registry: the session drains
/// and destroys every entry on stop.
#[derive(Default)]
pub struct ComponentRegistry {
    components: HashMap<String, Arc<dyn Component>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self {
            components: HashMap::new(),
        }
    }

    /// Register a component under `id`, silently replacing any previous entry.
    ///
    /// The replaced component is handed back, not destroyed; the caller decides
    /// whether it needs releasing.
    pub fn register(
        &mut self,
        id: impl Into<String>,
        component: Arc<dyn Component>,
    ) -> Option<Arc<dyn Component>> {
        self.components.insert(id.into(), component)
    }

    /// Look up a component by exact id
    pub fn get(&self, id: &str) -> Result<Arc<dyn Component>, RegistryError> {
        self.components
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::ComponentNotFound(id.to_string()))
    }

    /// The component registered under [`PROCESSOR_ID`], viewed as a processor
    pub fn processor(&self) -> Result<Arc<dyn Processor>, RegistryError> {
        self.get(PROCESSOR_ID)?
            .into_processor()
            .ok_or_else(|| RegistryError::ComponentTypeMismatch {
                id: PROCESSOR_ID.to_string(),
                expected: "processor",
            })
    }

    /// Snapshot of every (id, component) pair. Order is unspecified.
    pub fn all(&self) -> Vec<(String, Arc<dyn Component>)> {
        self.components
            .iter()
            .map(|(id, c)| (id.clone(), Arc::clone(c)))
            .collect()
    }

    /// Remove and return every entry, leaving the registry empty
    pub fn drain(&mut self) -> Vec<(String, Arc<dyn Component>)> {
        self.components.drain().collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.components.contains_key(id)
    }

    /// Registered ids, sorted
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.components.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Number of registered components
    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentError;
    use crate::processor::DefaultProcessor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingComponent {
        name: String,
        destroyed: AtomicUsize,
    }

    impl CountingComponent {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                destroyed: AtomicUsize::new(0),
            }
        }
    }

    impl Component for CountingComponent {
        fn name(&self) -> &str {
            &self.name
        }

        fn destroy(&self) -> Result<(), ComponentError> {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_registry_new() {
        let registry = ComponentRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_get_unregistered_id_fails() {
        let registry = ComponentRegistry::new();
        let err = registry.get("certificatefactory").err().unwrap();
        assert_eq!(
            err,
            RegistryError::ComponentNotFound("certificatefactory".to_string())
        );
    }

    #[test]
    fn test_register_then_get_returns_same_component() {
        let mut registry = ComponentRegistry::new();
        let component: Arc<dyn Component> = Arc::new(CountingComponent::new("certs"));

        registry.register("certificatefactory", Arc::clone(&component));

        let fetched = registry.get("certificatefactory").unwrap();
        assert!(Arc::ptr_eq(&fetched, &component));
        assert!(registry.contains("certificatefactory"));
    }

    #[test]
    fn test_get_is_exact_match_only() {
        let mut registry = ComponentRegistry::new();
        registry.register("processor", Arc::new(CountingComponent::new("p")));

        assert!(registry.get("Processor").is_err());
        assert!(registry.get("proc").is_err());
        assert!(registry.get("processor ").is_err());
    }

    #[test]
    fn test_reregister_overwrites_without_destroying() {
        let mut registry = ComponentRegistry::new();
        let first = Arc::new(CountingComponent::new("first"));
        let second: Arc<dyn Component> = Arc::new(CountingComponent::new("second"));

        assert!(registry.register("x", first.clone()).is_none());
        let replaced = registry.register("x", Arc::clone(&second)).unwrap();

        assert_eq!(replaced.name(), "first");
        assert_eq!(first.destroyed.load(Ordering::SeqCst), 0);
        assert_eq!(registry.len(), 1);
        assert!(Arc::ptr_eq(&registry.get("x").unwrap(), &second));
    }

    #[test]
    fn test_all_and_drain() {
        let mut registry = ComponentRegistry::new();
        registry.register("a", Arc::new(CountingComponent::new("a")));
        registry.register("b", Arc::new(CountingComponent::new("b")));

        let mut ids: Vec<String> = registry.all().into_iter().map(|(id, _)| id).collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(registry.len(), 2, "all() must not consume entries");

        let drained = registry.drain();
        assert_eq!(drained.len(), 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_processor_lookup() {
        let mut registry = ComponentRegistry::new();
        assert_eq!(
            registry.processor().err().unwrap(),
            RegistryError::ComponentNotFound(PROCESSOR_ID.to_string())
        );

        registry.register(PROCESSOR_ID, Arc::new(CountingComponent::new("fake")));
        assert!(matches!(
            registry.processor().err().unwrap(),
            RegistryError::ComponentTypeMismatch { .. }
        ));

        registry.register(PROCESSOR_ID, Arc::new(DefaultProcessor::new()));
        assert!(registry.processor().unwrap().modules().is_empty());
    }
}

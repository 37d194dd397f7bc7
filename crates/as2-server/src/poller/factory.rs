//! Module factory table: declared module type name → constructor.

use super::directory::{self, DirectoryPoller};
use crate::component::{ComponentError, ProcessorModule};
use as2_core::ModuleSpec;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A file in a partnership outbox that has stopped growing and is ready to
/// be handed to the AS2 sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFile {
    pub partnership: String,
    pub path: PathBuf,
    pub size: u64,
    pub detected_at: DateTime<Utc>,
}

/// Channel pollers use to hand off ready files
pub type OutboundSender = mpsc::UnboundedSender<OutboundFile>;

/// Everything a module constructor may need besides its own spec
#[derive(Debug, Clone)]
pub struct ModuleContext {
    /// Session base directory, for resolving relative parameters
    pub base_dir: PathBuf,
    /// Partnership the module is being built for
    pub partnership: String,
    /// Where ready outbound files go; `None` means log only
    pub outbound: Option<OutboundSender>,
}

/// A factory function that creates a processor module instance
pub type FactoryFn = Arc<
    dyn Fn(&ModuleSpec, &ModuleContext) -> Result<Arc<dyn ProcessorModule>, ComponentError>
        + Send
        + Sync,
>;

/// A factory that can create a processor module instance
#[derive(Clone)]
pub struct ModuleFactory {
    /// Module type name as written in config, e.g. "directory_poller"
    pub name: String,
    /// Human-readable description
    pub description: String,
    pub create: FactoryFn,
}

impl std::fmt::Debug for ModuleFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleFactory")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("create", &"<factory_fn>")
            .finish()
    }
}

/// Registry of module constructors, resolved once at startup.
#[derive(Debug, Clone, Default)]
pub struct ModuleFactories {
    factories: HashMap<String, ModuleFactory>,
}

impl ModuleFactories {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Table with every module type shipped in this crate
    pub fn with_builtins() -> Self {
        let mut table = Self::new();
        table.register(ModuleFactory {
            name: directory::MODULE_TYPE.to_string(),
            description: "Watches a partnership outbox for files to send".to_string(),
            create: Arc::new(|spec: &ModuleSpec, ctx: &ModuleContext| {
                let poller = DirectoryPoller::from_spec(spec, ctx)?;
                Ok(Arc::new(poller) as Arc<dyn ProcessorModule>)
            }),
        });
        table
    }

    /// Register a factory, replacing any existing one with the same name
    pub fn register(&mut self, factory: ModuleFactory) {
        self.factories.insert(factory.name.clone(), factory);
    }

    /// Build a module from its spec
    ///
    /// # Errors
    ///
    /// Returns `ComponentError::UnknownModuleType` if no factory is registered
    /// for `spec.module_type`, or whatever the factory itself returns.
    pub fn create(
        &self,
        spec: &ModuleSpec,
        ctx: &ModuleContext,
    ) -> Result<Arc<dyn ProcessorModule>, ComponentError> {
        let factory = self
            .factories
            .get(&spec.module_type)
            .ok_or_else(|| ComponentError::UnknownModuleType(spec.module_type.clone()))?;

        (factory.create)(spec, ctx)
    }

    /// List registered module type names
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ModuleContext {
        ModuleContext {
            base_dir: PathBuf::from("/srv/as2"),
            partnership: "acme".to_string(),
            outbound: None,
        }
    }

    #[test]
    fn test_new_table_is_empty() {
        let table = ModuleFactories::new();
        assert!(table.is_empty());
        assert!(table.list().is_empty());
    }

    #[test]
    fn test_builtins_include_directory_poller() {
        let table = ModuleFactories::with_builtins();
        assert!(table.contains("directory_poller"));
        assert_eq!(table.list(), vec!["directory_poller"]);
    }

    #[test]
    fn test_unknown_module_type() {
        let table = ModuleFactories::with_builtins();
        let spec = ModuleSpec::new("ftp_poller").with_param("outboxdir", "/out");

        let err = table.create(&spec, &ctx()).err().unwrap();
        assert!(matches!(err, ComponentError::UnknownModuleType(ref t) if t == "ftp_poller"));
    }

    #[test]
    fn test_create_directory_poller() {
        let table = ModuleFactories::with_builtins();
        let spec = ModuleSpec::new("directory_poller").with_param("outboxdir", "outbox/acme");

        let module = table.create(&spec, &ctx()).unwrap();
        assert!(module.is_active());
        assert_eq!(module.parameter("outboxdir"), Some("/srv/as2/outbox/acme"));
        module.destroy().unwrap();
    }

    #[test]
    fn test_register_replaces_existing() {
        let mut table = ModuleFactories::with_builtins();
        table.register(ModuleFactory {
            name: "directory_poller".to_string(),
            description: "replacement".to_string(),
            create: Arc::new(
                |_spec: &ModuleSpec,
                 _ctx: &ModuleContext|
                 -> Result<Arc<dyn ProcessorModule>, ComponentError> {
                    Err(ComponentError::UnknownModuleType("disabled".to_string()))
                },
            ),
        });

        assert_eq!(table.len(), 1);
        let spec = ModuleSpec::new("directory_poller").with_param("outboxdir", "/out");
        assert!(table.create(&spec, &ctx()).is_err());
    }
}

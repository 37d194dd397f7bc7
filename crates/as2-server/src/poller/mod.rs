pub mod directory;
pub mod factory;
pub mod tracker;

pub use directory::DirectoryPoller;
pub use factory::{
    FactoryFn, ModuleContext, ModuleFactories, ModuleFactory, OutboundFile, OutboundSender,
};
pub use tracker::{
    DuplicateDirectoryError, LoadError, PollerConfigError, PollerLifecycleTracker, PollerRecord,
};

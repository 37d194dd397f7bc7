pub mod registry;
pub mod traits;
pub mod types;

pub use registry::{ComponentRegistry, RegistryError};
pub use traits::{Component, Processor, ProcessorModule, destroy_isolated};
pub use types::{
    CERTIFICATE_FACTORY_ID, ComponentError, PARTNERSHIP_FACTORY_ID, PROCESSOR_ID, TeardownError,
};

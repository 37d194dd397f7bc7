use std::path::PathBuf;

/// Well-known id of the certificate store component
pub const CERTIFICATE_FACTORY_ID: &str = "certificatefactory";
/// Well-known id of the partnership factory component
pub const PARTNERSHIP_FACTORY_ID: &str = "partnershipfactory";
/// Well-known id of the processor component
pub const PROCESSOR_ID: &str = "processor";

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Component and module errors with structured variants
#[derive(Debug, thiserror::Error)]
pub enum ComponentError {
    #[error("missing required parameter `{0}`")]
    MissingParameter(String),

    #[error("invalid value {value:?} for parameter `{name}`: {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("unknown module type `{0}`")]
    UnknownModuleType(String),

    #[error("{component} failed to start: {message}")]
    Start {
        component: String,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("{component} failed to stop cleanly: {message}")]
    Destroy {
        component: String,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("{0} panicked")]
    Panicked(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A single failure collected during best-effort teardown.
///
/// Teardown never stops at the first failure; callers get the full list.
#[derive(Debug, thiserror::Error)]
pub enum TeardownError {
    #[error("failed to stop poller for partnership {partnership} on {}: {cause}", .directory.display())]
    Poller {
        directory: PathBuf,
        partnership: String,
        #[source]
        cause: ComponentError,
    },

    #[error("failed to destroy component {id}: {cause}")]
    Component {
        id: String,
        #[source]
        cause: ComponentError,
    },
}

impl TeardownError {
    /// The underlying failure.
    pub fn cause(&self) -> &ComponentError {
        match self {
            TeardownError::Poller { cause, .. } | TeardownError::Component { cause, .. } => cause,
        }
    }
}

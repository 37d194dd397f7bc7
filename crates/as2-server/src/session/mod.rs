pub mod content_types;
pub mod lifecycle;
pub mod loader;

pub use lifecycle::{InitError, Session, SessionBuilder, SessionError, SessionState, ShutdownReport};
pub use loader::{LoaderError, load_session};

//! AS2 server session management
//!
//! The [`session::Session`] owns every long-lived piece of a running server:
//! a registry of named components (certificate store, partnership factory,
//! processor) and a table of partnership outbox pollers. It refuses pollers
//! that would watch an already-claimed directory and tears everything down
//! best-effort on shutdown, reporting each failure instead of stopping at the
//! first one.

pub mod component;
pub mod poller;
pub mod processor;
pub mod session;

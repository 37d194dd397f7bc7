//! Process-wide content-type handler table.
//!
//! Message parsing looks up a handler by MIME type. The handlers the server
//! needs must be registered before any message is parsed, once per process.

use std::collections::HashMap;
use std::sync::{OnceLock, PoisonError, RwLock};
use tracing::debug;

/// MIME type of AS2 message disposition notifications (MDNs)
pub const DISPOSITION_NOTIFICATION: &str = "message/disposition-notification";

/// Handler that decodes disposition notification bodies
pub const DISPOSITION_HANDLER: &str = "as2.disposition-notification";

static TABLE: OnceLock<RwLock<HashMap<String, &'static str>>> = OnceLock::new();
static DEFAULTS: OnceLock<Result<(), ContentTypeError>> = OnceLock::new();

/// Content-type registration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContentTypeError {
    #[error("invalid content type {0:?}: expected type/subtype")]
    Invalid(String),

    #[error("content type {content_type} is already handled by {existing}, refusing {requested}")]
    Conflict {
        content_type: String,
        existing: &'static str,
        requested: &'static str,
    },
}

fn table() -> &'static RwLock<HashMap<String, &'static str>> {
    TABLE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Lowercase `type/subtype` with parameters stripped
fn canonical(content_type: &str) -> Result<String, ContentTypeError> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.split_once('/') {
        Some((ty, sub)) if !ty.is_empty() && !sub.is_empty() && !sub.contains('/') => Ok(essence),
        _ => Err(ContentTypeError::Invalid(content_type.to_string())),
    }
}

/// Register `handler` for `content_type`.
///
/// Registering the same handler again is accepted; a different handler for
/// an already-handled type is a conflict.
pub fn register_handler(
    content_type: &str,
    handler: &'static str,
) -> Result<(), ContentTypeError> {
    let key = canonical(content_type)?;
    let mut table = table().write().unwrap_or_else(PoisonError::into_inner);
    match table.get(&key) {
        Some(existing) if *existing == handler => Ok(()),
        Some(existing) => Err(ContentTypeError::Conflict {
            content_type: key,
            existing: *existing,
            requested: handler,
        }),
        None => {
            debug!("Registered content handler {} for {}", handler, key);
            table.insert(key, handler);
            Ok(())
        }
    }
}

/// Handler registered for `content_type`, parameters ignored
pub fn handler_for(content_type: &str) -> Option<&'static str> {
    let key = canonical(content_type).ok()?;
    table()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&key)
        .copied()
}

/// Register the server's built-in handlers. Runs once per process; later
/// calls return the first outcome.
pub fn register_defaults() -> Result<(), ContentTypeError> {
    DEFAULTS
        .get_or_init(|| register_handler(DISPOSITION_NOTIFICATION, DISPOSITION_HANDLER))
        .clone()
}

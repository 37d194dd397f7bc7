//! Base-directory relative path handling.
//!
//! Configuration values may reference the server base directory with the
//! `%home%` token, e.g. `outboxdir = "%home%/outbox/acme"`. Relative paths that
//! remain after substitution are resolved against the base directory.

use std::path::{Path, PathBuf};

/// Token replaced with the base directory in configuration values.
pub const HOME_TOKEN: &str = "%home%";

/// Replace every `%home%` token in `value` with `base_dir`.
pub fn substitute_home(value: &str, base_dir: &Path) -> String {
    if !value.contains(HOME_TOKEN) {
        return value.to_string();
    }
    value.replace(HOME_TOKEN, &base_dir.to_string_lossy())
}

/// Resolve `path` against `base_dir` unless it is already absolute.
pub fn resolve_against(base_dir: &Path, path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

/// Lexically normalize a path so that spellings of the same directory compare
/// equal: trailing separators and `.` segments are dropped.
///
/// Symlinks and `..` segments are left alone; this never touches the
/// filesystem.
pub fn normalize(path: impl AsRef<Path>) -> PathBuf {
    path.as_ref().components().collect()
}

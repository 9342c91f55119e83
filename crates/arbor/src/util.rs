//! dotted path and key helpers
//!
//! Schema paths are dot separated field names starting at the root record. The empty string is the root itself.

/// Suffix on a defaults key that permits an intentional duplicate
pub const OVERRIDE_SUFFIX: char = '!';

/// Join a parent path and a field name
pub fn join_path(parent: &str, field: &str) -> String {
    if parent.is_empty() {
        field.to_string()
    } else {
        format!("{parent}.{field}")
    }
}

/// Split a path into its segments. The root path has no segments.
pub fn split_path(path: &str) -> Vec<&str> {
    if path.is_empty() {
        vec![]
    } else {
        path.split('.').collect()
    }
}

/// Human readable form of a path
pub fn display_path(path: &str) -> &str {
    if path.is_empty() {
        "<root>"
    } else {
        path
    }
}

pub(crate) trait KeyExt {
    /// Whether the key carries the override marker
    fn is_override(&self) -> bool;
    /// The key without its override marker
    fn base_key(&self) -> &str;
}

impl KeyExt for str {
    fn is_override(&self) -> bool {
        self.ends_with(OVERRIDE_SUFFIX)
    }

    fn base_key(&self) -> &str {
        self.strip_suffix(OVERRIDE_SUFFIX).unwrap_or(self)
    }
}

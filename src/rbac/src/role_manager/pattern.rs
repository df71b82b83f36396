//! Wildcard matching for role names and domains
//!
//! Supported pattern forms:
//! 1. Exact match: `"admin"` matches `"admin"`
//! 2. Universal wildcard: `"*"` matches anything
//! 3. Prefix wildcard: `"book:*"` matches `"book:1"`, `"book:shelf:2"`
//! 4. Suffix wildcard: `"*:viewer"` matches `"document:viewer"`

/// Checks whether `name` matches `pattern`
///
/// Usable directly as a name- or domain-matching predicate.
///
/// # Examples
///
/// ```rust
/// use cretoai_rbac::role_manager::wildcard_match;
///
/// assert!(wildcard_match("tenant1", "*"));
/// assert!(wildcard_match("book:1", "book:*"));
/// assert!(wildcard_match("document:viewer", "*:viewer"));
/// assert!(!wildcard_match("pen:1", "book:*"));
/// ```
pub fn wildcard_match(name: &str, pattern: &str) -> bool {
    if name == pattern || pattern == "*" {
        return true;
    }

    if let Some(prefix) = pattern.strip_suffix(":*") {
        return name
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with(':'));
    }

    if let Some(suffix) = pattern.strip_prefix("*:") {
        return name
            .strip_suffix(suffix)
            .is_some_and(|rest| rest.ends_with(':'));
    }

    false
}

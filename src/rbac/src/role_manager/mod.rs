//! Role inheritance resolution
//!
//! Every manager answers "does `name1` inherit `name2` (in domain `d`)?" over a
//! name-indexed role graph. The variants differ only in which capabilities they
//! switch on:
//!
//! - [`DefaultRoleManager`]: one graph, optional name-matching predicate, an
//!   optional single domain folded into the name as `domain::name`
//! - [`DomainRoleManager`]: one graph per domain, optional domain-matching
//!   predicate with propagation and an LRU of match results
//! - [`ConditionalRoleManager`]: per-domain graphs whose edges may carry guards
//! - [`GroupRoleManager`]: per-domain graphs with a fallback through the
//!   default-namespace group relation
//!
//! # Example
//!
//! ```rust
//! use cretoai_rbac::role_manager::{DefaultRoleManager, RoleManager};
//!
//! let rm = DefaultRoleManager::new(10);
//! rm.add_link("alice", "editor", &[]).unwrap();
//! rm.add_link("editor", "viewer", &[]).unwrap();
//!
//! assert!(rm.has_link("alice", "viewer", &[]).unwrap());
//! assert!(!rm.has_link("viewer", "alice", &[]).unwrap());
//! ```

mod conditional;
mod default;
mod domain;
mod graph;
mod group;
pub mod pattern;

pub use conditional::{not_expired, ConditionalRoleManager};
pub use default::DefaultRoleManager;
pub use domain::DomainRoleManager;
pub use group::GroupRoleManager;
pub use pattern::wildcard_match;

pub(crate) use graph::{RoleGraph, Traversal};

use serde::Serialize;
use std::sync::Arc;

use crate::error::{RbacError, Result};

/// Domain used when an operation is called without one
pub const DEFAULT_DOMAIN: &str = "";

/// Separator between domain and role name in a domain-qualified name
pub const DOMAIN_SEPARATOR: &str = "::";

/// Name (or domain) matching predicate, called as `matcher(name, pattern)`
pub type MatchingFn = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// Guard gating one inheritance edge, called with the bound parameters
pub type LinkConditionFn = Arc<dyn Fn(&[String]) -> anyhow::Result<bool> + Send + Sync>;

/// One role and its direct parents, as exposed for diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleLinks {
    /// Owning domain, `None` for the default namespace
    pub domain: Option<String>,
    pub name: String,
    pub parents: Vec<String>,
}

impl RoleLinks {
    /// Domain-qualified role name (`domain::name`, or the bare name)
    pub fn qualified_name(&self) -> String {
        qualify(self.domain.as_deref(), &self.name)
    }

    /// Domain-qualified parent names
    pub fn qualified_parents(&self) -> Vec<String> {
        self.parents
            .iter()
            .map(|p| qualify(self.domain.as_deref(), p))
            .collect()
    }
}

/// Capability set shared by every role manager
///
/// Domain parameters are passed as a slice; at most one entry is accepted.
pub trait RoleManager: Send + Sync {
    /// Drop every role, link and cached result
    fn clear(&self);

    /// `name1` inherits `name2`. Missing roles are created; re-adding is a no-op.
    fn add_link(&self, name1: &str, name2: &str, domains: &[&str]) -> Result<()>;

    /// Remove the `name1 -> name2` edge. Fails if either role is absent.
    fn delete_link(&self, name1: &str, name2: &str, domains: &[&str]) -> Result<()>;

    /// Whether `name2` is reachable from `name1` within the hierarchy bound
    fn has_link(&self, name1: &str, name2: &str, domains: &[&str]) -> Result<bool>;

    /// Direct parents of `name`
    fn get_roles(&self, name: &str, domains: &[&str]) -> Result<Vec<String>>;

    /// Roles that directly inherit `name`
    fn get_users(&self, name: &str, domains: &[&str]) -> Result<Vec<String>>;

    /// Snapshot of every role with its direct parents
    fn role_links(&self) -> Vec<RoleLinks>;

    /// Dump the role graph through `tracing`
    fn print_roles(&self) {
        let links = self.role_links();
        if links.is_empty() {
            tracing::info!("role manager is empty");
            return;
        }
        for link in links.iter().filter(|l| !l.parents.is_empty()) {
            tracing::info!(
                role = %link.qualified_name(),
                parents = %link.parents.join(", "),
                "role links"
            );
        }
    }
}

/// Accept zero or one domain argument
pub(crate) fn single_domain<'a>(domains: &[&'a str]) -> Result<Option<&'a str>> {
    match domains {
        [] => Ok(None),
        [domain] => Ok(Some(*domain)),
        _ => Err(RbacError::InvalidArgument(format!(
            "at most one domain may be given, got {}",
            domains.len()
        ))),
    }
}

pub(crate) fn qualify(domain: Option<&str>, name: &str) -> String {
    match domain {
        Some(domain) if !domain.is_empty() => format!("{}{}{}", domain, DOMAIN_SEPARATOR, name),
        _ => name.to_string(),
    }
}

//! Single-graph role manager

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

use super::{qualify, single_domain, MatchingFn, RoleGraph, RoleLinks, RoleManager, Traversal};
use crate::config::RoleManagerConfig;
use crate::error::{RbacError, Result};

struct DefaultState {
    graph: RoleGraph,
    max_hierarchy_level: usize,
    matcher: Option<MatchingFn>,
}

impl DefaultState {
    fn traversal(&self) -> Traversal<'_> {
        Traversal::new(self.max_hierarchy_level).with_matcher(self.matcher.as_ref())
    }
}

/// Role manager over one role graph
///
/// An optional domain argument is folded into role names as `domain::name`,
/// so every domain shares the same graph but not the same roles. Use
/// [`DomainRoleManager`](super::DomainRoleManager) when domains need their own
/// graphs or pattern propagation.
///
/// # Thread Safety
///
/// All state sits behind one `RwLock`: mutations are exclusive, queries share.
///
/// # Examples
///
/// ```rust
/// use cretoai_rbac::role_manager::{DefaultRoleManager, RoleManager};
///
/// let rm = DefaultRoleManager::new(10);
/// rm.add_link("alice", "admin", &["tenant1"]).unwrap();
///
/// assert!(rm.has_link("alice", "admin", &["tenant1"]).unwrap());
/// assert!(!rm.has_link("alice", "admin", &["tenant2"]).unwrap());
/// assert_eq!(rm.get_roles("alice", &["tenant1"]).unwrap(), vec!["admin"]);
/// ```
pub struct DefaultRoleManager {
    state: RwLock<DefaultState>,
}

impl DefaultRoleManager {
    /// Create a manager following at most `max_hierarchy_level` inheritance hops
    pub fn new(max_hierarchy_level: usize) -> Self {
        Self {
            state: RwLock::new(DefaultState {
                graph: RoleGraph::new(),
                max_hierarchy_level,
                matcher: None,
            }),
        }
    }

    pub fn from_config(config: &RoleManagerConfig) -> Self {
        Self::new(config.max_hierarchy_level)
    }

    pub fn set_max_hierarchy_level(&self, level: usize) {
        self.state.write().max_hierarchy_level = level;
    }

    /// Install a name-matching predicate, called as `matcher(name, pattern)`
    ///
    /// Roles whose names match a pattern role inherit that role's links without
    /// extra edges being stored.
    pub fn add_matching_fn<F>(&self, matcher: F)
    where
        F: Fn(&str, &str) -> bool + Send + Sync + 'static,
    {
        self.state.write().matcher = Some(Arc::new(matcher));
    }

    /// All roles `name` inherits within the hierarchy bound, nearest first
    pub fn implicit_roles(&self, name: &str, domains: &[&str]) -> Result<Vec<String>> {
        let domain = single_domain(domains)?;
        let state = self.state.read();
        let roles = state
            .graph
            .reachable_roles(&qualify(domain, name), &state.traversal());
        Ok(strip_all(domain, roles))
    }

    /// All roles that inherit `name` within the hierarchy bound, nearest first
    pub fn implicit_users(&self, name: &str, domains: &[&str]) -> Result<Vec<String>> {
        let domain = single_domain(domains)?;
        let state = self.state.read();
        let users = state
            .graph
            .reaching_users(&qualify(domain, name), &state.traversal());
        Ok(strip_all(domain, users))
    }

    /// Number of roles in the graph
    pub fn len(&self) -> usize {
        self.state.read().graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().graph.is_empty()
    }

    /// Remove a role together with every link into or out of it
    pub fn delete_role(&self, name: &str, domains: &[&str]) -> Result<()> {
        let domain = single_domain(domains)?;
        let qualified = qualify(domain, name);
        if !self.state.write().graph.remove_role(&qualified) {
            return Err(RbacError::RoleNotFound(qualified));
        }
        debug!(role = name, domain = ?domain, "deleted role");
        Ok(())
    }
}

impl RoleManager for DefaultRoleManager {
    fn clear(&self) {
        self.state.write().graph.clear();
    }

    fn add_link(&self, name1: &str, name2: &str, domains: &[&str]) -> Result<()> {
        let domain = single_domain(domains)?;
        let added = self
            .state
            .write()
            .graph
            .add_link(&qualify(domain, name1), &qualify(domain, name2));
        if added {
            debug!(user = name1, role = name2, domain = ?domain, "added role link");
        }
        Ok(())
    }

    fn delete_link(&self, name1: &str, name2: &str, domains: &[&str]) -> Result<()> {
        let domain = single_domain(domains)?;
        let removed = self
            .state
            .write()
            .graph
            .delete_link(&qualify(domain, name1), &qualify(domain, name2))?;
        if removed {
            debug!(user = name1, role = name2, domain = ?domain, "deleted role link");
        }
        Ok(())
    }

    fn has_link(&self, name1: &str, name2: &str, domains: &[&str]) -> Result<bool> {
        let domain = single_domain(domains)?;
        if name1 == name2 {
            return Ok(true);
        }

        let state = self.state.read();
        if state.matcher.as_ref().is_some_and(|m| m(name1, name2)) {
            return Ok(true);
        }
        Ok(state
            .graph
            .reaches(&qualify(domain, name1), &qualify(domain, name2), &state.traversal()))
    }

    fn get_roles(&self, name: &str, domains: &[&str]) -> Result<Vec<String>> {
        let domain = single_domain(domains)?;
        let qualified = qualify(domain, name);
        let roles = self
            .state
            .read()
            .graph
            .parents(&qualified)
            .ok_or(RbacError::RoleNotFound(qualified))?;
        Ok(strip_all(domain, roles))
    }

    fn get_users(&self, name: &str, domains: &[&str]) -> Result<Vec<String>> {
        let domain = single_domain(domains)?;
        let users = self
            .state
            .read()
            .graph
            .children(&qualify(domain, name))
            .unwrap_or_default();
        Ok(strip_all(domain, users))
    }

    fn role_links(&self) -> Vec<RoleLinks> {
        self.state
            .read()
            .graph
            .links()
            .into_iter()
            .map(|(name, parents)| RoleLinks {
                domain: None,
                name,
                parents,
            })
            .collect()
    }
}

fn strip_all(domain: Option<&str>, names: Vec<String>) -> Vec<String> {
    match domain {
        Some(domain) if !domain.is_empty() => {
            let prefix = qualify(Some(domain), "");
            names
                .into_iter()
                .map(|n| n.strip_prefix(prefix.as_str()).map(str::to_string).unwrap_or(n))
                .collect()
        }
        _ => names,
    }
}

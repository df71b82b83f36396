//! Role manager resolving links through group memberships

use std::collections::HashSet;

use super::{single_domain, DomainRoleManager, RoleLinks, RoleManager};
use crate::config::{RoleManagerConfig, DEFAULT_MAX_HIERARCHY_LEVEL};
use crate::error::Result;

/// Role manager with a group fallback
///
/// Links added without a domain form the group relation (`user -> group`).
/// A domain-scoped `has_link` that the domain graph cannot answer directly is
/// retried from each group the user belongs to, recursively.
///
/// # Examples
///
/// ```rust
/// use cretoai_rbac::role_manager::{GroupRoleManager, RoleManager};
///
/// let rm = GroupRoleManager::new(10);
/// rm.add_link("alice", "engineering", &[]).unwrap();
/// rm.add_link("engineering", "deployer", &["prod"]).unwrap();
///
/// assert!(rm.has_link("alice", "deployer", &["prod"]).unwrap());
/// assert!(!rm.has_link("alice", "deployer", &["staging"]).unwrap());
/// ```
pub struct GroupRoleManager {
    inner: DomainRoleManager,
    max_group_depth: usize,
}

impl GroupRoleManager {
    pub fn new(max_hierarchy_level: usize) -> Self {
        Self {
            inner: DomainRoleManager::new(max_hierarchy_level),
            max_group_depth: max_hierarchy_level,
        }
    }

    pub fn from_config(config: &RoleManagerConfig) -> Self {
        Self {
            inner: DomainRoleManager::from_config(config),
            max_group_depth: config.max_hierarchy_level,
        }
    }

    /// The underlying domain manager, for installing matching predicates
    pub fn roles(&self) -> &DomainRoleManager {
        &self.inner
    }

    fn has_link_via_groups(
        &self,
        name: &str,
        role: &str,
        domain: &str,
        depth: usize,
        visited: &mut HashSet<String>,
    ) -> Result<bool> {
        if depth == 0 || !visited.insert(name.to_string()) {
            return Ok(false);
        }

        let groups = match self.inner.get_roles(name, &[]) {
            Ok(groups) => groups,
            Err(err) if err.is_not_found() => return Ok(false),
            Err(err) => return Err(err),
        };

        for group in groups {
            if self.inner.has_link(&group, role, &[domain])?
                || self.has_link_via_groups(&group, role, domain, depth - 1, visited)?
            {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl Default for GroupRoleManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HIERARCHY_LEVEL)
    }
}

impl RoleManager for GroupRoleManager {
    fn clear(&self) {
        self.inner.clear();
    }

    fn add_link(&self, name1: &str, name2: &str, domains: &[&str]) -> Result<()> {
        self.inner.add_link(name1, name2, domains)
    }

    fn delete_link(&self, name1: &str, name2: &str, domains: &[&str]) -> Result<()> {
        self.inner.delete_link(name1, name2, domains)
    }

    fn has_link(&self, name1: &str, name2: &str, domains: &[&str]) -> Result<bool> {
        let domain = single_domain(domains)?;
        if self.inner.has_link(name1, name2, domains)? {
            return Ok(true);
        }
        match domain {
            Some(domain) => {
                let mut visited = HashSet::new();
                self.has_link_via_groups(name1, name2, domain, self.max_group_depth, &mut visited)
            }
            None => Ok(false),
        }
    }

    fn get_roles(&self, name: &str, domains: &[&str]) -> Result<Vec<String>> {
        self.inner.get_roles(name, domains)
    }

    fn get_users(&self, name: &str, domains: &[&str]) -> Result<Vec<String>> {
        self.inner.get_users(name, domains)
    }

    fn role_links(&self) -> Vec<RoleLinks> {
        self.inner.role_links()
    }
}

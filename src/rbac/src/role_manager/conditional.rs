//! Role manager whose inheritance edges may be gated by caller-supplied guards

use indexmap::IndexSet;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::graph::EdgeGate;
use super::{single_domain, DomainRoleManager, LinkConditionFn, RoleLinks, RoleManager, DEFAULT_DOMAIN};
use crate::config::RoleManagerConfig;
use crate::error::Result;

/// Guard key: (child, parent, domain or empty)
type LinkKey = (String, String, String);

#[derive(Clone, Default)]
struct LinkCondition {
    func: Option<LinkConditionFn>,
    params: Vec<String>,
}

/// Role manager with guarded edges
///
/// Each edge `child -> parent` may carry a guard plus a bound parameter list.
/// `has_link` expands the frontier level by level and only follows an edge
/// when its guard returns `true` for the currently bound parameters. A guard
/// that returns an error is logged and treated as `false` for that edge only.
///
/// Guard lookup for a domain-scoped query: the guard registered for that
/// domain, else the guards of every pattern domain matching it (all must
/// pass), else the edge's no-domain guard, else the edge is unconditional.
///
/// # Examples
///
/// ```rust
/// use cretoai_rbac::role_manager::{ConditionalRoleManager, RoleManager};
///
/// let rm = ConditionalRoleManager::new(10);
/// rm.add_link("alice", "auditor", &[]).unwrap();
/// rm.add_link_condition_func("alice", "auditor", |params: &[String]| {
///     Ok(params.first().map(String::as_str) == Some("active"))
/// });
///
/// rm.set_link_condition_func_params("alice", "auditor", &["expired"]);
/// assert!(!rm.has_link("alice", "auditor", &[]).unwrap());
///
/// rm.set_link_condition_func_params("alice", "auditor", &["active"]);
/// assert!(rm.has_link("alice", "auditor", &[]).unwrap());
/// ```
pub struct ConditionalRoleManager {
    inner: DomainRoleManager,
    conditions: RwLock<HashMap<LinkKey, LinkCondition>>,
}

impl ConditionalRoleManager {
    pub fn new(max_hierarchy_level: usize) -> Self {
        Self::with_roles(DomainRoleManager::new(max_hierarchy_level))
    }

    pub fn from_config(config: &RoleManagerConfig) -> Self {
        Self::with_roles(DomainRoleManager::from_config(config))
    }

    /// Layer guards over an existing domain role manager
    pub fn with_roles(inner: DomainRoleManager) -> Self {
        Self {
            inner,
            conditions: RwLock::new(HashMap::new()),
        }
    }

    /// The underlying domain manager, for installing matching predicates
    pub fn roles(&self) -> &DomainRoleManager {
        &self.inner
    }

    /// Register the guard for edge `user -> role` outside any domain
    pub fn add_link_condition_func<F>(&self, user: &str, role: &str, func: F)
    where
        F: Fn(&[String]) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        self.register(user, role, DEFAULT_DOMAIN, Arc::new(func));
    }

    /// Register the guard for edge `user -> role` within `domain`
    pub fn add_domain_link_condition_func<F>(&self, user: &str, role: &str, domain: &str, func: F)
    where
        F: Fn(&[String]) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        self.register(user, role, domain, Arc::new(func));
    }

    /// Rebind the parameters passed to the no-domain guard of `user -> role`
    pub fn set_link_condition_func_params(&self, user: &str, role: &str, params: &[&str]) {
        self.bind(user, role, DEFAULT_DOMAIN, params);
    }

    /// Rebind the parameters passed to the `domain` guard of `user -> role`
    pub fn set_domain_link_condition_func_params(
        &self,
        user: &str,
        role: &str,
        domain: &str,
        params: &[&str],
    ) {
        self.bind(user, role, domain, params);
    }

    fn register(&self, user: &str, role: &str, domain: &str, func: LinkConditionFn) {
        self.conditions
            .write()
            .entry(link_key(user, role, domain))
            .or_default()
            .func = Some(func);
        debug!(user, role, domain, "registered link condition");
    }

    fn bind(&self, user: &str, role: &str, domain: &str, params: &[&str]) {
        self.conditions
            .write()
            .entry(link_key(user, role, domain))
            .or_default()
            .params = params.iter().map(|p| p.to_string()).collect();
    }

    /// Whether `child -> parent` may be followed in `domain`, whose matching
    /// pattern domains are `patterns`
    fn edge_eligible(
        conditions: &HashMap<LinkKey, LinkCondition>,
        child: &str,
        parent: &str,
        domain: &str,
        patterns: &[&str],
    ) -> bool {
        let lookup = |domain: &str| {
            conditions
                .get(&link_key(child, parent, domain))
                .and_then(|c| c.func.as_ref().map(|func| (func, &c.params)))
        };
        if let Some((func, params)) = lookup(domain) {
            return Self::run_guard(func, params, child, parent, domain);
        }

        let mut inherited = patterns
            .iter()
            .filter_map(|pattern| lookup(*pattern).map(|guard| (*pattern, guard)))
            .peekable();
        if inherited.peek().is_some() {
            return inherited.all(|(pattern, (func, params))| {
                Self::run_guard(func, params, child, parent, pattern)
            });
        }

        if domain == DEFAULT_DOMAIN {
            return true;
        }
        match lookup(DEFAULT_DOMAIN) {
            Some((func, params)) => Self::run_guard(func, params, child, parent, DEFAULT_DOMAIN),
            None => true,
        }
    }

    fn run_guard(
        func: &LinkConditionFn,
        params: &[String],
        child: &str,
        parent: &str,
        domain: &str,
    ) -> bool {
        match func(params) {
            Ok(eligible) => eligible,
            Err(err) => {
                warn!(
                    user = child,
                    role = parent,
                    domain,
                    error = %err,
                    "link condition failed, treating edge as inactive"
                );
                false
            }
        }
    }

    /// Domains with registered guards that match `domain` as a pattern
    fn guard_patterns<'c>(
        &self,
        conditions: &'c HashMap<LinkKey, LinkCondition>,
        domain: &str,
    ) -> Vec<&'c str> {
        let candidates: IndexSet<&str> = conditions
            .keys()
            .map(|(_, _, guarded)| guarded.as_str())
            .filter(|guarded| *guarded != domain && *guarded != DEFAULT_DOMAIN)
            .collect();
        if candidates.is_empty() {
            return Vec::new();
        }
        self.inner.matching_patterns(domain, candidates)
    }
}

impl RoleManager for ConditionalRoleManager {
    fn clear(&self) {
        self.inner.clear();
        self.conditions.write().clear();
    }

    fn add_link(&self, name1: &str, name2: &str, domains: &[&str]) -> Result<()> {
        self.inner.add_link(name1, name2, domains)
    }

    fn delete_link(&self, name1: &str, name2: &str, domains: &[&str]) -> Result<()> {
        self.inner.delete_link(name1, name2, domains)
    }

    fn has_link(&self, name1: &str, name2: &str, domains: &[&str]) -> Result<bool> {
        let domain = single_domain(domains)?.unwrap_or(DEFAULT_DOMAIN);
        let conditions = self.conditions.read();
        let patterns = self.guard_patterns(&conditions, domain);
        let gate = |child: &str, parent: &str| {
            Self::edge_eligible(&conditions, child, parent, domain, &patterns)
        };
        let gate: EdgeGate<'_> = &gate;
        Ok(self.inner.has_link_gated(name1, name2, domain, Some(gate)))
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

impl From<DomainRoleManager> for ConditionalRoleManager {
    fn from(inner: DomainRoleManager) -> Self {
        Self::with_roles(inner)
    }
}

fn link_key(child: &str, parent: &str, domain: &str) -> LinkKey {
    (child.to_string(), parent.to_string(), domain.to_string())
}

/// Guard: active while the first parameter (a unix timestamp) is before the
/// second (an expiry timestamp)
pub fn not_expired(params: &[String]) -> anyhow::Result<bool> {
    let [now, expires_at] = params else {
        anyhow::bail!("expected [now, expires_at], got {} parameters", params.len());
    };
    let now: i64 = now.parse()?;
    let expires_at: i64 = expires_at.parse()?;
    Ok(now < expires_at)
}

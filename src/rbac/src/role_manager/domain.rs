//! Per-domain role graphs with pattern-domain propagation

use indexmap::{IndexMap, IndexSet};
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::debug;

use super::graph::EdgeGate;
use super::{
    single_domain, MatchingFn, RoleGraph, RoleLinks, RoleManager, Traversal, DEFAULT_DOMAIN,
};
use crate::config::{RoleManagerConfig, DEFAULT_DOMAIN_CACHE_CAPACITY};
use crate::error::{RbacError, Result};

/// Cache key: (domain, pattern domain)
type MatchKey = (String, String);

struct DomainState {
    domains: IndexMap<String, RoleGraph>,
    /// Links added under each domain by callers, without propagated copies
    direct: IndexMap<String, IndexSet<(String, String)>>,
    max_hierarchy_level: usize,
    name_matcher: Option<MatchingFn>,
    domain_matcher: Option<MatchingFn>,
}

/// Role manager keeping one independent role graph per domain
///
/// With a domain-matching predicate installed, a domain whose key matches
/// another domain's key (as a pattern) picks up that domain's links: when the
/// matching domain is created its graph is seeded from the pattern domain, and
/// later links added under the pattern domain are fanned out to it.
///
/// Queries never create domains. A query against a domain without a graph
/// reads a graph seeded from the matching pattern domains; the seeded graph is
/// kept in a bounded LRU until the next mutation.
///
/// Predicate results are memoized in a bounded LRU keyed by the domain pair.
///
/// # Thread Safety
///
/// The domain map sits behind one `RwLock`. The match and seeded-graph caches
/// have their own mutexes, only taken while the domain map lock is held.
///
/// # Examples
///
/// ```rust
/// use cretoai_rbac::role_manager::{wildcard_match, DomainRoleManager, RoleManager};
///
/// let rm = DomainRoleManager::new(10);
/// rm.add_domain_matching_fn(wildcard_match);
/// rm.add_link("alice", "admin", &["*"]).unwrap();
///
/// // "tenant3" was never used, but "*" matches it
/// assert!(rm.has_link("alice", "admin", &["tenant3"]).unwrap());
/// ```
pub struct DomainRoleManager {
    state: RwLock<DomainState>,
    match_cache: Mutex<LruCache<MatchKey, bool>>,
    seeded: Mutex<LruCache<String, Arc<RoleGraph>>>,
}

impl DomainRoleManager {
    pub fn new(max_hierarchy_level: usize) -> Self {
        Self::with_cache_capacity(max_hierarchy_level, DEFAULT_DOMAIN_CACHE_CAPACITY)
    }

    pub fn from_config(config: &RoleManagerConfig) -> Self {
        Self::with_cache_capacity(config.max_hierarchy_level, config.domain_cache_capacity)
    }

    /// Create a manager whose domain caches hold at most `capacity` entries each
    pub fn with_cache_capacity(max_hierarchy_level: usize, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: RwLock::new(DomainState {
                domains: IndexMap::new(),
                direct: IndexMap::new(),
                max_hierarchy_level,
                name_matcher: None,
                domain_matcher: None,
            }),
            match_cache: Mutex::new(LruCache::new(capacity)),
            seeded: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn set_max_hierarchy_level(&self, level: usize) {
        self.state.write().max_hierarchy_level = level;
    }

    /// Install a role-name matching predicate, called as `matcher(name, pattern)`
    pub fn add_matching_fn<F>(&self, matcher: F)
    where
        F: Fn(&str, &str) -> bool + Send + Sync + 'static,
    {
        self.state.write().name_matcher = Some(Arc::new(matcher));
    }

    /// Install a domain matching predicate, called as `matcher(domain, pattern)`
    ///
    /// Every domain is rebuilt from the links added under it directly, so a
    /// replaced predicate drops the copies the previous one propagated.
    pub fn add_domain_matching_fn<F>(&self, matcher: F)
    where
        F: Fn(&str, &str) -> bool + Send + Sync + 'static,
    {
        let mut state = self.state.write();
        state.domain_matcher = Some(Arc::new(matcher));
        self.match_cache.lock().clear();
        self.seeded.lock().clear();

        let keys: Vec<String> = state.domains.keys().cloned().collect();
        let direct = std::mem::take(&mut state.direct);
        state.domains.clear();
        for domain in keys {
            self.ensure_domain(&mut state, &domain);
            let Some(edges) = direct.get(&domain) else {
                continue;
            };
            for (child, parent) in edges {
                self.add_link_locked(&mut state, child, parent, &domain);
            }
        }
        debug!(domains = state.domains.len(), "rebuilt role links for domain matching");
    }

    /// Every domain that currently owns a graph
    pub fn all_domains(&self) -> Vec<String> {
        self.state.read().domains.keys().cloned().collect()
    }

    /// Domains in which `name` inherits at least one role
    pub fn domains_for(&self, name: &str) -> Vec<String> {
        self.state
            .read()
            .domains
            .iter()
            .filter(|(_, graph)| graph.parents(name).is_some_and(|p| !p.is_empty()))
            .map(|(domain, _)| domain.clone())
            .collect()
    }

    /// Number of memoized domain-pattern results
    pub fn match_cache_len(&self) -> usize {
        self.match_cache.lock().len()
    }

    /// The candidates other than `domain` that match it as pattern domains
    pub(crate) fn matching_patterns<'c>(
        &self,
        domain: &str,
        candidates: impl IntoIterator<Item = &'c str>,
    ) -> Vec<&'c str> {
        let state = self.state.read();
        if state.domain_matcher.is_none() {
            return Vec::new();
        }
        candidates
            .into_iter()
            .filter(|pattern| *pattern != domain && self.domain_matches(&state, domain, pattern))
            .collect()
    }

    /// `has_link` with an optional per-edge gate, used by the conditional manager
    pub(crate) fn has_link_gated(
        &self,
        name1: &str,
        name2: &str,
        domain: &str,
        gate: Option<EdgeGate<'_>>,
    ) -> bool {
        if name1 == name2 {
            return true;
        }

        let state = self.state.read();
        if state.name_matcher.as_ref().is_some_and(|m| m(name1, name2)) {
            return true;
        }

        let traversal = Traversal::new(state.max_hierarchy_level)
            .with_matcher(state.name_matcher.as_ref())
            .with_gate(gate);
        self.with_graph(&state, domain, |graph| graph.reaches(name1, name2, &traversal))
    }

    /// Run `f` against the domain's graph, or the cached seeded graph if the
    /// domain has never been used
    fn with_graph<R>(&self, state: &DomainState, domain: &str, f: impl FnOnce(&RoleGraph) -> R) -> R {
        if let Some(graph) = state.domains.get(domain) {
            return f(graph);
        }
        if state.domain_matcher.is_none() {
            return f(&RoleGraph::new());
        }

        let cached = self.seeded.lock().get(domain).cloned();
        let graph = match cached {
            Some(graph) => graph,
            None => {
                let graph = Arc::new(self.seeded_graph(state, domain));
                self.seeded.lock().put(domain.to_string(), Arc::clone(&graph));
                graph
            }
        };
        f(graph.as_ref())
    }

    /// A fresh graph for `domain` holding the links of every pattern domain matching it
    fn seeded_graph(&self, state: &DomainState, domain: &str) -> RoleGraph {
        let mut graph = RoleGraph::new();
        if state.domain_matcher.is_some() {
            for (pattern, source) in &state.domains {
                if pattern != domain && self.domain_matches(state, domain, pattern) {
                    graph.copy_links_from(source);
                }
            }
        }
        graph
    }

    fn ensure_domain(&self, state: &mut DomainState, domain: &str) {
        if !state.domains.contains_key(domain) {
            let graph = self.seeded_graph(state, domain);
            debug!(domain, roles = graph.len(), "created domain role graph");
            state.domains.insert(domain.to_string(), graph);
        }
    }

    /// Existing domains other than `pattern` that `pattern` matches
    fn matching_domains(&self, state: &DomainState, pattern: &str) -> Vec<String> {
        if state.domain_matcher.is_none() {
            return Vec::new();
        }
        state
            .domains
            .keys()
            .filter(|domain| domain.as_str() != pattern && self.domain_matches(state, domain, pattern))
            .cloned()
            .collect()
    }

    fn add_link_locked(&self, state: &mut DomainState, name1: &str, name2: &str, domain: &str) -> bool {
        self.ensure_domain(state, domain);
        let targets = self.matching_domains(state, domain);

        state
            .direct
            .entry(domain.to_string())
            .or_default()
            .insert((name1.to_string(), name2.to_string()));

        let mut added = false;
        if let Some(graph) = state.domains.get_mut(domain) {
            added = graph.add_link(name1, name2);
        }
        for target in targets {
            if let Some(graph) = state.domains.get_mut(&target) {
                graph.add_link(name1, name2);
            }
        }
        added
    }

    fn domain_matches(&self, state: &DomainState, domain: &str, pattern: &str) -> bool {
        let Some(matcher) = state.domain_matcher.as_ref() else {
            return false;
        };

        let key = (domain.to_string(), pattern.to_string());
        let mut cache = self.match_cache.lock();
        if let Some(&matched) = cache.get(&key) {
            return matched;
        }
        let matched = matcher(domain, pattern);
        cache.put(key, matched);
        matched
    }

    #[cfg(test)]
    fn seeded_len(&self) -> usize {
        self.seeded.lock().len()
    }
}

impl RoleManager for DomainRoleManager {
    fn clear(&self) {
        let mut state = self.state.write();
        state.domains.clear();
        state.direct.clear();
        self.match_cache.lock().clear();
        self.seeded.lock().clear();
    }

    fn add_link(&self, name1: &str, name2: &str, domains: &[&str]) -> Result<()> {
        let domain = single_domain(domains)?.unwrap_or(DEFAULT_DOMAIN);
        let mut state = self.state.write();
        self.seeded.lock().clear();
        if self.add_link_locked(&mut state, name1, name2, domain) {
            debug!(user = name1, role = name2, domain, "added role link");
        }
        Ok(())
    }

    fn delete_link(&self, name1: &str, name2: &str, domains: &[&str]) -> Result<()> {
        let domain = single_domain(domains)?.unwrap_or(DEFAULT_DOMAIN);
        let mut state = self.state.write();

        // an unknown domain is only materialized once the delete succeeds on it
        let removed = match state.domains.get_mut(domain) {
            Some(graph) => graph.delete_link(name1, name2)?,
            None => {
                let mut graph = self.seeded_graph(&state, domain);
                let removed = graph.delete_link(name1, name2)?;
                state.domains.insert(domain.to_string(), graph);
                removed
            }
        };
        self.seeded.lock().clear();
        if removed {
            debug!(user = name1, role = name2, domain, "deleted role link");
        }

        let edge = (name1.to_string(), name2.to_string());
        if let Some(edges) = state.direct.get_mut(domain) {
            edges.shift_remove(&edge);
        }
        for target in self.matching_domains(&state, domain) {
            if let Some(edges) = state.direct.get_mut(&target) {
                edges.shift_remove(&edge);
            }
            if let Some(graph) = state.domains.get_mut(&target) {
                // roles may be missing in propagated domains
                let _ = graph.delete_link(name1, name2);
            }
        }
        Ok(())
    }

    fn has_link(&self, name1: &str, name2: &str, domains: &[&str]) -> Result<bool> {
        let domain = single_domain(domains)?.unwrap_or(DEFAULT_DOMAIN);
        Ok(self.has_link_gated(name1, name2, domain, None))
    }

    fn get_roles(&self, name: &str, domains: &[&str]) -> Result<Vec<String>> {
        let domain = single_domain(domains)?.unwrap_or(DEFAULT_DOMAIN);
        let state = self.state.read();
        self.with_graph(&state, domain, |graph| graph.parents(name))
            .ok_or_else(|| RbacError::RoleNotFound(name.to_string()))
    }

    fn get_users(&self, name: &str, domains: &[&str]) -> Result<Vec<String>> {
        let domain = single_domain(domains)?.unwrap_or(DEFAULT_DOMAIN);
        let state = self.state.read();
        Ok(self
            .with_graph(&state, domain, |graph| graph.children(name))
            .unwrap_or_default())
    }

    fn role_links(&self) -> Vec<RoleLinks> {
        let state = self.state.read();
        state
            .domains
            .iter()
            .flat_map(|(domain, graph)| {
                let domain = (domain != DEFAULT_DOMAIN).then(|| domain.clone());
                graph.links().into_iter().map(move |(name, parents)| RoleLinks {
                    domain: domain.clone(),
                    name,
                    parents,
                })
            })
            .collect()
    }
}

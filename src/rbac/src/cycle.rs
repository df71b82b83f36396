//! Inheritance cycle detection
//!
//! Offline model check: snapshots a role manager through
//! [`RoleManager::role_links`] and searches the snapshot for a cycle. The role
//! manager is only read once and no reference into it is kept.
//!
//! # Example
//!
//! ```rust
//! use cretoai_rbac::cycle::CycleDetector;
//! use cretoai_rbac::role_manager::{DefaultRoleManager, RoleManager};
//!
//! let rm = DefaultRoleManager::new(10);
//! rm.add_link("a", "b", &[]).unwrap();
//! rm.add_link("b", "c", &[]).unwrap();
//! assert_eq!(CycleDetector::new().check(&rm), None);
//!
//! rm.add_link("c", "a", &[]).unwrap();
//! assert_eq!(
//!     CycleDetector::new().check(&rm).as_deref(),
//!     Some("Cycle detected: a -> b -> c -> a")
//! );
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

use crate::role_manager::RoleManager;

/// Role name to direct parent names
pub type Adjacency = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Copy, Default)]
pub struct CycleDetector;

impl CycleDetector {
    pub fn new() -> Self {
        Self
    }

    /// Report the first cycle found, formatted as `Cycle detected: A -> B -> A`
    pub fn check<R: RoleManager + ?Sized>(&self, rm: &R) -> Option<String> {
        let adjacency = Self::snapshot(rm);
        let cycle = find_cycle(&adjacency)?;
        debug!(cycle = ?cycle, "role inheritance cycle found");
        Some(format!("Cycle detected: {}", cycle.join(" -> ")))
    }

    /// Private adjacency copy of a role manager, keyed by domain-qualified name
    pub fn snapshot<R: RoleManager + ?Sized>(rm: &R) -> Adjacency {
        let mut adjacency = Adjacency::new();
        for links in rm.role_links() {
            adjacency
                .entry(links.qualified_name())
                .or_default()
                .extend(links.qualified_parents());
        }
        for parents in adjacency.values_mut() {
            parents.sort();
            parents.dedup();
        }
        adjacency
    }
}

/// Find one cycle in `adjacency`
///
/// Iterative depth-first search with an explicit stack. The returned path
/// starts and ends on the repeated node.
pub fn find_cycle(adjacency: &Adjacency) -> Option<Vec<String>> {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut on_path: HashSet<&str> = HashSet::new();
    let mut parent: HashMap<&str, &str> = HashMap::new();

    for start in adjacency.keys() {
        if !visited.insert(start.as_str()) {
            continue;
        }
        on_path.insert(start.as_str());

        // (node, index of the next child to explore)
        let mut stack: Vec<(&str, usize)> = vec![(start.as_str(), 0)];

        while let Some(&(node, next)) = stack.last() {
            let children = adjacency.get(node).map(Vec::as_slice).unwrap_or(&[]);

            let Some(child) = children.get(next).map(String::as_str) else {
                on_path.remove(node);
                stack.pop();
                continue;
            };

            let top = stack.len() - 1;
            stack[top].1 += 1;

            if on_path.contains(child) {
                return Some(reconstruct(&parent, node, child));
            }
            if visited.insert(child) {
                parent.insert(child, node);
                on_path.insert(child);
                stack.push((child, 0));
            }
        }
    }

    None
}

/// Walk parent pointers from `from` back to `to`, closing the loop on `to`
fn reconstruct(parent: &HashMap<&str, &str>, from: &str, to: &str) -> Vec<String> {
    let mut cycle = vec![from.to_string()];
    let mut current = from;
    while current != to {
        match parent.get(current) {
            Some(&prev) => {
                cycle.push(prev.to_string());
                current = prev;
            }
            None => break,
        }
    }
    cycle.reverse();
    cycle.push(to.to_string());
    cycle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role_manager::{DefaultRoleManager, DomainRoleManager};

    fn adjacency(edges: &[(&str, &str)]) -> Adjacency {
        let mut adjacency = Adjacency::new();
        for (child, parent) in edges {
            adjacency
                .entry(child.to_string())
                .or_default()
                .push(parent.to_string());
        }
        adjacency
    }

    #[test]
    fn test_no_cycle() {
        let graph = adjacency(&[("a", "b"), ("b", "c"), ("a", "c")]);
        assert_eq!(find_cycle(&graph), None);
    }

    #[test]
    fn test_simple_cycle() {
        let graph = adjacency(&[("a", "b"), ("b", "c"), ("c", "a")]);
        assert_eq!(find_cycle(&graph).unwrap(), vec!["a", "b", "c", "a"]);
    }

    #[test]
    fn test_self_loop() {
        let graph = adjacency(&[("a", "a")]);
        assert_eq!(find_cycle(&graph).unwrap(), vec!["a", "a"]);
    }

    #[test]
    fn test_cycle_not_through_start() {
        let graph = adjacency(&[("a", "b"), ("b", "c"), ("c", "d"), ("d", "b")]);
        assert_eq!(find_cycle(&graph).unwrap(), vec!["b", "c", "d", "b"]);
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let graph = adjacency(&[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")]);
        assert_eq!(find_cycle(&graph), None);
    }

    #[test]
    fn test_deep_chain_does_not_overflow() {
        let names: Vec<String> = (0..100_000).map(|i| format!("r{}", i)).collect();
        let mut graph = Adjacency::new();
        for pair in names.windows(2) {
            graph.insert(pair[0].clone(), vec![pair[1].clone()]);
        }
        assert_eq!(find_cycle(&graph), None);
    }

    #[test]
    fn test_check_role_manager() {
        let rm = DefaultRoleManager::new(10);
        rm.add_link("u1", "g1", &[]).unwrap();
        rm.add_link("g1", "g2", &[]).unwrap();
        assert_eq!(CycleDetector::new().check(&rm), None);

        rm.add_link("g2", "u1", &[]).unwrap();
        assert_eq!(
            CycleDetector::new().check(&rm).unwrap(),
            "Cycle detected: g1 -> g2 -> u1 -> g1"
        );
    }

    #[test]
    fn test_domains_are_separate_nodes() {
        let rm = DomainRoleManager::new(10);
        rm.add_link("a", "b", &["d1"]).unwrap();
        rm.add_link("b", "a", &["d2"]).unwrap();
        assert_eq!(CycleDetector::new().check(&rm), None);

        rm.add_link("b", "a", &["d1"]).unwrap();
        let report = CycleDetector::new().check(&rm).unwrap();
        assert_eq!(report, "Cycle detected: d1::a -> d1::b -> d1::a");
    }

    #[test]
    fn test_check_does_not_mutate() {
        let rm = DefaultRoleManager::new(10);
        rm.add_link("a", "b", &[]).unwrap();
        let before = rm.role_links();
        CycleDetector::new().check(&rm);
        assert_eq!(rm.role_links(), before);
    }
}

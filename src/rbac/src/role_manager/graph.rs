//! Name-indexed role graph with bounded, level-synchronized traversal
//!
//! Roles live in an arena (`slots`) addressed by [`RoleId`]; a name index maps
//! role names to slots. Each node keeps both its parent set and its child set,
//! so inverse lookups never scan the arena. Freed slots are reused.

use indexmap::IndexSet;
use std::collections::{HashMap, HashSet};

use super::MatchingFn;
use crate::error::{RbacError, Result};

pub(crate) type RoleId = usize;

/// Edge gate, called as `gate(child, parent)` for each candidate edge
pub(crate) type EdgeGate<'a> = &'a dyn Fn(&str, &str) -> bool;

#[derive(Debug, Clone)]
struct RoleNode {
    name: String,
    parents: IndexSet<RoleId>,
    children: IndexSet<RoleId>,
}

impl RoleNode {
    fn new(name: String) -> Self {
        Self {
            name,
            parents: IndexSet::new(),
            children: IndexSet::new(),
        }
    }
}

/// Traversal capabilities for one query
#[derive(Clone, Copy)]
pub(crate) struct Traversal<'a> {
    /// Maximum number of inheritance hops
    pub max_level: usize,
    /// Name-matching predicate; pattern roles become equivalent to the names they match
    pub matcher: Option<&'a MatchingFn>,
    /// Per-edge eligibility check
    pub gate: Option<EdgeGate<'a>>,
}

impl<'a> Traversal<'a> {
    pub fn new(max_level: usize) -> Self {
        Self {
            max_level,
            matcher: None,
            gate: None,
        }
    }

    pub fn with_matcher(mut self, matcher: Option<&'a MatchingFn>) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_gate(mut self, gate: Option<EdgeGate<'a>>) -> Self {
        self.gate = gate;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// Towards inherited roles
    Parents,
    /// Towards inheriting roles
    Children,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct RoleGraph {
    slots: Vec<Option<RoleNode>>,
    free: Vec<RoleId>,
    index: HashMap<String, RoleId>,
}

impl RoleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.index.clear();
    }

    /// Look up or create a role
    pub fn ensure_role(&mut self, name: &str) -> RoleId {
        if let Some(&id) = self.index.get(name) {
            return id;
        }
        let node = RoleNode::new(name.to_string());
        let id = match self.free.pop() {
            Some(id) => {
                self.slots[id] = Some(node);
                id
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };
        self.index.insert(name.to_string(), id);
        id
    }

    /// Remove a role and every edge touching it
    pub fn remove_role(&mut self, name: &str) -> bool {
        let Some(id) = self.index.remove(name) else {
            return false;
        };
        if let Some(node) = self.slots[id].take() {
            for parent in node.parents {
                if let Some(p) = self.slots[parent].as_mut() {
                    p.children.shift_remove(&id);
                }
            }
            for child in node.children {
                if let Some(c) = self.slots[child].as_mut() {
                    c.parents.shift_remove(&id);
                }
            }
        }
        self.free.push(id);
        true
    }

    /// Add `child -> parent`, creating both roles. Returns false if the edge existed.
    pub fn add_link(&mut self, child: &str, parent: &str) -> bool {
        let child_id = self.ensure_role(child);
        let parent_id = self.ensure_role(parent);
        let added = match self.slots[child_id].as_mut() {
            Some(node) => node.parents.insert(parent_id),
            None => false,
        };
        if let Some(node) = self.slots[parent_id].as_mut() {
            node.children.insert(child_id);
        }
        added
    }

    /// Remove `child -> parent`. Both roles must exist; a missing edge is a no-op.
    pub fn delete_link(&mut self, child: &str, parent: &str) -> Result<bool> {
        let child_id = self.require(child)?;
        let parent_id = self.require(parent)?;
        let removed = match self.slots[child_id].as_mut() {
            Some(node) => node.parents.shift_remove(&parent_id),
            None => false,
        };
        if let Some(node) = self.slots[parent_id].as_mut() {
            node.children.shift_remove(&child_id);
        }
        Ok(removed)
    }

    /// Direct parents in insertion order, `None` if the role is absent
    pub fn parents(&self, name: &str) -> Option<Vec<String>> {
        let id = *self.index.get(name)?;
        Some(self.names_of(self.neighbours(id, Direction::Parents)))
    }

    /// Direct children in insertion order, `None` if the role is absent
    pub fn children(&self, name: &str) -> Option<Vec<String>> {
        let id = *self.index.get(name)?;
        Some(self.names_of(self.neighbours(id, Direction::Children)))
    }

    /// Every role with its direct parents, in arena order
    pub fn links(&self) -> Vec<(String, Vec<String>)> {
        self.slots
            .iter()
            .flatten()
            .map(|node| (node.name.clone(), self.names_of(node.parents.iter().copied())))
            .collect()
    }

    /// Every `(child, parent)` edge, in arena order
    pub fn edges(&self) -> Vec<(String, String)> {
        self.links()
            .into_iter()
            .flat_map(|(child, parents)| parents.into_iter().map(move |p| (child.clone(), p)))
            .collect()
    }

    /// Add every edge of `other` to this graph
    pub fn copy_links_from(&mut self, other: &RoleGraph) {
        for (child, parent) in other.edges() {
            self.add_link(&child, &parent);
        }
    }

    /// Whether `to` is reachable from `from` within `traversal.max_level` hops
    ///
    /// Expands the frontier one level at a time so the hop bound is exact, and
    /// keeps a visited set so cyclic graphs terminate early.
    pub fn reaches(&self, from: &str, to: &str, traversal: &Traversal<'_>) -> bool {
        if traversal.matcher.is_none() && !self.contains(to) {
            return false;
        }

        let mut frontier = self.start_set(from, traversal.matcher);
        let mut visited: HashSet<RoleId> = frontier.iter().copied().collect();
        let mut remaining = traversal.max_level;

        while !frontier.is_empty() {
            if frontier.iter().any(|&id| self.is_target(id, to, traversal.matcher)) {
                return true;
            }
            if remaining == 0 {
                return false;
            }
            remaining -= 1;
            frontier = self.expand(&frontier, traversal, Direction::Parents, &mut visited);
        }

        false
    }

    /// Roles reachable from `from` (excluding the start set), breadth-first
    pub fn reachable_roles(&self, from: &str, traversal: &Traversal<'_>) -> Vec<String> {
        self.walk(from, traversal, Direction::Parents)
    }

    /// Roles that reach `to` (excluding the start set), breadth-first
    pub fn reaching_users(&self, to: &str, traversal: &Traversal<'_>) -> Vec<String> {
        self.walk(to, traversal, Direction::Children)
    }

    fn walk(&self, start: &str, traversal: &Traversal<'_>, direction: Direction) -> Vec<String> {
        let mut frontier = self.start_set(start, traversal.matcher);
        let mut visited: HashSet<RoleId> = frontier.iter().copied().collect();
        let mut found = Vec::new();

        for _ in 0..traversal.max_level {
            frontier = self.expand(&frontier, traversal, direction, &mut visited);
            if frontier.is_empty() {
                break;
            }
            found.extend(frontier.iter().filter_map(|&id| self.name(id)).map(str::to_string));
        }

        found
    }

    fn expand(
        &self,
        frontier: &[RoleId],
        traversal: &Traversal<'_>,
        direction: Direction,
        visited: &mut HashSet<RoleId>,
    ) -> Vec<RoleId> {
        let mut next = Vec::new();
        for &id in frontier {
            for holder in self.equivalents(id, traversal.matcher) {
                let Some(holder_name) = self.name(holder) else {
                    continue;
                };
                for neighbour in self.neighbours(holder, direction) {
                    if visited.contains(&neighbour) {
                        continue;
                    }
                    let Some(neighbour_name) = self.name(neighbour) else {
                        continue;
                    };
                    if let Some(gate) = traversal.gate {
                        let eligible = match direction {
                            Direction::Parents => gate(holder_name, neighbour_name),
                            Direction::Children => gate(neighbour_name, holder_name),
                        };
                        if !eligible {
                            continue;
                        }
                    }
                    visited.insert(neighbour);
                    next.push(neighbour);
                }
            }
        }
        next
    }

    /// The role itself, or the pattern roles matching the name when it is absent
    fn start_set(&self, name: &str, matcher: Option<&MatchingFn>) -> Vec<RoleId> {
        if let Some(&id) = self.index.get(name) {
            return vec![id];
        }
        match matcher {
            Some(matcher) => self.matching_ids(name, None, matcher),
            None => Vec::new(),
        }
    }

    /// A role plus every other role whose name it matches as a pattern
    fn equivalents(&self, id: RoleId, matcher: Option<&MatchingFn>) -> Vec<RoleId> {
        let mut ids = vec![id];
        if let (Some(matcher), Some(name)) = (matcher, self.name(id)) {
            ids.extend(self.matching_ids(name, Some(id), matcher));
        }
        ids
    }

    fn matching_ids(&self, name: &str, skip: Option<RoleId>, matcher: &MatchingFn) -> Vec<RoleId> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.as_ref().map(|node| (id, node)))
            .filter(|(id, node)| Some(*id) != skip && node.name != name && matcher(name, &node.name))
            .map(|(id, _)| id)
            .collect()
    }

    fn is_target(&self, id: RoleId, target: &str, matcher: Option<&MatchingFn>) -> bool {
        match self.name(id) {
            Some(name) => name == target || matcher.is_some_and(|m| m(name, target)),
            None => false,
        }
    }

    fn require(&self, name: &str) -> Result<RoleId> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| RbacError::RoleNotFound(name.to_string()))
    }

    fn name(&self, id: RoleId) -> Option<&str> {
        self.slots.get(id)?.as_ref().map(|node| node.name.as_str())
    }

    fn neighbours(&self, id: RoleId, direction: Direction) -> impl Iterator<Item = RoleId> + '_ {
        self.slots
            .get(id)
            .and_then(Option::as_ref)
            .into_iter()
            .flat_map(move |node| match direction {
                Direction::Parents => node.parents.iter().copied(),
                Direction::Children => node.children.iter().copied(),
            })
    }

    fn names_of(&self, ids: impl IntoIterator<Item = RoleId>) -> Vec<String> {
        ids.into_iter()
            .filter_map(|id| self.name(id))
            .map(str::to_string)
            .collect()
    }
}

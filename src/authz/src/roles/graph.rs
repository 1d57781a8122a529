//! Role inheritance graph
//!
//! Inheritance must form a DAG. Cycles are rejected when a role is
//! defined, never at evaluation time:
//! 1. DFS with three colors finds a cycle and reports its path
//! 2. Kahn's algorithm yields a parents-first definition order

use super::types::Role;
use crate::error::{AuthzError, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

/// DFS node state
#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    Unvisited,
    InProgress,
    Done,
}

/// Inheritance edges, role name → parent role names
#[derive(Debug, Clone, Default)]
pub struct RoleGraph {
    edges: BTreeMap<String, Vec<String>>,
}

impl RoleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from role definitions
    pub fn from_roles<'a>(roles: impl IntoIterator<Item = &'a Role>) -> Self {
        let mut graph = Self::new();
        for role in roles {
            graph.insert(role);
        }
        graph
    }

    /// Add or replace a role's edges
    pub fn insert(&mut self, role: &Role) {
        self.edges.insert(role.name.clone(), role.parents.clone());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.edges.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Find one inheritance cycle, returned as a closed path
    pub fn detect_cycle(&self) -> Option<Vec<String>> {
        let mut state: HashMap<&str, Visit> =
            self.edges.keys().map(|k| (k.as_str(), Visit::Unvisited)).collect();
        let mut path = Vec::new();

        for start in self.edges.keys() {
            if state.get(start.as_str()) == Some(&Visit::Unvisited) {
                if let Some(cycle) = self.visit(start, &mut state, &mut path) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn visit<'a>(
        &'a self,
        node: &'a str,
        state: &mut HashMap<&'a str, Visit>,
        path: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        match state.get(node) {
            Some(Visit::InProgress) => {
                let start = path.iter().position(|n| *n == node)?;
                let mut cycle: Vec<String> = path[start..].iter().map(|n| n.to_string()).collect();
                cycle.push(node.to_string());
                return Some(cycle);
            }
            Some(Visit::Done) | None => return None,
            Some(Visit::Unvisited) => {}
        }

        state.insert(node, Visit::InProgress);
        path.push(node);

        if let Some(parents) = self.edges.get(node) {
            for parent in parents {
                if let Some(cycle) = self.visit(parent, state, path) {
                    return Some(cycle);
                }
            }
        }

        state.insert(node, Visit::Done);
        path.pop();
        None
    }

    /// Parents-first order over all roles in the graph (Kahn's algorithm)
    ///
    /// Parents outside the graph are ignored for ordering purposes.
    pub fn resolve_order(&self) -> Result<Vec<String>> {
        let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
        let mut children: HashMap<&str, Vec<&str>> = HashMap::new();

        for (name, parents) in &self.edges {
            let known: BTreeSet<&str> = parents
                .iter()
                .map(String::as_str)
                .filter(|p| self.edges.contains_key(*p))
                .collect();
            in_degree.insert(name.as_str(), known.len());
            for parent in known {
                children.entry(parent).or_default().push(name.as_str());
            }
        }

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut order = Vec::with_capacity(self.edges.len());

        while let Some(current) = queue.pop_front() {
            order.push(current.to_string());
            if let Some(dependents) = children.get(current) {
                for dependent in dependents {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(*dependent);
                        }
                    }
                }
            }
        }

        if order.len() != self.edges.len() {
            let cycle = self
                .detect_cycle()
                .map(|c| c.join(" -> "))
                .unwrap_or_else(|| "unknown cycle".to_string());
            return Err(AuthzError::CircularInheritance(cycle));
        }

        Ok(order)
    }

    /// Check that defining `role` on top of `catalog` keeps the graph valid
    ///
    /// Every parent must already be defined and the result must be acyclic.
    pub fn check_definition(catalog: &HashMap<String, Role>, role: &Role) -> Result<()> {
        role.validate()?;

        for parent in &role.parents {
            if parent != &role.name && !catalog.contains_key(parent) {
                return Err(AuthzError::RoleNotFound(format!(
                    "parent '{}' of role '{}'",
                    parent, role.name
                )));
            }
        }

        let mut graph = Self::from_roles(catalog.values());
        graph.insert(role);
        if let Some(cycle) = graph.detect_cycle() {
            return Err(AuthzError::CircularInheritance(cycle.join(" -> ")));
        }

        Ok(())
    }
}

//! `ExecutionGraph` — a per-run derived view built from a [`Workflow`] just
//! before dispatch (spec.md §3). Never persisted.

use std::collections::HashMap;

use super::workflow::{Connection, Node, Workflow};

/// A set of nodes that share an identical dependency set and are therefore
/// eligible to run concurrently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParallelGroup {
    pub nodes: Vec<String>,
    pub max_concurrency: usize,
}

#[derive(Debug, Clone)]
pub struct ExecutionGraph {
    pub node_map: HashMap<String, Node>,
    /// For each node id, the ids of nodes it depends on (`wait_for_all`).
    pub dependencies: HashMap<String, Vec<String>>,
    /// For each node id, the ids of nodes that depend on it.
    pub dependents: HashMap<String, Vec<String>>,
    /// For each node id, its full incoming connections (source id plus the
    /// `source_port`/`target_port` pair) — kept so branch routing (condition
    /// `true`/`false`, split ports) can be enforced at dispatch time instead
    /// of being discarded after dependency extraction.
    pub incoming: HashMap<String, Vec<Connection>>,
    pub parallel_groups: Vec<ParallelGroup>,
    pub topological_order: Vec<String>,
    pub critical_path: Vec<String>,
}

impl ExecutionGraph {
    /// Build the derived graph from a workflow and its precomputed
    /// topological order (the validator already proved acyclicity).
    pub fn build(workflow: &Workflow, topological_order: Vec<String>) -> Self {
        let node_map: HashMap<String, Node> = workflow
            .nodes
            .iter()
            .map(|n| (n.id.clone(), n.clone()))
            .collect();

        let mut dependencies: HashMap<String, Vec<String>> =
            node_map.keys().map(|id| (id.clone(), Vec::new())).collect();
        let mut dependents: HashMap<String, Vec<String>> =
            node_map.keys().map(|id| (id.clone(), Vec::new())).collect();
        let mut incoming: HashMap<String, Vec<Connection>> =
            node_map.keys().map(|id| (id.clone(), Vec::new())).collect();

        for conn in &workflow.connections {
            dependencies
                .entry(conn.target.clone())
                .or_default()
                .push(conn.source.clone());
            dependents
                .entry(conn.source.clone())
                .or_default()
                .push(conn.target.clone());
            incoming.entry(conn.target.clone()).or_default().push(conn.clone());
        }

        let parallel_groups = group_by_identical_dependencies(&dependencies, &topological_order);
        let critical_path = longest_path(&node_map, &dependents, &topological_order);

        Self {
            node_map,
            dependencies,
            dependents,
            incoming,
            parallel_groups,
            topological_order,
            critical_path,
        }
    }

    pub fn incoming_of(&self, node_id: &str) -> &[Connection] {
        self.incoming
            .get(node_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn dependencies_of(&self, node_id: &str) -> &[String] {
        self.dependencies
            .get(node_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn dependents_of(&self, node_id: &str) -> &[String] {
        self.dependents
            .get(node_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

/// Group nodes that share an identical *multiset* of dependency ids.
/// Each group's default `max_concurrency` equals its size (spec.md §4.1).
fn group_by_identical_dependencies(
    dependencies: &HashMap<String, Vec<String>>,
    topological_order: &[String],
) -> Vec<ParallelGroup> {
    let mut buckets: Vec<(Vec<String>, Vec<String>)> = Vec::new();

    for node_id in topological_order {
        let mut deps = dependencies.get(node_id).cloned().unwrap_or_default();
        deps.sort();

        if let Some((_, nodes)) = buckets.iter_mut().find(|(key, _)| key == &deps) {
            nodes.push(node_id.clone());
        } else {
            buckets.push((deps, vec![node_id.clone()]));
        }
    }

    buckets
        .into_iter()
        .map(|(_, nodes)| {
            let max_concurrency = nodes.len();
            ParallelGroup { nodes, max_concurrency }
        })
        .collect()
}

/// Longest path through the DAG by node count, used as a rough critical
/// path estimate (no per-node cost model exists at graph-build time).
fn longest_path(
    node_map: &HashMap<String, Node>,
    dependents: &HashMap<String, Vec<String>>,
    topological_order: &[String],
) -> Vec<String> {
    let mut best_len: HashMap<&str, usize> = HashMap::new();
    let mut best_prev: HashMap<&str, &str> = HashMap::new();

    for id in topological_order {
        best_len.entry(id.as_str()).or_insert(1);
    }

    for id in topological_order {
        let current_len = *best_len.get(id.as_str()).unwrap_or(&1);
        if let Some(children) = dependents.get(id) {
            for child in children {
                let candidate = current_len + 1;
                let existing = *best_len.get(child.as_str()).unwrap_or(&1);
                if candidate > existing {
                    best_len.insert(child.as_str(), candidate);
                    best_prev.insert(child.as_str(), id.as_str());
                }
            }
        }
    }

    let tail = best_len
        .iter()
        .max_by_key(|(_, len)| **len)
        .map(|(id, _)| *id);

    let Some(mut cursor) = tail else {
        return Vec::new();
    };

    let mut path = vec![cursor.to_string()];
    while let Some(prev) = best_prev.get(cursor) {
        path.push(prev.to_string());
        cursor = prev;
    }
    path.reverse();

    // Guard against a disconnected graph reporting a misleadingly short path.
    if node_map.is_empty() {
        return Vec::new();
    }
    path
}

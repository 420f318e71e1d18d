//! Dependency graph over the tasks of a run.
//!
//! The graph is built once from a frozen task list. Construction computes
//! the level batching used for scheduling: level 0 holds the tasks with no
//! dependencies, level k the tasks whose dependencies all sit in levels
//! 0..k. Tasks that can never be levelled are part of (or downstream of) a
//! dependency cycle.

use crate::core::task::{Task, TaskId};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::HashMap;

/// The task dependency graph.
///
/// Nodes are task ids. An edge `a -> b` means `b` requires `a`.
pub struct DependencyGraph {
    /// The underlying directed graph.
    graph: DiGraph<TaskId, ()>,
    /// Index mapping from TaskId to NodeIndex for fast lookups.
    task_index: HashMap<TaskId, NodeIndex>,
    /// Topological batches, level 0 first.
    levels: Vec<Vec<TaskId>>,
    /// Level assigned to each levelled task.
    level_of: HashMap<TaskId, usize>,
    /// Tasks left without a level because of a cycle.
    unresolved: Vec<TaskId>,
}

impl DependencyGraph {
    /// Build the graph and its leveling from a task list.
    ///
    /// Dependency ids that do not resolve to a task in the list are
    /// ignored and treated as already satisfied. If a task id appears more
    /// than once, the first occurrence wins.
    pub fn build(tasks: &[Task]) -> Self {
        let mut graph = DiGraph::new();
        let mut task_index = HashMap::new();
        let mut unique = Vec::with_capacity(tasks.len());

        for task in tasks {
            if task_index.contains_key(&task.id) {
                continue;
            }
            let index = graph.add_node(task.id.clone());
            task_index.insert(task.id.clone(), index);
            unique.push(task);
        }

        for task in unique {
            let to = task_index[&task.id];
            for dep in &task.dependencies {
                if let Some(&from) = task_index.get(dep) {
                    if graph.find_edge(from, to).is_none() {
                        graph.add_edge(from, to, ());
                    }
                }
            }
        }

        let (levels, unresolved) = compute_levels(&graph);
        let level_of = levels
            .iter()
            .enumerate()
            .flat_map(|(level, ids)| ids.iter().map(move |id| (id.clone(), level)))
            .collect();

        Self {
            graph,
            task_index,
            levels,
            level_of,
            unresolved,
        }
    }

    /// True if some tasks could not be levelled.
    pub fn has_cycles(&self) -> bool {
        !self.unresolved.is_empty()
    }

    /// Level batches. Partial when [`has_cycles`](Self::has_cycles) is true.
    pub fn levels(&self) -> &[Vec<TaskId>] {
        &self.levels
    }

    /// Tasks that were not assigned any level.
    pub fn unresolved(&self) -> &[TaskId] {
        &self.unresolved
    }

    /// The dependency cycles themselves, one entry per strongly connected
    /// component (including self-loops). Each cycle is sorted by id.
    pub fn cycle_members(&self) -> Vec<Vec<TaskId>> {
        let mut cycles: Vec<Vec<TaskId>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| {
                scc.len() > 1 || scc.iter().any(|&n| self.graph.find_edge(n, n).is_some())
            })
            .map(|scc| {
                let mut ids: Vec<TaskId> = scc
                    .into_iter()
                    .filter_map(|n| self.graph.node_weight(n).cloned())
                    .collect();
                ids.sort();
                ids
            })
            .collect();
        cycles.sort();
        cycles
    }

    /// Level of a task, if it was levelled.
    pub fn level_of(&self, id: &TaskId) -> Option<usize> {
        self.level_of.get(id).copied()
    }

    /// Tasks the given task requires (predecessors).
    pub fn dependencies_of(&self, id: &TaskId) -> Vec<&TaskId> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Tasks requiring the given task (successors).
    pub fn dependents_of(&self, id: &TaskId) -> Vec<&TaskId> {
        self.neighbors(id, Direction::Outgoing)
    }

    fn neighbors(&self, id: &TaskId, direction: Direction) -> Vec<&TaskId> {
        let Some(&index) = self.task_index.get(id) else {
            return Vec::new();
        };
        let mut out: Vec<&TaskId> = self
            .graph
            .neighbors_directed(index, direction)
            .filter_map(|n| self.graph.node_weight(n))
            .collect();
        out.sort();
        out
    }

    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }
}

/// Kahn-style batching. Returns the levels and the ids never levelled.
fn compute_levels(graph: &DiGraph<TaskId, ()>) -> (Vec<Vec<TaskId>>, Vec<TaskId>) {
    let mut in_degree: Vec<usize> = graph
        .node_indices()
        .map(|n| graph.neighbors_directed(n, Direction::Incoming).count())
        .collect();
    let mut assigned = vec![false; graph.node_count()];

    let mut current: Vec<NodeIndex> = graph
        .node_indices()
        .filter(|n| in_degree[n.index()] == 0)
        .collect();
    let mut levels = Vec::new();

    while !current.is_empty() {
        let mut next = Vec::new();
        for &node in &current {
            assigned[node.index()] = true;
            for succ in graph.neighbors_directed(node, Direction::Outgoing) {
                in_degree[succ.index()] -= 1;
                if in_degree[succ.index()] == 0 {
                    next.push(succ);
                }
            }
        }
        levels.push(current.iter().map(|&n| graph[n].clone()).collect());
        next.sort();
        current = next;
    }

    let unresolved = graph
        .node_indices()
        .filter(|n| !assigned[n.index()])
        .map(|n| graph[n].clone())
        .collect();

    (levels, unresolved)
}

impl std::fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("tasks", &self.task_count())
            .field("dependencies", &self.dependency_count())
            .field("levels", &self.levels.len())
            .field("unresolved", &self.unresolved.len())
            .finish()
    }
}

// src/dag/graph.rs

use std::collections::BTreeMap;

use crate::config::model::DagSection;
use crate::types::TaskId;

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone, Default)]
struct DagNode {
    /// Direct upstream tasks.
    deps: Vec<TaskId>,
    /// Direct downstream tasks.
    dependents: Vec<TaskId>,
}

/// Adjacency lists of a DAG keyed by task id.
///
/// Acyclicity is checked in `config::validate`; here we only keep the edges
/// needed for scheduling, leaf lookup and downstream skipping. Keys are kept
/// sorted so iteration order is stable.
#[derive(Debug, Clone, Default)]
pub struct DagGraph {
    nodes: BTreeMap<TaskId, DagNode>,
}

impl DagGraph {
    /// Build a graph from a DAG section.
    ///
    /// Assumes every `after` reference names a task of the same section.
    pub fn from_section(section: &DagSection) -> Self {
        let mut nodes: BTreeMap<TaskId, DagNode> = section
            .task
            .iter()
            .map(|(name, task)| {
                (
                    name.clone(),
                    DagNode {
                        deps: task.after.clone(),
                        dependents: Vec::new(),
                    },
                )
            })
            .collect();

        let edges: Vec<(TaskId, TaskId)> = nodes
            .iter()
            .flat_map(|(name, node)| node.deps.iter().map(move |dep| (dep.clone(), name.clone())))
            .collect();

        for (dep, task) in edges {
            if let Some(dep_node) = nodes.get_mut(&dep) {
                dep_node.dependents.push(task);
            }
        }

        Self { nodes }
    }

    /// All task ids, sorted.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    /// Immediate downstream tasks of `name`.
    pub fn dependents_of(&self, name: &str) -> &[TaskId] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Tasks without downstream dependents.
    pub fn leaves(&self) -> impl Iterator<Item = &str> {
        self.nodes
            .iter()
            .filter(|(_, n)| n.dependents.is_empty())
            .map(|(name, _)| name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::TaskConfig;

    fn section() -> DagSection {
        let mut task = BTreeMap::new();
        task.insert("a".to_string(), TaskConfig::default());
        task.insert(
            "b".to_string(),
            TaskConfig {
                after: vec!["a".to_string()],
                ..TaskConfig::default()
            },
        );
        task.insert(
            "c".to_string(),
            TaskConfig {
                after: vec!["a".to_string()],
                ..TaskConfig::default()
            },
        );
        DagSection {
            dag_id: "d".to_string(),
            task,
        }
    }

    #[test]
    fn leaves_and_dependents_follow_edges() {
        let graph = DagGraph::from_section(&section());
        assert_eq!(graph.tasks().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(graph.leaves().collect::<Vec<_>>(), vec!["b", "c"]);
        assert_eq!(graph.dependents_of("a"), &["b".to_string(), "c".to_string()]);
        assert!(graph.dependents_of("b").is_empty());
        assert!(graph.dependents_of("missing").is_empty());
    }
}

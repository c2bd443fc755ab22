// src/dag/definition.rs

//! A named DAG: its tasks' settings plus the edges between them.

use std::collections::BTreeMap;

use crate::config::model::{DagSection, TaskConfig};
use crate::dag::graph::DagGraph;
use crate::types::TaskId;

#[derive(Debug, Clone)]
pub struct Dag {
    dag_id: String,
    tasks: BTreeMap<TaskId, TaskConfig>,
    graph: DagGraph,
}

impl Dag {
    /// Build from a (validated) DAG section.
    pub fn from_section(section: &DagSection) -> Self {
        Self {
            dag_id: section.dag_id.clone(),
            tasks: section.task.clone(),
            graph: DagGraph::from_section(section),
        }
    }

    pub fn dag_id(&self) -> &str {
        &self.dag_id
    }

    pub fn graph(&self) -> &DagGraph {
        &self.graph
    }

    pub fn task(&self, task_id: &str) -> Option<&TaskConfig> {
        self.tasks.get(task_id)
    }

    pub fn tasks(&self) -> impl Iterator<Item = (&str, &TaskConfig)> {
        self.tasks.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Tasks assigned to `pool`, in id order.
    pub fn tasks_in_pool<'a>(&'a self, pool: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.tasks
            .iter()
            .filter(move |(_, t)| t.pool.as_deref() == Some(pool))
            .map(|(k, _)| k.as_str())
    }

    /// Tasks with no downstream dependents.
    pub fn leaves(&self) -> Vec<TaskId> {
        self.graph.leaves().map(str::to_string).collect()
    }

    /// Direct downstream tasks of `task_id`.
    pub fn downstream_of(&self, task_id: &str) -> &[TaskId] {
        self.graph.dependents_of(task_id)
    }
}

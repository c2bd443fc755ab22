// src/store/model.rs

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::types::{RunState, RunType, TaskId, UNMAPPED};

/// One execution of a workflow at a given logical time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DagRun {
    pub dag_id: String,
    pub run_id: String,
    pub logical_date: DateTime<Utc>,
    pub run_type: RunType,
    pub state: RunState,
    pub external_trigger: bool,
    pub conf: Option<serde_json::Value>,
    pub data_interval: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl DagRun {
    pub fn run_ref(&self) -> RunRef {
        RunRef::new(&self.dag_id, &self.run_id)
    }

    /// Run id derived from run type and logical date, e.g.
    /// `scheduled__2016-01-01T00:00:00+00:00`.
    pub fn generate_run_id(run_type: RunType, logical_date: DateTime<Utc>) -> String {
        format!(
            "{}__{}",
            run_type.as_str(),
            logical_date.to_rfc3339_opts(SecondsFormat::AutoSi, false)
        )
    }
}

/// Parameters for [`RunRepository::create_run`](super::RunRepository::create_run).
#[derive(Debug, Clone, PartialEq)]
pub struct NewRun {
    pub run_type: RunType,
    pub logical_date: DateTime<Utc>,
    pub data_interval: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub conf: Option<serde_json::Value>,
    pub state: RunState,
    pub external_trigger: bool,
}

/// Identifies a run without carrying its state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunRef {
    pub dag_id: String,
    pub run_id: String,
}

impl RunRef {
    pub fn new(dag_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            dag_id: dag_id.into(),
            run_id: run_id.into(),
        }
    }
}

/// Identifies one task instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TaskInstanceKey {
    pub dag_id: String,
    pub run_id: String,
    pub task_id: TaskId,
    pub map_index: i64,
}

impl TaskInstanceKey {
    /// Key of an unmapped task instance.
    pub fn new(run: &RunRef, task_id: impl Into<TaskId>) -> Self {
        Self::mapped(run, task_id, UNMAPPED)
    }

    pub fn mapped(run: &RunRef, task_id: impl Into<TaskId>, map_index: i64) -> Self {
        Self {
            dag_id: run.dag_id.clone(),
            run_id: run.run_id.clone(),
            task_id: task_id.into(),
            map_index,
        }
    }

    pub fn run(&self) -> RunRef {
        RunRef::new(&self.dag_id, &self.run_id)
    }
}

/// A named capacity limiter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pool {
    pub name: String,
    pub slots: u32,
}

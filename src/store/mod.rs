// src/store/mod.rs

//! Metadata store interfaces consumed by the operators and the nested-run
//! engine.
//!
//! Every collaborator is passed explicitly (usually as an
//! `Arc<dyn MetadataStore>`); nothing here is process-global.
//!
//! - [`model`] holds the run / task-instance / pool records.
//! - [`memory`] is the in-process implementation used by the CLI and tests.

pub mod memory;
pub mod model;

use chrono::{DateTime, Utc};

use crate::errors::Result;
use crate::types::{RunState, TaskId, TaskState};

pub use memory::InMemoryStore;
pub use model::{DagRun, NewRun, Pool, RunRef, TaskInstanceKey};

/// Create and look up workflow runs.
pub trait RunRepository: Send + Sync {
    /// Create a run; fails if one already exists for the same DAG and
    /// logical date.
    fn create_run(&self, dag_id: &str, new_run: NewRun) -> Result<DagRun>;

    /// The run of `dag_id` at `logical_date`, if any.
    fn get_run(&self, dag_id: &str, logical_date: DateTime<Utc>) -> Result<Option<DagRun>>;

    fn set_run_state(&self, run: &RunRef, state: RunState) -> Result<()>;
}

/// Read and write task-instance states.
pub trait TaskStateStore: Send + Sync {
    /// `None` when no task instance exists for the key.
    fn get_task_state(&self, key: &TaskInstanceKey) -> Result<Option<TaskState>>;

    fn set_task_state(&self, key: TaskInstanceKey, state: TaskState) -> Result<()>;

    /// Every task instance recorded for a run.
    fn task_instances(&self, run: &RunRef) -> Result<Vec<(TaskInstanceKey, TaskState)>>;
}

/// Mark tasks of a run as intentionally not executed.
pub trait SkipMarker: Send + Sync {
    fn skip(
        &self,
        run: &RunRef,
        logical_date: DateTime<Utc>,
        tasks: &[TaskId],
        map_index: i64,
    ) -> Result<()>;
}

/// Read pool records.
pub trait PoolReader: Send + Sync {
    fn get_pool(&self, name: &str) -> Result<Option<Pool>>;
}

/// Everything the operators need from the metadata database.
pub trait MetadataStore: RunRepository + TaskStateStore + SkipMarker + PoolReader {}

impl<T> MetadataStore for T where T: RunRepository + TaskStateStore + SkipMarker + PoolReader {}

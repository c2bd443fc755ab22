// src/dag/task_info.rs

//! Task metadata and per-run state used by the nested-run scheduler.

use crate::config::model::TaskConfig;
use crate::types::{TaskId, TaskState};

/// Per-run progress of a task (internal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Waiting on upstream tasks or on a free pool slot.
    Pending,
    /// Handed to the executor.
    Running,
    /// Finished with the given (finished) state.
    Done(TaskState),
}

impl From<Progress> for TaskState {
    fn from(p: Progress) -> Self {
        match p {
            Progress::Pending => TaskState::None,
            Progress::Running => TaskState::Running,
            Progress::Done(state) => state,
        }
    }
}

/// Static task information plus per-run progress.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub name: TaskId,
    pub cmd: String,
    pub pool: Option<String>,
    /// Direct upstream tasks (names in `after = [...]`).
    pub deps: Vec<TaskId>,
    pub progress: Progress,
}

impl TaskInfo {
    pub fn from_config(name: TaskId, cfg: &TaskConfig) -> Self {
        Self {
            name,
            cmd: cfg.cmd.clone().unwrap_or_default(),
            pool: cfg.pool.clone(),
            deps: cfg.after.clone(),
            progress: Progress::Pending,
        }
    }
}

/// A task the scheduler wants the executor to run now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTask {
    pub name: TaskId,
    pub cmd: String,
    pub pool: Option<String>,
    /// Run the task belongs to.
    pub run_id: String,
}

impl ScheduledTask {
    pub fn from_task_info(info: &TaskInfo, run_id: &str) -> Self {
        Self {
            name: info.name.clone(),
            cmd: info.cmd.clone(),
            pool: info.pool.clone(),
            run_id: run_id.to_string(),
        }
    }
}

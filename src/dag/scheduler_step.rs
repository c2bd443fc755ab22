// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use crate::dag::task_info::ScheduledTask;
use crate::types::{TaskId, TaskState};

/// Structured result of a single scheduler "step".
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Tasks that became ready to run as a result of this step.
    pub newly_scheduled: Vec<ScheduledTask>,
    /// Tasks that reached a finished state in this step, in the order they
    /// were decided (the completed task first, then anything it cascaded to).
    pub newly_finished: Vec<(TaskId, TaskState)>,
    /// Whether every task of the run is now finished.
    pub run_just_finished: bool,
}

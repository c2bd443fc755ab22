// src/engine/mod.rs

//! Local engine that executes one nested run.
//!
//! This module ties together:
//! - the nested-run scheduler
//! - the runtime event loop that reacts to task completions and shutdown
//! - the metadata store, which receives every task and run state change
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use crate::types::{TaskId, TaskState};

/// Exit code that marks a task as skipped rather than failed.
pub const SKIP_EXIT_CODE: i32 = 99;

/// Outcome of a task process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    Skipped,
    Failed(i32),
}

impl TaskOutcome {
    /// Map a process exit code to an outcome.
    pub fn from_exit_code(code: i32) -> Self {
        match code {
            0 => TaskOutcome::Success,
            SKIP_EXIT_CODE => TaskOutcome::Skipped,
            other => TaskOutcome::Failed(other),
        }
    }

    pub fn task_state(self) -> TaskState {
        match self {
            TaskOutcome::Success => TaskState::Success,
            TaskOutcome::Skipped => TaskState::Skipped,
            TaskOutcome::Failed(_) => TaskState::Failed,
        }
    }
}

/// Events flowing into the runtime from the executor and signal handlers.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A task process exited with a concrete outcome.
    TaskCompleted { task: TaskId, outcome: TaskOutcome },
    /// Stop without finishing the run (e.g. Ctrl-C).
    ShutdownRequested,
}

pub mod core;
pub mod event_handlers;
pub mod runtime;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use runtime::Runtime;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_map_to_outcomes() {
        assert_eq!(TaskOutcome::from_exit_code(0), TaskOutcome::Success);
        assert_eq!(TaskOutcome::from_exit_code(99), TaskOutcome::Skipped);
        assert_eq!(TaskOutcome::from_exit_code(2), TaskOutcome::Failed(2));
        assert_eq!(TaskOutcome::Failed(2).task_state(), TaskState::Failed);
    }
}

// src/dag/mod.rs

//! DAG representation and nested-run scheduling.
//!
//! - [`definition`] holds a named DAG and its task settings.
//! - [`graph`] keeps the edges between tasks.
//! - [`scheduler`] contains the per-run state machine that decides which
//!   tasks are ready and what state the run ends in.
//! - [`task_info`] provides task metadata and scheduled task types.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`state_manager`] manages per-run state transitions.

pub mod definition;
pub mod graph;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;
pub mod task_info;

pub use definition::Dag;
pub use graph::DagGraph;
pub use scheduler::Scheduler;
pub use scheduler_step::SchedulerStep;
pub use task_info::ScheduledTask;

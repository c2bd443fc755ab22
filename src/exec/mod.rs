// src/exec/mod.rs

//! Process execution layer.
//!
//! Runs the commands of nested tasks with `tokio::process::Command` and
//! reports back to the runtime via `RuntimeEvent`s.
//!
//! - [`executor_loop`] owns the loop that starts task processes.
//! - [`task_runner`] runs a single task process.
//! - [`backend`] provides the `ExecutorBackend` trait and the
//!   `RealExecutorBackend` used in production, which tests replace with a
//!   fake implementation.

pub mod backend;
pub mod executor_loop;
pub mod task_runner;

pub use backend::{ExecutorBackend, RealExecutorBackend};
pub use executor_loop::spawn_executor;

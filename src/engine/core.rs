// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! The core consumes [`RuntimeEvent`]s and produces [`CoreCommand`]s
//! describing what the IO shell should do next (dispatch tasks, persist
//! states, finish the run). It has no channels, no Tokio types and does no
//! IO, so it can be unit tested directly.

use crate::dag::Scheduler;
use crate::engine::event_handlers::{handle_start, handle_task_completion, CoreStep};
use crate::engine::RuntimeEvent;

#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
}

impl CoreRuntime {
    pub fn new(scheduler: Scheduler) -> Self {
        Self { scheduler }
    }

    /// Expose whether every task finished (for tests).
    pub fn is_finished(&self) -> bool {
        self.scheduler.is_finished()
    }

    /// Produce the commands that kick off the run.
    pub fn start(&mut self) -> CoreStep {
        handle_start(&mut self.scheduler)
    }

    /// Handle a single runtime event.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::TaskCompleted { task, outcome } => {
                handle_task_completion(&mut self.scheduler, task, outcome)
            }
            RuntimeEvent::ShutdownRequested => CoreStep {
                commands: Vec::new(),
                keep_running: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::config::model::{DagSection, TaskConfig};
    use crate::dag::Dag;
    use crate::engine::{CoreCommand, TaskOutcome};
    use crate::types::{RunState, TaskState};

    fn core() -> CoreRuntime {
        let mut task = BTreeMap::new();
        task.insert(
            "a".to_string(),
            TaskConfig {
                cmd: Some("true".to_string()),
                ..TaskConfig::default()
            },
        );
        task.insert(
            "b".to_string(),
            TaskConfig {
                cmd: Some("true".to_string()),
                after: vec!["a".to_string()],
                ..TaskConfig::default()
            },
        );
        let dag = Dag::from_section(&DagSection {
            dag_id: "p.c".to_string(),
            task,
        });
        CoreRuntime::new(Scheduler::new(&dag, "r1", BTreeMap::new()))
    }

    #[test]
    fn failure_records_cascade_and_finishes_run() {
        let mut core = core();
        let start = core.start();
        assert!(start.keep_running);
        assert!(matches!(&start.commands[..], [CoreCommand::DispatchTasks(t)] if t.len() == 1));

        let step = core.step(RuntimeEvent::TaskCompleted {
            task: "a".to_string(),
            outcome: TaskOutcome::Failed(1),
        });
        assert!(!step.keep_running);
        assert_eq!(
            step.commands,
            vec![
                CoreCommand::RecordStates(vec![
                    ("a".to_string(), TaskState::Failed),
                    ("b".to_string(), TaskState::UpstreamFailed),
                ]),
                CoreCommand::FinishRun(RunState::Failed),
            ]
        );
        assert!(core.is_finished());
    }

    #[test]
    fn shutdown_stops_without_commands() {
        let mut core = core();
        core.start();
        let step = core.step(RuntimeEvent::ShutdownRequested);
        assert!(!step.keep_running);
        assert!(step.commands.is_empty());
    }
}

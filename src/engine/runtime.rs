// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::dag::{ScheduledTask, Scheduler};
use crate::errors::Result;
use crate::exec::ExecutorBackend;
use crate::store::{MetadataStore, RunRef, TaskInstanceKey};
use crate::types::{RunState, TaskId, TaskState};

use super::core::CoreRuntime;
use super::{CoreCommand, RuntimeEvent};

/// Carry task states recorded for `run` (by an earlier attempt) into
/// `scheduler` before it starts.
pub fn seed_from_store(
    scheduler: &mut Scheduler,
    store: &dyn MetadataStore,
    run: &RunRef,
) -> Result<()> {
    for (key, state) in store.task_instances(run)? {
        scheduler.seed_state(&key.task_id, state);
    }
    Ok(())
}

/// Drives the nested-run scheduler in response to `RuntimeEvent`s,
/// delegates command execution to an `ExecutorBackend` and writes every
/// state change to the metadata store.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// scheduling semantics.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    executor: E,
    store: Arc<dyn MetadataStore>,
    run: RunRef,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("run", &self.run)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(
        core: CoreRuntime,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        executor: E,
        store: Arc<dyn MetadataStore>,
        run: RunRef,
    ) -> Self {
        Self {
            core,
            event_rx,
            executor,
            store,
            run,
        }
    }

    /// Main event loop.
    ///
    /// - Starts the run and dispatches the first ready tasks.
    /// - Consumes `RuntimeEvent`s from `event_rx` and feeds them to the core.
    /// - Executes the commands returned by the core.
    ///
    /// Returns once the run finished or a shutdown was requested.
    pub async fn run(mut self) -> Result<()> {
        info!(dag_id = %self.run.dag_id, run_id = %self.run.run_id, "nested runtime started");

        let step = self.core.start();
        for command in step.commands {
            self.execute_command(command).await?;
        }
        if !step.keep_running {
            info!("nothing left to run; stopping runtime");
            return Ok(());
        }

        loop {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    warn!(run_id = %self.run.run_id, "runtime event channel closed before the run finished");
                    break;
                }
            };

            debug!(?event, "runtime received event");

            let step = self.core.step(event);
            for command in step.commands {
                self.execute_command(command).await?;
            }

            if !step.keep_running {
                info!("core requested exit; stopping runtime");
                break;
            }
        }

        info!(run_id = %self.run.run_id, "nested runtime exiting");
        Ok(())
    }

    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::DispatchTasks(tasks) => self.spawn_ready(tasks).await,
            CoreCommand::RecordStates(states) => self.record_states(states),
            CoreCommand::FinishRun(state) => self.finish_run(state),
        }
    }

    async fn spawn_ready(&mut self, tasks: Vec<ScheduledTask>) -> Result<()> {
        if tasks.is_empty() {
            return Ok(());
        }

        for task in &tasks {
            self.store.set_task_state(
                TaskInstanceKey::new(&self.run, task.name.as_str()),
                TaskState::Running,
            )?;
        }

        let names: Vec<_> = tasks.iter().map(|t| t.name.as_str()).collect();
        debug!(?names, run_id = %self.run.run_id, "spawning ready tasks");

        self.executor.spawn_ready_tasks(tasks).await
    }

    fn record_states(&self, states: Vec<(TaskId, TaskState)>) -> Result<()> {
        for (task, state) in states {
            debug!(task = %task, %state, "recording task state");
            self.store
                .set_task_state(TaskInstanceKey::new(&self.run, task), state)?;
        }
        Ok(())
    }

    fn finish_run(&self, state: RunState) -> Result<()> {
        info!(run_id = %self.run.run_id, %state, "nested run finished");
        self.store.set_run_state(&self.run, state)
    }
}

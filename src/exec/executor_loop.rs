// src/exec/executor_loop.rs

//! Executor loop that starts one process per scheduled task.

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::dag::ScheduledTask;
use crate::engine::RuntimeEvent;
use crate::exec::task_runner::run_task;

/// Spawn the background executor loop.
///
/// The returned sender is what `RealExecutorBackend` uses to hand over
/// tasks. Each task runs in its own Tokio task; concurrency is already
/// bounded by the scheduler's pool slots. When the sender is dropped the
/// loop stops and running processes are killed.
pub fn spawn_executor(runtime_tx: mpsc::Sender<RuntimeEvent>) -> mpsc::Sender<ScheduledTask> {
    let (tx, mut rx) = mpsc::channel::<ScheduledTask>(32);

    tokio::spawn(async move {
        info!("executor loop started");
        let mut running = JoinSet::new();

        loop {
            tokio::select! {
                next = rx.recv() => match next {
                    Some(task) => {
                        debug!(task = %task.name, run_id = %task.run_id, "executor received task");
                        running.spawn(run_task(task, runtime_tx.clone()));
                    }
                    None => break,
                },
                Some(joined) = running.join_next(), if !running.is_empty() => {
                    if let Err(err) = joined {
                        warn!(error = %err, "task runner panicked or was aborted");
                    }
                }
            }
        }

        info!("executor loop finished (channel closed)");
    });

    tx
}

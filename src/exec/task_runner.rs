// src/exec/task_runner.rs

//! Individual task process runner.

use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::dag::ScheduledTask;
use crate::engine::{RuntimeEvent, TaskOutcome};

/// Run a single task process and emit exactly one `TaskCompleted` event.
///
/// Exit code 0 is success, [`SKIP_EXIT_CODE`](crate::engine::SKIP_EXIT_CODE)
/// is a skip, anything else (including failing to start) is a failure.
pub async fn run_task(task: ScheduledTask, runtime_tx: mpsc::Sender<RuntimeEvent>) {
    let task_name = task.name.clone();
    let run_id = task.run_id.clone();

    let outcome = match run_process(&task).await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(task = %task_name, %run_id, error = %err, "task execution error");
            TaskOutcome::Failed(-1)
        }
    };

    if runtime_tx
        .send(RuntimeEvent::TaskCompleted {
            task: task_name.clone(),
            outcome,
        })
        .await
        .is_err()
    {
        debug!(task = %task_name, "runtime gone; dropping completion");
    }
}

async fn run_process(task: &ScheduledTask) -> Result<TaskOutcome> {
    info!(task = %task.name, run_id = %task.run_id, cmd = %task.cmd, "starting task process");

    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(&task.cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(&task.cmd);
        c
    };

    cmd.stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning process for task '{}'", task.name))?;

    if let Some(stdout) = child.stdout.take() {
        let task_name = task.name.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!(task = %task_name, "stdout: {}", line);
            }
        });
    }

    // Always consume stderr so buffers don't fill; log at debug.
    if let Some(stderr) = child.stderr.take() {
        let task_name = task.name.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(task = %task_name, "stderr: {}", line);
            }
        });
    }

    let status = child
        .wait()
        .await
        .with_context(|| format!("waiting for process of task '{}'", task.name))?;

    let code = status.code().unwrap_or(-1);
    let outcome = TaskOutcome::from_exit_code(code);
    info!(task = %task.name, run_id = %task.run_id, exit_code = code, ?outcome, "task process exited");
    Ok(outcome)
}

// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use crate::dag::{ScheduledTask, Scheduler, SchedulerStep};
use crate::engine::TaskOutcome;
use crate::types::{RunState, TaskId, TaskState};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreCommand {
    /// Send these tasks to the executor (and record them as running).
    DispatchTasks(Vec<ScheduledTask>),
    /// Persist finished task states.
    RecordStates(Vec<(TaskId, TaskState)>),
    /// Persist the final run state; the run is over.
    FinishRun(RunState),
}

/// Decision returned by the core after handling a single event.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute, in order.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

/// Start the run.
pub fn handle_start(scheduler: &mut Scheduler) -> CoreStep {
    let step = scheduler.start();
    commands_for(scheduler, step)
}

/// Handle a task completion event.
pub fn handle_task_completion(
    scheduler: &mut Scheduler,
    task: TaskId,
    outcome: TaskOutcome,
) -> CoreStep {
    let step = scheduler.handle_completion(&task, outcome.task_state());
    commands_for(scheduler, step)
}

fn commands_for(scheduler: &Scheduler, step: SchedulerStep) -> CoreStep {
    let mut commands = Vec::new();

    if !step.newly_finished.is_empty() {
        commands.push(CoreCommand::RecordStates(step.newly_finished));
    }
    if !step.newly_scheduled.is_empty() {
        commands.push(CoreCommand::DispatchTasks(step.newly_scheduled));
    }

    let mut keep_running = true;
    if step.run_just_finished {
        commands.push(CoreCommand::FinishRun(scheduler.final_run_state()));
        keep_running = false;
    }

    CoreStep {
        commands,
        keep_running,
    }
}

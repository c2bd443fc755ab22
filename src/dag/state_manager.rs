// src/dag/state_manager.rs

//! Per-run state transitions for tasks of the nested run.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::dag::task_info::{Progress, ScheduledTask, TaskInfo};
use crate::types::{TaskId, TaskState};

/// What the upstream tasks of a pending task say about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Every upstream task succeeded.
    Ready,
    /// Some upstream task has not finished yet.
    Wait,
    /// Some upstream task failed (or was itself upstream-failed).
    UpstreamFailed,
    /// No upstream failure, but some upstream task was skipped.
    Skipped,
}

/// Manages per-run state transitions for tasks.
pub struct StateManager<'a> {
    tasks: &'a mut BTreeMap<TaskId, TaskInfo>,
    pool_slots: &'a BTreeMap<String, u32>,
    run_id: &'a str,
}

impl<'a> StateManager<'a> {
    pub fn new(
        tasks: &'a mut BTreeMap<TaskId, TaskInfo>,
        pool_slots: &'a BTreeMap<String, u32>,
        run_id: &'a str,
    ) -> Self {
        Self {
            tasks,
            pool_slots,
            run_id,
        }
    }

    /// Resolve every pending task as far as the current states allow.
    ///
    /// Upstream failures and skips cascade until nothing changes; tasks whose
    /// upstream all succeeded are marked `Running` if their pool has a free
    /// slot. Returns the newly scheduled tasks and the newly finished states.
    pub fn settle(&mut self) -> (Vec<ScheduledTask>, Vec<(TaskId, TaskState)>) {
        let mut scheduled = Vec::new();
        let mut finished = Vec::new();

        loop {
            let mut changed = false;

            // Decide first, then mutate to avoid borrowing issues.
            let pending: Vec<(TaskId, Verdict)> = {
                let ro = ReadOnlyStateManager::new(self.tasks);
                self.tasks
                    .values()
                    .filter(|info| info.progress == Progress::Pending)
                    .map(|info| (info.name.clone(), ro.verdict_for(info)))
                    .collect()
            };

            for (name, verdict) in pending {
                match verdict {
                    Verdict::Wait => {}
                    Verdict::UpstreamFailed | Verdict::Skipped => {
                        let state = if verdict == Verdict::Skipped {
                            TaskState::Skipped
                        } else {
                            TaskState::UpstreamFailed
                        };
                        if let Some(info) = self.tasks.get_mut(&name) {
                            debug!(task = %name, run_id = self.run_id, %state, "resolved from upstream");
                            info.progress = Progress::Done(state);
                            finished.push((name, state));
                            changed = true;
                        }
                    }
                    Verdict::Ready => {
                        let pool = self.tasks.get(&name).and_then(|i| i.pool.clone());
                        if let Some(pool) = pool.as_deref() {
                            if !self.has_free_slot(pool) {
                                debug!(task = %name, pool, "pool is full; task stays pending");
                                continue;
                            }
                        }
                        if let Some(info) = self.tasks.get_mut(&name) {
                            info!(task = %name, run_id = self.run_id, "dependencies satisfied; scheduling task");
                            info.progress = Progress::Running;
                            scheduled.push(ScheduledTask::from_task_info(info, self.run_id));
                            changed = true;
                        }
                    }
                }
            }

            if !changed {
                break;
            }
        }

        (scheduled, finished)
    }

    /// Record the outcome of a running task.
    ///
    /// Returns `false` (and leaves state untouched) when the task is unknown
    /// or not currently running.
    pub fn complete(&mut self, task: &str, state: TaskState) -> bool {
        match self.tasks.get_mut(task) {
            Some(info) if info.progress == Progress::Running => {
                info.progress = Progress::Done(state);
                true
            }
            Some(info) => {
                warn!(task, progress = ?info.progress, "completion for a task that is not running; ignoring");
                false
            }
            None => {
                warn!(task, "completion for unknown task; ignoring");
                false
            }
        }
    }

    fn has_free_slot(&self, pool: &str) -> bool {
        let Some(&slots) = self.pool_slots.get(pool) else {
            // Unknown pools do not limit anything.
            return true;
        };
        let running = self
            .tasks
            .values()
            .filter(|i| i.progress == Progress::Running && i.pool.as_deref() == Some(pool))
            .count();
        running < slots as usize
    }

    /// Check if all tasks are finished.
    pub fn all_tasks_finished(&self) -> bool {
        self.tasks
            .values()
            .all(|info| matches!(info.progress, Progress::Done(_)))
    }
}

/// Read-only view used to evaluate upstream states.
pub struct ReadOnlyStateManager<'a> {
    tasks: &'a BTreeMap<TaskId, TaskInfo>,
}

impl<'a> ReadOnlyStateManager<'a> {
    pub fn new(tasks: &'a BTreeMap<TaskId, TaskInfo>) -> Self {
        Self { tasks }
    }

    /// Evaluate the "all upstream succeeded" rule for one task.
    ///
    /// A failure anywhere upstream wins over a skip.
    pub fn verdict_for(&self, info: &TaskInfo) -> Verdict {
        let mut waiting = false;
        let mut skipped = false;

        for dep_name in &info.deps {
            let Some(dep) = self.tasks.get(dep_name) else {
                warn!(task = %info.name, dep = %dep_name, "dependency missing from tasks map");
                waiting = true;
                continue;
            };

            match dep.progress {
                Progress::Done(TaskState::Success) => {}
                Progress::Done(state) if state.is_failure() => return Verdict::UpstreamFailed,
                Progress::Done(TaskState::Skipped) => skipped = true,
                Progress::Done(_) | Progress::Pending | Progress::Running => waiting = true,
            }
        }

        if skipped {
            Verdict::Skipped
        } else if waiting {
            Verdict::Wait
        } else {
            Verdict::Ready
        }
    }
}

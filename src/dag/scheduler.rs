use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::dag::definition::Dag;
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::state_manager::StateManager;
use crate::dag::task_info::{Progress, ScheduledTask, TaskInfo};
use crate::types::{RunState, TaskId, TaskState};

/// Scheduler for one run of a nested DAG.
///
/// It is responsible for:
/// - seeding tasks that already finished in an earlier attempt of the run
/// - deciding when a task is ready (all upstream tasks succeeded, pool slot
///   free)
/// - cascading upstream failures and skips to dependents
/// - deciding the final state of the run
#[derive(Debug)]
pub struct Scheduler {
    dag_id: String,
    run_id: String,
    tasks: BTreeMap<TaskId, TaskInfo>,
    pool_slots: BTreeMap<String, u32>,
    started: bool,
}

impl Scheduler {
    /// Construct a scheduler for `run_id` of `dag`, limiting concurrency per
    /// pool with `pool_slots`.
    pub fn new(dag: &Dag, run_id: impl Into<String>, pool_slots: BTreeMap<String, u32>) -> Self {
        let tasks = dag
            .tasks()
            .map(|(name, cfg)| (name.to_string(), TaskInfo::from_config(name.to_string(), cfg)))
            .collect();

        Self {
            dag_id: dag.dag_id().to_string(),
            run_id: run_id.into(),
            tasks,
            pool_slots,
            started: false,
        }
    }

    /// Mark a task as already finished before the run starts.
    ///
    /// Only `Success` and `Skipped` are carried over; anything else is run
    /// again.
    pub fn seed_state(&mut self, task: &str, state: TaskState) {
        if self.started {
            warn!(task, "seed_state called after start; ignoring");
            return;
        }
        match (self.tasks.get_mut(task), state) {
            (Some(info), TaskState::Success | TaskState::Skipped) => {
                debug!(task, %state, "seeding finished task from store");
                info.progress = Progress::Done(state);
            }
            (Some(_), _) => {}
            (None, _) => warn!(task, "seed for unknown task; ignoring"),
        }
    }

    /// Start the run: schedule every task whose upstream is satisfied.
    pub fn start(&mut self) -> SchedulerStep {
        self.started = true;
        info!(dag_id = %self.dag_id, run_id = %self.run_id, tasks = self.tasks.len(), "scheduler: starting nested run");
        self.settle(Vec::new())
    }

    /// Handle completion of a running task with a finished state.
    pub fn handle_completion(&mut self, task: &str, state: TaskState) -> SchedulerStep {
        if !self.started {
            warn!(task, "completion before start; ignoring");
            return SchedulerStep::default();
        }

        let mut manager = StateManager::new(&mut self.tasks, &self.pool_slots, &self.run_id);
        if !manager.complete(task, state) {
            return SchedulerStep::default();
        }

        match state {
            TaskState::Success => debug!(task, run_id = %self.run_id, "task completed successfully"),
            TaskState::Skipped => info!(task, run_id = %self.run_id, "task skipped; skipping dependents"),
            _ => warn!(task, run_id = %self.run_id, %state, "task failed; failing dependents"),
        }

        self.settle(vec![(task.to_string(), state)])
    }

    fn settle(&mut self, mut newly_finished: Vec<(TaskId, TaskState)>) -> SchedulerStep {
        let mut manager = StateManager::new(&mut self.tasks, &self.pool_slots, &self.run_id);
        let (newly_scheduled, mut cascaded): (Vec<ScheduledTask>, _) = manager.settle();
        newly_finished.append(&mut cascaded);
        let run_just_finished = manager.all_tasks_finished();

        if run_just_finished {
            info!(run_id = %self.run_id, state = %self.final_run_state(), "scheduler: all tasks finished");
        }

        SchedulerStep {
            newly_scheduled,
            newly_finished,
            run_just_finished,
        }
    }

    /// Whether every task has finished.
    pub fn is_finished(&self) -> bool {
        self.started
            && self
                .tasks
                .values()
                .all(|info| matches!(info.progress, Progress::Done(_)))
    }

    /// The run state implied by the current task states.
    ///
    /// `Failed` as soon as any task failed or was upstream-failed, `Success`
    /// once everything else finished, `Running` otherwise.
    pub fn final_run_state(&self) -> RunState {
        let failed = self
            .tasks
            .values()
            .any(|info| matches!(info.progress, Progress::Done(s) if s.is_failure()));
        if failed {
            RunState::Failed
        } else if self.is_finished() {
            RunState::Success
        } else {
            RunState::Running
        }
    }

    /// Current state of a task, or `None` if the task is unknown.
    pub fn state_of(&self, task: &str) -> Option<TaskState> {
        self.tasks.get(task).map(|info| info.progress.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{DagSection, TaskConfig};

    fn task(after: &[&str], pool: Option<&str>) -> TaskConfig {
        TaskConfig {
            cmd: Some("true".to_string()),
            after: after.iter().map(|s| s.to_string()).collect(),
            pool: pool.map(str::to_string),
        }
    }

    fn dag(tasks: &[(&str, TaskConfig)]) -> Dag {
        Dag::from_section(&DagSection {
            dag_id: "parent.child".to_string(),
            task: tasks
                .iter()
                .map(|(n, t)| (n.to_string(), t.clone()))
                .collect(),
        })
    }

    fn names(step: &SchedulerStep) -> Vec<&str> {
        step.newly_scheduled.iter().map(|t| t.name.as_str()).collect()
    }

    #[test]
    fn chain_runs_in_order_and_succeeds() {
        let dag = dag(&[("a", task(&[], None)), ("b", task(&["a"], None))]);
        let mut s = Scheduler::new(&dag, "r1", BTreeMap::new());

        let step = s.start();
        assert_eq!(names(&step), vec!["a"]);

        let step = s.handle_completion("a", TaskState::Success);
        assert_eq!(names(&step), vec!["b"]);
        assert!(!step.run_just_finished);

        let step = s.handle_completion("b", TaskState::Success);
        assert!(step.run_just_finished);
        assert_eq!(s.final_run_state(), RunState::Success);
    }

    #[test]
    fn failure_marks_dependents_upstream_failed() {
        let dag = dag(&[
            ("a", task(&[], None)),
            ("b", task(&["a"], None)),
            ("c", task(&["b"], None)),
        ]);
        let mut s = Scheduler::new(&dag, "r1", BTreeMap::new());
        s.start();

        let step = s.handle_completion("a", TaskState::Failed);
        assert!(step.newly_scheduled.is_empty());
        assert_eq!(
            step.newly_finished,
            vec![
                ("a".to_string(), TaskState::Failed),
                ("b".to_string(), TaskState::UpstreamFailed),
                ("c".to_string(), TaskState::UpstreamFailed),
            ]
        );
        assert!(step.run_just_finished);
        assert_eq!(s.final_run_state(), RunState::Failed);
    }

    #[test]
    fn skip_cascades_and_run_still_succeeds() {
        let dag = dag(&[("a", task(&[], None)), ("b", task(&["a"], None))]);
        let mut s = Scheduler::new(&dag, "r1", BTreeMap::new());
        s.start();

        let step = s.handle_completion("a", TaskState::Skipped);
        assert_eq!(s.state_of("b"), Some(TaskState::Skipped));
        assert!(step.run_just_finished);
        assert_eq!(s.final_run_state(), RunState::Success);
    }

    #[test]
    fn single_slot_pool_serialises_tasks() {
        let dag = dag(&[("a", task(&[], Some("one"))), ("b", task(&[], Some("one")))]);
        let mut pools = BTreeMap::new();
        pools.insert("one".to_string(), 1);
        let mut s = Scheduler::new(&dag, "r1", pools);

        let step = s.start();
        assert_eq!(names(&step), vec!["a"]);
        assert_eq!(s.state_of("b"), Some(TaskState::None));

        let step = s.handle_completion("a", TaskState::Success);
        assert_eq!(names(&step), vec!["b"]);
    }

    #[test]
    fn seeded_success_is_not_rerun() {
        let dag = dag(&[("a", task(&[], None)), ("b", task(&["a"], None))]);
        let mut s = Scheduler::new(&dag, "r1", BTreeMap::new());
        s.seed_state("a", TaskState::Success);
        s.seed_state("b", TaskState::Failed);

        let step = s.start();
        assert_eq!(names(&step), vec!["b"]);
    }

    #[test]
    fn completion_for_unknown_or_idle_task_is_ignored() {
        let dag = dag(&[("a", task(&[], None)), ("b", task(&["a"], None))]);
        let mut s = Scheduler::new(&dag, "r1", BTreeMap::new());
        s.start();

        assert!(s.handle_completion("nope", TaskState::Success).newly_finished.is_empty());
        assert!(s.handle_completion("b", TaskState::Success).newly_finished.is_empty());
        assert_eq!(s.state_of("b"), Some(TaskState::None));
    }
}

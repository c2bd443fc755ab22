// src/store/memory.rs

//! In-process metadata store.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::errors::{Result, SubdagError};
use crate::store::model::{DagRun, NewRun, Pool, RunRef, TaskInstanceKey};
use crate::store::{PoolReader, RunRepository, SkipMarker, TaskStateStore};
use crate::types::{RunState, TaskId, TaskState};

/// Metadata store backed by mutex-guarded maps.
///
/// Each table has its own lock; no operation spans two tables atomically.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    runs: Mutex<BTreeMap<RunRef, DagRun>>,
    task_states: Mutex<BTreeMap<TaskInstanceKey, TaskState>>,
    pools: Mutex<BTreeMap<String, Pool>>,
}

fn lock<'a, T>(m: &'a Mutex<T>, table: &str) -> Result<MutexGuard<'a, T>> {
    m.lock()
        .map_err(|_| SubdagError::Store(format!("{table} table lock poisoned")))
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with pools given as `(name, slots)` pairs.
    pub fn with_pools<'a>(pools: impl IntoIterator<Item = (&'a str, u32)>) -> Self {
        let store = Self::default();
        if let Ok(mut table) = store.pools.lock() {
            for (name, slots) in pools {
                table.insert(
                    name.to_string(),
                    Pool {
                        name: name.to_string(),
                        slots,
                    },
                );
            }
        }
        store
    }

    pub fn put_pool(&self, name: &str, slots: u32) -> Result<()> {
        lock(&self.pools, "pool")?.insert(
            name.to_string(),
            Pool {
                name: name.to_string(),
                slots,
            },
        );
        Ok(())
    }

    /// All runs recorded for `dag_id`, ordered by run id.
    pub fn runs_for(&self, dag_id: &str) -> Result<Vec<DagRun>> {
        Ok(lock(&self.runs, "run")?
            .values()
            .filter(|r| r.dag_id == dag_id)
            .cloned()
            .collect())
    }
}

impl RunRepository for InMemoryStore {
    fn create_run(&self, dag_id: &str, new_run: NewRun) -> Result<DagRun> {
        let mut runs = lock(&self.runs, "run")?;

        if runs
            .values()
            .any(|r| r.dag_id == dag_id && r.logical_date == new_run.logical_date)
        {
            return Err(SubdagError::Store(format!(
                "a run of DAG '{}' already exists at {}",
                dag_id, new_run.logical_date
            )));
        }

        let run = DagRun {
            dag_id: dag_id.to_string(),
            run_id: DagRun::generate_run_id(new_run.run_type, new_run.logical_date),
            logical_date: new_run.logical_date,
            run_type: new_run.run_type,
            state: new_run.state,
            external_trigger: new_run.external_trigger,
            conf: new_run.conf,
            data_interval: new_run.data_interval,
        };
        debug!(dag_id, run_id = %run.run_id, state = %run.state, "created run");
        runs.insert(run.run_ref(), run.clone());
        Ok(run)
    }

    fn get_run(&self, dag_id: &str, logical_date: DateTime<Utc>) -> Result<Option<DagRun>> {
        Ok(lock(&self.runs, "run")?
            .values()
            .find(|r| r.dag_id == dag_id && r.logical_date == logical_date)
            .cloned())
    }

    fn set_run_state(&self, run: &RunRef, state: RunState) -> Result<()> {
        let mut runs = lock(&self.runs, "run")?;
        let entry = runs.get_mut(run).ok_or_else(|| {
            SubdagError::Store(format!(
                "no run '{}' of DAG '{}' to update",
                run.run_id, run.dag_id
            ))
        })?;
        debug!(dag_id = %run.dag_id, run_id = %run.run_id, from = %entry.state, to = %state, "run state change");
        entry.state = state;
        Ok(())
    }
}

impl TaskStateStore for InMemoryStore {
    fn get_task_state(&self, key: &TaskInstanceKey) -> Result<Option<TaskState>> {
        Ok(lock(&self.task_states, "task instance")?.get(key).copied())
    }

    fn set_task_state(&self, key: TaskInstanceKey, state: TaskState) -> Result<()> {
        lock(&self.task_states, "task instance")?.insert(key, state);
        Ok(())
    }

    fn task_instances(&self, run: &RunRef) -> Result<Vec<(TaskInstanceKey, TaskState)>> {
        Ok(lock(&self.task_states, "task instance")?
            .iter()
            .filter(|(k, _)| k.dag_id == run.dag_id && k.run_id == run.run_id)
            .map(|(k, v)| (k.clone(), *v))
            .collect())
    }
}

impl SkipMarker for InMemoryStore {
    fn skip(
        &self,
        run: &RunRef,
        logical_date: DateTime<Utc>,
        tasks: &[TaskId],
        map_index: i64,
    ) -> Result<()> {
        if tasks.is_empty() {
            return Ok(());
        }

        let mut states = lock(&self.task_states, "task instance")?;
        for task in tasks {
            states.insert(
                TaskInstanceKey::mapped(run, task.clone(), map_index),
                TaskState::Skipped,
            );
        }
        debug!(dag_id = %run.dag_id, run_id = %run.run_id, %logical_date, ?tasks, map_index, "marked tasks skipped");
        Ok(())
    }
}

impl PoolReader for InMemoryStore {
    fn get_pool(&self, name: &str) -> Result<Option<Pool>> {
        Ok(lock(&self.pools, "pool")?.get(name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RunType;
    use chrono::TimeZone;

    fn new_run(state: RunState) -> NewRun {
        NewRun {
            run_type: RunType::Scheduled,
            logical_date: Utc.with_ymd_and_hms(2016, 1, 1, 0, 0, 0).unwrap(),
            data_interval: None,
            conf: None,
            state,
            external_trigger: true,
        }
    }

    #[test]
    fn create_then_get_and_update() {
        let store = InMemoryStore::new();
        let created = store.create_run("p.c", new_run(RunState::Running)).unwrap();
        assert_eq!(created.run_id, "scheduled__2016-01-01T00:00:00+00:00");

        let found = store
            .get_run("p.c", created.logical_date)
            .unwrap()
            .expect("run exists");
        assert_eq!(found, created);

        store.set_run_state(&created.run_ref(), RunState::Success).unwrap();
        let found = store.get_run("p.c", created.logical_date).unwrap().unwrap();
        assert_eq!(found.state, RunState::Success);
    }

    #[test]
    fn duplicate_run_is_rejected() {
        let store = InMemoryStore::new();
        store.create_run("p.c", new_run(RunState::Running)).unwrap();
        assert!(store.create_run("p.c", new_run(RunState::Running)).is_err());
        assert_eq!(store.runs_for("p.c").unwrap().len(), 1);
    }

    #[test]
    fn skip_marks_each_task_with_map_index() {
        let store = InMemoryStore::new();
        let run = RunRef::new("p", "r");
        let date = Utc.with_ymd_and_hms(2016, 1, 1, 0, 0, 0).unwrap();
        store
            .skip(&run, date, &["x".to_string(), "y".to_string()], 2)
            .unwrap();

        assert_eq!(
            store
                .get_task_state(&TaskInstanceKey::mapped(&run, "x", 2))
                .unwrap(),
            Some(TaskState::Skipped)
        );
        assert_eq!(
            store.get_task_state(&TaskInstanceKey::new(&run, "y")).unwrap(),
            None
        );
    }

    #[test]
    fn pools_are_readable() {
        let store = InMemoryStore::with_pools([("one", 1)]);
        assert_eq!(store.get_pool("one").unwrap().map(|p| p.slots), Some(1));
        assert_eq!(store.get_pool("missing").unwrap(), None);
    }
}

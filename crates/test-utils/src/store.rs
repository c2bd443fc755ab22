use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use subdag::errors::Result;
use subdag::store::{
    DagRun, InMemoryStore, NewRun, Pool, PoolReader, RunRef, RunRepository, SkipMarker,
    TaskInstanceKey, TaskStateStore,
};
use subdag::types::{RunState, TaskId, TaskState};

/// In-memory store that counts calls to the interesting operations.
#[derive(Debug, Default)]
pub struct CountingStore {
    pub inner: InMemoryStore,
    create_run_calls: AtomicUsize,
    get_pool_calls: AtomicUsize,
    skip_calls: AtomicUsize,
}

impl CountingStore {
    pub fn new(inner: InMemoryStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub fn create_run_calls(&self) -> usize {
        self.create_run_calls.load(Ordering::SeqCst)
    }

    pub fn get_pool_calls(&self) -> usize {
        self.get_pool_calls.load(Ordering::SeqCst)
    }

    pub fn skip_calls(&self) -> usize {
        self.skip_calls.load(Ordering::SeqCst)
    }
}

impl RunRepository for CountingStore {
    fn create_run(&self, dag_id: &str, new_run: NewRun) -> Result<DagRun> {
        self.create_run_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.create_run(dag_id, new_run)
    }

    fn get_run(&self, dag_id: &str, logical_date: DateTime<Utc>) -> Result<Option<DagRun>> {
        self.inner.get_run(dag_id, logical_date)
    }

    fn set_run_state(&self, run: &RunRef, state: RunState) -> Result<()> {
        self.inner.set_run_state(run, state)
    }
}

impl TaskStateStore for CountingStore {
    fn get_task_state(&self, key: &TaskInstanceKey) -> Result<Option<TaskState>> {
        self.inner.get_task_state(key)
    }

    fn set_task_state(&self, key: TaskInstanceKey, state: TaskState) -> Result<()> {
        self.inner.set_task_state(key, state)
    }

    fn task_instances(&self, run: &RunRef) -> Result<Vec<(TaskInstanceKey, TaskState)>> {
        self.inner.task_instances(run)
    }
}

impl SkipMarker for CountingStore {
    fn skip(
        &self,
        run: &RunRef,
        logical_date: DateTime<Utc>,
        tasks: &[TaskId],
        map_index: i64,
    ) -> Result<()> {
        self.skip_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.skip(run, logical_date, tasks, map_index)
    }
}

impl PoolReader for CountingStore {
    fn get_pool(&self, name: &str) -> Result<Option<Pool>> {
        self.get_pool_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get_pool(name)
    }
}

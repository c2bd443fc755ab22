#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use subdag::dag::Dag;
use subdag::operator::{SubDagOperator, SubDagOptions};
use subdag::store::{MetadataStore, NewRun, RunRef};
use subdag::types::{RunState, RunType};

pub use subdag_test_utils::builders;
pub use subdag_test_utils::fake_executor;
pub use subdag_test_utils::store::CountingStore;
pub use subdag_test_utils::{init_tracing, with_timeout};

use builders::{date, DagBuilder};

pub const PARENT: &str = "parent";
pub const TASK: &str = "test";
pub const SUBDAG: &str = "parent.test";

pub fn default_date() -> DateTime<Utc> {
    date(2016, 1, 1)
}

/// `parent`: `test -> downstream`.
pub fn parent_dag() -> Arc<Dag> {
    Arc::new(
        DagBuilder::new(PARENT)
            .task(TASK, &[])
            .task("downstream", &[TASK])
            .build(),
    )
}

/// `parent.test`: `a -> {b, c}`, leaves `b` and `c`.
pub fn subdag() -> Arc<Dag> {
    Arc::new(
        DagBuilder::new(SUBDAG)
            .task("a", &[])
            .task("b", &["a"])
            .task("c", &["a"])
            .build(),
    )
}

pub fn fast_options() -> SubDagOptions {
    SubDagOptions {
        poke_interval: Duration::from_millis(10),
        ..SubDagOptions::default()
    }
}

pub fn operator(store: Arc<dyn MetadataStore>, options: SubDagOptions) -> SubDagOperator {
    SubDagOperator::new(TASK, parent_dag(), subdag(), options, store).unwrap()
}

fn create(store: &dyn MetadataStore, dag_id: &str, state: RunState, external: bool) -> RunRef {
    store
        .create_run(
            dag_id,
            NewRun {
                run_type: RunType::Scheduled,
                logical_date: default_date(),
                data_interval: None,
                conf: None,
                state,
                external_trigger: external,
            },
        )
        .unwrap()
        .run_ref()
}

/// Create the parent run the way the enclosing engine would.
pub fn parent_run(store: &dyn MetadataStore) -> RunRef {
    create(store, PARENT, RunState::Running, false)
}

/// Create a nested run directly in `state`.
pub fn nested_run(store: &dyn MetadataStore, state: RunState) -> RunRef {
    create(store, SUBDAG, state, true)
}

/// Flip the nested run to `state` after `delay`, from a background task.
pub fn finish_nested_run_after(store: Arc<dyn MetadataStore>, state: RunState, delay: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let run = store
            .get_run(SUBDAG, default_date())
            .unwrap()
            .expect("nested run exists");
        store.set_run_state(&run.run_ref(), state).unwrap();
    });
}

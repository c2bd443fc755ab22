// tests/subdag_post_execute.rs

mod common;
use crate::common::*;

use std::sync::Arc;

use subdag::context::ExecutionContext;
use subdag::errors::SubdagError;
use subdag::operator::{Operator, SubDagOptions};
use subdag::store::{MetadataStore, RunRef, TaskInstanceKey};
use subdag::types::{RunState, SkipPropagation, TaskState};

struct Fixture {
    counting: Arc<CountingStore>,
    store: Arc<dyn MetadataStore>,
    parent: RunRef,
    nested: RunRef,
}

fn fixture(nested_state: RunState) -> Fixture {
    let counting = Arc::new(CountingStore::default());
    let store: Arc<dyn MetadataStore> = counting.clone();
    let parent = parent_run(store.as_ref());
    let nested = nested_run(store.as_ref(), nested_state);
    Fixture {
        counting,
        store,
        parent,
        nested,
    }
}

fn with_policy(policy: Option<SkipPropagation>) -> SubDagOptions {
    SubDagOptions {
        propagate_skipped_state: policy,
        ..fast_options()
    }
}

fn set_leaves(f: &Fixture, b: TaskState, c: TaskState) {
    f.store
        .set_task_state(TaskInstanceKey::new(&f.nested, "b"), b)
        .unwrap();
    f.store
        .set_task_state(TaskInstanceKey::new(&f.nested, "c"), c)
        .unwrap();
}

fn downstream_state(f: &Fixture, map_index: i64) -> Option<TaskState> {
    f.store
        .get_task_state(&TaskInstanceKey::mapped(&f.parent, "downstream", map_index))
        .unwrap()
}

#[test]
fn failed_run_raises_and_never_skips() {
    let f = fixture(RunState::Failed);
    set_leaves(&f, TaskState::Skipped, TaskState::Skipped);
    let op = operator(f.store.clone(), with_policy(Some(SkipPropagation::AnyLeaf)));

    let err = op
        .post_execute(&ExecutionContext::new(default_date()))
        .unwrap_err();

    assert!(matches!(err, SubdagError::NestedRunFailed { state: RunState::Failed }));
    assert_eq!(err.to_string(), "Expected state: success. Actual state: failed");
    assert_eq!(f.counting.skip_calls(), 0);
    assert_eq!(downstream_state(&f, -1), None);
}

#[test]
fn unfinished_run_is_not_a_success_either() {
    let f = fixture(RunState::Running);
    let op = operator(f.store.clone(), with_policy(None));

    let err = op
        .post_execute(&ExecutionContext::new(default_date()))
        .unwrap_err();
    assert!(matches!(err, SubdagError::NestedRunFailed { state: RunState::Running }));
}

#[test]
fn skip_policy_decides_whether_downstream_is_skipped() {
    use SkipPropagation::{AllLeaves, AnyLeaf};
    use TaskState::{Failed, Skipped, Success};

    let cases = [
        (Some(AllLeaves), Skipped, Skipped, true),
        (Some(AllLeaves), Skipped, Success, false),
        (Some(AnyLeaf), Skipped, Success, true),
        (Some(AnyLeaf), Failed, Skipped, true),
        (Some(AnyLeaf), Success, Success, false),
        (None, Skipped, Skipped, false),
    ];

    for (policy, b, c, expect_skip) in cases {
        let f = fixture(RunState::Success);
        set_leaves(&f, b, c);
        let op = operator(f.store.clone(), with_policy(policy));

        op.post_execute(&ExecutionContext::new(default_date()))
            .unwrap();

        let expected = expect_skip.then_some(TaskState::Skipped);
        assert_eq!(
            downstream_state(&f, -1),
            expected,
            "policy {policy:?} with leaves [{b}, {c}]"
        );
        assert_eq!(f.counting.skip_calls(), usize::from(expect_skip));
    }
}

#[test]
fn skip_uses_the_context_run_and_map_index() {
    let f = fixture(RunState::Success);
    set_leaves(&f, TaskState::Skipped, TaskState::Skipped);
    let op = operator(f.store.clone(), with_policy(Some(SkipPropagation::AllLeaves)));

    let ctx = ExecutionContext::new(default_date())
        .with_dag_run(f.parent.run_id.clone())
        .with_map_index(3);
    op.post_execute(&ctx).unwrap();

    assert_eq!(downstream_state(&f, 3), Some(TaskState::Skipped));
    assert_eq!(downstream_state(&f, -1), None);
}

#[test]
fn leaves_without_task_instances_are_ignored() {
    let f = fixture(RunState::Success);
    f.store
        .set_task_state(TaskInstanceKey::new(&f.nested, "b"), TaskState::Skipped)
        .unwrap();
    let op = operator(f.store.clone(), with_policy(Some(SkipPropagation::AllLeaves)));

    let leaves = op
        .leaf_states(&f.store.get_run(SUBDAG, default_date()).unwrap().unwrap())
        .unwrap();
    assert_eq!(leaves, vec![TaskState::Skipped]);

    op.post_execute(&ExecutionContext::new(default_date()))
        .unwrap();
    assert_eq!(downstream_state(&f, -1), Some(TaskState::Skipped));
}

#[test]
fn missing_parent_run_is_reported() {
    let counting = Arc::new(CountingStore::default());
    let store: Arc<dyn MetadataStore> = counting.clone();
    nested_run(store.as_ref(), RunState::Success);
    let nested = RunRef::new(SUBDAG, "scheduled__2016-01-01T00:00:00+00:00");
    store
        .set_task_state(TaskInstanceKey::new(&nested, "b"), TaskState::Skipped)
        .unwrap();
    let op = operator(store, with_policy(Some(SkipPropagation::AnyLeaf)));

    let err = op
        .post_execute(&ExecutionContext::new(default_date()))
        .unwrap_err();
    assert!(matches!(err, SubdagError::RunNotFound { ref dag_id, .. } if dag_id == PARENT));
}

// tests/pool_validation.rs

mod common;
use crate::common::builders::{DagBuilder, TaskConfigBuilder};
use crate::common::*;

use std::sync::Arc;

use subdag::context::ExecutionContext;
use subdag::errors::SubdagError;
use subdag::operator::{Operator, SubDagOperator, SubDagOptions};
use subdag::store::{InMemoryStore, MetadataStore};

fn pooled_subdag() -> Arc<subdag::dag::Dag> {
    Arc::new(
        DagBuilder::new(SUBDAG)
            .with_task("a", TaskConfigBuilder::new("true").pool("shared").build())
            .with_task("b", TaskConfigBuilder::new("true").after("a").build())
            .build(),
    )
}

fn op_in_pool(store: Arc<dyn MetadataStore>, pool: &str) -> SubDagOperator {
    let options = SubDagOptions {
        pool: Some(pool.to_string()),
        ..fast_options()
    };
    SubDagOperator::new(TASK, parent_dag(), pooled_subdag(), options, store).unwrap()
}

#[test]
fn single_slot_pool_shared_with_subdag_task_is_a_conflict() {
    let counting = Arc::new(CountingStore::new(InMemoryStore::with_pools([("shared", 1)])));
    let op = op_in_pool(counting.clone(), "shared");

    let err = op
        .pre_execute(&ExecutionContext::new(default_date()))
        .unwrap_err();

    match err {
        SubdagError::PoolConflict(msg) => {
            assert!(msg.contains("test"), "{msg}");
            assert!(msg.contains("a"), "{msg}");
            assert!(msg.contains("shared"), "{msg}");
        }
        other => panic!("expected PoolConflict, got {other:?}"),
    }
    assert_eq!(counting.get_pool_calls(), 1);
    assert!(counting.inner.runs_for(SUBDAG).unwrap().is_empty());
}

#[test]
fn pool_with_spare_slots_is_fine() {
    let counting = Arc::new(CountingStore::new(InMemoryStore::with_pools([("shared", 2)])));
    let op = op_in_pool(counting.clone(), "shared");

    op.pre_execute(&ExecutionContext::new(default_date()))
        .unwrap();
    assert_eq!(counting.get_pool_calls(), 1);
}

#[test]
fn pool_is_not_queried_without_overlap() {
    let counting = Arc::new(CountingStore::new(InMemoryStore::with_pools([
        ("shared", 1),
        ("other", 1),
    ])));
    let op = op_in_pool(counting.clone(), "other");

    op.pre_execute(&ExecutionContext::new(default_date()))
        .unwrap();
    assert_eq!(counting.get_pool_calls(), 0);
}

#[test]
fn operator_without_pool_skips_the_check() {
    let counting = Arc::new(CountingStore::default());
    let op = SubDagOperator::new(TASK, parent_dag(), pooled_subdag(), fast_options(), counting.clone())
        .unwrap();

    op.validate_pool().unwrap();
    assert_eq!(counting.get_pool_calls(), 0);
}

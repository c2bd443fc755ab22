// src/lib.rs

pub mod cli;
pub mod config;
pub mod context;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod operator;
pub mod store;
pub mod types;

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::load_and_validate;
use crate::config::model::{ConfigFile, DagSection};
use crate::context::ExecutionContext;
use crate::dag::{Dag, Scheduler};
use crate::engine::runtime::seed_from_store;
use crate::engine::{CoreRuntime, Runtime, RuntimeEvent};
use crate::errors::{Result, SubdagError};
use crate::exec::RealExecutorBackend;
use crate::operator::{Operator, SubDagOperator};
use crate::store::{DagRun, InMemoryStore, MetadataStore, NewRun, TaskInstanceKey};
use crate::types::{RunState, RunType, TaskState};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the metadata store and the parent run
/// - the sub-DAG operator lifecycle
/// - the nested-run engine and its executor
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let mut cfg = load_and_validate(&args.config)?;
    cfg.operator.rerun_failed |= args.reset_failed;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let store: Arc<dyn MetadataStore> = Arc::new(InMemoryStore::with_pools(
        cfg.pool.iter().map(|(name, p)| (name.as_str(), p.slots)),
    ));
    let parent = Arc::new(Dag::from_section(&cfg.parent));
    let subdag = Arc::new(Dag::from_section(&cfg.subdag));
    let ctx = ExecutionContext::try_from(args.raw_context())?;

    // The CLI plays the enclosing engine: it owns the parent run.
    let parent_run = store.create_run(
        parent.dag_id(),
        NewRun {
            run_type: RunType::Manual,
            logical_date: ctx.logical_date(),
            data_interval: ctx.data_interval(),
            conf: None,
            state: RunState::Running,
            external_trigger: false,
        },
    )?;
    let ctx = ctx.with_dag_run(parent_run.run_id.clone());

    // Ctrl-C → cancel polling and stop the nested engine.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            info!("Ctrl+C received; cancelling");
            cancel.cancel();
        });
    }

    let op = SubDagOperator::from_config(&cfg, parent.clone(), subdag.clone(), store.clone())?
        .with_cancellation(cancel.clone());

    op.pre_execute(&ctx)?;
    let nested = op.ensure_run(&ctx)?;
    let engine = if nested.state == RunState::Running {
        Some(spawn_nested_engine(
            &subdag,
            &nested,
            pool_slots(&cfg),
            store.clone(),
            cancel.clone(),
        )?)
    } else {
        None
    };

    let executed = match engine {
        Some(handle) => execute_with_engine(&op, &ctx, handle, &cancel).await,
        None => op.execute(&ctx).await,
    };
    let outcome = executed.and_then(|()| op.post_execute(&ctx));

    let op_state = if outcome.is_ok() {
        TaskState::Success
    } else {
        TaskState::Failed
    };
    store.set_task_state(
        TaskInstanceKey::mapped(&parent_run.run_ref(), op.task_id(), ctx.map_index()),
        op_state,
    )?;

    print_summary(store.as_ref(), &parent, &parent_run, &subdag, &nested, &ctx)?;
    outcome
}

/// Start the engine that executes the nested run in the background.
///
/// Tasks already finished in an earlier attempt of the run are carried over.
/// The engine stops when the run finishes or `cancel` fires.
pub fn spawn_nested_engine(
    subdag: &Dag,
    run: &DagRun,
    pool_slots: BTreeMap<String, u32>,
    store: Arc<dyn MetadataStore>,
    cancel: CancellationToken,
) -> Result<JoinHandle<Result<()>>> {
    let run_ref = run.run_ref();
    let mut scheduler = Scheduler::new(subdag, run.run_id.clone(), pool_slots);
    seed_from_store(&mut scheduler, store.as_ref(), &run_ref)?;

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);
    let executor = RealExecutorBackend::new(rt_tx.clone());

    tokio::spawn(async move {
        cancel.cancelled().await;
        let _ = rt_tx.send(RuntimeEvent::ShutdownRequested).await;
    });

    let runtime = Runtime::new(CoreRuntime::new(scheduler), rt_rx, executor, store, run_ref);
    Ok(tokio::spawn(runtime.run()))
}

/// Run `op.execute` while the nested engine works on the run.
///
/// An engine that stops with an error cancels polling and returns that
/// error at once; the run would otherwise stay `running` forever. When
/// polling fails first, the engine is told to stop.
pub async fn execute_with_engine(
    op: &SubDagOperator,
    ctx: &ExecutionContext,
    mut engine: JoinHandle<Result<()>>,
    cancel: &CancellationToken,
) -> Result<()> {
    enum First {
        Polled(Result<()>),
        Engine(Result<()>),
    }

    let first = tokio::select! {
        res = op.execute(ctx) => First::Polled(res),
        joined = &mut engine => First::Engine(flatten_join(joined)),
    };

    match first {
        First::Polled(res) => {
            if res.is_err() {
                cancel.cancel();
            }
            if let Err(e) = flatten_join(engine.await) {
                warn!(error = %e, "nested engine stopped with an error");
                res?;
                return Err(e);
            }
            res
        }
        First::Engine(Err(e)) => {
            warn!(error = %e, "nested engine failed; stop polling");
            cancel.cancel();
            Err(e)
        }
        // The engine finished the run; one more poll observes its final state.
        First::Engine(Ok(())) => op.execute(ctx).await,
    }
}

fn flatten_join(joined: std::result::Result<Result<()>, JoinError>) -> Result<()> {
    joined.map_err(|e| SubdagError::Other(anyhow::anyhow!("nested engine task failed: {e}")))?
}

fn pool_slots(cfg: &ConfigFile) -> BTreeMap<String, u32> {
    cfg.pool
        .iter()
        .map(|(name, p)| (name.clone(), p.slots))
        .collect()
}

fn print_summary(
    store: &dyn MetadataStore,
    parent: &Dag,
    parent_run: &DagRun,
    subdag: &Dag,
    nested: &DagRun,
    ctx: &ExecutionContext,
) -> Result<()> {
    let nested_ref = nested.run_ref();
    let state = store
        .get_run(subdag.dag_id(), nested.logical_date)?
        .map(|r| r.state)
        .unwrap_or(RunState::None);

    println!("{} {} {}", subdag.dag_id(), nested.run_id, state);
    for (task, _) in subdag.tasks() {
        let state = store
            .get_task_state(&TaskInstanceKey::new(&nested_ref, task))?
            .unwrap_or(TaskState::None);
        println!("  {task}: {state}");
    }

    let parent_ref = parent_run.run_ref();
    println!("{} {}", parent.dag_id(), parent_run.run_id);
    for (task, _) in parent.tasks() {
        let state = store
            .get_task_state(&TaskInstanceKey::mapped(&parent_ref, task, ctx.map_index()))?
            .unwrap_or(TaskState::None);
        println!("  {task}: {state}");
    }
    Ok(())
}

/// Simple dry-run output: print both DAGs and the operator settings.
fn print_dry_run(cfg: &ConfigFile) {
    println!("subdag dry-run");
    println!("  operator.task_id = {}", cfg.operator.task_id);
    println!("  operator.poke_interval = {:?}", cfg.operator.poke_interval);
    if let Some(timeout) = cfg.operator.timeout {
        println!("  operator.timeout = {timeout:?}");
    }
    if let Some(policy) = cfg.operator.propagate_skipped_state {
        println!("  operator.propagate_skipped_state = {policy:?}");
    }
    if let Some(ref pool) = cfg.operator.pool {
        println!("  operator.pool = {pool}");
    }
    for (name, p) in cfg.pool.iter() {
        println!("  pool.{name}.slots = {}", p.slots);
    }
    println!();

    print_dag("parent", &cfg.parent);
    print_dag("subdag", &cfg.subdag);

    debug!("dry-run complete (no execution)");
}

fn print_dag(label: &str, dag: &DagSection) {
    println!("{label} {} ({} tasks):", dag.dag_id, dag.task.len());
    for (name, task) in dag.task.iter() {
        println!("  - {name}");
        if let Some(ref cmd) = task.cmd {
            println!("      cmd: {cmd}");
        }
        if !task.after.is_empty() {
            println!("      after: {:?}", task.after);
        }
        if let Some(ref pool) = task.pool {
            println!("      pool: {pool}");
        }
    }
}

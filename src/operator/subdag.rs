// src/operator/subdag.rs

//! Operator that runs a nested DAG as one task of its parent.
//!
//! Lifecycle, as driven by the enclosing engine:
//!
//! 1. `pre_execute` checks the pool configuration. Nothing is created yet.
//! 2. `execute` finds the nested run for the logical date (creating it in
//!    state `running` if there is none) and polls it until it is terminal.
//! 3. `post_execute` fails unless the run succeeded, then applies the
//!    skip-propagation policy to the nested DAG's leaf tasks.
//!
//! The nested DAG must be named `{parent_dag_id}.{task_id}`; that is checked
//! when the operator is built.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::model::ConfigFile;
use crate::config::validate::validate_subdag_name;
use crate::context::ExecutionContext;
use crate::dag::Dag;
use crate::errors::{Result, SubdagError};
use crate::operator::Operator;
use crate::store::{DagRun, MetadataStore, NewRun, RunRef, TaskInstanceKey};
use crate::types::{RunState, RunType, SkipPropagation, TaskState};

/// Default delay between two polls of the nested run.
pub const DEFAULT_POKE_INTERVAL: Duration = Duration::from_secs(60);

/// Optional settings of a [`SubDagOperator`].
#[derive(Debug, Clone)]
pub struct SubDagOptions {
    pub poke_interval: Duration,
    /// Fail with [`SubdagError::PollTimeout`] after polling this long.
    pub timeout: Option<Duration>,
    /// Payload stored on a newly created nested run.
    pub conf: Option<serde_json::Value>,
    pub propagate_skipped_state: Option<SkipPropagation>,
    pub pool: Option<String>,
    /// Reset a FAILED nested run (and its task instances) before polling.
    pub rerun_failed: bool,
}

impl Default for SubDagOptions {
    fn default() -> Self {
        Self {
            poke_interval: DEFAULT_POKE_INTERVAL,
            timeout: None,
            conf: None,
            propagate_skipped_state: None,
            pool: None,
            rerun_failed: false,
        }
    }
}

pub struct SubDagOperator {
    task_id: String,
    parent: Arc<Dag>,
    subdag: Arc<Dag>,
    options: SubDagOptions,
    store: Arc<dyn MetadataStore>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for SubDagOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubDagOperator")
            .field("task_id", &self.task_id)
            .field("parent", &self.parent.dag_id())
            .field("subdag", &self.subdag.dag_id())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl SubDagOperator {
    /// Build the operator, failing with a configuration error when the nested
    /// DAG is not named `{parent_dag_id}.{task_id}`.
    pub fn new(
        task_id: impl Into<String>,
        parent: Arc<Dag>,
        subdag: Arc<Dag>,
        options: SubDagOptions,
        store: Arc<dyn MetadataStore>,
    ) -> Result<Self> {
        let task_id = task_id.into();
        validate_subdag_name(parent.dag_id(), &task_id, subdag.dag_id())?;

        if options.poke_interval.is_zero() {
            return Err(SubdagError::ConfigError(
                "poke_interval must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            task_id,
            parent,
            subdag,
            options,
            store,
            cancel: CancellationToken::new(),
        })
    }

    /// Build the operator described by a validated config file.
    pub fn from_config(
        cfg: &ConfigFile,
        parent: Arc<Dag>,
        subdag: Arc<Dag>,
        store: Arc<dyn MetadataStore>,
    ) -> Result<Self> {
        let op = &cfg.operator;
        let options = SubDagOptions {
            poke_interval: op.poke_interval,
            timeout: op.timeout,
            conf: op.conf.clone(),
            propagate_skipped_state: op.propagate_skipped_state,
            pool: op.pool.clone(),
            rerun_failed: op.rerun_failed,
        };
        Self::new(op.task_id.clone(), parent, subdag, options, store)
    }

    /// Use `token` to interrupt polling from outside.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn subdag(&self) -> &Dag {
        &self.subdag
    }

    pub fn options(&self) -> &SubDagOptions {
        &self.options
    }

    /// Check that the operator and the nested tasks do not both need the
    /// only slot of the same pool.
    ///
    /// The pool record is only read when some nested task shares the
    /// operator's pool.
    pub fn validate_pool(&self) -> Result<()> {
        let Some(pool) = self.options.pool.as_deref() else {
            return Ok(());
        };

        let conflicts: Vec<&str> = self.subdag.tasks_in_pool(pool).collect();
        if conflicts.is_empty() {
            return Ok(());
        }

        match self.store.get_pool(pool)? {
            Some(record) if record.slots == 1 => Err(SubdagError::PoolConflict(format!(
                "SubDagOperator {} and subdag task{} {} both use pool {}, but the pool only has 1 slot. \
                 The subdag tasks will never run.",
                self.task_id,
                if conflicts.len() > 1 { "s" } else { "" },
                conflicts.join(", "),
                pool
            ))),
            _ => Ok(()),
        }
    }

    fn get_dagrun(&self, ctx: &ExecutionContext) -> Result<Option<DagRun>> {
        self.store.get_run(self.subdag.dag_id(), ctx.logical_date())
    }

    fn require_dagrun(&self, ctx: &ExecutionContext) -> Result<DagRun> {
        self.get_dagrun(ctx)?
            .ok_or_else(|| SubdagError::RunNotFound {
                dag_id: self.subdag.dag_id().to_string(),
                logical_date: ctx.logical_date().to_rfc3339(),
            })
    }

    /// Find the nested run for the context's logical date, creating it when
    /// there is none.
    ///
    /// Calling this again for the same date returns the same run.
    pub fn ensure_run(&self, ctx: &ExecutionContext) -> Result<DagRun> {
        match self.get_dagrun(ctx)? {
            None => {
                let run = self.store.create_run(
                    self.subdag.dag_id(),
                    NewRun {
                        run_type: RunType::Scheduled,
                        logical_date: ctx.logical_date(),
                        data_interval: ctx.data_interval(),
                        conf: self.options.conf.clone(),
                        state: RunState::Running,
                        external_trigger: true,
                    },
                )?;
                info!(dag_id = %run.dag_id, run_id = %run.run_id, "created nested DagRun");
                Ok(run)
            }
            Some(run) if run.state == RunState::Failed && self.options.rerun_failed => {
                info!(dag_id = %run.dag_id, run_id = %run.run_id, "found failed nested DagRun; resetting it");
                self.reset_dag_run_and_task_instances(&run)?;
                self.require_dagrun(ctx)
            }
            Some(run) => {
                info!(dag_id = %run.dag_id, run_id = %run.run_id, state = %run.state, "found existing nested DagRun");
                Ok(run)
            }
        }
    }

    /// Recovery path: put a failed run back to `running` and every one of its
    /// task instances back to `none`.
    pub fn reset_dag_run_and_task_instances(&self, run: &DagRun) -> Result<()> {
        let run_ref = run.run_ref();
        self.store.set_run_state(&run_ref, RunState::Running)?;

        let instances = self.store.task_instances(&run_ref)?;
        let count = instances.len();
        for (key, _) in instances {
            self.store.set_task_state(key, TaskState::None)?;
        }

        info!(dag_id = %run.dag_id, run_id = %run.run_id, task_instances = count, "reset nested DagRun to running");
        Ok(())
    }

    /// Poll the nested run every `poke_interval` until it is terminal.
    ///
    /// With a timeout, the last sleep is shortened so the limit is honoured
    /// without waiting out a whole interval.
    ///
    /// Returns the terminal state. The run is left untouched when polling is
    /// cancelled or times out.
    pub async fn poll_until_terminal(&self, ctx: &ExecutionContext) -> Result<RunState> {
        let started = Instant::now();
        let mut pokes: u64 = 0;

        loop {
            let run = self.require_dagrun(ctx)?;
            pokes += 1;

            if run.state.is_terminal() {
                info!(run_id = %run.run_id, state = %run.state, pokes, "nested DagRun reached a terminal state");
                return Ok(run.state);
            }
            debug!(run_id = %run.run_id, state = %run.state, pokes, "nested DagRun not finished yet");

            let mut nap = self.options.poke_interval;
            if let Some(limit) = self.options.timeout {
                let waited = started.elapsed();
                if waited >= limit {
                    warn!(run_id = %run.run_id, ?waited, "timed out waiting for nested DagRun");
                    return Err(SubdagError::PollTimeout {
                        run_id: run.run_id,
                        waited,
                    });
                }
                // Wake up for one last poke right when the limit is reached.
                nap = nap.min(limit - waited);
            }

            tokio::select! {
                _ = sleep(nap) => {}
                _ = self.cancel.cancelled() => {
                    warn!(run_id = %run.run_id, "polling cancelled; leaving nested DagRun as is");
                    return Err(SubdagError::Cancelled(run.run_id));
                }
            }
        }
    }

    /// Leaf-task states of the nested run. Leaves without a task instance
    /// are left out.
    pub fn leaf_states(&self, run: &DagRun) -> Result<Vec<TaskState>> {
        let run_ref = run.run_ref();
        let mut states = Vec::new();
        for leaf in self.subdag.leaves() {
            match self
                .store
                .get_task_state(&TaskInstanceKey::new(&run_ref, leaf.as_str()))?
            {
                Some(state) => states.push(state),
                None => debug!(task = %leaf, "no task instance for leaf; ignoring"),
            }
        }
        Ok(states)
    }

    fn parent_run(&self, ctx: &ExecutionContext) -> Result<RunRef> {
        if let Some(run_id) = ctx.dag_run() {
            return Ok(RunRef::new(self.parent.dag_id(), run_id));
        }
        self.store
            .get_run(self.parent.dag_id(), ctx.logical_date())?
            .map(|r| r.run_ref())
            .ok_or_else(|| SubdagError::RunNotFound {
                dag_id: self.parent.dag_id().to_string(),
                logical_date: ctx.logical_date().to_rfc3339(),
            })
    }

    fn skip_downstream_tasks(&self, ctx: &ExecutionContext) -> Result<()> {
        let downstream = self.parent.downstream_of(&self.task_id);
        if downstream.is_empty() {
            info!(task = %self.task_id, "no downstream tasks to skip");
            return Ok(());
        }

        info!(task = %self.task_id, ?downstream, "skipping downstream tasks");
        let parent_run = self.parent_run(ctx)?;
        self.store
            .skip(&parent_run, ctx.logical_date(), downstream, ctx.map_index())
    }
}

impl Operator for SubDagOperator {
    fn task_id(&self) -> &str {
        &self.task_id
    }

    fn pre_execute(&self, _ctx: &ExecutionContext) -> Result<()> {
        validate_subdag_name(self.parent.dag_id(), &self.task_id, self.subdag.dag_id())?;
        self.validate_pool()
    }

    fn execute<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let run = self.ensure_run(ctx)?;
            if run.state == RunState::Success {
                info!(run_id = %run.run_id, "nested DagRun already succeeded");
                return Ok(());
            }
            self.poll_until_terminal(ctx).await.map(|_| ())
        })
    }

    fn post_execute(&self, ctx: &ExecutionContext) -> Result<()> {
        let run = self.require_dagrun(ctx)?;
        info!(run_id = %run.run_id, state = %run.state, "execution finished");

        if run.state != RunState::Success {
            return Err(SubdagError::NestedRunFailed { state: run.state });
        }

        let Some(policy) = self.options.propagate_skipped_state else {
            return Ok(());
        };

        let leaf_states = self.leaf_states(&run)?;
        debug!(?policy, ?leaf_states, "checking skipped state of leaf tasks");
        if policy.should_skip(&leaf_states) {
            self.skip_downstream_tasks(ctx)?;
        }
        Ok(())
    }
}

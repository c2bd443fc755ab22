// src/operator/branch.rs

//! Branching: pick which direct downstream tasks to follow and skip the
//! rest.

use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Utc};
use tracing::{debug, info};

use crate::context::ExecutionContext;
use crate::dag::Dag;
use crate::errors::{Result, SubdagError};
use crate::operator::Operator;
use crate::operator::weekday::WeekdaySet;
use crate::store::{MetadataStore, RunRef};
use crate::types::TaskId;

/// How a branch decides between its two follow sets.
#[derive(Debug, Clone)]
pub enum BranchCondition {
    /// True when the run's logical date falls on one of `days`.
    FixedDaySet { days: WeekdaySet },
    /// True when "today", at evaluation time in a fixed UTC offset, falls on
    /// one of `days`.
    CalendarRelative {
        days: WeekdaySet,
        utc_offset_hours: i32,
    },
}

impl BranchCondition {
    pub fn is_met(&self, ctx: &ExecutionContext, now: DateTime<Utc>) -> bool {
        match self {
            BranchCondition::FixedDaySet { days } => days.contains(ctx.logical_date().weekday()),
            BranchCondition::CalendarRelative {
                days,
                utc_offset_hours,
            } => {
                let local = now.naive_utc() + Duration::hours(i64::from(*utc_offset_hours));
                days.contains(local.weekday())
            }
        }
    }
}

pub struct BranchOperator {
    task_id: String,
    dag: Arc<Dag>,
    condition: BranchCondition,
    follow_if_true: BTreeSet<TaskId>,
    follow_if_false: BTreeSet<TaskId>,
    store: Arc<dyn MetadataStore>,
}

impl std::fmt::Debug for BranchOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BranchOperator")
            .field("task_id", &self.task_id)
            .field("dag", &self.dag.dag_id())
            .field("condition", &self.condition)
            .field("follow_if_true", &self.follow_if_true)
            .field("follow_if_false", &self.follow_if_false)
            .finish_non_exhaustive()
    }
}

impl BranchOperator {
    /// Build a branch; every task in either follow set must be a direct
    /// downstream task of `task_id` in `dag`.
    pub fn new<I, J, S, T>(
        task_id: impl Into<String>,
        dag: Arc<Dag>,
        condition: BranchCondition,
        follow_if_true: I,
        follow_if_false: J,
        store: Arc<dyn MetadataStore>,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: Into<TaskId>,
        T: Into<TaskId>,
    {
        let task_id = task_id.into();
        let follow_if_true: BTreeSet<TaskId> = follow_if_true.into_iter().map(Into::into).collect();
        let follow_if_false: BTreeSet<TaskId> =
            follow_if_false.into_iter().map(Into::into).collect();

        let downstream = dag.downstream_of(&task_id);
        for follow in follow_if_true.iter().chain(follow_if_false.iter()) {
            if !downstream.contains(follow) {
                return Err(SubdagError::ConfigError(format!(
                    "branch '{}' follows '{}', which is not one of its direct downstream tasks",
                    task_id, follow
                )));
            }
        }

        Ok(Self {
            task_id,
            dag,
            condition,
            follow_if_true,
            follow_if_false,
            store,
        })
    }

    /// Task ids to follow, evaluated against the current wall clock.
    pub fn choose_branch(&self, ctx: &ExecutionContext) -> BTreeSet<TaskId> {
        self.choose_branch_at(ctx, Utc::now())
    }

    pub fn choose_branch_at(&self, ctx: &ExecutionContext, now: DateTime<Utc>) -> BTreeSet<TaskId> {
        if self.condition.is_met(ctx, now) {
            self.follow_if_true.clone()
        } else {
            self.follow_if_false.clone()
        }
    }

    /// Skip every direct downstream task not in `chosen`.
    pub fn skip_all_except(&self, ctx: &ExecutionContext, chosen: &BTreeSet<TaskId>) -> Result<()> {
        let to_skip: Vec<TaskId> = self
            .dag
            .downstream_of(&self.task_id)
            .iter()
            .filter(|t| !chosen.contains(*t))
            .cloned()
            .collect();

        info!(task = %self.task_id, ?chosen, skipped = ?to_skip, "following branch");
        if to_skip.is_empty() {
            return Ok(());
        }

        let run = match ctx.dag_run() {
            Some(run_id) => RunRef::new(self.dag.dag_id(), run_id),
            None => self
                .store
                .get_run(self.dag.dag_id(), ctx.logical_date())?
                .map(|r| r.run_ref())
                .ok_or_else(|| SubdagError::RunNotFound {
                    dag_id: self.dag.dag_id().to_string(),
                    logical_date: ctx.logical_date().to_rfc3339(),
                })?,
        };
        self.store
            .skip(&run, ctx.logical_date(), &to_skip, ctx.map_index())
    }
}

impl Operator for BranchOperator {
    fn task_id(&self) -> &str {
        &self.task_id
    }

    fn execute<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let chosen = self.choose_branch(ctx);
            debug!(task = %self.task_id, ?chosen, "branch chosen");
            self.skip_all_except(ctx, &chosen)
        })
    }
}

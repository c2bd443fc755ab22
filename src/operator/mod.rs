// src/operator/mod.rs

//! Operators and the lifecycle the enclosing engine drives them through.
//!
//! - [`subdag`] runs a nested DAG and propagates its outcome.
//! - [`branch`] follows one of two sets of downstream tasks.
//! - [`weekday`] parses the day sets used by day-of-week branches.

pub mod branch;
pub mod subdag;
pub mod weekday;

use std::future::Future;
use std::pin::Pin;

use tracing::info;

use crate::context::ExecutionContext;
use crate::errors::Result;

pub use branch::{BranchCondition, BranchOperator};
pub use subdag::{SubDagOperator, SubDagOptions};
pub use weekday::WeekdaySet;

/// Lifecycle hooks called by the enclosing task-execution engine, in order:
/// `pre_execute`, `execute`, `post_execute`.
///
/// An error from any hook fails the task; later hooks are not called.
pub trait Operator: Send + Sync {
    fn task_id(&self) -> &str;

    fn pre_execute(&self, _ctx: &ExecutionContext) -> Result<()> {
        Ok(())
    }

    fn execute<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    fn post_execute(&self, _ctx: &ExecutionContext) -> Result<()> {
        Ok(())
    }
}

/// Run all three hooks of `op`.
pub async fn run_lifecycle(op: &dyn Operator, ctx: &ExecutionContext) -> Result<()> {
    info!(task = op.task_id(), logical_date = %ctx.logical_date(), "pre_execute");
    op.pre_execute(ctx)?;
    info!(task = op.task_id(), "execute");
    op.execute(ctx).await?;
    info!(task = op.task_id(), "post_execute");
    op.post_execute(ctx)
}

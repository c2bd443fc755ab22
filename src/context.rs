// src/context.rs

//! Execution context handed to operator lifecycle hooks.
//!
//! Enclosing engines may still hand over the legacy `execution_date` key
//! instead of `logical_date`. [`RawContext`] accepts both; it is normalised
//! once into an [`ExecutionContext`] so that the operators only ever see a
//! single accessor.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::errors::SubdagError;
use crate::types::UNMAPPED;

/// Context as received at the boundary, before normalisation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawContext {
    #[serde(default)]
    pub logical_date: Option<DateTime<Utc>>,

    /// Legacy name of `logical_date`.
    #[serde(default)]
    pub execution_date: Option<DateTime<Utc>>,

    #[serde(default)]
    pub data_interval_start: Option<DateTime<Utc>>,

    #[serde(default)]
    pub data_interval_end: Option<DateTime<Utc>>,

    /// Run id of the parent DAG run the operator is executing in.
    #[serde(default)]
    pub dag_run: Option<String>,

    #[serde(default)]
    pub map_index: Option<i64>,
}

/// Normalised, validated execution context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    logical_date: DateTime<Utc>,
    data_interval: Option<(DateTime<Utc>, DateTime<Utc>)>,
    dag_run: Option<String>,
    map_index: i64,
}

impl ExecutionContext {
    pub fn new(logical_date: DateTime<Utc>) -> Self {
        Self {
            logical_date,
            data_interval: None,
            dag_run: None,
            map_index: UNMAPPED,
        }
    }

    pub fn with_data_interval(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.data_interval = Some((start, end));
        self
    }

    pub fn with_dag_run(mut self, run_id: impl Into<String>) -> Self {
        self.dag_run = Some(run_id.into());
        self
    }

    pub fn with_map_index(mut self, map_index: i64) -> Self {
        self.map_index = map_index;
        self
    }

    pub fn logical_date(&self) -> DateTime<Utc> {
        self.logical_date
    }

    pub fn data_interval(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        self.data_interval
    }

    pub fn dag_run(&self) -> Option<&str> {
        self.dag_run.as_deref()
    }

    pub fn map_index(&self) -> i64 {
        self.map_index
    }
}

impl TryFrom<RawContext> for ExecutionContext {
    type Error = SubdagError;

    fn try_from(raw: RawContext) -> std::result::Result<Self, Self::Error> {
        let logical_date = raw.logical_date.or(raw.execution_date).ok_or_else(|| {
            SubdagError::ContextError(
                "context carries neither `logical_date` nor `execution_date`".to_string(),
            )
        })?;

        let data_interval = match (raw.data_interval_start, raw.data_interval_end) {
            (Some(start), Some(end)) if start > end => {
                return Err(SubdagError::ContextError(format!(
                    "data interval start {start} is after its end {end}"
                )));
            }
            (Some(start), Some(end)) => Some((start, end)),
            _ => None,
        };

        Ok(Self {
            logical_date,
            data_interval,
            dag_run: raw.dag_run,
            map_index: raw.map_index.unwrap_or(UNMAPPED),
        })
    }
}

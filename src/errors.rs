// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

use crate::types::RunState;

#[derive(Error, Debug)]
pub enum SubdagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Pool conflict: {0}")]
    PoolConflict(String),

    #[error("Context error: {0}")]
    ContextError(String),

    #[error("Cycle detected in DAG: {0}")]
    DagCycle(String),

    #[error("Expected state: success. Actual state: {state}")]
    NestedRunFailed { state: RunState },

    #[error("No run found for DAG '{dag_id}' at {logical_date}")]
    RunNotFound { dag_id: String, logical_date: String },

    #[error("Run '{run_id}' did not reach a terminal state within {waited:?}")]
    PollTimeout {
        run_id: String,
        waited: std::time::Duration,
    },

    #[error("Polling of run '{0}' was cancelled")]
    Cancelled(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SubdagError {
    /// Configuration problems are reported before any run is created and are
    /// never worth retrying.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            SubdagError::ConfigError(_) | SubdagError::PoolConflict(_) | SubdagError::DagCycle(_)
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, SubdagError>;

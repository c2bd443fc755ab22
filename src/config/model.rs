// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::types::SkipPropagation;

/// Configuration exactly as read from a TOML file.
///
/// ```toml
/// [parent]
/// dag_id = "parent"
///
/// [parent.task.report]
/// after = ["section_1"]
///
/// [operator]
/// task_id = "section_1"
/// poke_interval = "1s"
/// propagate_skipped_state = "all_leaves"
/// pool = "single"
/// conf = { key = "value" }
///
/// [subdag]
/// dag_id = "parent.section_1"
///
/// [subdag.task.extract]
/// cmd = "echo extract"
///
/// [subdag.task.load]
/// cmd = "echo load"
/// after = ["extract"]
///
/// [pool.single]
/// slots = 1
/// ```
///
/// The raw form is not validated; convert it into a [`ConfigFile`] with
/// `ConfigFile::try_from` to get checked, typed settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    /// The DAG the operator belongs to.
    pub parent: DagSection,

    /// The sub-DAG operator itself.
    pub operator: OperatorSection,

    /// The nested DAG the operator runs.
    pub subdag: DagSection,

    /// Pools from `[pool.<name>]`.
    #[serde(default)]
    pub pool: BTreeMap<String, PoolSection>,
}

/// `[parent]` / `[subdag]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct DagSection {
    pub dag_id: String,

    /// Tasks from `[<dag>.task.<name>]`, keyed by task id.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// `[<dag>.task.<name>]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskConfig {
    /// Shell command run by the local nested-run engine.
    ///
    /// Parent tasks never run locally, so they usually leave this out.
    #[serde(default)]
    pub cmd: Option<String>,

    /// Upstream tasks this one waits for.
    #[serde(default)]
    pub after: Vec<String>,

    /// Pool limiting how many tasks run at once.
    #[serde(default)]
    pub pool: Option<String>,
}

/// `[operator]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct OperatorSection {
    pub task_id: String,

    /// Duration string such as `"500ms"`, `"5s"` or `"1m"`.
    #[serde(default = "default_poke_interval")]
    pub poke_interval: String,

    /// Give up polling after this long. No limit when absent.
    #[serde(default)]
    pub timeout: Option<String>,

    /// `"all_leaves"` or `"any_leaf"`; propagation is disabled when absent.
    #[serde(default)]
    pub propagate_skipped_state: Option<SkipPropagation>,

    #[serde(default)]
    pub pool: Option<String>,

    /// Payload stored on a newly created nested run.
    #[serde(default)]
    pub conf: Option<serde_json::Value>,

    /// Reset a FAILED nested run before polling it again.
    #[serde(default)]
    pub rerun_failed: bool,
}

fn default_poke_interval() -> String {
    "60s".to_string()
}

/// `[pool.<name>]` section.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PoolSection {
    pub slots: u32,
}

/// Validated configuration.
///
/// Only constructed via `ConfigFile::try_from(RawConfigFile)`, so holders
/// can rely on:
/// - known `after` references and acyclic task graphs in both DAGs,
/// - `subdag.dag_id == "{parent.dag_id}.{operator.task_id}"`,
/// - pool references that point at `[pool.<name>]` entries,
/// - parsed durations.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub parent: DagSection,
    pub operator: OperatorConfig,
    pub subdag: DagSection,
    pub pool: BTreeMap<String, PoolSection>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        parent: DagSection,
        operator: OperatorConfig,
        subdag: DagSection,
        pool: BTreeMap<String, PoolSection>,
    ) -> Self {
        Self {
            parent,
            operator,
            subdag,
            pool,
        }
    }
}

/// Typed operator settings.
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    pub task_id: String,
    pub poke_interval: Duration,
    pub timeout: Option<Duration>,
    pub propagate_skipped_state: Option<SkipPropagation>,
    pub pool: Option<String>,
    pub conf: Option<serde_json::Value>,
    pub rerun_failed: bool,
}

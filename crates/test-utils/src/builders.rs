#![allow(dead_code)]

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use subdag::config::{ConfigFile, DagSection, OperatorSection, PoolSection, RawConfigFile, TaskConfig};
use subdag::dag::Dag;
use subdag::types::SkipPropagation;

/// Midnight UTC of the given day.
pub fn date(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    /// A task that runs `cmd` in the nested engine.
    pub fn new(cmd: &str) -> Self {
        Self {
            task: TaskConfig {
                cmd: Some(cmd.to_string()),
                ..TaskConfig::default()
            },
        }
    }

    /// A parent-DAG task without a command.
    pub fn placeholder() -> Self {
        Self {
            task: TaskConfig::default(),
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn pool(mut self, pool: &str) -> Self {
        self.task.pool = Some(pool.to_string());
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}

/// Builder for a `[parent]` / `[subdag]` section, or the `Dag` made from it.
pub struct DagBuilder {
    section: DagSection,
}

impl DagBuilder {
    pub fn new(dag_id: &str) -> Self {
        Self {
            section: DagSection {
                dag_id: dag_id.to_string(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.section.task.insert(name.to_string(), task);
        self
    }

    /// Shorthand for a task running `true` after `deps`.
    pub fn task(self, name: &str, deps: &[&str]) -> Self {
        let task = deps
            .iter()
            .fold(TaskConfigBuilder::new("true"), |b, d| b.after(d))
            .build();
        self.with_task(name, task)
    }

    pub fn section(self) -> DagSection {
        self.section
    }

    pub fn build(self) -> Dag {
        Dag::from_section(&self.section)
    }
}

/// Builder for `ConfigFile` to simplify test setup.
///
/// The nested DAG id follows the `{parent}.{task_id}` convention unless
/// overridden with [`ConfigFileBuilder::subdag_id`].
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new(parent_id: &str, task_id: &str) -> Self {
        Self {
            config: RawConfigFile {
                parent: DagBuilder::new(parent_id).section(),
                operator: OperatorSection {
                    task_id: task_id.to_string(),
                    poke_interval: "10ms".to_string(),
                    timeout: None,
                    propagate_skipped_state: None,
                    pool: None,
                    conf: None,
                    rerun_failed: false,
                },
                subdag: DagBuilder::new(&format!("{parent_id}.{task_id}")).section(),
                pool: BTreeMap::new(),
            },
        }
    }

    pub fn subdag_id(mut self, dag_id: &str) -> Self {
        self.config.subdag.dag_id = dag_id.to_string();
        self
    }

    pub fn parent_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.parent.task.insert(name.to_string(), task);
        self
    }

    pub fn subdag_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.subdag.task.insert(name.to_string(), task);
        self
    }

    pub fn pool(mut self, name: &str, slots: u32) -> Self {
        self.config.pool.insert(name.to_string(), PoolSection { slots });
        self
    }

    pub fn operator_pool(mut self, pool: &str) -> Self {
        self.config.operator.pool = Some(pool.to_string());
        self
    }

    pub fn poke_interval(mut self, interval: &str) -> Self {
        self.config.operator.poke_interval = interval.to_string();
        self
    }

    pub fn timeout(mut self, timeout: &str) -> Self {
        self.config.operator.timeout = Some(timeout.to_string());
        self
    }

    pub fn propagate_skipped_state(mut self, policy: SkipPropagation) -> Self {
        self.config.operator.propagate_skipped_state = Some(policy);
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

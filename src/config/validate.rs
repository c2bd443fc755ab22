// src/config/validate.rs

use std::sync::LazyLock;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use regex::Regex;

use crate::config::duration::parse_duration;
use crate::config::model::{
    ConfigFile, DagSection, OperatorConfig, OperatorSection, RawConfigFile, TaskConfig,
};
use crate::errors::{Result, SubdagError};

/// DAG and task ids: word characters, dots and dashes.
static KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").expect("static regex is valid"));

const MAX_KEY_LEN: usize = 250;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = SubdagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;

        let operator = operator_config(&raw.operator)?;
        let mut parent = raw.parent;
        // The operator is a task of the parent DAG even when the file only
        // mentions it through `after` references.
        parent
            .task
            .entry(operator.task_id.clone())
            .or_insert_with(|| TaskConfig {
                pool: operator.pool.clone(),
                ..TaskConfig::default()
            });

        Ok(ConfigFile::new_unchecked(
            parent,
            operator,
            raw.subdag,
            raw.pool,
        ))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_ids(cfg)?;
    validate_subdag_name(&cfg.parent.dag_id, &cfg.operator.task_id, &cfg.subdag.dag_id)?;
    ensure_has_tasks(&cfg.subdag)?;

    let operator_id = cfg.operator.task_id.as_str();
    validate_task_dependencies(&cfg.parent, Some(operator_id))?;
    validate_task_dependencies(&cfg.subdag, None)?;
    validate_dag(&cfg.parent, Some(operator_id))?;
    validate_dag(&cfg.subdag, None)?;

    validate_commands(&cfg.subdag)?;
    validate_pools(cfg)?;
    Ok(())
}

/// The nested DAG must be named `{parent_dag_id}.{task_id}`.
pub fn validate_subdag_name(parent_dag_id: &str, task_id: &str, subdag_id: &str) -> Result<()> {
    let expected = format!("{parent_dag_id}.{task_id}");
    if subdag_id != expected {
        return Err(SubdagError::ConfigError(format!(
            "the subdag's dag_id should have the form '{{parent_dag_id}}.{{this_task_id}}'. \
             Expected '{expected}'; received '{subdag_id}'."
        )));
    }
    Ok(())
}

/// Check a DAG or task id against the allowed character set and length.
pub fn validate_key(kind: &str, key: &str) -> Result<()> {
    if key.len() > MAX_KEY_LEN {
        return Err(SubdagError::ConfigError(format!(
            "{kind} '{key}' is longer than {MAX_KEY_LEN} characters"
        )));
    }
    if !KEY_RE.is_match(key) {
        return Err(SubdagError::ConfigError(format!(
            "{kind} '{key}' must only contain alphanumerics, dashes, dots and underscores"
        )));
    }
    Ok(())
}

fn validate_ids(cfg: &RawConfigFile) -> Result<()> {
    validate_key("dag_id", &cfg.parent.dag_id)?;
    validate_key("dag_id", &cfg.subdag.dag_id)?;
    validate_key("task_id", &cfg.operator.task_id)?;
    for name in cfg.parent.task.keys().chain(cfg.subdag.task.keys()) {
        validate_key("task_id", name)?;
    }
    Ok(())
}

fn ensure_has_tasks(dag: &DagSection) -> Result<()> {
    if dag.task.is_empty() {
        return Err(SubdagError::ConfigError(format!(
            "DAG '{}' must contain at least one task",
            dag.dag_id
        )));
    }
    Ok(())
}

fn validate_task_dependencies(dag: &DagSection, implicit: Option<&str>) -> Result<()> {
    let known = |name: &str| dag.task.contains_key(name) || implicit == Some(name);

    for (name, task) in dag.task.iter() {
        for dep in task.after.iter() {
            if dep == name {
                return Err(SubdagError::ConfigError(format!(
                    "task '{}' in DAG '{}' cannot depend on itself in `after`",
                    name, dag.dag_id
                )));
            }
            if !known(dep) {
                return Err(SubdagError::ConfigError(format!(
                    "task '{}' in DAG '{}' has unknown dependency '{}' in `after`",
                    name, dag.dag_id, dep
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(dag: &DagSection, implicit: Option<&str>) -> Result<()> {
    // Edge direction: dep -> task.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    if let Some(name) = implicit {
        graph.add_node(name);
    }
    for name in dag.task.keys() {
        graph.add_node(name.as_str());
    }
    for (name, task) in dag.task.iter() {
        for dep in task.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(SubdagError::DagCycle(format!(
            "cycle detected in DAG '{}' involving task '{}'",
            dag.dag_id,
            cycle.node_id()
        ))),
    }
}

fn validate_commands(dag: &DagSection) -> Result<()> {
    for (name, task) in dag.task.iter() {
        match task.cmd.as_deref() {
            Some(cmd) if !cmd.trim().is_empty() => {}
            _ => {
                return Err(SubdagError::ConfigError(format!(
                    "task '{}' in DAG '{}' needs a non-empty `cmd`",
                    name, dag.dag_id
                )));
            }
        }
    }
    Ok(())
}

fn validate_pools(cfg: &RawConfigFile) -> Result<()> {
    for (name, pool) in cfg.pool.iter() {
        validate_key("pool", name)?;
        if pool.slots == 0 {
            return Err(SubdagError::ConfigError(format!(
                "[pool.{name}].slots must be >= 1 (got 0)"
            )));
        }
    }

    let check = |owner: &str, pool: Option<&String>| -> Result<()> {
        match pool {
            Some(p) if !cfg.pool.contains_key(p) => Err(SubdagError::ConfigError(format!(
                "{owner} uses unknown pool '{p}'"
            ))),
            _ => Ok(()),
        }
    };

    check(
        &format!("operator '{}'", cfg.operator.task_id),
        cfg.operator.pool.as_ref(),
    )?;
    for dag in [&cfg.parent, &cfg.subdag] {
        for (name, task) in dag.task.iter() {
            check(
                &format!("task '{}' in DAG '{}'", name, dag.dag_id),
                task.pool.as_ref(),
            )?;
        }
    }
    Ok(())
}

fn operator_config(raw: &OperatorSection) -> Result<OperatorConfig> {
    let poke_interval = parse_duration(&raw.poke_interval)
        .map_err(|e| SubdagError::ConfigError(format!("[operator].poke_interval: {e}")))?;
    if poke_interval.is_zero() {
        return Err(SubdagError::ConfigError(
            "[operator].poke_interval must be greater than zero".to_string(),
        ));
    }

    let timeout = raw
        .timeout
        .as_deref()
        .map(parse_duration)
        .transpose()
        .map_err(|e| SubdagError::ConfigError(format!("[operator].timeout: {e}")))?;

    Ok(OperatorConfig {
        task_id: raw.task_id.clone(),
        poke_interval,
        timeout,
        propagate_skipped_state: raw.propagate_skipped_state,
        pool: raw.pool.clone(),
        conf: raw.conf.clone(),
        rerun_failed: raw.rerun_failed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subdag_name_must_be_parent_dot_task() {
        assert!(validate_subdag_name("parent", "test", "parent.test").is_ok());
        assert!(validate_subdag_name("parent", "test", "parent.bad").is_err());
        assert!(validate_subdag_name("parent", "test", "bad.test").is_err());
        assert!(validate_subdag_name("parent", "test", "bad.bad").is_err());
    }

    #[test]
    fn keys_reject_spaces_and_overlong_names() {
        assert!(validate_key("task_id", "extract-1.v2").is_ok());
        assert!(validate_key("task_id", "has space").is_err());
        assert!(validate_key("task_id", &"x".repeat(MAX_KEY_LEN + 1)).is_err());
    }
}

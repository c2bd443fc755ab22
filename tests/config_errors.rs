// tests/config_errors.rs

mod common;
use crate::common::builders::{ConfigFileBuilder, TaskConfigBuilder};

use std::io::Write;
use std::time::Duration;

use tempfile::NamedTempFile;

use subdag::config::load_and_validate;
use subdag::errors::SubdagError;
use subdag::types::SkipPropagation;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

#[test]
fn full_config_loads() {
    let file = write_config(
        r#"
[parent]
dag_id = "parent"

[parent.task.report]
after = ["section_1"]

[operator]
task_id = "section_1"
poke_interval = "500ms"
timeout = "2m"
propagate_skipped_state = "all_leaves"
conf = { key = "value" }

[subdag]
dag_id = "parent.section_1"

[subdag.task.extract]
cmd = "echo extract"

[subdag.task.load]
cmd = "echo load"
after = ["extract"]
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();
    assert_eq!(cfg.operator.task_id, "section_1");
    assert_eq!(cfg.operator.poke_interval, Duration::from_millis(500));
    assert_eq!(cfg.operator.timeout, Some(Duration::from_secs(120)));
    assert_eq!(
        cfg.operator.propagate_skipped_state,
        Some(SkipPropagation::AllLeaves)
    );
    assert!(cfg.parent.task.contains_key("section_1"));
    assert_eq!(cfg.subdag.task.len(), 2);
}

#[test]
fn nested_cycle_returns_structured_error() {
    let file = write_config(
        r#"
[parent]
dag_id = "p"

[operator]
task_id = "s"

[subdag]
dag_id = "p.s"

[subdag.task.A]
cmd = "echo A"
after = ["B"]

[subdag.task.B]
cmd = "echo B"
after = ["A"]
"#,
    );

    match load_and_validate(file.path()) {
        Err(SubdagError::DagCycle(msg)) => {
            assert!(msg.contains('A') || msg.contains('B'), "{msg}");
        }
        other => panic!("expected DagCycle, got {other:?}"),
    }
}

#[test]
fn unknown_skip_policy_is_a_toml_error() {
    let file = write_config(
        r#"
[parent]
dag_id = "p"

[operator]
task_id = "s"
propagate_skipped_state = "some_leaves"

[subdag]
dag_id = "p.s"

[subdag.task.A]
cmd = "echo A"
"#,
    );

    assert!(matches!(
        load_and_validate(file.path()),
        Err(SubdagError::TomlError(_))
    ));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = load_and_validate(dir.path().join("Subdag.toml"));
    assert!(matches!(result, Err(SubdagError::IoError(_))));
}

#[test]
fn pool_reference_must_exist() {
    let raw = ConfigFileBuilder::new("p", "s")
        .subdag_task("a", TaskConfigBuilder::new("true").pool("ghost").build())
        .raw();

    let err = subdag::config::ConfigFile::try_from(raw).unwrap_err();
    assert!(err.is_config());
    assert!(err.to_string().contains("ghost"));
}

#[test]
fn bad_poke_interval_is_rejected() {
    let raw = ConfigFileBuilder::new("p", "s")
        .poke_interval("soon")
        .subdag_task("a", TaskConfigBuilder::new("true").build())
        .raw();

    assert!(subdag::config::ConfigFile::try_from(raw).is_err());
}

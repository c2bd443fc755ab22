use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Canonical task identifier type used throughout the crate.
pub type TaskId = String;

/// `map_index` value of a task instance that is not mapped.
pub const UNMAPPED: i64 = -1;

/// State of one run of a workflow.
///
/// `Running` and `None` are transient; `Success` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    None,
    Running,
    Success,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Success | RunState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunState::None => "none",
            RunState::Running => "running",
            RunState::Success => "success",
            RunState::Failed => "failed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a single task instance within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    None,
    Running,
    Success,
    Failed,
    /// Never ran because something upstream failed.
    UpstreamFailed,
    Skipped,
}

impl TaskState {
    /// Whether the task instance has finished for this run.
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            TaskState::Success | TaskState::Failed | TaskState::UpstreamFailed | TaskState::Skipped
        )
    }

    /// Whether this state makes the enclosing run fail.
    pub fn is_failure(self) -> bool {
        matches!(self, TaskState::Failed | TaskState::UpstreamFailed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::None => "none",
            TaskState::Running => "running",
            TaskState::Success => "success",
            TaskState::Failed => "failed",
            TaskState::UpstreamFailed => "upstream_failed",
            TaskState::Skipped => "skipped",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy deciding whether the SKIPPED state of the nested run's leaf tasks
/// is pushed onto the operator's downstream tasks.
///
/// "Disabled" is modelled as `Option::<SkipPropagation>::None` by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipPropagation {
    /// Propagate only when every leaf task was skipped.
    AllLeaves,
    /// Propagate when at least one leaf task was skipped.
    AnyLeaf,
}

impl SkipPropagation {
    /// Apply the policy to the observed leaf states.
    ///
    /// An empty slice never propagates under `AnyLeaf`, and vacuously does
    /// under `AllLeaves` (matching `Iterator::all`).
    pub fn should_skip(self, leaf_states: &[TaskState]) -> bool {
        match self {
            SkipPropagation::AllLeaves => leaf_states.iter().all(|s| *s == TaskState::Skipped),
            SkipPropagation::AnyLeaf => leaf_states.iter().any(|s| *s == TaskState::Skipped),
        }
    }
}

impl FromStr for SkipPropagation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all_leaves" => Ok(SkipPropagation::AllLeaves),
            "any_leaf" => Ok(SkipPropagation::AnyLeaf),
            other => Err(format!(
                "invalid propagate_skipped_state: {other} (expected \"all_leaves\" or \"any_leaf\")"
            )),
        }
    }
}

/// How a run came into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunType {
    Scheduled,
    Manual,
}

impl Default for RunType {
    fn default() -> Self {
        RunType::Scheduled
    }
}

impl RunType {
    pub fn as_str(self) -> &'static str {
        match self {
            RunType::Scheduled => "scheduled",
            RunType::Manual => "manual",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_success_and_failed_are_terminal() {
        assert!(RunState::Success.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert!(!RunState::Running.is_terminal());
        assert!(!RunState::None.is_terminal());
    }

    #[test]
    fn skip_policy_parses_case_insensitively() {
        assert_eq!("ALL_LEAVES".parse(), Ok(SkipPropagation::AllLeaves));
        assert_eq!(" any_leaf ".parse(), Ok(SkipPropagation::AnyLeaf));
        assert!("some_leaves".parse::<SkipPropagation>().is_err());
    }

    #[test]
    fn any_leaf_counts_skips_next_to_failures() {
        let states = [TaskState::Failed, TaskState::Skipped];
        assert!(SkipPropagation::AnyLeaf.should_skip(&states));
        assert!(!SkipPropagation::AllLeaves.should_skip(&states));
    }
}

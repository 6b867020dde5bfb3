//! Core types for the convergence engine

use serde::{Deserialize, Serialize};

/// A value observed from the live system.
///
/// A probe that cannot determine a field reports `Unknown` for that field
/// instead of failing the whole snapshot. Planners treat `Unknown`
/// conservatively (emit the corrective action; its own idempotency predicate
/// re-checks at execution time).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Probed<T> {
    /// The value was observed successfully
    Known(T),
    /// The value could not be determined (missing tool, command failure)
    Unknown,
}

impl<T> Probed<T> {
    /// Get the observed value, if known
    pub fn known(&self) -> Option<&T> {
        match self {
            Self::Known(v) => Some(v),
            Self::Unknown => None,
        }
    }

    /// True when the value is known and matches the predicate
    pub fn satisfies<F: FnOnce(&T) -> bool>(&self, pred: F) -> bool {
        match self {
            Self::Known(v) => pred(v),
            Self::Unknown => false,
        }
    }
}

impl<T> From<Option<T>> for Probed<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Unknown, Self::Known)
    }
}

/// How a failed action affects the rest of the plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// Failure halts the remaining plan
    Fatal,
    /// Failure is recorded and the plan continues
    Recoverable,
}

/// Per-action outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionStatus {
    /// Idempotency predicate was already satisfied; nothing applied
    Skipped,
    /// Action applied (and verified, where the action defines a check)
    Applied,
    /// Action failed after all permitted attempts
    Failed { reason: String },
}

impl ActionStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Record of one executed action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Action id (e.g. "apt:python3-pip")
    pub action_id: String,
    /// Action kind (e.g. "install_package")
    pub kind: String,
    pub status: ActionStatus,
    /// Apply attempts made (primary + fallback)
    pub attempts: u32,
}

/// Overall outcome of one convergence run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// Desired state reached (or nothing to do)
    Success,
    /// Recoverable failures occurred; the rest of the plan completed
    PartialFailure,
    /// A fatal failure halted the run
    Fatal,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::PartialFailure => "partial-failure",
            Self::Fatal => "fatal",
        }
    }
}

/// Aggregated counts over one execution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn from_results(results: &[ExecutionResult]) -> Self {
        let mut summary = Self::default();
        for result in results {
            match &result.status {
                ActionStatus::Skipped => summary.skipped += 1,
                ActionStatus::Applied => summary.applied += 1,
                ActionStatus::Failed { .. } => summary.failed += 1,
            }
        }
        summary
    }

    pub fn is_all_skipped(&self) -> bool {
        self.applied == 0 && self.failed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probed_satisfies_only_when_known() {
        assert!(Probed::Known(3u32).satisfies(|v| *v == 3));
        assert!(!Probed::Known(3u32).satisfies(|v| *v == 4));
        assert!(!Probed::<u32>::Unknown.satisfies(|_| true));
    }

    #[test]
    fn probed_from_option() {
        assert_eq!(Probed::from(Some(1)), Probed::Known(1));
        assert_eq!(Probed::<i32>::from(None), Probed::Unknown);
    }

    #[test]
    fn summary_counts_results() {
        let results = vec![
            ExecutionResult {
                action_id: "a".into(),
                kind: "k".into(),
                status: ActionStatus::Applied,
                attempts: 1,
            },
            ExecutionResult {
                action_id: "b".into(),
                kind: "k".into(),
                status: ActionStatus::Skipped,
                attempts: 0,
            },
            ExecutionResult {
                action_id: "c".into(),
                kind: "k".into(),
                status: ActionStatus::Failed {
                    reason: "boom".into(),
                },
                attempts: 2,
            },
        ];
        let summary = RunSummary::from_results(&results);
        assert_eq!(summary.applied, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
        assert!(!summary.is_all_skipped());
    }
}

//! The Action trait - one corrective step toward desired state

use anyhow::Result;
use std::fmt;

use crate::types::Severity;

/// A single corrective action with an idempotency predicate.
///
/// Actions must be safe to re-apply: `is_satisfied` is re-checked immediately
/// before `apply`, so a converged item costs one read-only check and nothing
/// else. `verify` is the action's own post-check (e.g. an import-and-call
/// smoke test for a native dependency); `fallback` supplies at most one
/// alternate-source retry when apply or verify fails.
pub trait Action: fmt::Debug {
    /// Unique identifier (e.g. "apt:python3-pip", "cron:update")
    fn id(&self) -> String;

    /// Human-readable description
    fn description(&self) -> String;

    /// Action kind (e.g. "install_package", "replace_mirror")
    fn kind(&self) -> &'static str;

    /// How a failure of this action affects the remaining plan
    fn severity(&self) -> Severity {
        Severity::Recoverable
    }

    /// Idempotency predicate: true when the system already matches
    fn is_satisfied(&self) -> Result<bool>;

    /// Apply the corrective step
    fn apply(&self) -> Result<()>;

    /// Post-apply functional check; install success alone is never trusted
    /// for dependency-sensitive actions
    fn verify(&self) -> Result<()> {
        Ok(())
    }

    /// One bounded retry via an alternate source, if the action has one
    fn fallback(&self) -> Option<BoxedAction> {
        None
    }
}

pub type BoxedAction = Box<dyn Action>;

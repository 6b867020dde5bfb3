//! Run-level error taxonomy

use thiserror::Error;

/// Failure classes a convergence run can hit.
///
/// Only `ConnectivityUnavailable` is benign: a cron-triggered update with no
/// network has nothing to do and exits 0. Everything else is surfaced through
/// the run log and, for the fatal classes, a non-zero exit.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// No network; the update cycle is skipped, not failed
    #[error("connectivity unavailable: {0}")]
    ConnectivityUnavailable(String),

    /// The repo clone is missing, dirty, or diverged; aborts before mutation
    #[error("repository state invalid: {0}")]
    RepositoryStateInvalid(String),

    /// A conflicting native library shadows the pinned dependency
    #[error("dependency conflict: {0}")]
    DependencyConflict(String),

    /// Post-install smoke test failed after all permitted attempts
    #[error("verification failed: {0}")]
    VerificationFailed(String),

    /// Run requires root and does not have it; checked before any mutation
    #[error("elevated privileges required: {0}")]
    PrivilegeMissing(String),
}

impl ProvisionError {
    /// Process exit code for this error class
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectivityUnavailable(_) => 0,
            Self::PrivilegeMissing(_) => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connectivity_is_a_clean_exit() {
        assert_eq!(
            ProvisionError::ConnectivityUnavailable("offline".into()).exit_code(),
            0
        );
    }

    #[test]
    fn privilege_and_repository_errors_are_nonzero() {
        assert_ne!(
            ProvisionError::PrivilegeMissing("run as root".into()).exit_code(),
            0
        );
        assert_ne!(
            ProvisionError::RepositoryStateInvalid("dirty tree".into()).exit_code(),
            0
        );
    }
}

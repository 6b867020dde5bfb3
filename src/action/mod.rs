//! Concrete corrective actions
//!
//! Each action implements [`converge::Action`]: an idempotency predicate that
//! is re-checked right before apply, the apply itself, and - for the
//! dependency-sensitive ones - a functional verification plus a single
//! alternate-source fallback.

pub mod apt;
pub mod artifact;
pub mod cron;
pub mod mirror;
pub mod pip;
pub mod repo;
pub mod swap;
pub mod systemd;

pub use apt::{AptInstall, AptRemove};
pub use artifact::CreateFile;
pub use cron::InstallCronJob;
pub use mirror::ReplaceMirror;
pub use pip::PipInstall;
pub use repo::PullRepository;
pub use swap::ExpandSwap;
pub use systemd::{InstallService, RestartService};

use anyhow::Result;

use crate::error::ProvisionError;
use crate::runner::{self, QUICK_TIMEOUT};

/// Run a python snippet as a post-install smoke test.
///
/// Exercises the installed dependency's actual functionality (e.g. an ArUco
/// dictionary lookup), not just its importability.
pub(crate) fn run_smoke_test(snippet: &str) -> Result<()> {
    let out = runner::run_with_timeout("python3", &["-c", snippet], QUICK_TIMEOUT)?;
    if out.timed_out {
        return Err(ProvisionError::VerificationFailed("smoke test timed out".to_string()).into());
    }
    if !out.success {
        return Err(
            ProvisionError::VerificationFailed(out.stderr.trim().to_string()).into(),
        );
    }
    Ok(())
}

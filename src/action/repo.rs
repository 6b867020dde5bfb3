//! Source repository pull with device-local exclusions

use anyhow::Result;
use converge::{Action, Severity};
use std::path::PathBuf;

use crate::error::ProvisionError;
use crate::git;

/// Fast-forward the clone to upstream.
///
/// Files on the exclusion list (device id config, calibration variables) are
/// marked assume-unchanged first, on every run: the flag does not survive
/// some index rewrites, and re-marking is idempotent.
#[derive(Debug, Clone)]
pub struct PullRepository {
    pub path: PathBuf,
    pub remote: String,
    pub branch: String,
    pub exclude: Vec<String>,
}

impl PullRepository {
    pub fn new(path: PathBuf, remote: &str, branch: &str, exclude: &[String]) -> Self {
        Self {
            path,
            remote: remote.to_string(),
            branch: branch.to_string(),
            exclude: exclude.to_vec(),
        }
    }
}

impl Action for PullRepository {
    fn id(&self) -> String {
        format!("repo:{}", self.path.display())
    }

    fn description(&self) -> String {
        format!(
            "pull {}/{} into {}",
            self.remote,
            self.branch,
            self.path.display()
        )
    }

    fn kind(&self) -> &'static str {
        "pull_repository"
    }

    fn severity(&self) -> Severity {
        // A clone that cannot be brought current means everything installed
        // from it is suspect; stop before touching packages or the service.
        Severity::Fatal
    }

    fn is_satisfied(&self) -> Result<bool> {
        git::fetch(&self.path, &self.remote, &self.branch)?;
        let head = git::current_revision(&self.path)?;
        let upstream = git::fetched_revision(&self.path)?;
        Ok(head == upstream)
    }

    fn apply(&self) -> Result<()> {
        for file in &self.exclude {
            git::assume_unchanged(&self.path, file);
        }
        git::pull_ff(&self.path, &self.remote, &self.branch).map_err(|err| {
            ProvisionError::RepositoryStateInvalid(format!(
                "{}: {err:#}",
                self.path.display()
            ))
            .into()
        })
    }

    fn verify(&self) -> Result<()> {
        let head = git::current_revision(&self.path)?;
        let upstream = git::fetched_revision(&self.path)?;
        if head != upstream {
            return Err(ProvisionError::RepositoryStateInvalid(format!(
                "HEAD {head} does not match upstream {upstream} after pull"
            ))
            .into());
        }
        Ok(())
    }
}

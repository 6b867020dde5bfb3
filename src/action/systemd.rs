//! systemd service actions

use anyhow::{Context, Result};
use converge::{Action, Severity};
use std::fs;
use std::path::PathBuf;

use crate::runner::{self, QUICK_TIMEOUT};

/// Install the capture service unit from the repo clone and enable it
#[derive(Debug, Clone)]
pub struct InstallService {
    pub name: String,
    pub unit_source: PathBuf,
    pub unit_install_path: PathBuf,
    pub enable: bool,
}

impl InstallService {
    pub fn new(name: &str, unit_source: PathBuf, unit_install_path: PathBuf, enable: bool) -> Self {
        Self {
            name: name.to_string(),
            unit_source,
            unit_install_path,
            enable,
        }
    }

    fn unit_matches(&self) -> Result<bool> {
        let desired = fs::read(&self.unit_source)
            .with_context(|| format!("Could not read {}", self.unit_source.display()))?;
        let Ok(installed) = fs::read(&self.unit_install_path) else {
            return Ok(false);
        };
        Ok(blake3::hash(&desired) == blake3::hash(&installed))
    }

    fn is_enabled(&self) -> Result<bool> {
        let out = runner::run_with_timeout("systemctl", &["is-enabled", &self.name], QUICK_TIMEOUT)?;
        Ok(out.success)
    }
}

impl Action for InstallService {
    fn id(&self) -> String {
        format!("service:{}", self.name)
    }

    fn description(&self) -> String {
        format!("install and enable service unit {}", self.name)
    }

    fn kind(&self) -> &'static str {
        "install_service"
    }

    fn severity(&self) -> Severity {
        // Missing unit source is a missing required local artifact.
        Severity::Fatal
    }

    fn is_satisfied(&self) -> Result<bool> {
        Ok(self.unit_matches()? && (!self.enable || self.is_enabled()?))
    }

    fn apply(&self) -> Result<()> {
        let unit = fs::read(&self.unit_source)
            .with_context(|| format!("Could not read {}", self.unit_source.display()))?;
        fs::write(&self.unit_install_path, unit)
            .with_context(|| format!("Could not write {}", self.unit_install_path.display()))?;

        runner::run_with_timeout("systemctl", &["daemon-reload"], QUICK_TIMEOUT)?
            .require_success("systemctl daemon-reload")?;
        if self.enable {
            runner::run_with_timeout("systemctl", &["enable", &self.name], QUICK_TIMEOUT)?
                .require_success(&format!("systemctl enable {}", self.name))?;
        }
        Ok(())
    }

    fn verify(&self) -> Result<()> {
        if self.enable && !self.is_enabled()? {
            anyhow::bail!("{} is not enabled after install", self.name);
        }
        Ok(())
    }
}

/// Restart the capture service; `force` restarts even a running instance
/// (code changed underneath it)
#[derive(Debug, Clone)]
pub struct RestartService {
    pub name: String,
    pub force: bool,
}

impl RestartService {
    pub fn new(name: &str, force: bool) -> Self {
        Self {
            name: name.to_string(),
            force,
        }
    }

    fn is_active(&self) -> Result<bool> {
        let out = runner::run_with_timeout("systemctl", &["is-active", &self.name], QUICK_TIMEOUT)?;
        Ok(out.success)
    }
}

impl Action for RestartService {
    fn id(&self) -> String {
        format!("restart:{}", self.name)
    }

    fn description(&self) -> String {
        if self.force {
            format!("restart {} (updated code)", self.name)
        } else {
            format!("start {} (not active)", self.name)
        }
    }

    fn kind(&self) -> &'static str {
        "restart_service"
    }

    fn severity(&self) -> Severity {
        Severity::Fatal
    }

    fn is_satisfied(&self) -> Result<bool> {
        if self.force {
            return Ok(false);
        }
        self.is_active()
    }

    fn apply(&self) -> Result<()> {
        runner::run_with_timeout("systemctl", &["restart", &self.name], QUICK_TIMEOUT)?
            .require_success(&format!("systemctl restart {}", self.name))?;
        Ok(())
    }

    fn verify(&self) -> Result<()> {
        if !self.is_active()? {
            anyhow::bail!("{} is not active after restart", self.name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn unit_comparison_is_content_based() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("capture.service");
        let installed = dir.path().join("installed.service");
        fs::write(&source, "[Unit]\nDescription=capture\n").unwrap();

        let action = InstallService::new("capture", source.clone(), installed.clone(), false);
        assert!(!action.unit_matches().unwrap());

        fs::write(&installed, "[Unit]\nDescription=capture\n").unwrap();
        assert!(action.unit_matches().unwrap());

        fs::write(&installed, "[Unit]\nDescription=stale\n").unwrap();
        assert!(!action.unit_matches().unwrap());
    }

    #[test]
    fn missing_unit_source_is_an_error() {
        let dir = tempdir().unwrap();
        let action = InstallService::new(
            "capture",
            dir.path().join("missing.service"),
            dir.path().join("installed.service"),
            true,
        );
        assert!(action.is_satisfied().is_err());
        assert!(action.apply().is_err());
    }

    #[test]
    fn forced_restart_is_never_satisfied() {
        let action = RestartService::new("capture", true);
        assert!(!action.is_satisfied().unwrap());
    }
}

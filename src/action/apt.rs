//! APT package actions

use anyhow::Result;
use converge::{Action, BoxedAction, Severity};

use super::run_smoke_test;
use crate::error::ProvisionError;
use crate::probe::parse_dpkg_status;
use crate::runner::{self, NETWORK_TIMEOUT, PACKAGE_TIMEOUT, QUICK_TIMEOUT};

/// Install an apt package, optionally pinned to an exact version
#[derive(Debug, Clone)]
pub struct AptInstall {
    pub name: String,
    pub version: Option<String>,
    pub import_name: Option<String>,
    pub smoke_test: Option<String>,
    pub optional: bool,
    /// Fallback refreshes the package index before retrying
    refresh_index_first: bool,
}

impl AptInstall {
    pub fn new(
        name: &str,
        version: Option<&str>,
        import_name: Option<&str>,
        smoke_test: Option<&str>,
        optional: bool,
    ) -> Self {
        Self {
            name: name.to_string(),
            version: version.map(String::from),
            import_name: import_name.map(String::from),
            smoke_test: smoke_test.map(String::from),
            optional,
            refresh_index_first: false,
        }
    }

    fn install_spec(&self) -> String {
        match &self.version {
            Some(version) => format!("{}={}", self.name, version),
            None => self.name.clone(),
        }
    }

    fn installed_version(&self) -> Result<Option<String>> {
        let args = ["-W", "-f=${db:Status-Status} ${Version}", &self.name];
        let out = runner::run_with_timeout("dpkg-query", &args, QUICK_TIMEOUT)?;
        if out.success {
            Ok(parse_dpkg_status(&out.stdout))
        } else {
            Ok(None)
        }
    }
}

impl Action for AptInstall {
    fn id(&self) -> String {
        format!("apt:{}", self.name)
    }

    fn description(&self) -> String {
        match &self.version {
            Some(v) => format!("install apt package {} pinned to {v}", self.name),
            None => format!("install apt package {}", self.name),
        }
    }

    fn kind(&self) -> &'static str {
        "install_package"
    }

    fn severity(&self) -> Severity {
        if self.optional {
            Severity::Recoverable
        } else {
            Severity::Fatal
        }
    }

    fn is_satisfied(&self) -> Result<bool> {
        let installed = self.installed_version()?;
        Ok(match (&self.version, installed) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(pin), Some(have)) => *pin == have,
        })
    }

    fn apply(&self) -> Result<()> {
        if self.refresh_index_first {
            runner::run_command(
                noninteractive("apt-get", &["update"]),
                None,
                NETWORK_TIMEOUT,
            )?
            .require_success("apt-get update")?;
        }

        let spec = self.install_spec();
        runner::run_command(
            noninteractive("apt-get", &["install", "-y", &spec]),
            None,
            PACKAGE_TIMEOUT,
        )?
        .require_success(&format!("apt-get install {spec}"))?;
        Ok(())
    }

    fn verify(&self) -> Result<()> {
        if let Some(snippet) = &self.smoke_test {
            return run_smoke_test(snippet);
        }
        if let Some(import) = &self.import_name {
            return run_smoke_test(&format!("import {import}"));
        }
        Ok(())
    }

    fn fallback(&self) -> Option<BoxedAction> {
        if self.refresh_index_first {
            return None;
        }
        Some(Box::new(Self {
            refresh_index_first: true,
            ..self.clone()
        }))
    }
}

/// Purge a conflicting package so a stale binary can never satisfy a
/// version check for its pinned replacement
#[derive(Debug, Clone)]
pub struct AptRemove {
    pub name: String,
}

impl AptRemove {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl Action for AptRemove {
    fn id(&self) -> String {
        format!("apt-purge:{}", self.name)
    }

    fn description(&self) -> String {
        format!("purge conflicting package {}", self.name)
    }

    fn kind(&self) -> &'static str {
        "remove_package"
    }

    fn severity(&self) -> Severity {
        // A failed purge surfaces later as a dependency conflict; the pinned
        // install's own verification catches the stale binary.
        Severity::Recoverable
    }

    fn is_satisfied(&self) -> Result<bool> {
        let args = ["-W", "-f=${db:Status-Status} ${Version}", &self.name];
        let out = runner::run_with_timeout("dpkg-query", &args, QUICK_TIMEOUT)?;
        Ok(!out.success || parse_dpkg_status(&out.stdout).is_none())
    }

    fn apply(&self) -> Result<()> {
        let out = runner::run_command(
            noninteractive("apt-get", &["purge", "-y", &self.name]),
            None,
            PACKAGE_TIMEOUT,
        )?;
        if !out.success {
            return Err(ProvisionError::DependencyConflict(format!(
                "could not purge {}: {}",
                self.name,
                out.stderr.trim()
            ))
            .into());
        }
        Ok(())
    }
}

fn noninteractive(program: &str, args: &[&str]) -> std::process::Command {
    let mut cmd = runner::command(program, args);
    cmd.env("DEBIAN_FRONTEND", "noninteractive");
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_spec_includes_pin() {
        let pinned = AptInstall::new("libatlas-base-dev", Some("3.10.3-8"), None, None, false);
        assert_eq!(pinned.install_spec(), "libatlas-base-dev=3.10.3-8");

        let unpinned = AptInstall::new("git", None, None, None, false);
        assert_eq!(unpinned.install_spec(), "git");
    }

    #[test]
    fn optional_packages_are_recoverable() {
        let optional = AptInstall::new("python3-picamera", None, None, None, true);
        assert_eq!(optional.severity(), Severity::Recoverable);

        let required = AptInstall::new("python3-pip", None, None, None, false);
        assert_eq!(required.severity(), Severity::Fatal);
    }

    #[test]
    fn fallback_refreshes_index_exactly_once() {
        let install = AptInstall::new("git", None, None, None, false);
        let fallback = install.fallback().expect("primary has a fallback");
        // The fallback itself must not chain into further retries.
        assert!(fallback.fallback().is_none());
    }
}

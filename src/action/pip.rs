//! Pip package action with alternate-source fallback
//!
//! The pinned OpenCV build with ArUco support is the fragile dependency this
//! exists for: install from the primary index (piwheels), smoke-test the
//! import plus a representative ArUco call, and fall back to the next
//! configured source exactly once before the failure escalates.

use anyhow::Result;
use converge::{Action, BoxedAction, Severity};

use super::run_smoke_test;
use crate::probe::parse_pip_show;
use crate::runner::{self, PACKAGE_TIMEOUT, QUICK_TIMEOUT};

#[derive(Debug, Clone)]
pub struct PipInstall {
    pub name: String,
    pub version: Option<String>,
    /// Index URL or direct wheel URL for this attempt
    pub source: Option<String>,
    /// Remaining sources for fallback attempts
    remaining_sources: Vec<String>,
    pub import_name: Option<String>,
    pub smoke_test: Option<String>,
    pub optional: bool,
    /// Reinstall even when the version check passes (dependency manifest
    /// changed upstream)
    pub force: bool,
}

impl PipInstall {
    pub fn new(
        name: &str,
        version: Option<&str>,
        sources: &[String],
        import_name: Option<&str>,
        smoke_test: Option<&str>,
        optional: bool,
        force: bool,
    ) -> Self {
        let mut sources = sources.iter().cloned();
        Self {
            name: name.to_string(),
            version: version.map(String::from),
            source: sources.next(),
            remaining_sources: sources.collect(),
            import_name: import_name.map(String::from),
            smoke_test: smoke_test.map(String::from),
            optional,
            force,
        }
    }

    fn requirement(&self) -> String {
        match &self.version {
            Some(version) => format!("{}=={}", self.name, version),
            None => self.name.clone(),
        }
    }

    fn install_args(&self) -> Vec<String> {
        let mut args = vec!["install".to_string(), "--no-cache-dir".to_string()];
        if self.force {
            args.push("--force-reinstall".to_string());
        }
        match &self.source {
            // A wheel URL is installed directly; an index URL scopes the
            // resolver to the alternate source.
            Some(url) if url.ends_with(".whl") => args.push(url.clone()),
            Some(index) => {
                args.push("--index-url".to_string());
                args.push(index.clone());
                args.push(self.requirement());
            }
            None => args.push(self.requirement()),
        }
        args
    }
}

impl Action for PipInstall {
    fn id(&self) -> String {
        format!("pip:{}", self.name)
    }

    fn description(&self) -> String {
        let what = self.requirement();
        match &self.source {
            Some(source) => format!("install {what} from {source}"),
            None => format!("install {what}"),
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
        if self.force {
            return Ok(false);
        }
        let out = runner::run_with_timeout("pip3", &["show", &self.name], QUICK_TIMEOUT)?;
        if !out.success {
            return Ok(false);
        }
        let installed = parse_pip_show(&out.stdout);
        Ok(match (&self.version, installed) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(pin), Some(have)) => *pin == have,
        })
    }

    fn apply(&self) -> Result<()> {
        let args = self.install_args();
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        runner::run_with_timeout("pip3", &arg_refs, PACKAGE_TIMEOUT)?
            .require_success(&format!("pip3 install {}", self.requirement()))?;
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
        let (next, rest) = self.remaining_sources.split_first()?;
        Some(Box::new(Self {
            source: Some(next.clone()),
            remaining_sources: rest.to_vec(),
            // A fallback attempt replaces whatever the primary left behind
            force: true,
            ..self.clone()
        }))
    }
}

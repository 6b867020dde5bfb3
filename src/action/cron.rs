//! Idempotent crontab entries

use anyhow::Result;
use converge::{Action, Severity};

use crate::probe::{normalize_cron_line, parse_crontab};
use crate::runner::{self, QUICK_TIMEOUT};

/// Append a cron job unless a matching signature already exists.
///
/// The signature is the whitespace-normalized "schedule command" line, so
/// re-running the installer never duplicates the update job.
#[derive(Debug, Clone)]
pub struct InstallCronJob {
    pub schedule: String,
    pub command: String,
}

impl InstallCronJob {
    pub fn new(schedule: &str, command: &str) -> Self {
        Self {
            schedule: schedule.to_string(),
            command: command.to_string(),
        }
    }

    pub fn signature(&self) -> String {
        normalize_cron_line(&format!("{} {}", self.schedule, self.command))
    }

    fn current_table(&self) -> Result<String> {
        let out = runner::run_with_timeout("crontab", &["-l"], QUICK_TIMEOUT)?;
        if out.success {
            Ok(out.stdout)
        } else if out.stderr.contains("no crontab") {
            Ok(String::new())
        } else {
            anyhow::bail!("crontab -l failed: {}", out.stderr.trim())
        }
    }
}

impl Action for InstallCronJob {
    fn id(&self) -> String {
        format!("cron:{}", self.command)
    }

    fn description(&self) -> String {
        format!("schedule '{}' at '{}'", self.command, self.schedule)
    }

    fn kind(&self) -> &'static str {
        "install_cron_job"
    }

    fn severity(&self) -> Severity {
        // The device still captures without the update job; fleet tooling
        // flags the missing schedule through the health record.
        Severity::Recoverable
    }

    fn is_satisfied(&self) -> Result<bool> {
        let table = self.current_table()?;
        Ok(parse_crontab(&table).contains(&self.signature()))
    }

    fn apply(&self) -> Result<()> {
        let table = self.current_table()?;
        let updated = append_job(&table, &self.schedule, &self.command);
        runner::run_with_input("crontab", &["-"], &updated, QUICK_TIMEOUT)?
            .require_success("crontab install")?;
        Ok(())
    }

    fn verify(&self) -> Result<()> {
        if !self.is_satisfied()? {
            anyhow::bail!("cron job missing after install");
        }
        Ok(())
    }
}

/// Append a job line, preserving the existing table verbatim
pub fn append_job(table: &str, schedule: &str, command: &str) -> String {
    let mut updated = table.trim_end().to_string();
    if !updated.is_empty() {
        updated.push('\n');
    }
    updated.push_str(&format!("{schedule} {command}\n"));
    updated
}

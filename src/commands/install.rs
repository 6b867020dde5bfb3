//! `pifleet install` - full provisioning run for a fresh or re-imaged device

use anyhow::Result;
use converge::{RunLog, Verdict};

use crate::health::HealthRecord;
use crate::lock::RunLock;
use crate::logfile::FileLog;
use crate::manifest::Manifest;
use crate::{commands, privilege, ui};

pub fn run(manifest: &Manifest, dry_run: bool) -> Result<i32> {
    if dry_run {
        // Probing is read-only; a dry run works without root or the lock.
        let mut log = commands::ConsoleLog;
        let outcome = commands::run_convergence(manifest, &mut log, true)?;
        commands::print_summary(outcome.verdict, &outcome.summary);
        return Ok(0);
    }

    privilege::ensure_root()?;

    let Some(_lock) = RunLock::try_acquire(&manifest.paths.lock_file())? else {
        ui::warn("another run holds the lock, exiting");
        return Ok(0);
    };

    let mut log = FileLog::open(&manifest.paths.log_file())?;
    log.info(&format!("install run starting on {}", manifest.device.name));

    let outcome = commands::run_convergence(manifest, &mut log, false)?;

    let record = HealthRecord::new(
        &manifest.device.name,
        outcome.verdict,
        &outcome.summary,
        outcome.after.head_revision.known().cloned(),
        outcome.after.service_active.known().copied(),
    );
    if let Err(err) = record.write(&manifest.paths.health_file()) {
        log.warn(&format!("could not write health record: {err:#}"));
    }

    commands::print_summary(outcome.verdict, &outcome.summary);
    Ok(match outcome.verdict {
        Verdict::Success | Verdict::PartialFailure => 0,
        Verdict::Fatal => 1,
    })
}

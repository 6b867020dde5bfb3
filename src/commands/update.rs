//! `pifleet update` - the unattended cron entry point
//!
//! Exit code discipline matters here: cron mails nonzero exits, and a fleet
//! of devices behind flaky LTE links must not page anyone for a dropped
//! connection or an overlapping run. Only a fatal halt exits nonzero.

use anyhow::Result;
use converge::{RunLog, Verdict};

use crate::health::HealthRecord;
use crate::lock::RunLock;
use crate::logfile::FileLog;
use crate::manifest::Manifest;
use crate::{commands, net, privilege};

pub fn run(manifest: &Manifest) -> Result<i32> {
    privilege::ensure_root()?;

    let mut log = FileLog::open(&manifest.paths.log_file())?;

    let Some(_lock) = RunLock::try_acquire(&manifest.paths.lock_file())? else {
        log.info("another run holds the lock, exiting");
        return skip(manifest, &mut log, "lock held by another run");
    };

    if let Err(err) = net::check(&manifest.connectivity) {
        log.info(&format!("{err}, skipping this cycle"));
        return skip(manifest, &mut log, "no connectivity");
    }

    log.info(&format!("update run starting on {}", manifest.device.name));

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

    Ok(match outcome.verdict {
        Verdict::Success | Verdict::PartialFailure => 0,
        Verdict::Fatal => 1,
    })
}

/// A cycle that applies nothing still refreshes the health record, so fleet
/// tooling can tell a device skipping for a day from a healthy one.
fn skip(manifest: &Manifest, log: &mut FileLog, reason: &str) -> Result<i32> {
    let record = HealthRecord::skipped(&manifest.device.name, reason);
    if let Err(err) = record.write(&manifest.paths.health_file()) {
        log.warn(&format!("could not write health record: {err:#}"));
    }
    Ok(0)
}

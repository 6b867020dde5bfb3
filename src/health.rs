//! Per-run health record
//!
//! One JSON document, overwritten atomically after every run. Fleet tooling
//! polls these files over SSH (the same shape the devices used to push to a
//! telemetry channel), so field names are part of the external contract.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use converge::{RunSummary, Verdict};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Status code fleet dashboards key on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Converged, no failures
    Ok,
    /// Converged with recoverable failures left behind
    Degraded,
    /// Fatal failure, manual attention needed
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthRecord {
    pub device: String,
    pub timestamp: DateTime<Utc>,
    pub status: HealthStatus,
    pub verdict: String,
    /// HEAD of the source clone after the run, when known
    pub revision: Option<String>,
    pub service_active: Option<bool>,
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl HealthRecord {
    pub fn new(
        device: &str,
        verdict: Verdict,
        summary: &RunSummary,
        revision: Option<String>,
        service_active: Option<bool>,
    ) -> Self {
        Self {
            device: device.to_string(),
            timestamp: Utc::now(),
            status: status_for(verdict),
            verdict: verdict.as_str().to_string(),
            revision,
            service_active,
            applied: summary.applied,
            skipped: summary.skipped,
            failed: summary.failed,
        }
    }

    /// Record for a cycle that applied nothing (lock held, no connectivity).
    ///
    /// Without these, a device skipping every cycle for a day looks exactly
    /// like one that converged this morning. The timestamp keeps moving and
    /// the verdict names the reason.
    pub fn skipped(device: &str, reason: &str) -> Self {
        Self {
            device: device.to_string(),
            timestamp: Utc::now(),
            status: HealthStatus::Ok,
            verdict: format!("skipped: {reason}"),
            revision: None,
            service_active: None,
            applied: 0,
            skipped: 0,
            failed: 0,
        }
    }

    /// Write-then-rename so a poll mid-run never sees a torn record
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Could not create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("Could not write {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("Could not replace {}", path.display()))?;
        Ok(())
    }
}

fn status_for(verdict: Verdict) -> HealthStatus {
    match verdict {
        Verdict::Success => HealthStatus::Ok,
        Verdict::PartialFailure => HealthStatus::Degraded,
        Verdict::Fatal => HealthStatus::Error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn summary() -> RunSummary {
        RunSummary {
            applied: 2,
            skipped: 5,
            failed: 1,
        }
    }

    #[test]
    fn verdict_maps_to_status_code() {
        assert_eq!(status_for(Verdict::Success), HealthStatus::Ok);
        assert_eq!(status_for(Verdict::PartialFailure), HealthStatus::Degraded);
        assert_eq!(status_for(Verdict::Fatal), HealthStatus::Error);
    }

    #[test]
    fn record_round_trips_and_uses_lowercase_status() {
        let record = HealthRecord::new(
            "meter-07",
            Verdict::PartialFailure,
            &summary(),
            Some("abc123".to_string()),
            Some(true),
        );

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"status\":\"degraded\""));
        assert!(json.contains("\"verdict\":\"partial-failure\""));

        let parsed: HealthRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.device, "meter-07");
        assert_eq!(parsed.failed, 1);
    }

    #[test]
    fn skipped_cycle_still_produces_a_fresh_record() {
        let record = HealthRecord::skipped("meter-07", "no connectivity");
        assert_eq!(record.status, HealthStatus::Ok);
        assert_eq!(record.verdict, "skipped: no connectivity");
        assert_eq!(record.applied, 0);
        assert!(record.revision.is_none());

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
        assert!(json.contains("skipped: no connectivity"));
    }

    #[test]
    fn write_replaces_previous_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state/health.json");

        let first = HealthRecord::new("meter-07", Verdict::Fatal, &summary(), None, None);
        first.write(&path).unwrap();

        let second =
            HealthRecord::new("meter-07", Verdict::Success, &RunSummary::default(), None, None);
        second.write(&path).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let parsed: HealthRecord = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed.status, HealthStatus::Ok);
        assert!(!path.with_extension("json.tmp").exists());
    }
}

//! CLI command implementations

pub mod install;
pub mod plan;
pub mod status;
pub mod update;

use anyhow::Result;
use converge::{ExecuteOptions, RunLog, RunSummary, Verdict};

use crate::manifest::Manifest;
use crate::probe::{self, ObservedState};
use crate::runner::{self, QUICK_TIMEOUT};
use crate::{planner, ui};

/// Log sink for interactive runs that never touch the log file
pub struct ConsoleLog;

impl RunLog for ConsoleLog {
    fn info(&mut self, message: &str) {
        ui::info(message);
    }

    fn warn(&mut self, message: &str) {
        ui::warn(message);
    }

    fn error(&mut self, message: &str) {
        ui::error(message);
    }
}

/// Everything a caller needs after one probe-plan-execute cycle
pub struct Outcome {
    pub verdict: Verdict,
    pub summary: RunSummary,
    pub after: ObservedState,
}

/// One full convergence cycle: probe, plan, execute, re-probe, judge.
///
/// The verdict comes from evidence, not bookkeeping: after execution the
/// system is probed again and re-planned. An empty re-plan with no recorded
/// failures is Success; anything left over is PartialFailure even if every
/// action claimed to apply.
pub fn run_convergence(
    manifest: &Manifest,
    log: &mut dyn RunLog,
    dry_run: bool,
) -> Result<Outcome> {
    let observed = probe::probe(manifest);
    let plan = planner::build(manifest, &observed);

    if plan.is_empty() {
        log.info("already converged, nothing to do");
        return Ok(Outcome {
            verdict: Verdict::Success,
            summary: RunSummary::default(),
            after: observed,
        });
    }

    log.info(&format!(
        "plan: {} action(s): {}",
        plan.len(),
        plan.ids().join(", ")
    ));

    let report = converge::execute(&plan, &ExecuteOptions { dry_run }, log);
    let summary = RunSummary::from_results(&report.results);

    if dry_run {
        return Ok(Outcome {
            verdict: Verdict::Success,
            summary,
            after: observed,
        });
    }

    if let Some(reason) = &report.halted {
        log.error(reason);
        dump_diagnostics(log);
        return Ok(Outcome {
            verdict: Verdict::Fatal,
            summary,
            after: probe::probe(manifest),
        });
    }

    let after = probe::probe(manifest);
    let replan = planner::build(manifest, &after);
    let verdict = if replan.is_empty() && !report.has_failures() {
        Verdict::Success
    } else {
        if !replan.is_empty() {
            log.warn(&format!(
                "still divergent after run: {}",
                replan.ids().join(", ")
            ));
        }
        Verdict::PartialFailure
    };

    log.info(&format!(
        "run finished: {} ({} applied, {} skipped, {} failed)",
        verdict.as_str(),
        summary.applied,
        summary.skipped,
        summary.failed
    ));

    Ok(Outcome {
        verdict,
        summary,
        after,
    })
}

/// Snapshot of the environment for post-mortem after a fatal halt.
///
/// Field repair happens days later over a flaky link; capturing tool versions
/// and kernel identity now saves a round trip then.
fn dump_diagnostics(log: &mut dyn RunLog) {
    log.info("--- diagnostics ---");
    for (tool, args) in [
        ("uname", ["-a"].as_slice()),
        ("python3", ["--version"].as_slice()),
        ("pip3", ["--version"].as_slice()),
        ("git", ["--version"].as_slice()),
        ("apt-get", ["--version"].as_slice()),
    ] {
        match runner::run_with_timeout(tool, args, QUICK_TIMEOUT) {
            Ok(out) if out.success => {
                if let Some(line) = out.stdout.lines().next() {
                    log.info(&format!("{tool}: {line}"));
                }
            }
            Ok(out) => log.info(&format!("{tool}: unavailable ({})", out.stderr.trim())),
            Err(err) => log.info(&format!("{tool}: unavailable ({err:#})")),
        }
    }
    for var in ["PATH", "DEBIAN_FRONTEND"] {
        match std::env::var(var) {
            Ok(value) => log.info(&format!("env {var}={value}")),
            Err(_) => log.info(&format!("env {var} unset")),
        }
    }
    log.info("--- end diagnostics ---");
}

/// Console summary line shared by install and update
pub fn print_summary(verdict: Verdict, summary: &RunSummary) {
    let counts = format!(
        "{} applied, {} skipped, {} failed",
        summary.applied, summary.skipped, summary.failed
    );
    match verdict {
        Verdict::Success => ui::success(&format!("converged ({counts})")),
        Verdict::PartialFailure => ui::warn(&format!("partially converged ({counts})")),
        Verdict::Fatal => ui::error(&format!("halted on fatal failure ({counts})")),
    }
}

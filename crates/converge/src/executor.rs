//! Sequential plan executor with severity classification and bounded retry

use anyhow::Result;

use crate::action::Action;
use crate::plan::Plan;
use crate::types::{ActionStatus, ExecutionResult, Severity};

/// Sink for run-level log lines.
///
/// The engine stays UI-agnostic; the binary wires this to its append-only
/// log file and the console.
pub trait RunLog {
    fn info(&mut self, message: &str);
    fn warn(&mut self, message: &str);
    fn error(&mut self, message: &str);
}

/// A log sink that discards everything (tests, dry probing)
#[derive(Debug, Default)]
pub struct NullLog;

impl RunLog for NullLog {
    fn info(&mut self, _message: &str) {}
    fn warn(&mut self, _message: &str) {}
    fn error(&mut self, _message: &str) {}
}

/// Options for plan execution
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Record every pending action as Skipped without applying
    pub dry_run: bool,
}

/// Outcome of executing a plan
#[derive(Debug)]
pub struct ExecutionReport {
    /// One result per action, in plan order (actions after a fatal halt are
    /// not represented)
    pub results: Vec<ExecutionResult>,
    /// Set when a fatal failure halted the remaining plan
    pub halted: Option<String>,
}

impl ExecutionReport {
    pub fn has_failures(&self) -> bool {
        self.results.iter().any(|r| r.status.is_failure())
    }
}

/// Execute the plan strictly in order, one action at a time.
///
/// Side effects here (mirror edits, swap reconfiguration, package database
/// writes) are not safe to interleave, so there is deliberately no
/// parallelism. Per action:
/// 1. re-check the idempotency predicate; satisfied means Skipped;
/// 2. apply, then run the action's own verification;
/// 3. on failure, make exactly one fallback attempt if the action carries an
///    alternate source, then classify by severity: Fatal halts the remaining
///    plan, Recoverable is recorded and the plan continues.
pub fn execute(plan: &Plan, opts: &ExecuteOptions, log: &mut dyn RunLog) -> ExecutionReport {
    let mut results = Vec::with_capacity(plan.len());
    let mut halted = None;

    for action in plan.iter() {
        match action.is_satisfied() {
            Ok(true) => {
                log.info(&format!("{}: already satisfied, skipping", action.id()));
                results.push(result(action.as_ref(), ActionStatus::Skipped, 0));
                continue;
            }
            Ok(false) => {}
            Err(err) => {
                // Predicate failure is not a reason to abort; the apply path
                // re-establishes the state it needs.
                log.warn(&format!(
                    "{}: idempotency check failed ({err:#}), applying anyway",
                    action.id()
                ));
            }
        }

        if opts.dry_run {
            log.info(&format!("{}: would apply (dry run)", action.id()));
            results.push(result(
                action.as_ref(),
                ActionStatus::Skipped,
                0,
            ));
            continue;
        }

        log.info(&format!("{}: {}", action.id(), action.description()));

        let (status, attempts) = apply_with_fallback(action.as_ref(), log);
        let failed = status.is_failure();
        results.push(result(action.as_ref(), status, attempts));

        if failed && action.severity() == Severity::Fatal {
            let reason = format!("{} failed fatally, halting remaining plan", action.id());
            log.error(&reason);
            halted = Some(reason);
            break;
        }
    }

    ExecutionReport { results, halted }
}

/// Apply and verify one action, with at most one fallback attempt
fn apply_with_fallback(action: &dyn Action, log: &mut dyn RunLog) -> (ActionStatus, u32) {
    match attempt(action) {
        Ok(()) => {
            log.info(&format!("{}: applied", action.id()));
            return (ActionStatus::Applied, 1);
        }
        Err(primary_err) => {
            log.warn(&format!("{}: attempt failed: {primary_err:#}", action.id()));

            let Some(fallback) = action.fallback() else {
                return (
                    ActionStatus::Failed {
                        reason: format!("{primary_err:#}"),
                    },
                    1,
                );
            };

            log.info(&format!(
                "{}: retrying via fallback: {}",
                action.id(),
                fallback.description()
            ));

            match attempt(fallback.as_ref()) {
                Ok(()) => {
                    log.info(&format!("{}: applied via fallback", action.id()));
                    (ActionStatus::Applied, 2)
                }
                Err(fallback_err) => (
                    ActionStatus::Failed {
                        reason: format!(
                            "primary: {primary_err:#}; fallback: {fallback_err:#}"
                        ),
                    },
                    2,
                ),
            }
        }
    }
}

fn attempt(action: &dyn Action) -> Result<()> {
    action.apply()?;
    action.verify()
}

fn result(action: &dyn Action, status: ActionStatus, attempts: u32) -> ExecutionResult {
    ExecutionResult {
        action_id: action.id(),
        kind: action.kind().to_string(),
        status,
        attempts,
    }
}

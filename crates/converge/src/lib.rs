//! # Converge
//!
//! A small engine for idempotent system convergence.
//!
//! The loop is always the same, whether triggered by a one-time install or a
//! periodic update check:
//!
//! 1. **Probe** the live system into an observed snapshot (caller-owned;
//!    probe failures degrade single fields to [`Probed::Unknown`], never
//!    abort).
//! 2. **Plan**: a pure function of desired + observed state produces an
//!    ordered [`Plan`] of [`Action`]s, omitting anything already satisfied.
//! 3. **Execute** the plan strictly sequentially with per-action idempotency
//!    re-checks, severity classification, and at most one alternate-source
//!    fallback per action.
//! 4. Re-probe and compute a [`Verdict`] by diffing desired vs. observed.
//!
//! ## Example
//!
//! ```ignore
//! use converge::{Action, ExecuteOptions, NullLog, Plan, Severity, execute};
//!
//! #[derive(Debug)]
//! struct Touch { path: String }
//!
//! impl Action for Touch {
//!     fn id(&self) -> String { format!("file:{}", self.path) }
//!     fn description(&self) -> String { format!("create {}", self.path) }
//!     fn kind(&self) -> &'static str { "create_file" }
//!     fn is_satisfied(&self) -> anyhow::Result<bool> {
//!         Ok(std::path::Path::new(&self.path).exists())
//!     }
//!     fn apply(&self) -> anyhow::Result<()> {
//!         std::fs::write(&self.path, b"")?;
//!         Ok(())
//!     }
//! }
//!
//! let mut plan = Plan::new();
//! plan.push(Box::new(Touch { path: "/tmp/marker".into() }));
//! let report = execute(&plan, &ExecuteOptions::default(), &mut NullLog);
//! assert!(report.halted.is_none());
//! ```

pub mod action;
pub mod executor;
pub mod plan;
pub mod types;

// Re-export main types at crate root
pub use action::{Action, BoxedAction};
pub use executor::{ExecuteOptions, ExecutionReport, NullLog, RunLog, execute};
pub use plan::Plan;
pub use types::{ActionStatus, ExecutionResult, Probed, RunSummary, Severity, Verdict};

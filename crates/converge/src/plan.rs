//! Ordered execution plan

use crate::action::BoxedAction;

/// An ordered list of corrective actions.
///
/// Ordering is fixed by the planner at build time (mirror repair before
/// installs, purge before pinned replacement, packages before service,
/// service before cron); the plan itself preserves insertion order and is
/// executed strictly sequentially.
#[derive(Debug, Default)]
pub struct Plan {
    actions: Vec<BoxedAction>,
}

impl Plan {
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
        }
    }

    pub fn push(&mut self, action: BoxedAction) {
        self.actions.push(action);
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BoxedAction> {
        self.actions.iter()
    }

    /// Action ids in execution order (for logging and tests)
    pub fn ids(&self) -> Vec<String> {
        self.actions.iter().map(|a| a.id()).collect()
    }

    /// Action kinds in execution order
    pub fn kinds(&self) -> Vec<&'static str> {
        self.actions.iter().map(|a| a.kind()).collect()
    }

    /// Position of the first action with the given kind
    pub fn position_of_kind(&self, kind: &str) -> Option<usize> {
        self.actions.iter().position(|a| a.kind() == kind)
    }

    /// Position of the last action with the given kind
    pub fn last_position_of_kind(&self, kind: &str) -> Option<usize> {
        self.actions.iter().rposition(|a| a.kind() == kind)
    }
}

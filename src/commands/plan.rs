//! `pifleet plan` - print what a run would execute right now

use anyhow::Result;

use crate::manifest::Manifest;
use crate::probe;
use crate::{planner, ui};

pub fn run(manifest: &Manifest) -> Result<i32> {
    let observed = probe::probe(manifest);
    let plan = planner::build(manifest, &observed);

    if plan.is_empty() {
        ui::success("converged, nothing to do");
        return Ok(0);
    }

    ui::header(&format!("{} pending action(s)", plan.len()));
    for (idx, action) in plan.iter().enumerate() {
        ui::step(idx + 1, plan.len(), &action.description());
        ui::dim(&action.id());
    }

    Ok(0)
}

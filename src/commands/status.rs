//! `pifleet status` - desired vs observed, read-only

use anyhow::Result;
use colored::Colorize;
use converge::Probed;

use crate::manifest::Manifest;
use crate::probe::{self, ObservedState};
use crate::{planner, ui};

pub fn run(manifest: &Manifest) -> Result<i32> {
    let observed = probe::probe(manifest);

    ui::header(&format!("Device: {}", manifest.device.name));

    if manifest.repository.is_some() {
        ui::section("Repository");
        ui::kv("HEAD", &probed_str(&observed.head_revision));
        ui::kv("upstream", &probed_str(&observed.remote_revision));
        let state = if observed.repo_current() {
            "current".green().to_string()
        } else {
            "behind or unknown".yellow().to_string()
        };
        ui::kv("state", &state);
    }

    if !manifest.packages.is_empty() {
        ui::section("Packages");
        for pkg in &manifest.packages {
            let line = match observed.packages.get(&pkg.name) {
                Some(Probed::Known(Some(version))) if pkg.wants_version(Some(version.as_str())) => {
                    format!("{} ({version})", "ok".green())
                }
                Some(Probed::Known(Some(version))) => {
                    format!(
                        "{} (installed {version}, want {})",
                        "drift".yellow(),
                        pkg.version.as_deref().unwrap_or("any")
                    )
                }
                Some(Probed::Known(None)) => "absent".red().to_string(),
                _ => "unknown".dimmed().to_string(),
            };
            ui::kv(&pkg.name, &line);
        }
    }

    if let Some(service) = &manifest.service {
        ui::section("Service");
        ui::kv(&service.name, &service_line(&observed));
    }

    if let Some(swap) = &manifest.swap {
        ui::section("Swap");
        let line = match observed.swap_total_mb.known() {
            Some(mb) if *mb >= swap.min_mb => format!("{} ({mb} MB)", "ok".green()),
            Some(mb) => format!("{} ({mb} MB, want {} MB)", "low".yellow(), swap.min_mb),
            None => "unknown".dimmed().to_string(),
        };
        ui::kv("total", &line);
    }

    let plan = planner::build(manifest, &observed);
    println!();
    if plan.is_empty() {
        ui::success("converged, a run would change nothing");
    } else {
        ui::warn(&format!(
            "{} pending action(s), run 'pifleet plan' for details",
            plan.len()
        ));
    }

    Ok(0)
}

fn service_line(observed: &ObservedState) -> String {
    let enabled = probed_flag(&observed.service_enabled, "enabled", "disabled");
    let active = probed_flag(&observed.service_active, "active", "inactive");
    format!("{enabled}, {active}")
}

fn probed_flag(value: &Probed<bool>, yes: &str, no: &str) -> String {
    match value.known() {
        Some(true) => yes.green().to_string(),
        Some(false) => no.red().to_string(),
        None => "unknown".dimmed().to_string(),
    }
}

fn probed_str(value: &Probed<String>) -> String {
    match value.known() {
        Some(v) => v.clone(),
        None => "unknown".dimmed().to_string(),
    }
}

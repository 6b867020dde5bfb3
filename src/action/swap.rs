//! Swap expansion for low-memory devices
//!
//! A Pi Zero cannot compile the pinned native wheels on 512 MB of RAM; swap
//! is expanded before any compilation-dependent install runs.

use anyhow::{Context, Result};
use converge::{Action, Severity};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::probe::parse_meminfo_swap_mb;
use crate::runner;

/// dphys-swapfile re-creation can take a while on SD storage
const SWAP_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
pub struct ExpandSwap {
    pub min_mb: u64,
    pub config_path: PathBuf,
}

impl ExpandSwap {
    pub fn new(min_mb: u64, config_path: PathBuf) -> Self {
        Self {
            min_mb,
            config_path,
        }
    }

    fn current_swap_mb(&self) -> Result<u64> {
        let meminfo =
            fs::read_to_string("/proc/meminfo").context("Could not read /proc/meminfo")?;
        parse_meminfo_swap_mb(&meminfo).context("SwapTotal missing from /proc/meminfo")
    }
}

impl Action for ExpandSwap {
    fn id(&self) -> String {
        format!("swap:{}mb", self.min_mb)
    }

    fn description(&self) -> String {
        format!("expand swap to at least {} MB", self.min_mb)
    }

    fn kind(&self) -> &'static str {
        "expand_swap"
    }

    fn severity(&self) -> Severity {
        // Builds may still succeed on devices with more RAM; a failed
        // expansion surfaces later through the install's own verification.
        Severity::Recoverable
    }

    fn is_satisfied(&self) -> Result<bool> {
        Ok(self.current_swap_mb()? >= self.min_mb)
    }

    fn apply(&self) -> Result<()> {
        let content = fs::read_to_string(&self.config_path)
            .with_context(|| format!("Could not read {}", self.config_path.display()))?;
        fs::write(&self.config_path, rewrite_swap_size(&content, self.min_mb))
            .with_context(|| format!("Could not write {}", self.config_path.display()))?;

        // Swap must be off while dphys-swapfile re-creates the file.
        let _ = runner::run_with_timeout("dphys-swapfile", &["swapoff"], SWAP_TIMEOUT);
        runner::run_with_timeout("dphys-swapfile", &["setup"], SWAP_TIMEOUT)?
            .require_success("dphys-swapfile setup")?;
        runner::run_with_timeout("dphys-swapfile", &["swapon"], SWAP_TIMEOUT)?
            .require_success("dphys-swapfile swapon")?;
        Ok(())
    }

    fn verify(&self) -> Result<()> {
        let current = self.current_swap_mb()?;
        if current < self.min_mb {
            anyhow::bail!(
                "swap is {current} MB after expansion, expected at least {} MB",
                self.min_mb
            );
        }
        Ok(())
    }
}

/// Set CONF_SWAPSIZE, replacing an existing assignment or appending one
pub fn rewrite_swap_size(content: &str, min_mb: u64) -> String {
    let assignment = format!("CONF_SWAPSIZE={min_mb}");
    let mut replaced = false;
    let mut lines: Vec<String> = content
        .lines()
        .map(|line| {
            let trimmed = line.trim_start();
            if trimmed.starts_with("CONF_SWAPSIZE=") && !replaced {
                replaced = true;
                assignment.clone()
            } else {
                line.to_string()
            }
        })
        .collect();
    if !replaced {
        lines.push(assignment);
    }
    lines.join("\n") + "\n"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_existing_assignment() {
        let config = "# swap config\nCONF_SWAPSIZE=100\nCONF_MAXSWAP=2048\n";
        let rewritten = rewrite_swap_size(config, 1024);
        assert!(rewritten.contains("CONF_SWAPSIZE=1024"));
        assert!(!rewritten.contains("CONF_SWAPSIZE=100"));
        assert!(rewritten.contains("CONF_MAXSWAP=2048"));
    }

    #[test]
    fn appends_when_missing() {
        let rewritten = rewrite_swap_size("# empty\n", 1024);
        assert!(rewritten.ends_with("CONF_SWAPSIZE=1024\n"));
    }
}

//! Thin git client for the device's source clone

use anyhow::Result;
use std::path::Path;

use crate::runner::{self, CommandOutput, NETWORK_TIMEOUT, QUICK_TIMEOUT};

fn git(repo: &Path, args: &[&str]) -> Result<CommandOutput> {
    let repo_str = repo.to_string_lossy();
    let mut full: Vec<&str> = vec!["-C", repo_str.as_ref()];
    full.extend_from_slice(args);
    let timeout = match args.first() {
        Some(&"fetch" | &"pull") => NETWORK_TIMEOUT,
        _ => QUICK_TIMEOUT,
    };
    runner::run_with_timeout("git", &full, timeout)
}

/// Commit id of HEAD
pub fn current_revision(repo: &Path) -> Result<String> {
    let out = git(repo, &["rev-parse", "HEAD"])?.require_success("git rev-parse HEAD")?;
    Ok(out.stdout.trim().to_string())
}

/// Fetch the tracked branch; FETCH_HEAD then points at upstream
pub fn fetch(repo: &Path, remote: &str, branch: &str) -> Result<()> {
    git(repo, &["fetch", "--quiet", remote, branch])?.require_success("git fetch")?;
    Ok(())
}

/// Commit id of FETCH_HEAD after a fetch
pub fn fetched_revision(repo: &Path) -> Result<String> {
    let out =
        git(repo, &["rev-parse", "FETCH_HEAD"])?.require_success("git rev-parse FETCH_HEAD")?;
    Ok(out.stdout.trim().to_string())
}

/// Files that differ between two revisions
pub fn changed_files(repo: &Path, from: &str, to: &str) -> Result<Vec<String>> {
    let out = git(repo, &["diff", "--name-only", from, to])?.require_success("git diff")?;
    Ok(out
        .stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

/// Mark a device-local file so pulls never touch it.
///
/// Untracked entries make update-index fail; that is fine, the file cannot
/// be overwritten by a pull anyway.
pub fn assume_unchanged(repo: &Path, file: &str) -> bool {
    git(repo, &["update-index", "--assume-unchanged", file])
        .map(|out| out.success)
        .unwrap_or(false)
}

/// Fast-forward pull of the tracked branch
pub fn pull_ff(repo: &Path, remote: &str, branch: &str) -> Result<()> {
    git(repo, &["pull", "--ff-only", remote, branch])?.require_success("git pull")?;
    Ok(())
}

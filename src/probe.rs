//! StateProbe - snapshot of the live system
//!
//! Rebuilt fresh on every run, never cached across runs, and strictly
//! read-only. A single failed check degrades that one field to
//! [`Probed::Unknown`]; the probe as a whole never fails. All command output
//! parsing lives in pure functions so it can be tested without the tools.

use converge::Probed;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::git;
use crate::manifest::{Manifest, PackageKind, PackageSection};
use crate::runner::{self, QUICK_TIMEOUT};

/// Snapshot of everything the planner compares against the manifest
#[derive(Debug, Clone)]
pub struct ObservedState {
    /// Installed version per desired package (`None` = absent)
    pub packages: BTreeMap<String, Probed<Option<String>>>,
    /// Whether each purge target is still installed
    pub conflicts: BTreeMap<String, Probed<bool>>,
    /// Existence per desired artifact path
    pub artifacts: BTreeMap<String, bool>,
    /// Content digest of the installed unit file (`None` = not installed)
    pub unit_digest: Probed<Option<String>>,
    /// Content digest of the unit file shipped in the repo
    pub desired_unit_digest: Probed<String>,
    pub service_enabled: Probed<bool>,
    pub service_active: Probed<bool>,
    /// Normalized signatures of existing cron jobs
    pub cron_signatures: Probed<BTreeSet<String>>,
    pub head_revision: Probed<String>,
    pub remote_revision: Probed<String>,
    /// Files that differ between HEAD and the fetched upstream
    pub upstream_delta: Probed<Vec<String>>,
    pub swap_total_mb: Probed<u64>,
    /// True when sources.list still points at the dead mirror
    pub sources_list_stale: Probed<bool>,
}

impl ObservedState {
    pub(crate) fn empty() -> Self {
        Self {
            packages: BTreeMap::new(),
            conflicts: BTreeMap::new(),
            artifacts: BTreeMap::new(),
            unit_digest: Probed::Unknown,
            desired_unit_digest: Probed::Unknown,
            service_enabled: Probed::Unknown,
            service_active: Probed::Unknown,
            cron_signatures: Probed::Unknown,
            head_revision: Probed::Unknown,
            remote_revision: Probed::Unknown,
            upstream_delta: Probed::Unknown,
            swap_total_mb: Probed::Unknown,
            sources_list_stale: Probed::Unknown,
        }
    }

    /// True when HEAD is known to match upstream
    pub fn repo_current(&self) -> bool {
        match (self.head_revision.known(), self.remote_revision.known()) {
            (Some(head), Some(remote)) => head == remote,
            _ => false,
        }
    }
}

/// Inspect the live system against the manifest. Never mutates anything.
pub fn probe(manifest: &Manifest) -> ObservedState {
    let mut observed = ObservedState::empty();

    for pkg in &manifest.packages {
        observed
            .packages
            .insert(pkg.name.clone(), probe_package(pkg));
        for conflict in &pkg.purge_first {
            let installed = probe_apt_version(conflict);
            observed.conflicts.insert(
                conflict.clone(),
                match installed {
                    Probed::Known(v) => Probed::Known(v.is_some()),
                    Probed::Unknown => Probed::Unknown,
                },
            );
        }
    }

    for artifact in &manifest.artifacts {
        observed
            .artifacts
            .insert(artifact.path.clone(), artifact.path().exists());
    }

    if let Some(service) = &manifest.service {
        observed.unit_digest = probe_file_digest(&service.unit_install_path());
        observed.desired_unit_digest =
            match probe_file_digest(&service.unit_source_path(manifest.repository.as_ref())) {
                Probed::Known(Some(digest)) => Probed::Known(digest),
                // Missing unit source is surfaced later as a fatal install
                // failure; the probe only records what it sees.
                _ => Probed::Unknown,
            };
        observed.service_enabled = probe_systemctl(&service.name, "is-enabled");
        observed.service_active = probe_systemctl(&service.name, "is-active");
    }

    if !manifest.cron_jobs.is_empty() {
        observed.cron_signatures = probe_crontab();
    }

    if let Some(repo) = &manifest.repository {
        let path = repo.path();
        observed.head_revision = git::current_revision(&path).ok().into();
        if git::fetch(&path, &repo.remote, &repo.branch).is_ok() {
            observed.remote_revision = git::fetched_revision(&path).ok().into();
        }
        if let (Some(head), Some(remote)) = (
            observed.head_revision.known().cloned(),
            observed.remote_revision.known().cloned(),
        ) {
            observed.upstream_delta = if head == remote {
                Probed::Known(Vec::new())
            } else {
                git::changed_files(&path, &head, &remote).ok().into()
            };
        }
    }

    if manifest.swap.is_some() {
        observed.swap_total_mb = probe_swap_total_mb();
    }

    if let Some(mirror) = &manifest.mirror {
        observed.sources_list_stale =
            match fs::read_to_string(crate::manifest::expand_path(&mirror.sources_list)) {
                Ok(content) => Probed::Known(sources_mention_host(&content, &mirror.dead_host)),
                Err(_) => Probed::Unknown,
            };
    }

    observed
}

fn probe_package(pkg: &PackageSection) -> Probed<Option<String>> {
    match pkg.kind {
        PackageKind::Apt => probe_apt_version(&pkg.name),
        PackageKind::Pip => probe_pip_version(&pkg.name),
    }
}

fn probe_apt_version(name: &str) -> Probed<Option<String>> {
    let args = ["-W", "-f=${db:Status-Status} ${Version}", name];
    match runner::run_with_timeout("dpkg-query", &args, QUICK_TIMEOUT) {
        // dpkg-query exits non-zero for packages it has never heard of
        Ok(out) if out.success => Probed::Known(parse_dpkg_status(&out.stdout)),
        Ok(_) => Probed::Known(None),
        Err(_) => Probed::Unknown,
    }
}

fn probe_pip_version(name: &str) -> Probed<Option<String>> {
    match runner::run_with_timeout("pip3", &["show", name], QUICK_TIMEOUT) {
        Ok(out) if out.success => Probed::Known(parse_pip_show(&out.stdout)),
        Ok(_) => Probed::Known(None),
        Err(_) => Probed::Unknown,
    }
}

fn probe_systemctl(service: &str, verb: &str) -> Probed<bool> {
    match runner::run_with_timeout("systemctl", &[verb, service], QUICK_TIMEOUT) {
        // is-active / is-enabled report their answer through the exit status
        Ok(out) => Probed::Known(out.success),
        Err(_) => Probed::Unknown,
    }
}

fn probe_crontab() -> Probed<BTreeSet<String>> {
    match runner::run_with_timeout("crontab", &["-l"], QUICK_TIMEOUT) {
        Ok(out) if out.success => Probed::Known(parse_crontab(&out.stdout)),
        // "no crontab for <user>" - an empty table, not a failure
        Ok(out) if out.stderr.contains("no crontab") => Probed::Known(BTreeSet::new()),
        Ok(_) => Probed::Unknown,
        Err(_) => Probed::Unknown,
    }
}

fn probe_file_digest(path: &Path) -> Probed<Option<String>> {
    match fs::read(path) {
        Ok(bytes) => Probed::Known(Some(blake3::hash(&bytes).to_hex().to_string())),
        Err(err) if err.kind() == ErrorKind::NotFound => Probed::Known(None),
        Err(_) => Probed::Unknown,
    }
}

fn probe_swap_total_mb() -> Probed<u64> {
    match fs::read_to_string("/proc/meminfo") {
        Ok(content) => parse_meminfo_swap_mb(&content).into(),
        Err(_) => Probed::Unknown,
    }
}

// ============================================================================
// Pure parsers
// ============================================================================

/// Parse `dpkg-query -W -f='${db:Status-Status} ${Version}'` output
pub fn parse_dpkg_status(output: &str) -> Option<String> {
    let line = output.trim();
    let (status, version) = line.split_once(' ')?;
    if status == "installed" && !version.is_empty() {
        Some(version.to_string())
    } else {
        None
    }
}

/// Parse `pip3 show <name>` output
pub fn parse_pip_show(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.strip_prefix("Version:"))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Normalized signatures of all job lines in a crontab dump
pub fn parse_crontab(output: &str) -> BTreeSet<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(normalize_cron_line)
        .collect()
}

/// Collapse whitespace so formatting differences never duplicate a job
pub fn normalize_cron_line(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// SwapTotal from /proc/meminfo, in megabytes
pub fn parse_meminfo_swap_mb(content: &str) -> Option<u64> {
    let line = content.lines().find(|l| l.starts_with("SwapTotal:"))?;
    let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb / 1024)
}

/// True when any active deb line references the host
pub fn sources_mention_host(content: &str, host: &str) -> bool {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#'))
        .any(|line| line.contains(host))
}

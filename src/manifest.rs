//! Fleet manifest - the declarative desired state
//!
//! Loaded once per run and never mutated by it. The manifest is the single
//! source of truth for what a device should look like: packages (with pins,
//! alternate sources and smoke tests), the capture service unit, cron jobs,
//! swap sizing, mirror repair, and the device-local files a pull must never
//! overwrite.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default manifest location on a provisioned device
pub const DEFAULT_MANIFEST_PATH: &str = "/etc/pifleet/fleet.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub device: DeviceSection,

    /// The source clone the devices run from
    pub repository: Option<RepositorySection>,

    #[serde(default, rename = "package")]
    pub packages: Vec<PackageSection>,

    pub service: Option<ServiceSection>,

    #[serde(default, rename = "cron_job")]
    pub cron_jobs: Vec<CronJobSection>,

    #[serde(default, rename = "artifact")]
    pub artifacts: Vec<ArtifactSection>,

    pub swap: Option<SwapSection>,

    pub mirror: Option<MirrorSection>,

    #[serde(default)]
    pub connectivity: ConnectivitySection,

    #[serde(default)]
    pub paths: PathsSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSection {
    /// Device name reported in the health record
    #[serde(default = "default_device_name")]
    pub name: String,
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            name: default_device_name(),
        }
    }
}

fn default_device_name() -> String {
    "unknown-device".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositorySection {
    /// Path of the clone on the device
    pub path: String,

    #[serde(default = "default_remote")]
    pub remote: String,

    #[serde(default = "default_branch")]
    pub branch: String,

    /// Files whose upstream change forces a dependency reinstall
    #[serde(default)]
    pub dependency_manifests: Vec<String>,

    /// Device-local files never overwritten by a pull (device id config,
    /// calibration variables). Tracked in the tree, excluded on the device.
    #[serde(default)]
    pub exclude: Vec<String>,
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

impl RepositorySection {
    pub fn path(&self) -> PathBuf {
        expand_path(&self.path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    Apt,
    Pip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageSection {
    pub name: String,
    pub kind: PackageKind,

    /// Exact version pin; absent means "any installed version satisfies"
    #[serde(default)]
    pub version: Option<String>,

    /// Ordered install sources: first is primary, the next is the single
    /// bounded fallback (index URL or direct wheel URL for pip)
    #[serde(default)]
    pub sources: Vec<String>,

    /// Import name when it differs from the package name (declarative
    /// mapping, not runtime text parsing)
    #[serde(default)]
    pub import_name: Option<String>,

    /// Python snippet exercising the dependency after install; presence
    /// alone is never trusted for pinned native builds
    #[serde(default)]
    pub smoke_test: Option<String>,

    /// Conflicting packages purged before installing the pin, so a stale
    /// binary can never silently satisfy the version check
    #[serde(default)]
    pub purge_first: Vec<String>,

    /// Failure of an optional package is recoverable (e.g. a camera library
    /// unavailable on this OS release)
    #[serde(default)]
    pub optional: bool,

    /// Install may compile native code; swap must be expanded first
    #[serde(default)]
    pub needs_build: bool,
}

impl PackageSection {
    /// True when the installed version satisfies the pin
    pub fn wants_version(&self, installed: Option<&str>) -> bool {
        match (&self.version, installed) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(pin), Some(have)) => pin == have,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSection {
    /// Unit name without the `.service` suffix
    pub name: String,

    /// Unit file source, relative to the repository clone
    pub unit_source: String,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl ServiceSection {
    pub fn unit_name(&self) -> String {
        format!("{}.service", self.name)
    }

    pub fn unit_install_path(&self) -> PathBuf {
        PathBuf::from("/etc/systemd/system").join(self.unit_name())
    }

    /// Unit source resolved against the repository clone
    pub fn unit_source_path(&self, repo: Option<&RepositorySection>) -> PathBuf {
        let source = expand_path(&self.unit_source);
        if source.is_absolute() {
            return source;
        }
        match repo {
            Some(r) => r.path().join(source),
            None => source,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronJobSection {
    /// Five-field cron schedule (e.g. "*/30 * * * *")
    pub schedule: String,
    pub command: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactSection {
    pub path: String,
    /// Written only when the file is absent
    #[serde(default)]
    pub contents: Option<String>,
}

impl ArtifactSection {
    pub fn path(&self) -> PathBuf {
        expand_path(&self.path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapSection {
    pub min_mb: u64,

    #[serde(default = "default_swap_config")]
    pub config_path: String,
}

fn default_swap_config() -> String {
    "/etc/dphys-swapfile".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorSection {
    #[serde(default = "default_sources_list")]
    pub sources_list: String,

    /// Host known to be dead for this OS release
    pub dead_host: String,

    /// Replacement archive host
    pub replacement_host: String,
}

fn default_sources_list() -> String {
    "/etc/apt/sources.list".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivitySection {
    #[serde(default = "default_probe_url")]
    pub probe_url: String,

    #[serde(default = "default_connectivity_timeout")]
    pub timeout_secs: u64,
}

impl Default for ConnectivitySection {
    fn default() -> Self {
        Self {
            probe_url: default_probe_url(),
            timeout_secs: default_connectivity_timeout(),
        }
    }
}

fn default_probe_url() -> String {
    "https://github.com".to_string()
}

fn default_connectivity_timeout() -> u64 {
    15
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsSection {
    #[serde(default = "default_log_file")]
    pub log_file: String,

    #[serde(default = "default_health_file")]
    pub health_file: String,

    #[serde(default = "default_lock_file")]
    pub lock_file: String,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            log_file: default_log_file(),
            health_file: default_health_file(),
            lock_file: default_lock_file(),
        }
    }
}

fn default_log_file() -> String {
    "/var/log/pifleet/run.log".to_string()
}

fn default_health_file() -> String {
    "/var/lib/pifleet/health.json".to_string()
}

fn default_lock_file() -> String {
    "/run/lock/pifleet.lock".to_string()
}

impl PathsSection {
    pub fn log_file(&self) -> PathBuf {
        expand_path(&self.log_file)
    }

    pub fn health_file(&self) -> PathBuf {
        expand_path(&self.health_file)
    }

    pub fn lock_file(&self) -> PathBuf {
        expand_path(&self.lock_file)
    }
}

impl Manifest {
    /// Load and validate a manifest
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read manifest {}", path.display()))?;
        let manifest: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid manifest format in {}", path.display()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let manifest: Self = toml::from_str(content).context("Invalid manifest format")?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Validate the whole manifest, collecting every problem before failing
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        let mut seen = std::collections::HashSet::new();
        for pkg in &self.packages {
            if pkg.name.trim().is_empty() {
                errors.push("package name must not be empty".to_string());
            }
            if !seen.insert((&pkg.name, pkg.kind)) {
                errors.push(format!("duplicate package entry: {}", pkg.name));
            }
        }

        for job in &self.cron_jobs {
            let fields = job.schedule.split_whitespace().count();
            if fields != 5 {
                errors.push(format!(
                    "cron schedule '{}' must have 5 fields, has {fields}",
                    job.schedule
                ));
            }
            if job.command.trim().is_empty() {
                errors.push("cron command must not be empty".to_string());
            }
        }

        if let Some(service) = &self.service {
            if service.name.trim().is_empty() {
                errors.push("service name must not be empty".to_string());
            }
            if service.unit_source.trim().is_empty() {
                errors.push("service unit_source must not be empty".to_string());
            }
        }

        if let Some(swap) = &self.swap {
            if swap.min_mb == 0 {
                errors.push("swap min_mb must be positive".to_string());
            }
        }

        if let Some(mirror) = &self.mirror {
            if mirror.dead_host.trim().is_empty() || mirror.replacement_host.trim().is_empty() {
                errors.push("mirror dead_host and replacement_host must not be empty".to_string());
            }
        }

        if let Some(repo) = &self.repository {
            if repo.path.trim().is_empty() {
                errors.push("repository path must not be empty".to_string());
            }
        }

        if self.connectivity.timeout_secs == 0 {
            errors.push("connectivity timeout_secs must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("Manifest validation failed:\n  - {}", errors.join("\n  - "))
        }
    }
}

/// Expand `~` in a configured path
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const EXAMPLE: &str = r#"
        [device]
        name = "meter-07"

        [repository]
        path = "/home/pi/capture"
        remote = "origin"
        branch = "main"
        dependency_manifests = ["requirements.txt"]
        exclude = ["config_WM.py", "Variable.txt"]

        [[package]]
        name = "python3-pip"
        kind = "apt"

        [[package]]
        name = "opencv-contrib-python"
        kind = "pip"
        version = "4.5.1.48"
        sources = [
            "https://www.piwheels.org/simple",
            "https://pypi.org/simple",
        ]
        import_name = "cv2"
        smoke_test = "import cv2; cv2.aruco.Dictionary_get(cv2.aruco.DICT_4X4_50)"
        purge_first = ["python3-opencv"]
        needs_build = true

        [[package]]
        name = "python3-picamera"
        kind = "apt"
        optional = true

        [service]
        name = "pifleet-capture"
        unit_source = "deploy/pifleet-capture.service"

        [[cron_job]]
        schedule = "*/30 * * * *"
        command = "/usr/local/bin/pifleet update"

        [[artifact]]
        path = "/home/pi/capture/error.log"

        [swap]
        min_mb = 1024

        [mirror]
        dead_host = "mirrordirector.raspbian.org"
        replacement_host = "legacy.raspbian.org"
    "#;

    #[test]
    fn parses_full_manifest() {
        let m = Manifest::parse(EXAMPLE).unwrap();
        assert_eq!(m.device.name, "meter-07");
        assert_eq!(m.packages.len(), 3);
        let repo = m.repository.as_ref().unwrap();
        assert_eq!(repo.exclude, vec!["config_WM.py", "Variable.txt"]);
        let opencv = &m.packages[1];
        assert_eq!(opencv.kind, PackageKind::Pip);
        assert_eq!(opencv.sources.len(), 2);
        assert!(opencv.needs_build);
        assert_eq!(m.cron_jobs[0].schedule, "*/30 * * * *");
    }

    #[test]
    fn defaults_fill_missing_sections() {
        let m = Manifest::parse("").unwrap();
        assert_eq!(m.device.name, "unknown-device");
        assert!(m.packages.is_empty());
        assert_eq!(m.paths.log_file, "/var/log/pifleet/run.log");
        assert_eq!(m.connectivity.timeout_secs, 15);
    }

    #[test]
    fn rejects_malformed_cron_schedule() {
        let err = Manifest::parse(
            r#"
            [[cron_job]]
            schedule = "*/30 * *"
            command = "echo hi"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("5 fields"));
    }

    #[test]
    fn rejects_duplicate_packages() {
        let err = Manifest::parse(
            r#"
            [[package]]
            name = "git"
            kind = "apt"

            [[package]]
            name = "git"
            kind = "apt"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn collects_all_validation_errors_at_once() {
        let err = Manifest::parse(
            r#"
            [swap]
            min_mb = 0

            [[cron_job]]
            schedule = "bad"
            command = ""
            "#,
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("min_mb"));
        assert!(msg.contains("5 fields"));
        assert!(msg.contains("cron command"));
    }

    #[test]
    fn version_pin_matching() {
        let pinned = PackageSection {
            name: "opencv-contrib-python".into(),
            kind: PackageKind::Pip,
            version: Some("4.5.1.48".into()),
            sources: vec![],
            import_name: None,
            smoke_test: None,
            purge_first: vec![],
            optional: false,
            needs_build: false,
        };
        assert!(pinned.wants_version(Some("4.5.1.48")));
        assert!(!pinned.wants_version(Some("4.6.0.66")));
        assert!(!pinned.wants_version(None));

        let unpinned = PackageSection {
            version: None,
            ..pinned
        };
        assert!(unpinned.wants_version(Some("anything")));
        assert!(!unpinned.wants_version(None));
    }

    #[test]
    fn unit_source_resolves_against_repo() {
        let m = Manifest::parse(EXAMPLE).unwrap();
        let svc = m.service.as_ref().unwrap();
        assert_eq!(
            svc.unit_source_path(m.repository.as_ref()),
            PathBuf::from("/home/pi/capture/deploy/pifleet-capture.service")
        );
        assert_eq!(
            svc.unit_install_path(),
            PathBuf::from("/etc/systemd/system/pifleet-capture.service")
        );
    }
}

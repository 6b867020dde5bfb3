//! PlanBuilder - pure diff of desired vs observed state
//!
//! `build` is a deterministic function of its inputs with no I/O. Ordering is
//! fixed by construction, not by sorting:
//!
//! 1. mirror repair (broken mirrors block everything downstream)
//! 2. swap expansion, emitted only when a pending install compiles native
//!    code on-device
//! 3. repository pull (a changed dependency manifest must be seen by the
//!    installs that follow)
//! 4. per package: purge of conflicting libraries, then the pinned install
//! 5. filesystem artifacts
//! 6. service install, then restart
//! 7. cron jobs last (they restart the service; it must exist first)
//!
//! Within a phase, manifest declaration order is preserved. An item the
//! observation already satisfies produces no action at all - the plan stays
//! minimal for logging and audit. Unknown observations yield the conservative
//! corrective action; its own idempotency predicate re-checks at execution
//! time and skips if the system turns out to be fine.

use converge::{Plan, Probed};

use crate::action::{
    AptInstall, AptRemove, CreateFile, ExpandSwap, InstallCronJob, InstallService, PipInstall,
    PullRepository, ReplaceMirror, RestartService,
};
use crate::manifest::{Manifest, PackageKind, PackageSection};
use crate::probe::ObservedState;

pub fn build(manifest: &Manifest, observed: &ObservedState) -> Plan {
    let mut plan = Plan::new();

    // A pull that touches a dependency manifest invalidates every pinned
    // pip install, even ones whose version check still passes.
    let force_reinstall = manifest.repository.as_ref().is_some_and(|repo| {
        observed.upstream_delta.satisfies(|delta| {
            delta
                .iter()
                .any(|file| repo.dependency_manifests.iter().any(|m| m == file))
        })
    });

    let pending_install = |pkg: &PackageSection| {
        let satisfied = observed
            .packages
            .get(&pkg.name)
            .is_some_and(|state| state.satisfies(|installed| pkg.wants_version(installed.as_deref())));
        !satisfied || (force_reinstall && pkg.kind == PackageKind::Pip)
    };

    if let Some(mirror) = &manifest.mirror {
        let stale = !observed.sources_list_stale.satisfies(|stale| !stale);
        if stale {
            plan.push(Box::new(ReplaceMirror::new(
                crate::manifest::expand_path(&mirror.sources_list),
                &mirror.dead_host,
                &mirror.replacement_host,
            )));
        }
    }

    if let Some(swap) = &manifest.swap {
        let sufficient = observed.swap_total_mb.satisfies(|mb| *mb >= swap.min_mb);
        // Swap only matters to installs that compile on-device; a converged
        // package set never warrants rewriting dphys-swapfile.
        let build_ahead = manifest
            .packages
            .iter()
            .any(|pkg| pkg.needs_build && pending_install(pkg));
        if !sufficient && build_ahead {
            plan.push(Box::new(ExpandSwap::new(
                swap.min_mb,
                crate::manifest::expand_path(&swap.config_path),
            )));
        }
    }

    let mut pulled = false;
    if let Some(repo) = &manifest.repository {
        if !observed.repo_current() {
            plan.push(Box::new(PullRepository::new(
                repo.path(),
                &repo.remote,
                &repo.branch,
                &repo.exclude,
            )));
            pulled = true;
        }
    }

    for pkg in &manifest.packages {
        for conflict in &pkg.purge_first {
            let absent = observed
                .conflicts
                .get(conflict)
                .is_some_and(|state| state.satisfies(|installed| !installed));
            if !absent {
                plan.push(Box::new(AptRemove::new(conflict)));
            }
        }

        if pending_install(pkg) {
            plan.push(install_action(
                pkg,
                force_reinstall && pkg.kind == PackageKind::Pip,
            ));
        }
    }

    for artifact in &manifest.artifacts {
        let exists = observed.artifacts.get(&artifact.path).copied().unwrap_or(false);
        if !exists {
            plan.push(Box::new(CreateFile::new(
                artifact.path(),
                artifact.contents.clone(),
            )));
        }
    }

    if let Some(service) = &manifest.service {
        let unit_ok = match (
            observed.unit_digest.known(),
            observed.desired_unit_digest.known(),
        ) {
            (Some(Some(installed)), Some(desired)) => installed == desired,
            _ => false,
        };
        let enabled_ok = !service.enabled || observed.service_enabled.satisfies(|e| *e);
        if !unit_ok || !enabled_ok {
            plan.push(Box::new(InstallService::new(
                &service.name,
                service.unit_source_path(manifest.repository.as_ref()),
                service.unit_install_path(),
                service.enabled,
            )));
        }

        // Restart when the service is down, or when a pull with a known code
        // delta just landed underneath a running instance.
        let code_changed =
            pulled && observed.upstream_delta.satisfies(|delta| !delta.is_empty());
        let active = observed.service_active.satisfies(|a| *a);
        if code_changed || !active {
            plan.push(Box::new(RestartService::new(&service.name, code_changed)));
        }
    }

    for job in &manifest.cron_jobs {
        let action = InstallCronJob::new(&job.schedule, &job.command);
        let installed = match &observed.cron_signatures {
            Probed::Known(signatures) => signatures.contains(&action.signature()),
            Probed::Unknown => false,
        };
        if !installed {
            plan.push(Box::new(action));
        }
    }

    plan
}

fn install_action(pkg: &PackageSection, force: bool) -> converge::BoxedAction {
    match pkg.kind {
        PackageKind::Apt => Box::new(AptInstall::new(
            &pkg.name,
            pkg.version.as_deref(),
            pkg.import_name.as_deref(),
            pkg.smoke_test.as_deref(),
            pkg.optional,
        )),
        PackageKind::Pip => Box::new(PipInstall::new(
            &pkg.name,
            pkg.version.as_deref(),
            &pkg.sources,
            pkg.import_name.as_deref(),
            pkg.smoke_test.as_deref(),
            pkg.optional,
            force,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge::Probed;
    use std::collections::BTreeSet;

    fn example_manifest() -> Manifest {
        Manifest::parse(crate::manifest::tests::EXAMPLE).unwrap()
    }

    /// An observation where every desired item is already satisfied
    fn converged(manifest: &Manifest) -> ObservedState {
        let mut observed = ObservedState::empty();
        for pkg in &manifest.packages {
            let version = pkg.version.clone().unwrap_or_else(|| "1.0".to_string());
            observed
                .packages
                .insert(pkg.name.clone(), Probed::Known(Some(version)));
            for conflict in &pkg.purge_first {
                observed
                    .conflicts
                    .insert(conflict.clone(), Probed::Known(false));
            }
        }
        for artifact in &manifest.artifacts {
            observed.artifacts.insert(artifact.path.clone(), true);
        }
        observed.unit_digest = Probed::Known(Some("digest".to_string()));
        observed.desired_unit_digest = Probed::Known("digest".to_string());
        observed.service_enabled = Probed::Known(true);
        observed.service_active = Probed::Known(true);
        observed.cron_signatures = Probed::Known(
            manifest
                .cron_jobs
                .iter()
                .map(|j| InstallCronJob::new(&j.schedule, &j.command).signature())
                .collect::<BTreeSet<_>>(),
        );
        observed.head_revision = Probed::Known("abc123".to_string());
        observed.remote_revision = Probed::Known("abc123".to_string());
        observed.upstream_delta = Probed::Known(Vec::new());
        observed.swap_total_mb = Probed::Known(2048);
        observed.sources_list_stale = Probed::Known(false);
        observed
    }

    #[test]
    fn converged_state_yields_empty_plan() {
        let manifest = example_manifest();
        let observed = converged(&manifest);
        let plan = build(&manifest, &observed);
        assert!(plan.is_empty(), "plan was {:?}", plan.ids());
    }

    #[test]
    fn absent_package_yields_exactly_one_install() {
        let manifest = example_manifest();
        let mut observed = converged(&manifest);
        observed
            .packages
            .insert("python3-pip".to_string(), Probed::Known(None));

        let plan = build(&manifest, &observed);
        assert_eq!(plan.ids(), vec!["apt:python3-pip"]);
    }

    #[test]
    fn wrong_version_triggers_reinstall_of_the_pin() {
        let manifest = example_manifest();
        let mut observed = converged(&manifest);
        observed.packages.insert(
            "opencv-contrib-python".to_string(),
            Probed::Known(Some("4.6.0.66".to_string())),
        );

        let plan = build(&manifest, &observed);
        assert_eq!(plan.ids(), vec!["pip:opencv-contrib-python"]);
    }

    #[test]
    fn purge_precedes_its_pinned_install() {
        let manifest = example_manifest();
        let mut observed = converged(&manifest);
        observed
            .conflicts
            .insert("python3-opencv".to_string(), Probed::Known(true));
        observed
            .packages
            .insert("opencv-contrib-python".to_string(), Probed::Known(None));

        let plan = build(&manifest, &observed);
        let ids = plan.ids();
        let purge = ids.iter().position(|id| id == "apt-purge:python3-opencv");
        let install = ids.iter().position(|id| id == "pip:opencv-contrib-python");
        assert!(purge.unwrap() < install.unwrap());
    }

    #[test]
    fn fresh_device_orders_phases_correctly() {
        let manifest = example_manifest();
        let observed = ObservedState::empty();

        let plan = build(&manifest, &observed);
        let kinds = plan.kinds();

        let mirror = plan.position_of_kind("replace_mirror").unwrap();
        let swap = plan.position_of_kind("expand_swap").unwrap();
        let pull = plan.position_of_kind("pull_repository").unwrap();
        let last_install = plan.last_position_of_kind("install_package").unwrap();
        let service = plan.position_of_kind("install_service").unwrap();
        let cron = plan.position_of_kind("install_cron_job").unwrap();

        assert_eq!(mirror, 0, "mirror repair comes first: {kinds:?}");
        assert!(swap < pull);
        assert!(pull < plan.position_of_kind("install_package").unwrap());
        assert!(last_install < service, "all installs precede the service");
        assert!(service < cron, "service exists before cron can restart it");
    }

    #[test]
    fn low_swap_alone_does_not_expand() {
        let manifest = example_manifest();
        let mut observed = converged(&manifest);
        observed.swap_total_mb = Probed::Known(100);

        // Every package is satisfied, so nothing ahead will compile.
        let plan = build(&manifest, &observed);
        assert!(plan.position_of_kind("expand_swap").is_none());
    }

    #[test]
    fn low_swap_expands_before_a_compiling_install() {
        let manifest = example_manifest();
        let mut observed = converged(&manifest);
        observed.swap_total_mb = Probed::Known(100);
        observed
            .packages
            .insert("opencv-contrib-python".to_string(), Probed::Known(None));

        let plan = build(&manifest, &observed);
        let swap = plan.position_of_kind("expand_swap").unwrap();
        let install = plan.position_of_kind("install_package").unwrap();
        assert!(swap < install, "swap expands before the build");
    }

    #[test]
    fn low_swap_ignores_pending_installs_that_do_not_compile() {
        let manifest = example_manifest();
        let mut observed = converged(&manifest);
        observed.swap_total_mb = Probed::Known(100);
        observed
            .packages
            .insert("python3-pip".to_string(), Probed::Known(None));

        let plan = build(&manifest, &observed);
        assert!(plan.position_of_kind("expand_swap").is_none());
        assert_eq!(plan.ids(), vec!["apt:python3-pip"]);
    }

    #[test]
    fn unknown_observations_emit_conservative_actions() {
        let manifest = example_manifest();
        // Everything Unknown: the planner re-installs rather than assumes.
        let plan = build(&manifest, &ObservedState::empty());
        assert!(plan.position_of_kind("install_package").is_some());
        assert!(plan.position_of_kind("pull_repository").is_some());
        assert!(plan.position_of_kind("install_service").is_some());
    }

    #[test]
    fn manifest_delta_forces_reinstall_before_restart() {
        let manifest = example_manifest();
        let mut observed = converged(&manifest);
        // Upstream moved and touched the dependency manifest.
        observed.remote_revision = Probed::Known("def456".to_string());
        observed.upstream_delta = Probed::Known(vec![
            "requirements.txt".to_string(),
            "src/capture.py".to_string(),
        ]);

        let plan = build(&manifest, &observed);
        let ids = plan.ids();
        let reinstall = ids
            .iter()
            .position(|id| id == "pip:opencv-contrib-python")
            .expect("dependency reinstall planned");
        let restart = ids
            .iter()
            .position(|id| id.starts_with("restart:"))
            .expect("service restart planned");
        assert!(reinstall < restart);
        assert!(ids.iter().any(|id| id.starts_with("repo:")));
    }

    #[test]
    fn code_only_delta_restarts_without_reinstall() {
        let manifest = example_manifest();
        let mut observed = converged(&manifest);
        observed.remote_revision = Probed::Known("def456".to_string());
        observed.upstream_delta = Probed::Known(vec!["src/capture.py".to_string()]);

        let plan = build(&manifest, &observed);
        let ids = plan.ids();
        assert!(!ids.iter().any(|id| id.starts_with("pip:")));
        assert!(ids.iter().any(|id| id.starts_with("restart:")));
    }

    #[test]
    fn inactive_service_is_restarted_without_a_pull() {
        let manifest = example_manifest();
        let mut observed = converged(&manifest);
        observed.service_active = Probed::Known(false);

        let plan = build(&manifest, &observed);
        assert_eq!(plan.kinds(), vec!["restart_service"]);
    }

    #[test]
    fn excluded_files_ride_along_on_the_pull_action() {
        let manifest = example_manifest();
        let mut observed = converged(&manifest);
        observed.remote_revision = Probed::Known("def456".to_string());
        observed.upstream_delta = Probed::Known(vec!["src/capture.py".to_string()]);

        let plan = build(&manifest, &observed);
        let pull = plan
            .iter()
            .find(|a| a.kind() == "pull_repository")
            .expect("pull planned");
        assert!(pull.description().contains("origin/main"));
        // The exclusion list travels with the action so the executor marks
        // the device-local files before touching the tree.
        let debug = format!("{pull:?}");
        assert!(debug.contains("config_WM.py"));
        assert!(debug.contains("Variable.txt"));
    }

    #[test]
    fn missing_cron_signature_installs_only_that_job() {
        let manifest = example_manifest();
        let mut observed = converged(&manifest);
        observed.cron_signatures = Probed::Known(BTreeSet::new());

        let plan = build(&manifest, &observed);
        assert_eq!(plan.kinds(), vec!["install_cron_job"]);
        assert_eq!(plan.len(), manifest.cron_jobs.len());
    }
}

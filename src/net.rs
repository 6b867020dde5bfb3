//! Connectivity gate
//!
//! Unattended runs on LTE-backed devices skip convergence entirely when the
//! upstream host is unreachable. Half a convergence (packages updated, code
//! not pulled) is worse than none.

use std::time::Duration;

use crate::error::ProvisionError;
use crate::manifest::ConnectivitySection;

/// One GET against the probe URL. Any HTTP response counts as reachable;
/// only transport failures (DNS, TCP, TLS, timeout) count against it.
pub fn check(connectivity: &ConnectivitySection) -> Result<(), ProvisionError> {
    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(Duration::from_secs(connectivity.timeout_secs)))
        .build()
        .into();

    match agent
        .get(&connectivity.probe_url)
        .header("User-Agent", "pifleet")
        .call()
    {
        Ok(_) => Ok(()),
        Err(ureq::Error::StatusCode(_)) => Ok(()),
        Err(err) => Err(ProvisionError::ConnectivityUnavailable(format!(
            "{}: {err}",
            connectivity.probe_url
        ))),
    }
}

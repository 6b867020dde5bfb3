//! Root check
//!
//! apt, systemd units under /etc, and /var state all need root. The check
//! runs before the lock is taken so an unprivileged invocation exits cleanly
//! without leaving a stale lock file behind.

use anyhow::Result;

use crate::error::ProvisionError;

pub fn ensure_root() -> Result<()> {
    if effective_uid() != 0 {
        return Err(
            ProvisionError::PrivilegeMissing("run as root (sudo pifleet ...)".to_string()).into(),
        );
    }
    Ok(())
}

fn effective_uid() -> u32 {
    unsafe { libc::geteuid() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_root_maps_to_privilege_error() {
        // CI and dev machines run tests unprivileged.
        if effective_uid() != 0 {
            let err = ensure_root().unwrap_err();
            let provision = err.downcast_ref::<ProvisionError>().unwrap();
            assert_eq!(provision.exit_code(), 2);
        } else {
            assert!(ensure_root().is_ok());
        }
    }
}

//! Single-writer run lock
//!
//! Cron fires every half hour; a slow package build can outlive the interval.
//! An flock on the lock file keeps a second run from interleaving apt and pip
//! operations with the first. Losing the race is not an error: the other run
//! is already converging the same manifest.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::Path;

/// Exclusive advisory lock, released on drop.
///
/// The lock file itself is left in place. Removing it would let a contender
/// that opened the old path lock a dead inode while a third run locks a
/// fresh file at the same path, and both would proceed. An empty file under
/// /run/lock costs nothing.
#[derive(Debug)]
pub struct RunLock {
    file: File,
}

impl RunLock {
    /// Try to take the lock without blocking.
    ///
    /// `Ok(None)` means another run holds it.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Could not create {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(path)
            .with_context(|| format!("Could not open lock file {}", path.display()))?;

        let ret = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if ret != 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
                return Ok(None);
            }
            return Err(err).with_context(|| format!("flock on {}", path.display()));
        }

        Ok(Some(Self { file }))
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn second_acquire_loses_while_first_is_held() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.lock");

        let first = RunLock::try_acquire(&path).unwrap();
        assert!(first.is_some());

        // flock is per open file description, so a fresh open contends.
        let second = RunLock::try_acquire(&path).unwrap();
        assert!(second.is_none());

        drop(first);
        let third = RunLock::try_acquire(&path).unwrap();
        assert!(third.is_some());
    }

    #[test]
    fn release_keeps_the_file_on_one_inode() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.lock");

        // A contender that opened the path before the holder exits must
        // still contend with later acquires, so the inode has to survive.
        let early = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)
            .unwrap();

        let first = RunLock::try_acquire(&path).unwrap().unwrap();
        let ret = unsafe { libc::flock(early.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        assert_eq!(ret, -1, "early fd must lose while the lock is held");

        drop(first);
        assert!(path.exists(), "lock file survives release");

        let ret = unsafe { libc::flock(early.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        assert_eq!(ret, 0, "early fd wins once the lock is released");
        let contender = RunLock::try_acquire(&path).unwrap();
        assert!(
            contender.is_none(),
            "a fresh acquire and the early fd never both hold"
        );
    }

    #[test]
    fn missing_parent_directory_is_created() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/lock/run.lock");
        let lock = RunLock::try_acquire(&path).unwrap();
        assert!(lock.is_some());
    }
}

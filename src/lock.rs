// src/lock.rs

//! Machine-wide install lock
//!
//! At most one pipeline may run against an installation root at a time,
//! across every process on the machine. The lock is an advisory OS file lock
//! on a well-known file in the system temp directory, named by the SHA-1 of
//! the root path, so any two processes pointed at the same root contend on
//! the same file. The OS releases the lock when the holding process exits,
//! even on a kill.

use crate::error::{Error, Result};
use crate::hash;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use fs4::fs_std::FileExt;

/// Default bound on lock acquisition
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(2000);

/// Poll interval while waiting for a contended lock
const RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Exclusive machine-wide lock for one installation root
///
/// Released on drop; if the process dies while holding it, the OS drops the
/// lock at process exit.
pub struct InstallLock {
    file: File,
    path: PathBuf,
}

impl InstallLock {
    /// Lock-file path for an installation root
    ///
    /// The file lives in the system temp directory and is named by the SHA-1
    /// hex digest of the root path's UTF-8 bytes.
    pub fn lock_path(root: &Path) -> PathBuf {
        let digest = hash::sha1_bytes(root.to_string_lossy().as_bytes());
        std::env::temp_dir().join(format!("update-{}.lock", digest))
    }

    /// Acquire with the default 2 s bound
    pub fn acquire(root: &Path) -> Result<Self> {
        Self::acquire_timeout(root, DEFAULT_LOCK_TIMEOUT)
    }

    /// Acquire, waiting at most `timeout`; fails with
    /// `AnotherInstanceActive` when the bound elapses
    pub fn acquire_timeout(root: &Path, timeout: Duration) -> Result<Self> {
        let path = Self::lock_path(root);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)?;

        let deadline = Instant::now() + timeout;
        loop {
            if file.try_lock_exclusive()? {
                debug!("acquired install lock: {}", path.display());
                return Ok(Self { file, path });
            }
            if Instant::now() >= deadline {
                return Err(Error::AnotherInstanceActive);
            }
            std::thread::sleep(RETRY_INTERVAL);
        }
    }
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("failed to release install lock {}: {}", self.path.display(), e);
        } else {
            debug!("released install lock: {}", self.path.display());
        }
    }
}

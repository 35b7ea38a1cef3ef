// src/planner.rs

//! The update planner
//!
//! Diffs the local catalog against the remote feed and produces the minimal
//! plan: nothing, a bootstrap install, a reinstall (when local is somehow
//! ahead of remote), a delta chain, or a single full package.

use crate::error::{Error, Result};
use crate::manifest::{Manifest, ReleaseEntry};
use crate::version::PackageVersion;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Framework profile ceiling for package extraction, e.g. `net40`
///
/// Directories under `lib/` named `net<XX>` are included when `XX` is at
/// most this target's number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameworkTarget(pub u32);

impl FrameworkTarget {
    /// Parse `net40`-style profile names, case-insensitively
    pub fn parse(s: &str) -> Option<Self> {
        let lower = s.to_ascii_lowercase();
        let digits = lower.strip_prefix("net")?;
        digits.parse().ok().map(Self)
    }
}

impl Default for FrameworkTarget {
    fn default() -> Self {
        Self(45)
    }
}

impl std::fmt::Display for FrameworkTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "net{}", self.0)
    }
}

/// A computed update plan
#[derive(Debug, Clone)]
pub struct UpdateInfo {
    /// The installed full release the plan starts from; `None` on bootstrap
    pub currently_installed: Option<ReleaseEntry>,
    /// Releases to apply, ascending; never empty
    pub releases_to_apply: Vec<ReleaseEntry>,
    /// The release whose version is current after apply
    pub future_release: ReleaseEntry,
    /// The packages directory artifacts are staged in
    pub package_dir: PathBuf,
    /// Framework profile used during extraction
    pub framework_target: FrameworkTarget,
    /// True when no local version existed before this plan
    pub is_bootstrapping: bool,
}

impl UpdateInfo {
    /// The version that will be current once the plan is applied
    pub fn future_version(&self) -> PackageVersion {
        self.future_release.version
    }
}

/// Compute the update plan from local and remote catalogs
///
/// Returns `Ok(None)` when no update is needed.
pub fn plan(
    local: &Manifest,
    remote: &Manifest,
    ignore_delta_updates: bool,
    package_dir: PathBuf,
    framework_target: FrameworkTarget,
) -> Result<Option<UpdateInfo>> {
    if remote.is_empty() {
        return Err(Error::CorruptRemoteManifest(
            "remote feed has no releases".to_string(),
        ));
    }

    // A file name carrying different digests on the two sides means the feed
    // rewrote history; nothing downstream can be trusted.
    check_digest_consistency(local, remote)?;

    // Identical catalog sizes are read as "already current". Fragile when a
    // release is replaced in place, but that is the contract.
    if !local.is_empty() && local.len() == remote.len() {
        debug!("local and remote catalogs are the same size; no update");
        return Ok(None);
    }

    let remote_entries: Vec<&ReleaseEntry> = if ignore_delta_updates {
        remote.entries().iter().filter(|e| !e.is_delta).collect()
    } else {
        remote.entries().iter().collect()
    };
    if remote_entries.is_empty() {
        return Err(Error::CorruptRemoteManifest(
            "remote feed has no full releases".to_string(),
        ));
    }

    let latest_remote_full = remote_entries
        .iter()
        .filter(|e| !e.is_delta)
        .max_by(|a, b| a.version.cmp(&b.version))
        .copied()
        .ok_or_else(|| {
            Error::CorruptRemoteManifest("remote feed has no full releases".to_string())
        })?;

    // Bootstrap: nothing installed locally, take the latest full release.
    let Some(current) = local.latest_full().cloned() else {
        info!(
            "bootstrapping install at version {}",
            latest_remote_full.version
        );
        return Ok(Some(UpdateInfo {
            currently_installed: None,
            releases_to_apply: vec![latest_remote_full.clone()],
            future_release: latest_remote_full.clone(),
            package_dir,
            framework_target,
            is_bootstrapping: true,
        }));
    };

    let max_remote = remote_entries
        .iter()
        .map(|e| e.version)
        .max()
        .expect("remote_entries is non-empty");

    // Local ahead of (or equal to) remote: corruption or a rolled-back feed.
    // Reinstall the latest full remote release.
    if current.version >= max_remote {
        warn!(
            "local version {} is not behind remote {}; reinstalling",
            current.version, max_remote
        );
        return Ok(Some(UpdateInfo {
            currently_installed: Some(current),
            releases_to_apply: vec![latest_remote_full.clone()],
            future_release: latest_remote_full.clone(),
            package_dir,
            framework_target,
            is_bootstrapping: false,
        }));
    }

    // Normal upgrade: everything newer than the installed version.
    let mut newer: Vec<ReleaseEntry> = remote_entries
        .iter()
        .filter(|e| e.version > current.version)
        .map(|e| (*e).clone())
        .collect();
    newer.sort_by(|a, b| a.version.cmp(&b.version));

    // An unbroken run of deltas composes into one full package; any full
    // release in the mix takes precedence instead.
    let releases_to_apply = if newer.iter().all(|e| e.is_delta) {
        newer
    } else {
        let full = newer
            .iter()
            .filter(|e| !e.is_delta)
            .max_by(|a, b| a.version.cmp(&b.version))
            .expect("checked above that a full release exists")
            .clone();
        vec![full]
    };

    let future_release = releases_to_apply
        .iter()
        .max_by(|a, b| a.version.cmp(&b.version))
        .expect("releases_to_apply is non-empty")
        .clone();

    info!(
        "update available: {} -> {} ({} release(s) to apply)",
        current.version,
        future_release.version,
        releases_to_apply.len()
    );

    Ok(Some(UpdateInfo {
        currently_installed: Some(current),
        releases_to_apply,
        future_release,
        package_dir,
        framework_target,
        is_bootstrapping: false,
    }))
}

/// Reject feeds where a file name maps to two different digests across the
/// local and remote catalogs
fn check_digest_consistency(local: &Manifest, remote: &Manifest) -> Result<()> {
    let local_digests: HashMap<&str, &str> = local
        .entries()
        .iter()
        .map(|e| (e.filename.as_str(), e.sha1.as_str()))
        .collect();

    for entry in remote.entries() {
        if let Some(local_sha1) = local_digests.get(entry.filename.as_str()) {
            if *local_sha1 != entry.sha1 {
                return Err(Error::CorruptRemoteManifest(format!(
                    "{} has digest {} remotely but {} locally",
                    entry.filename, entry.sha1, local_sha1
                )));
            }
        }
    }
    Ok(())
}

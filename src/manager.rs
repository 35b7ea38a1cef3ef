// src/manager.rs

//! The update pipeline
//!
//! One manager drives one installation root: check for updates, download and
//! verify artifacts, apply a plan, rewrite the manifest, or uninstall. Every
//! operation holds the machine-wide install lock for its duration, and every
//! operation reports monotonic 0-100 progress with a guaranteed terminal 100
//! on success and failure alike.
//!
//! Re-entrant lock use inside one manager returns the same held handle, so a
//! caller composing check + download + apply pays for one acquisition.

use crate::delta::{DeltaApplier, OverlayDeltaApplier};
use crate::error::Result;
use crate::fsio::{FileSystem, RealFs};
use crate::install::Installer;
use crate::lock::{InstallLock, DEFAULT_LOCK_TIMEOUT};
use crate::manifest::{Manifest, ReleaseEntry};
use crate::planner::{self, FrameworkTarget, UpdateInfo};
use crate::progress::{PercentScope, ProgressTracker};
use crate::setup::SetupRunner;
use crate::source::UpdateSource;
use crate::store::PackageStore;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tracing::{debug, info};

/// Configuration for one installation root
#[derive(Debug, Clone)]
pub struct UpdateConfig {
    /// Installation root containing `packages/` and `app-<version>/`
    pub root: PathBuf,
    /// Release feed: an http(s) URL or a local directory
    pub source: String,
    /// Framework profile ceiling for extraction
    pub framework_target: FrameworkTarget,
    /// Where shortcut link files are created
    pub shortcut_dir: PathBuf,
    /// Pinned-shortcut directory to retarget after installs, where supported
    pub pinned_dir: Option<PathBuf>,
    /// Bound on install-lock acquisition
    pub lock_timeout: Duration,
}

impl UpdateConfig {
    pub fn new(root: impl Into<PathBuf>, source: impl Into<String>) -> Self {
        let root = root.into();
        Self {
            shortcut_dir: root.join("shortcuts"),
            pinned_dir: default_pinned_dir(),
            framework_target: FrameworkTarget::default(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            source: source.into(),
            root,
        }
    }
}

/// Default installation root for an application id: a subdirectory of the
/// per-user local app-data directory
pub fn default_install_root(app_id: &str) -> PathBuf {
    let base = std::env::var_os("LOCALAPPDATA")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("XDG_DATA_HOME").map(PathBuf::from))
        .or_else(|| {
            std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".local/share"))
        })
        .unwrap_or_else(std::env::temp_dir);
    base.join(app_id)
}

/// The OS pinned-shortcut directory, where the platform has one
#[cfg(windows)]
fn default_pinned_dir() -> Option<PathBuf> {
    std::env::var_os("APPDATA").map(|appdata| {
        PathBuf::from(appdata)
            .join(r"Microsoft\Internet Explorer\Quick Launch\User Pinned\TaskBar")
    })
}

#[cfg(not(windows))]
fn default_pinned_dir() -> Option<PathBuf> {
    None
}

/// Drives the update pipeline for one installation root
pub struct UpdateManager {
    config: UpdateConfig,
    fs: Arc<dyn FileSystem>,
    store: PackageStore,
    source: UpdateSource,
    applier: Box<dyn DeltaApplier>,
    runner: SetupRunner,
    /// Held lock for re-entrant acquisition within this manager
    lock_cell: Mutex<Weak<InstallLock>>,
}

impl UpdateManager {
    pub fn new(config: UpdateConfig) -> Result<Self> {
        let source = UpdateSource::new(&config.source)?;
        let fs: Arc<dyn FileSystem> = Arc::new(RealFs);
        let store = PackageStore::with_fs(&config.root, fs.clone());
        Ok(Self {
            config,
            fs,
            store,
            source,
            applier: Box::new(OverlayDeltaApplier::new()),
            runner: SetupRunner::new(),
            lock_cell: Mutex::new(Weak::new()),
        })
    }

    /// Substitute the delta applier (e.g. a binary-diff implementation)
    pub fn with_applier(mut self, applier: Box<dyn DeltaApplier>) -> Self {
        self.applier = applier;
        self
    }

    /// Substitute the hook runner (e.g. with a different timeout)
    pub fn with_runner(mut self, runner: SetupRunner) -> Self {
        self.runner = runner;
        self
    }

    #[inline]
    pub fn config(&self) -> &UpdateConfig {
        &self.config
    }

    /// Acquire the machine-wide lock, or reuse the handle this manager
    /// already holds
    fn acquire_lock(&self) -> Result<Arc<InstallLock>> {
        let mut cell = self.lock_cell.lock().unwrap();
        if let Some(held) = cell.upgrade() {
            debug!("reusing held install lock");
            return Ok(held);
        }
        let lock = Arc::new(InstallLock::acquire_timeout(
            &self.config.root,
            self.config.lock_timeout,
        )?);
        *cell = Arc::downgrade(&lock);
        Ok(lock)
    }

    /// Diff the local catalog against the remote feed
    ///
    /// Returns `Ok(None)` when the installation is current.
    pub fn check_for_update(
        &self,
        ignore_delta_updates: bool,
        sink: &dyn ProgressTracker,
    ) -> Result<Option<UpdateInfo>> {
        let _lock = self.acquire_lock()?;
        let scope = PercentScope::new(sink);
        sink.set_message("checking for update");

        let local = Manifest::load(self.fs.as_ref(), self.store.dir())?.unwrap_or_default();
        scope.at(33);

        let remote_text = self.source.fetch_manifest()?;
        scope.at(66);

        let remote = Manifest::parse(&remote_text)?;
        let plan = planner::plan(
            &local,
            &remote,
            ignore_delta_updates,
            self.store.dir().to_path_buf(),
            self.config.framework_target,
        )?;

        scope.complete(match &plan {
            Some(info) => {
                info!("update available: {}", info.future_version());
                "update available"
            }
            None => "up to date",
        });
        Ok(plan)
    }

    /// Download the plan's artifacts into the package store and verify each
    ///
    /// Artifacts already present and valid are skipped. A corrupt download
    /// is deleted before its error surfaces, so the call can simply be
    /// retried.
    pub fn download_releases(
        &self,
        entries: &[ReleaseEntry],
        sink: &dyn ProgressTracker,
    ) -> Result<()> {
        let _lock = self.acquire_lock()?;
        let scope = PercentScope::new(sink);
        sink.set_message("downloading releases");
        self.store.ensure_dir()?;

        let needed: Vec<ReleaseEntry> = entries
            .iter()
            .filter(|e| !self.store.has_valid(e))
            .cloned()
            .collect();
        debug!(
            "{} of {} artifact(s) need downloading",
            needed.len(),
            entries.len()
        );
        scope.at(5);

        if !needed.is_empty() {
            let bridge = ByteToPercent::new(&scope, 5, 90);
            self.source
                .fetch_artifacts(&needed, |e| self.store.path(e), &bridge)?;
        }
        scope.at(90);

        // Verification strictly follows each artifact's download.
        for entry in entries {
            self.store.verify(entry)?;
        }

        scope.complete("releases downloaded");
        Ok(())
    }

    /// Apply a computed plan: compose, extract, run hooks, publish
    ///
    /// Returns the launch targets of setups that want to start after
    /// install.
    pub fn apply_releases(
        &self,
        info: &UpdateInfo,
        sink: &dyn ProgressTracker,
    ) -> Result<Vec<PathBuf>> {
        let _lock = self.acquire_lock()?;
        let scope = PercentScope::new(sink);
        sink.set_message("applying releases");

        let installer = self.installer();
        let launch_targets = installer.apply(info, &scope)?;

        scope.complete("update applied");
        Ok(launch_targets)
    }

    /// Regenerate `packages/RELEASES` from the artifacts on disk
    pub fn update_local_manifest(&self, sink: &dyn ProgressTracker) -> Result<()> {
        let _lock = self.acquire_lock()?;
        let scope = PercentScope::new(sink);
        sink.set_message("rewriting local manifest");
        self.store.ensure_dir()?;

        let manifest = Manifest::rebuild_from_dir(self.fs.as_ref(), self.store.dir())?;
        scope.at(90);
        manifest.store(self.fs.as_ref(), self.store.dir())?;

        scope.complete("manifest rewritten");
        Ok(())
    }

    /// Remove the installation entirely
    pub fn full_uninstall(&self, sink: &dyn ProgressTracker) -> Result<()> {
        let _lock = self.acquire_lock()?;
        let scope = PercentScope::new(sink);
        sink.set_message("uninstalling");

        self.installer().full_uninstall()?;

        scope.complete("uninstalled");
        Ok(())
    }

    fn installer(&self) -> Installer<'_> {
        Installer::new(
            &self.config.root,
            &self.store,
            self.applier.as_ref(),
            &self.runner,
            self.config.shortcut_dir.clone(),
            self.config.pinned_dir.clone(),
        )
    }
}

/// Adapts byte-granular download progress onto a percent sub-range
struct ByteToPercent<'a, 'b> {
    scope: &'a PercentScope<'b>,
    from: u64,
    to: u64,
    total: AtomicU64,
}

impl<'a, 'b> ByteToPercent<'a, 'b> {
    fn new(scope: &'a PercentScope<'b>, from: u64, to: u64) -> Self {
        Self {
            scope,
            from,
            to,
            total: AtomicU64::new(0),
        }
    }
}

impl ProgressTracker for ByteToPercent<'_, '_> {
    fn set_message(&self, _message: &str) {}

    fn set_position(&self, position: u64) {
        let total = self.total.load(Ordering::Relaxed);
        if total > 0 {
            self.scope
                .at_fraction(self.from, self.to, position as f64 / total as f64);
        }
    }

    fn set_length(&self, length: u64) {
        self.total.store(length, Ordering::Relaxed);
    }

    fn position(&self) -> u64 {
        0
    }

    fn length(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    fn finish_with_message(&self, _message: &str) {}
    fn finish_with_error(&self, _message: &str) {}

    fn is_finished(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::hash;
    use crate::progress::SilentProgress;
    use std::fs;

    fn feed_with(dir: &std::path::Path, packages: &[(&str, &[u8])]) -> String {
        let mut lines = String::new();
        for (name, bytes) in packages {
            fs::write(dir.join(name), bytes).unwrap();
            lines.push_str(&format!(
                "{} {} {}\n",
                hash::sha1_bytes(bytes),
                name,
                bytes.len()
            ));
        }
        fs::write(dir.join("RELEASES"), &lines).unwrap();
        lines
    }

    fn manager_for(root: &std::path::Path, feed: &std::path::Path) -> UpdateManager {
        let mut config = UpdateConfig::new(root, feed.to_str().unwrap());
        config.pinned_dir = None;
        UpdateManager::new(config).unwrap()
    }

    #[test]
    fn test_lock_reentry_returns_same_handle() {
        let root = tempfile::tempdir().unwrap();
        let feed = tempfile::tempdir().unwrap();
        let manager = manager_for(root.path(), feed.path());

        let first = manager.acquire_lock().unwrap();
        let second = manager.acquire_lock().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        // Once every handle is dropped, the lock is re-acquired fresh.
        drop(first);
        drop(second);
        let third = manager.acquire_lock().unwrap();
        drop(third);
    }

    #[test]
    fn test_concurrent_managers_contend() {
        let root = tempfile::tempdir().unwrap();
        let feed = tempfile::tempdir().unwrap();
        feed_with(feed.path(), &[("myapp-1.0.0.nupkg", b"payload")]);

        let manager_a = manager_for(root.path(), feed.path());
        let mut config_b = UpdateConfig::new(root.path(), feed.path().to_str().unwrap());
        config_b.lock_timeout = Duration::from_millis(150);
        let manager_b = UpdateManager::new(config_b).unwrap();

        let held = manager_a.acquire_lock().unwrap();
        let sink = SilentProgress::new();
        let result = manager_b.check_for_update(false, &sink);
        assert!(matches!(result, Err(Error::AnotherInstanceActive)));
        // Failure still delivered terminal progress.
        assert_eq!(sink.position(), 100);
        assert!(sink.is_finished());
        drop(held);

        // With the lock free the same call succeeds.
        let sink = SilentProgress::new();
        assert!(manager_b.check_for_update(false, &sink).unwrap().is_some());
    }

    #[test]
    fn test_check_reports_terminal_progress_on_transport_failure() {
        let root = tempfile::tempdir().unwrap();
        let feed = tempfile::tempdir().unwrap(); // no RELEASES inside
        let manager = manager_for(root.path(), feed.path());

        let sink = SilentProgress::new();
        let result = manager.check_for_update(false, &sink);
        assert!(matches!(result, Err(Error::Transport(_))));
        assert_eq!(sink.position(), 100);
        assert!(sink.is_finished());
    }

    #[test]
    fn test_download_skips_valid_and_verifies() {
        let root = tempfile::tempdir().unwrap();
        let feed = tempfile::tempdir().unwrap();
        feed_with(feed.path(), &[("myapp-1.0.0.nupkg", b"payload")]);

        let manager = manager_for(root.path(), feed.path());
        let sink = SilentProgress::new();
        let info = manager.check_for_update(false, &sink).unwrap().unwrap();

        let sink = SilentProgress::new();
        manager
            .download_releases(&info.releases_to_apply, &sink)
            .unwrap();
        assert!(root.path().join("packages/myapp-1.0.0.nupkg").exists());

        // Second download is a no-op and still succeeds.
        let sink = SilentProgress::new();
        manager
            .download_releases(&info.releases_to_apply, &sink)
            .unwrap();
    }

    #[test]
    fn test_download_corrupt_feed_artifact_fails_and_evicts() {
        let root = tempfile::tempdir().unwrap();
        let feed = tempfile::tempdir().unwrap();

        // Manifest advertises different bytes than the feed delivers.
        let advertised = b"advertised payload";
        fs::write(feed.path().join("myapp-1.0.0.nupkg"), b"delivered payload!").unwrap();
        fs::write(
            feed.path().join("RELEASES"),
            format!(
                "{} myapp-1.0.0.nupkg {}\n",
                hash::sha1_bytes(advertised),
                advertised.len()
            ),
        )
        .unwrap();

        let manager = manager_for(root.path(), feed.path());
        let sink = SilentProgress::new();
        let info = manager.check_for_update(false, &sink).unwrap().unwrap();

        let sink = SilentProgress::new();
        let result = manager.download_releases(&info.releases_to_apply, &sink);
        assert!(matches!(result, Err(Error::DigestMismatch { .. })));
        // The corrupt artifact was evicted and the manifest never written.
        assert!(!root.path().join("packages/myapp-1.0.0.nupkg").exists());
        assert!(!root.path().join("packages/RELEASES").exists());
        assert_eq!(sink.position(), 100);
    }
}

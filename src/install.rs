// src/install.rs

//! The installer: from a verified plan to a runnable version directory
//!
//! One install walks a fixed sequence:
//!
//! ```text
//! PREPARE -> CLEAN_DEAD -> COMPOSE_OR_PICK -> EXTRACT -> POST_INSTALL -> REWRITE_MANIFEST
//! ```
//!
//! Only the final manifest rewrite publishes the new state; a crash anywhere
//! before it leaves the previous manifest in place, so the next run starts
//! from the old version as if nothing happened. Dead-version cleanup is
//! best-effort: a directory whose files are locked is scheduled for deletion
//! at the next reboot (or the next run, where the OS has no such facility)
//! and never fails the install.

use crate::delta::{DeltaApplier, DeltaComposer};
use crate::error::{Error, Result};
use crate::manifest::{Manifest, ReleaseEntry};
use crate::planner::{FrameworkTarget, UpdateInfo};
use crate::progress::PercentScope;
use crate::setup::{HookPhase, SetupRunner};
use crate::shortcuts::{retarget_pinned, ShortcutStore};
use crate::store::PackageStore;
use crate::version::{app_dir_name, parse_app_dir_name, PackageVersion};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Ledger of directories whose deletion must be retried, inside packages/
const PENDING_DELETES_FILE: &str = ".pending-deletes";

/// Decide whether an archive entry is installed, and where
///
/// Only entries under `lib/` install. Separators are normalised and matching
/// is case-insensitive. A `net<XX>` profile directory is included when `XX`
/// is at most the target; `winrt45` never installs; unrecognized profiles
/// are skipped. Returns the destination path relative to the version
/// directory (the `lib/<profile>/` prefix is stripped, so profile variants
/// of the same file land on the same destination).
pub fn profile_destination(target: FrameworkTarget, entry_path: &str) -> Option<PathBuf> {
    let normalized = entry_path.replace('\\', "/").to_ascii_lowercase();
    let components: Vec<&str> = normalized
        .split('/')
        .filter(|c| !c.is_empty())
        .collect();

    if components.first() != Some(&"lib") || components.len() < 2 {
        return None;
    }
    // Reject traversal outright; archives are not trusted.
    if components.iter().any(|c| *c == "." || *c == "..") {
        return None;
    }

    if components.len() == 2 {
        // A file directly under lib/ has no profile to match.
        return Some(PathBuf::from(components[1]));
    }

    let profile = components[1];
    if profile == "winrt45" {
        return None;
    }
    let number: u32 = profile.strip_prefix("net")?.parse().ok()?;
    if number > target.0 {
        return None;
    }

    Some(components[2..].iter().collect())
}

/// Performs one install against an installation root
pub struct Installer<'a> {
    root: &'a Path,
    store: &'a PackageStore,
    applier: &'a dyn DeltaApplier,
    runner: &'a SetupRunner,
    shortcut_dir: PathBuf,
    pinned_dir: Option<PathBuf>,
}

impl<'a> Installer<'a> {
    pub fn new(
        root: &'a Path,
        store: &'a PackageStore,
        applier: &'a dyn DeltaApplier,
        runner: &'a SetupRunner,
        shortcut_dir: PathBuf,
        pinned_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            root,
            store,
            applier,
            runner,
            shortcut_dir,
            pinned_dir,
        }
    }

    /// Run the full install sequence; returns the launch targets of setups
    /// that ask to be started after install
    pub fn apply(&self, info: &UpdateInfo, scope: &PercentScope<'_>) -> Result<Vec<PathBuf>> {
        self.prepare()?;
        self.clean_dead(info.currently_installed.as_ref().map(|e| e.version));
        scope.at(10);

        let entry = DeltaComposer::new(self.store, self.applier).compose(info)?;
        self.store.verify(&entry)?;
        scope.at(50);

        let app_dir = self.extract(&entry, info.framework_target)?;
        scope.at(80);

        let launch_targets = self.post_install(info, &entry, &app_dir)?;
        scope.at(95);

        self.rewrite_manifest()?;
        info!("installed version {}", entry.version);
        Ok(launch_targets)
    }

    /// PREPARE: the packages directory exists; pending deletions retried
    fn prepare(&self) -> Result<()> {
        self.store.ensure_dir()?;
        self.retry_pending_deletes();
        Ok(())
    }

    /// CLEAN_DEAD: drop version directories other than the installed one
    ///
    /// Tolerant by contract; nothing here can fail the install.
    fn clean_dead(&self, keep: Option<PackageVersion>) {
        for (version, dir) in self.app_dirs() {
            if Some(version) == keep {
                continue;
            }
            debug!("cleaning dead version directory {}", dir.display());
            self.delete_or_schedule(&dir);
        }
    }

    /// EXTRACT: unpack the chosen full package into `app-<version>`
    fn extract(&self, entry: &ReleaseEntry, target: FrameworkTarget) -> Result<PathBuf> {
        let app_dir = self.root.join(app_dir_name(&entry.version));
        if app_dir.exists() {
            fs::remove_dir_all(&app_dir)?;
        }
        fs::create_dir_all(&app_dir)?;

        let package_path = self.store.path(entry);
        let mut archive =
            zip::ZipArchive::new(File::open(&package_path)?).map_err(|e| Error::Archive {
                name: entry.filename.clone(),
                reason: e.to_string(),
            })?;

        // Select installable entries, then copy in ascending path order so
        // higher-profile variants overwrite lower-profile ones.
        let mut selected: Vec<(usize, String, PathBuf)> = Vec::new();
        for i in 0..archive.len() {
            let file = archive.by_index_raw(i).map_err(|e| Error::Archive {
                name: entry.filename.clone(),
                reason: e.to_string(),
            })?;
            let name = file.name().to_string();
            if name.ends_with('/') {
                continue;
            }
            if let Some(dest) = profile_destination(target, &name) {
                selected.push((i, name, dest));
            }
        }
        selected.sort_by_key(|(_, name, _)| name.replace('\\', "/").to_ascii_lowercase());

        let mut extracted = 0usize;
        for (i, name, dest_rel) in selected {
            let mut file = archive.by_index(i).map_err(|e| Error::Archive {
                name: entry.filename.clone(),
                reason: e.to_string(),
            })?;
            let dest = app_dir.join(&dest_rel);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&dest)?;
            io::copy(&mut file, &mut out)?;
            drop(out);

            // Hosted executables keep their mode bits.
            #[cfg(unix)]
            if let Some(mode) = file.unix_mode() {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&dest, fs::Permissions::from_mode(mode))?;
            }

            debug!("extracted {} -> {}", name, dest.display());
            extracted += 1;
        }

        info!(
            "extracted {} file(s) from {} into {}",
            extracted,
            entry.filename,
            app_dir.display()
        );
        Ok(app_dir)
    }

    /// POST_INSTALL: lifecycle hooks, shortcuts, and old-version retirement
    fn post_install(
        &self,
        info: &UpdateInfo,
        new_entry: &ReleaseEntry,
        app_dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        // Old versions first: their uninstalling hooks run before they go,
        // and a broken old version must never block the new install.
        let old_dirs: Vec<(PackageVersion, PathBuf)> = self
            .app_dirs()
            .into_iter()
            .filter(|(v, _)| *v != new_entry.version)
            .collect();

        for (version, dir) in &old_dirs {
            for setup in self.runner.discover(dir) {
                self.runner.run_hook_swallowed(
                    &setup,
                    HookPhase::VersionUninstalling,
                    Some(version),
                );
            }
        }

        // New version: install-phase hooks are fatal on failure.
        let setups = self.runner.discover(app_dir);
        for setup in &setups {
            if info.is_bootstrapping {
                self.runner.run_hook(setup, HookPhase::AppInstall, None)?;
            }
            self.runner
                .run_hook(setup, HookPhase::VersionInstalled, Some(&new_entry.version))?;
        }

        // Shortcuts: create or refresh, honoring tombstones.
        let shortcut_store = ShortcutStore::new(self.shortcut_dir.clone(), self.store.dir());
        let mut requests = Vec::new();
        for setup in &setups {
            requests.extend(setup.shortcut_requests());
        }
        shortcut_store.sync(&requests)?;

        // Pinned shortcuts follow the version directory move.
        if let Some(pinned) = &self.pinned_dir {
            let old_paths: Vec<PathBuf> = old_dirs.iter().map(|(_, d)| d.clone()).collect();
            retarget_pinned(pinned, &old_paths, app_dir);
        }

        // Retire old version directories now that their hooks have run.
        for (_, dir) in &old_dirs {
            self.delete_or_schedule(dir);
        }

        Ok(setups
            .iter()
            .filter(|s| s.launch_on_setup())
            .map(|s| s.target().to_path_buf())
            .collect())
    }

    /// REWRITE_MANIFEST: regenerate RELEASES from the artifacts on disk
    ///
    /// The one and only publication point; everything before this is
    /// invisible to the next invocation.
    fn rewrite_manifest(&self) -> Result<()> {
        let fs_ref = self.store.fs().as_ref();
        let manifest = Manifest::rebuild_from_dir(fs_ref, self.store.dir())?;
        manifest.store(fs_ref, self.store.dir())
    }

    /// Remove every trace of the installation
    ///
    /// Hooks run swallowed throughout; deletion is best-effort with the same
    /// reboot fallback as dead-version cleanup.
    pub fn full_uninstall(&self) -> Result<()> {
        let mut dirs = self.app_dirs();
        dirs.sort_by(|a, b| b.0.cmp(&a.0)); // newest first

        for (idx, (version, dir)) in dirs.iter().enumerate() {
            for setup in self.runner.discover(dir) {
                self.runner.run_hook_swallowed(
                    &setup,
                    HookPhase::VersionUninstalling,
                    Some(version),
                );
                if idx == 0 {
                    self.runner
                        .run_hook_swallowed(&setup, HookPhase::AppUninstall, None);
                }
            }
            self.delete_or_schedule(dir);
        }

        let shortcut_store = ShortcutStore::new(self.shortcut_dir.clone(), self.store.dir());
        shortcut_store.remove_all()?;

        if self.store.dir().exists() {
            self.delete_or_schedule(self.store.dir());
        }
        info!("uninstalled from {}", self.root.display());
        Ok(())
    }

    /// Installed version directories under the root
    fn app_dirs(&self) -> Vec<(PackageVersion, PathBuf)> {
        let Ok(entries) = fs::read_dir(self.root) else {
            return Vec::new();
        };
        let mut dirs: Vec<(PackageVersion, PathBuf)> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .filter_map(|p| {
                let name = p.file_name()?.to_str()?;
                Some((parse_app_dir_name(name)?, p.clone()))
            })
            .collect();
        dirs.sort_by(|a, b| a.0.cmp(&b.0));
        dirs
    }

    fn delete_or_schedule(&self, dir: &Path) {
        match fs::remove_dir_all(dir) {
            Ok(()) => debug!("deleted {}", dir.display()),
            Err(e) => {
                warn!(
                    "could not delete {} ({}); scheduling for later",
                    dir.display(),
                    e
                );
                self.schedule_delete(dir);
            }
        }
    }

    /// Windows: schedule every file, then the directories, for deletion at
    /// the next reboot
    #[cfg(windows)]
    fn schedule_delete(&self, path: &Path) {
        use std::os::windows::ffi::OsStrExt;
        use windows_sys::Win32::Storage::FileSystem::{
            MoveFileExW, MOVEFILE_DELAY_UNTIL_REBOOT,
        };

        fn schedule_one(p: &Path) {
            let wide: Vec<u16> = p.as_os_str().encode_wide().chain(Some(0)).collect();
            let ok = unsafe { MoveFileExW(wide.as_ptr(), std::ptr::null(), MOVEFILE_DELAY_UNTIL_REBOOT) };
            if ok == 0 {
                warn!("MoveFileExW failed for {}", p.display());
            }
        }

        fn schedule_tree(p: &Path) {
            if let Ok(entries) = fs::read_dir(p) {
                for entry in entries.filter_map(|e| e.ok()) {
                    let child = entry.path();
                    if child.is_dir() {
                        schedule_tree(&child);
                    } else {
                        schedule_one(&child);
                    }
                }
            }
            schedule_one(p);
        }

        schedule_tree(path);
        info!("scheduled {} for deletion at next reboot", path.display());
    }

    /// Elsewhere: record the path and retry on the next pipeline run
    #[cfg(not(windows))]
    fn schedule_delete(&self, path: &Path) {
        let ledger = self.store.dir().join(PENDING_DELETES_FILE);
        let line = format!("{}\n", path.display());
        let result = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&ledger)
            .and_then(|mut f| std::io::Write::write_all(&mut f, line.as_bytes()));
        match result {
            Ok(()) => info!("recorded {} for deletion on next run", path.display()),
            Err(e) => warn!("could not record pending delete: {}", e),
        }
    }

    /// Retry previously failed deletions; keep whatever still will not go
    fn retry_pending_deletes(&self) {
        let ledger = self.store.dir().join(PENDING_DELETES_FILE);
        let Ok(text) = fs::read_to_string(&ledger) else {
            return;
        };

        let mut survivors = Vec::new();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let path = Path::new(line);
            if !path.exists() {
                continue;
            }
            if let Err(e) = fs::remove_dir_all(path) {
                warn!("pending delete of {} still failing: {}", line, e);
                survivors.push(line.to_string());
            } else {
                debug!("completed pending delete of {}", line);
            }
        }

        if survivors.is_empty() {
            let _ = fs::remove_file(&ledger);
        } else {
            let _ = fs::write(&ledger, survivors.join("\n") + "\n");
        }
    }
}

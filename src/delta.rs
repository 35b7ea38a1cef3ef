// src/delta.rs

//! Delta packages and composition
//!
//! A delta package is a patch against the immediately prior full package;
//! applying it yields the next full package. The patch algorithm itself is a
//! black box behind [`DeltaApplier`]. The shipped [`OverlayDeltaApplier`]
//! understands a self-describing layout: entries in the delta archive replace
//! or add entries in the base archive, and `.whiteout` marker entries delete
//! them. A binary-diff applier can be injected through the same trait.
//!
//! [`DeltaComposer`] folds an ascending chain of deltas over the installed
//! full package, re-hashing each intermediate into a fresh release entry.
//! Intermediates stay in the package store; the next manifest rewrite
//! reclaims them.

use crate::error::{Error, Result};
use crate::manifest::ReleaseEntry;
use crate::planner::UpdateInfo;
use crate::store::PackageStore;
use std::collections::HashSet;
use std::fs::{self, File};
use std::path::Path;
use tracing::{debug, info};

/// Marker suffix inside a delta archive: `foo.dll.whiteout` deletes
/// `foo.dll` from the base
const WHITEOUT_SUFFIX: &str = ".whiteout";

/// Black-box delta application: `base + delta -> output`
pub trait DeltaApplier: Send + Sync {
    fn apply(&self, base: &Path, delta: &Path, output: &Path) -> Result<()>;
}

/// Default applier: delta archive entries overlaid on the base archive
#[derive(Debug, Default)]
pub struct OverlayDeltaApplier;

impl OverlayDeltaApplier {
    pub fn new() -> Self {
        Self
    }
}

impl DeltaApplier for OverlayDeltaApplier {
    fn apply(&self, base: &Path, delta: &Path, output: &Path) -> Result<()> {
        let archive_err = |path: &Path, e: zip::result::ZipError| Error::Archive {
            name: path.display().to_string(),
            reason: e.to_string(),
        };

        let mut base_zip =
            zip::ZipArchive::new(File::open(base)?).map_err(|e| archive_err(base, e))?;
        let mut delta_zip =
            zip::ZipArchive::new(File::open(delta)?).map_err(|e| archive_err(delta, e))?;

        // Names the delta replaces or removes.
        let mut replaced: HashSet<String> = HashSet::new();
        let mut removed: HashSet<String> = HashSet::new();
        for name in delta_zip.file_names() {
            match name.strip_suffix(WHITEOUT_SUFFIX) {
                Some(target) => {
                    removed.insert(target.to_string());
                }
                None => {
                    replaced.insert(name.to_string());
                }
            }
        }

        let temp_path = output.with_extension("partial");
        let mut writer = zip::ZipWriter::new(File::create(&temp_path)?);

        // Base entries the delta does not supersede.
        for i in 0..base_zip.len() {
            let file = base_zip
                .by_index_raw(i)
                .map_err(|e| archive_err(base, e))?;
            let name = file.name().to_string();
            if replaced.contains(&name) || removed.contains(&name) {
                continue;
            }
            writer
                .raw_copy_file(file)
                .map_err(|e| archive_err(output, e))?;
        }

        // Everything the delta carries, minus the whiteout markers.
        for i in 0..delta_zip.len() {
            let file = delta_zip
                .by_index_raw(i)
                .map_err(|e| archive_err(delta, e))?;
            if file.name().ends_with(WHITEOUT_SUFFIX) {
                continue;
            }
            writer
                .raw_copy_file(file)
                .map_err(|e| archive_err(output, e))?;
        }

        writer.finish().map_err(|e| archive_err(output, e))?;
        fs::rename(&temp_path, output)?;

        debug!(
            "applied delta {} over {} -> {}",
            delta.display(),
            base.display(),
            output.display()
        );
        Ok(())
    }
}

/// Reduces a plan's delta chain into one full package artifact
pub struct DeltaComposer<'a> {
    store: &'a PackageStore,
    applier: &'a dyn DeltaApplier,
}

impl<'a> DeltaComposer<'a> {
    pub fn new(store: &'a PackageStore, applier: &'a dyn DeltaApplier) -> Self {
        Self { store, applier }
    }

    /// Produce the single full release the plan installs
    ///
    /// An all-full plan just picks its newest entry. An all-delta plan folds
    /// each delta over the installed base in ascending version order,
    /// regenerating the release entry from the file after each step. A mix
    /// of the two is rejected.
    pub fn compose(&self, info: &UpdateInfo) -> Result<ReleaseEntry> {
        let delta_count = info
            .releases_to_apply
            .iter()
            .filter(|e| e.is_delta)
            .count();
        let full_count = info.releases_to_apply.len() - delta_count;

        if delta_count > 0 && full_count > 0 {
            return Err(Error::MixedFullAndDelta);
        }

        if delta_count == 0 {
            let newest = info
                .releases_to_apply
                .iter()
                .max_by(|a, b| a.version.cmp(&b.version))
                .ok_or(Error::MixedFullAndDelta)?;
            return Ok(newest.clone());
        }

        let current = info.currently_installed.as_ref().ok_or_else(|| {
            Error::CorruptRemoteManifest("delta chain without an installed base".to_string())
        })?;

        let mut deltas: Vec<&ReleaseEntry> = info.releases_to_apply.iter().collect();
        deltas.sort_by(|a, b| a.version.cmp(&b.version));

        let mut base_path = self.store.path(current);
        let mut composed = None;

        for delta in deltas {
            let full_name = crate::version::PackageName::parse(&delta.filename)?.full_filename();
            let output = self.store.path_for(&full_name);
            let delta_path = self.store.path(delta);

            info!(
                "composing {} from {} + {}",
                full_name,
                base_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                delta.filename
            );

            self.applier
                .apply(&base_path, &delta_path, &output)
                .map_err(|e| Error::DeltaApplicationFailed {
                    version: delta.version,
                    reason: e.to_string(),
                })?;

            let entry = ReleaseEntry::from_file(self.store.fs().as_ref(), &output)?;
            base_path = output;
            composed = Some(entry);
        }

        Ok(composed.expect("delta chain is non-empty"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::FrameworkTarget;
    use std::io::Write;
    use std::path::PathBuf;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
        let options = zip::write::SimpleFileOptions::default();
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    fn read_zip(path: &Path) -> Vec<(String, Vec<u8>)> {
        let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut out = Vec::new();
        for i in 0..archive.len() {
            let mut file = archive.by_index(i).unwrap();
            let mut data = Vec::new();
            std::io::Read::read_to_end(&mut file, &mut data).unwrap();
            out.push((file.name().to_string(), data));
        }
        out.sort();
        out
    }

    fn entry_for_file(path: &Path) -> ReleaseEntry {
        ReleaseEntry::from_file(&crate::fsio::RealFs, path).unwrap()
    }

    #[test]
    fn test_overlay_replaces_adds_and_removes() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("myapp-1.0.0.nupkg");
        let delta = dir.path().join("myapp-1.1.0-delta.nupkg");
        let output = dir.path().join("myapp-1.1.0.nupkg");

        write_zip(
            &base,
            &[
                ("lib/net45/app.exe", b"app v1"),
                ("lib/net45/helper.dll", b"helper v1"),
                ("lib/net45/legacy.dll", b"legacy"),
            ],
        );
        write_zip(
            &delta,
            &[
                ("lib/net45/app.exe", b"app v2"),
                ("lib/net45/fresh.dll", b"fresh"),
                ("lib/net45/legacy.dll.whiteout", b""),
            ],
        );

        OverlayDeltaApplier::new()
            .apply(&base, &delta, &output)
            .unwrap();

        let contents = read_zip(&output);
        let names: Vec<&str> = contents.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "lib/net45/app.exe",
                "lib/net45/fresh.dll",
                "lib/net45/helper.dll"
            ]
        );
        let app = contents.iter().find(|(n, _)| n.ends_with("app.exe")).unwrap();
        assert_eq!(app.1, b"app v2");
    }

    #[test]
    fn test_overlay_rejects_non_archive() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base.nupkg");
        let delta = dir.path().join("delta.nupkg");
        fs::write(&base, b"not a zip").unwrap();
        fs::write(&delta, b"also not").unwrap();

        let result =
            OverlayDeltaApplier::new().apply(&base, &delta, &dir.path().join("out.nupkg"));
        assert!(matches!(result, Err(Error::Archive { .. })));
    }

    fn info_with(
        current: Option<ReleaseEntry>,
        releases: Vec<ReleaseEntry>,
        package_dir: PathBuf,
    ) -> UpdateInfo {
        let future = releases
            .iter()
            .max_by(|a, b| a.version.cmp(&b.version))
            .unwrap()
            .clone();
        UpdateInfo {
            is_bootstrapping: current.is_none(),
            currently_installed: current,
            releases_to_apply: releases,
            future_release: future,
            package_dir,
            framework_target: FrameworkTarget::default(),
        }
    }

    #[test]
    fn test_compose_rejects_mixed() {
        let dir = tempfile::tempdir().unwrap();
        let store = PackageStore::new(dir.path());
        let applier = OverlayDeltaApplier::new();
        let composer = DeltaComposer::new(&store, &applier);

        let full = ReleaseEntry::new(&"a".repeat(40), "myapp-1.1.0.nupkg", 10).unwrap();
        let delta = ReleaseEntry::new(&"b".repeat(40), "myapp-1.2.0-delta.nupkg", 5).unwrap();
        let info = info_with(None, vec![full, delta], store.dir().to_path_buf());

        assert!(matches!(
            composer.compose(&info),
            Err(Error::MixedFullAndDelta)
        ));
    }

    #[test]
    fn test_compose_all_full_picks_newest() {
        let dir = tempfile::tempdir().unwrap();
        let store = PackageStore::new(dir.path());
        let applier = OverlayDeltaApplier::new();
        let composer = DeltaComposer::new(&store, &applier);

        let older = ReleaseEntry::new(&"a".repeat(40), "myapp-1.1.0.nupkg", 10).unwrap();
        let newer = ReleaseEntry::new(&"b".repeat(40), "myapp-1.2.0.nupkg", 10).unwrap();
        let info = info_with(None, vec![older, newer.clone()], store.dir().to_path_buf());

        assert_eq!(composer.compose(&info).unwrap(), newer);
    }

    #[test]
    fn test_compose_delta_chain() {
        let dir = tempfile::tempdir().unwrap();
        let store = PackageStore::new(dir.path());
        store.ensure_dir().unwrap();

        // Installed base 1.0.0 plus two deltas in the store.
        let base_path = store.path_for("myapp-1.0.0.nupkg");
        write_zip(&base_path, &[("lib/net45/app.exe", b"v1")]);
        let base_entry = entry_for_file(&base_path);

        let d1 = store.path_for("myapp-1.1.0-delta.nupkg");
        write_zip(&d1, &[("lib/net45/app.exe", b"v2")]);
        let d1_entry = entry_for_file(&d1);

        let d2 = store.path_for("myapp-1.2.0-delta.nupkg");
        write_zip(
            &d2,
            &[("lib/net45/app.exe", b"v3"), ("lib/net45/extra.dll", b"x")],
        );
        let d2_entry = entry_for_file(&d2);

        let applier = OverlayDeltaApplier::new();
        let composer = DeltaComposer::new(&store, &applier);
        // Deliberately out of order; compose must sort ascending.
        let info = info_with(
            Some(base_entry),
            vec![d2_entry, d1_entry],
            store.dir().to_path_buf(),
        );

        let composed = composer.compose(&info).unwrap();
        assert_eq!(composed.filename, "myapp-1.2.0.nupkg");
        assert!(!composed.is_delta);

        // Intermediate 1.1.0 full stays on disk for the manifest rewrite.
        assert!(store.path_for("myapp-1.1.0.nupkg").exists());

        let final_contents = read_zip(&store.path_for("myapp-1.2.0.nupkg"));
        assert_eq!(
            final_contents,
            vec![
                ("lib/net45/app.exe".to_string(), b"v3".to_vec()),
                ("lib/net45/extra.dll".to_string(), b"x".to_vec()),
            ]
        );
    }

    #[test]
    fn test_compose_failure_names_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = PackageStore::new(dir.path());
        store.ensure_dir().unwrap();

        // Base exists but the delta artifact is garbage.
        let base_path = store.path_for("myapp-1.0.0.nupkg");
        write_zip(&base_path, &[("lib/net45/app.exe", b"v1")]);
        let base_entry = entry_for_file(&base_path);

        let d1 = store.path_for("myapp-1.1.0-delta.nupkg");
        fs::write(&d1, b"corrupt").unwrap();
        let d1_entry = ReleaseEntry::new(&"c".repeat(40), "myapp-1.1.0-delta.nupkg", 7).unwrap();

        let applier = OverlayDeltaApplier::new();
        let composer = DeltaComposer::new(&store, &applier);
        let info = info_with(Some(base_entry), vec![d1_entry], store.dir().to_path_buf());

        match composer.compose(&info) {
            Err(Error::DeltaApplicationFailed { version, .. }) => {
                assert_eq!(version.to_string(), "1.1.0");
            }
            other => panic!("expected DeltaApplicationFailed, got {:?}", other),
        }
    }
}

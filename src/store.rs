// src/store.rs

//! The package store: `<root>/packages/`
//!
//! Owns every downloaded or composed artifact. Writes are atomic and
//! deduplicated by digest. Verification checks length before digest, and a
//! file that fails either check is deleted before the error surfaces so the
//! next attempt re-downloads from a clean slate.

use crate::error::{Error, Result};
use crate::fsio::{FileSystem, RealFs};
use crate::hash;
use crate::manifest::ReleaseEntry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Name of the directory the store owns, under the installation root
pub const PACKAGES_DIR: &str = "packages";

/// Artifact store over the packages directory
pub struct PackageStore {
    dir: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl PackageStore {
    /// Store over `<root>/packages` on the real filesystem
    pub fn new(root: &Path) -> Self {
        Self::with_fs(root, Arc::new(RealFs))
    }

    /// Store with an injected filesystem (tests)
    pub fn with_fs(root: &Path, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            dir: root.join(PACKAGES_DIR),
            fs,
        }
    }

    /// The packages directory itself
    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[inline]
    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    /// Create the packages directory if missing
    pub fn ensure_dir(&self) -> Result<()> {
        if !self.fs.exists(&self.dir) {
            self.fs.create_dir_all(&self.dir)?;
            debug!("created package store at {}", self.dir.display());
        }
        Ok(())
    }

    /// Expected absolute path of an entry's artifact
    pub fn path(&self, entry: &ReleaseEntry) -> PathBuf {
        self.dir.join(&entry.filename)
    }

    /// Absolute path for an artifact by file name
    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }

    /// Write an artifact atomically
    ///
    /// If a file with that name already exists with the same size and
    /// digest, the write is skipped.
    pub fn put(&self, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        self.ensure_dir()?;
        let path = self.path_for(name);

        if self.fs.exists(&path) {
            let existing_len = self.fs.file_len(&path)?;
            if existing_len == bytes.len() as u64 {
                let mut reader = self.fs.open(&path)?;
                let existing_sha1 = hash::sha1_reader(&mut reader)?;
                if hash::eq_hex(&existing_sha1, &hash::sha1_bytes(bytes)) {
                    debug!("artifact already in store, skipping write: {}", name);
                    return Ok(path);
                }
            }
        }

        self.fs.write_atomic(&path, bytes)?;
        debug!("stored artifact {} ({} bytes)", name, bytes.len());
        Ok(path)
    }

    /// Verify an artifact against its manifest entry
    ///
    /// Fails with `ArtifactMissing` when absent. On a length or digest
    /// mismatch the corrupt file is deleted first, then the error surfaces,
    /// so a retry can re-download.
    pub fn verify(&self, entry: &ReleaseEntry) -> Result<()> {
        let path = self.path(entry);

        if !self.fs.exists(&path) {
            return Err(Error::ArtifactMissing(entry.filename.clone()));
        }

        let actual_len = self.fs.file_len(&path)?;
        if actual_len != entry.filesize {
            self.evict(&path);
            return Err(Error::SizeMismatch {
                filename: entry.filename.clone(),
                expected: entry.filesize,
                actual: actual_len,
            });
        }

        let mut reader = self.fs.open(&path)?;
        let actual_sha1 = hash::sha1_reader(&mut reader)?;
        if !hash::eq_hex(&actual_sha1, &entry.sha1) {
            self.evict(&path);
            return Err(Error::DigestMismatch {
                filename: entry.filename.clone(),
                expected: entry.sha1.clone(),
                actual: actual_sha1,
            });
        }

        debug!("verified {}", entry.filename);
        Ok(())
    }

    /// Whether an entry's artifact exists and passes verification
    pub fn has_valid(&self, entry: &ReleaseEntry) -> bool {
        self.verify(entry).is_ok()
    }

    fn evict(&self, path: &Path) {
        match self.fs.remove_file(path) {
            Ok(()) => warn!("deleted corrupt artifact: {}", path.display()),
            Err(e) => warn!(
                "failed to delete corrupt artifact {}: {}",
                path.display(),
                e
            ),
        }
    }
}

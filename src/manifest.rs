// src/manifest.rs

//! The RELEASES manifest codec
//!
//! The manifest is a plain-text catalog with one release per line:
//! `<sha1-hex> <filename> <filesize>`. Lines starting with `#` and blank
//! lines are ignored. A single malformed line fails the whole parse with its
//! line number; the decoder never returns a partial catalog.
//!
//! The local manifest at `<root>/packages/RELEASES` is authoritative: it is
//! rewritten only after a successful install, by rescanning the artifacts
//! that actually exist on disk.

use crate::error::{Error, Result};
use crate::fsio::FileSystem;
use crate::hash;
use crate::version::{self, PackageName, PackageVersion};
use std::path::Path;
use tracing::{debug, warn};

/// Name of the manifest file inside the packages directory
pub const RELEASES_FILE: &str = "RELEASES";

/// One release in the catalog: a full or delta package artifact
///
/// Identity is the (`filename`, `sha1`) pair; two entries with the same name
/// but different digests are different releases.
#[derive(Debug, Clone)]
pub struct ReleaseEntry {
    /// SHA-1 of the artifact, lowercase hex
    pub sha1: String,
    /// Artifact file name, lowercase, no path separators
    pub filename: String,
    /// Artifact length in bytes
    pub filesize: u64,
    /// Package id parsed from the file name
    pub package_id: String,
    /// Version parsed from the file name
    pub version: PackageVersion,
    /// True iff this is a delta package
    pub is_delta: bool,
    /// Optional per-entry download base, overriding the feed source
    pub base_url: Option<String>,
}

impl ReleaseEntry {
    /// Build an entry from its manifest fields, deriving version metadata
    /// from the file name
    pub fn new(sha1: &str, filename: &str, filesize: u64) -> Result<Self> {
        if !hash::is_sha1_hex(sha1) {
            return Err(Error::InvalidPackageName(format!(
                "'{}' is not a SHA-1 hex digest",
                sha1
            )));
        }
        if filename.contains('/') || filename.contains('\\') {
            return Err(Error::InvalidPackageName(format!(
                "'{}' contains a path separator",
                filename
            )));
        }
        let name = PackageName::parse(filename)?;

        Ok(Self {
            sha1: sha1.to_ascii_lowercase(),
            filename: filename.to_ascii_lowercase(),
            package_id: name.package_id,
            version: name.version,
            is_delta: name.is_delta,
            filesize,
            base_url: None,
        })
    }

    /// Build an entry by hashing and measuring an artifact on disk
    ///
    /// Used after composing a full package from deltas, and when rebuilding
    /// the manifest from the packages directory.
    pub fn from_file(fs: &dyn FileSystem, path: &Path) -> Result<Self> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidPackageName(format!("{}", path.display())))?;

        let mut reader = fs.open(path)?;
        let sha1 = hash::sha1_reader(&mut reader)?;
        let filesize = fs.file_len(path)?;

        Self::new(&sha1, filename, filesize)
    }

    /// Serialize as one manifest line (no terminator)
    pub fn to_line(&self) -> String {
        format!("{} {} {}", self.sha1, self.filename, self.filesize)
    }
}

// Identity is (filename, sha1); both are stored lowercase.
impl PartialEq for ReleaseEntry {
    fn eq(&self, other: &Self) -> bool {
        self.filename == other.filename && self.sha1 == other.sha1
    }
}

impl Eq for ReleaseEntry {}

impl std::hash::Hash for ReleaseEntry {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.filename.hash(state);
        self.sha1.hash(state);
    }
}

/// An ordered catalog of release entries
///
/// Duplicate file names are permitted; they denote historical full releases
/// superseded by deltas.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    entries: Vec<ReleaseEntry>,
}

impl Manifest {
    pub fn new(entries: Vec<ReleaseEntry>) -> Self {
        Self { entries }
    }

    /// Parse manifest text; all-or-nothing
    pub fn parse(text: &str) -> Result<Self> {
        let mut entries = Vec::new();

        for (idx, line) in text.lines().enumerate() {
            let line_no = idx + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = trimmed.split_whitespace().collect();
            if fields.len() != 3 {
                return Err(Error::CorruptManifest {
                    line: line_no,
                    reason: format!("expected 3 fields, found {}", fields.len()),
                });
            }

            let filesize: u64 = fields[2].parse().map_err(|_| Error::CorruptManifest {
                line: line_no,
                reason: format!("'{}' is not a file size", fields[2]),
            })?;

            let entry =
                ReleaseEntry::new(fields[0], fields[1], filesize).map_err(|e| {
                    Error::CorruptManifest {
                        line: line_no,
                        reason: e.to_string(),
                    }
                })?;
            entries.push(entry);
        }

        Ok(Self { entries })
    }

    /// Serialize in entry order, one `\n`-terminated line per entry
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&entry.to_line());
            out.push('\n');
        }
        out
    }

    #[inline]
    pub fn entries(&self) -> &[ReleaseEntry] {
        &self.entries
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The non-delta entry with the highest version, if any
    pub fn latest_full(&self) -> Option<&ReleaseEntry> {
        self.entries
            .iter()
            .filter(|e| !e.is_delta)
            .max_by(|a, b| a.version.cmp(&b.version))
    }

    /// The catalog's logical current version: the largest among non-delta
    /// entries
    pub fn current_version(&self) -> Option<PackageVersion> {
        self.latest_full().map(|e| e.version)
    }

    /// Load and parse `<dir>/RELEASES`; `Ok(None)` when the file is absent
    pub fn load(fs: &dyn FileSystem, dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(RELEASES_FILE);
        if !fs.exists(&path) {
            return Ok(None);
        }
        let bytes = fs.read(&path)?;
        let text = String::from_utf8(bytes).map_err(|_| Error::CorruptManifest {
            line: 0,
            reason: "manifest is not valid UTF-8".to_string(),
        })?;
        Ok(Some(Self::parse(&text)?))
    }

    /// Write `<dir>/RELEASES` atomically, UTF-8 without BOM
    pub fn store(&self, fs: &dyn FileSystem, dir: &Path) -> Result<()> {
        let path = dir.join(RELEASES_FILE);
        fs.write_atomic(&path, self.serialize().as_bytes())?;
        debug!("wrote {} entries to {}", self.entries.len(), path.display());
        Ok(())
    }

    /// Rebuild the catalog from the `.nupkg` files actually present in a
    /// directory
    ///
    /// Every artifact is re-hashed; files that are not well-formed package
    /// names are skipped with a warning. Entries are ordered ascending by
    /// version, full packages before deltas on ties.
    pub fn rebuild_from_dir(fs: &dyn FileSystem, dir: &Path) -> Result<Self> {
        let mut entries = Vec::new();

        for path in fs.list_dir(dir)? {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.to_ascii_lowercase().ends_with(version::PACKAGE_EXT) {
                continue;
            }
            if !version::is_package_filename(name) {
                warn!("skipping unrecognized package file: {}", name);
                continue;
            }
            entries.push(ReleaseEntry::from_file(fs, &path)?);
        }

        entries.sort_by(|a, b| {
            version::release_order(&a.version, a.is_delta, &b.version, b.is_delta)
        });

        debug!(
            "rebuilt manifest from {}: {} entries",
            dir.display(),
            entries.len()
        );
        Ok(Self { entries })
    }
}

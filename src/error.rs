// src/error.rs

//! Crate-wide error type and result alias
//!
//! Every failure the update engine can surface is a variant here. Artifact
//! verification failures (`SizeMismatch`, `DigestMismatch`) are raised only
//! after the offending file has been deleted, so a retry can re-download.

use crate::version::PackageVersion;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the update engine
#[derive(Debug, Error)]
pub enum Error {
    /// A RELEASES manifest failed to parse; no entries are returned
    #[error("corrupt manifest at line {line}: {reason}")]
    CorruptManifest { line: usize, reason: String },

    /// The remote feed is unusable (empty, or inconsistent with local state)
    #[error("corrupt remote manifest: {0}")]
    CorruptRemoteManifest(String),

    /// A package file name does not follow `<id>-<version>(-delta)?.nupkg`
    #[error("invalid package file name: {0}")]
    InvalidPackageName(String),

    /// Network or local-source read failed
    #[error("transport failure: {0}")]
    Transport(String),

    /// The artifact named by a manifest entry is absent from packages/
    #[error("artifact missing from package store: {0}")]
    ArtifactMissing(String),

    /// On-disk length differs from the manifest entry (file was deleted)
    #[error("size mismatch for {filename}: manifest says {expected} bytes, file has {actual}")]
    SizeMismatch {
        filename: String,
        expected: u64,
        actual: u64,
    },

    /// On-disk SHA-1 differs from the manifest entry (file was deleted)
    #[error("digest mismatch for {filename}: expected {expected}, got {actual}")]
    DigestMismatch {
        filename: String,
        expected: String,
        actual: String,
    },

    /// An update plan contains both full and delta packages
    #[error("update plan mixes full and delta packages")]
    MixedFullAndDelta,

    /// The delta applier failed while composing a full package
    #[error("delta application failed at version {version}: {reason}")]
    DeltaApplicationFailed {
        version: PackageVersion,
        reason: String,
    },

    /// The machine-wide install lock could not be acquired in time
    #[error("another update is already running for this installation root")]
    AnotherInstanceActive,

    /// A lifecycle hook failed during an install phase
    #[error("{phase} hook failed for {target}: {reason}")]
    HookFailed {
        target: String,
        phase: String,
        reason: String,
    },

    /// A package archive could not be read or written
    #[error("archive error in {name}: {reason}")]
    Archive { name: String, reason: String },

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a transport error from any displayable cause
    pub fn transport(cause: impl std::fmt::Display) -> Self {
        Self::Transport(cause.to_string())
    }
}

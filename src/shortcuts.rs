// src/shortcuts.rs

//! Shortcut link files, tombstones, and pinned-shortcut retargeting
//!
//! Shortcuts are small JSON link files in a configured directory, one per
//! shortcut name. The engine remembers every link it has created; when a
//! previously created link is found missing, the user deleted it by hand and
//! its name becomes a tombstone that is never recreated.
//!
//! Pinned shortcuts live in a separate directory the user controls. After an
//! install, every pinned link whose target points into an old version
//! directory is rewritten to the new one, preserving the relative subpath; a
//! link whose rewritten target does not exist is unpinned (removed).

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File extension for link files
const LINK_EXT: &str = "shortcut.json";

/// A shortcut to create for an installed version
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShortcutRequest {
    /// Display name; doubles as the link file name
    pub name: String,
    /// Absolute path the shortcut launches
    pub target: PathBuf,
    /// Arguments passed to the target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
    /// Icon path, when distinct from the target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<PathBuf>,
}

impl ShortcutRequest {
    pub fn new(name: impl Into<String>, target: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            arguments: None,
            icon: None,
        }
    }
}

/// Ledger of created links and tombstones, kept next to the packages
#[derive(Debug, Default, Serialize, Deserialize)]
struct ShortcutLedger {
    /// Names of links this engine has created
    #[serde(default)]
    created: Vec<String>,
    /// Names the user deleted by hand, with the time of detection
    #[serde(default)]
    tombstones: BTreeMap<String, DateTime<Utc>>,
}

/// Manages the shortcut directory for one installation root
pub struct ShortcutStore {
    /// Where link files are created
    link_dir: PathBuf,
    /// Ledger path, inside the packages directory
    ledger_path: PathBuf,
}

impl ShortcutStore {
    pub fn new(link_dir: PathBuf, packages_dir: &Path) -> Self {
        Self {
            link_dir,
            ledger_path: packages_dir.join(".shortcuts.json"),
        }
    }

    fn link_path(&self, name: &str) -> PathBuf {
        self.link_dir.join(format!("{}.{}", name, LINK_EXT))
    }

    fn load_ledger(&self) -> ShortcutLedger {
        match fs::read(&self.ledger_path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!("shortcut ledger unreadable, starting fresh: {}", e);
                ShortcutLedger::default()
            }),
            Err(_) => ShortcutLedger::default(),
        }
    }

    fn store_ledger(&self, ledger: &ShortcutLedger) -> Result<()> {
        if let Some(parent) = self.ledger_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(ledger)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(&self.ledger_path, json)?;
        Ok(())
    }

    /// Create or refresh link files for the given requests
    ///
    /// A link whose name is tombstoned is skipped. A link recorded as created
    /// but missing from disk becomes a tombstone instead of being recreated.
    pub fn sync(&self, requests: &[ShortcutRequest]) -> Result<()> {
        let mut ledger = self.load_ledger();
        fs::create_dir_all(&self.link_dir)?;

        for request in requests {
            if ledger.tombstones.contains_key(&request.name) {
                debug!("shortcut '{}' is tombstoned, not recreating", request.name);
                continue;
            }

            let path = self.link_path(&request.name);
            let previously_created = ledger.created.iter().any(|n| n == &request.name);
            if previously_created && !path.exists() {
                info!(
                    "shortcut '{}' was deleted by the user; tombstoning",
                    request.name
                );
                ledger.tombstones.insert(request.name.clone(), Utc::now());
                continue;
            }

            let json = serde_json::to_vec_pretty(request)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            fs::write(&path, json)?;
            if !previously_created {
                ledger.created.push(request.name.clone());
            }
            debug!("wrote shortcut '{}' -> {}", request.name, request.target.display());
        }

        self.store_ledger(&ledger)
    }

    /// Remove every link this engine created, and the ledger
    pub fn remove_all(&self) -> Result<()> {
        let ledger = self.load_ledger();
        for name in &ledger.created {
            let path = self.link_path(name);
            if path.exists() {
                if let Err(e) = fs::remove_file(&path) {
                    warn!("failed to remove shortcut '{}': {}", name, e);
                }
            }
        }
        if self.ledger_path.exists() {
            fs::remove_file(&self.ledger_path)?;
        }
        Ok(())
    }
}

/// Rewrite pinned links after a version change
///
/// Every link file in `pinned_dir` whose target points into one of
/// `old_dirs` is retargeted into `new_dir`, keeping the relative subpath.
/// When the rewritten target does not exist the link is unpinned (removed).
/// Best-effort throughout: an unreadable link is left alone.
pub fn retarget_pinned(pinned_dir: &Path, old_dirs: &[PathBuf], new_dir: &Path) {
    let entries = match fs::read_dir(pinned_dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("no pinned shortcuts at {}: {}", pinned_dir.display(), e);
            return;
        }
    };

    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(LINK_EXT))
        {
            continue;
        }

        let Ok(bytes) = fs::read(&path) else { continue };
        let Ok(mut request) = serde_json::from_slice::<ShortcutRequest>(&bytes) else {
            continue;
        };

        let Some(rel) = old_dirs
            .iter()
            .find_map(|old| request.target.strip_prefix(old).ok())
        else {
            continue;
        };

        let new_target = new_dir.join(rel);
        if new_target.exists() {
            info!(
                "retargeting pinned shortcut {} -> {}",
                path.display(),
                new_target.display()
            );
            request.target = new_target;
            if let Ok(json) = serde_json::to_vec_pretty(&request) {
                if let Err(e) = fs::write(&path, json) {
                    warn!("failed to rewrite pinned shortcut {}: {}", path.display(), e);
                }
            }
        } else {
            info!(
                "unpinning {}: target {} does not exist",
                path.display(),
                new_target.display()
            );
            if let Err(e) = fs::remove_file(&path) {
                warn!("failed to unpin {}: {}", path.display(), e);
            }
        }
    }
}

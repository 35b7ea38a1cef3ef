// src/lib.rs

//! Squall - client-side application update engine
//!
//! Reconciles a locally installed application against a remote release feed:
//! computes a minimal update plan, downloads and verifies package artifacts,
//! folds delta packages into full ones, and rotates `app-<version>`
//! directories so the next launch runs the new version. Designed to be
//! wrapped by a desktop auto-updater; the UI, scheduler, and the hosted
//! application's install hooks are external collaborators.
//!
//! # Architecture
//!
//! - Feed-first: all state lives in `packages/RELEASES` and the directory
//!   layout; there is no database
//! - Crash-safe: the manifest is rewritten only after a successful install,
//!   so an interrupted pipeline is invisible to the next run
//! - Verified: every artifact is checked by length and SHA-1, and corrupt
//!   files are evicted so retries start clean
//! - Serialized: a machine-wide lock admits one pipeline per installation
//!   root
//!
//! # Core modules
//!
//! - [`manifest`] - the RELEASES catalog codec and rebuild-from-disk
//! - [`version`] - package versions and release file naming
//! - [`store`] - the verified artifact store under `packages/`
//! - [`planner`] - local/remote diffing into an update plan
//! - [`delta`] - delta application and chain composition
//! - [`install`] - extraction, lifecycle hooks, directory rotation
//! - [`manager`] - the pipeline: check, download, apply, uninstall
//! - [`source`] - release feeds over HTTP(S) or a local directory
//! - [`lock`] - the machine-wide install lock
//! - [`setup`] - the hosted application's lifecycle capability
//! - [`shortcuts`] - link files, tombstones, pinned retargeting
//! - [`progress`] - progress sinks and the percent scale
//! - [`fsio`] - the injectable filesystem seam
//! - [`hash`] - SHA-1 helpers

pub mod delta;
mod error;
pub mod fsio;
pub mod hash;
pub mod install;
pub mod lock;
pub mod manager;
pub mod manifest;
pub mod planner;
pub mod progress;
pub mod setup;
pub mod shortcuts;
pub mod source;
pub mod store;
pub mod version;

pub use delta::{DeltaApplier, DeltaComposer, OverlayDeltaApplier};
pub use error::{Error, Result};
pub use install::Installer;
pub use lock::InstallLock;
pub use manager::{default_install_root, UpdateConfig, UpdateManager};
pub use manifest::{Manifest, ReleaseEntry};
pub use planner::{FrameworkTarget, UpdateInfo};
pub use progress::{
    CallbackProgress, LogProgress, PercentScope, ProgressEvent, ProgressTracker, SilentProgress,
};
pub use setup::{HookPhase, Setup, SetupRunner};
pub use shortcuts::{ShortcutRequest, ShortcutStore};
pub use source::UpdateSource;
pub use store::PackageStore;
pub use version::{PackageName, PackageVersion};

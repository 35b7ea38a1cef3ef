// src/setup.rs

//! The `AppSetup` capability: per-version lifecycle hooks
//!
//! An installed version directory may contain executables that participate in
//! their own install lifecycle. Hosted code never runs inside this process:
//! every probe and every hook is a subprocess with a hard timeout, nulled
//! stdin, and captured output.
//!
//! Discovery probes each `*.exe` in the version directory; an executable that
//! answers the probe with a JSON descriptor is a discovered setup. One that
//! does not answer gets a default setup synthesized from its file name.
//! Install-phase hook failures abort the install; uninstall-phase failures
//! are logged and swallowed, because a broken old version must never block a
//! new install.

use crate::error::{Error, Result};
use crate::shortcuts::ShortcutRequest;
use crate::version::PackageVersion;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

/// Flag understood by hook-capable application executables
pub const HOOK_FLAG: &str = "--update-hook";

/// Default timeout for a probe or hook subprocess (10 seconds)
const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifecycle phases delivered to setups
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    /// First install on this machine
    AppInstall,
    /// Complete removal from this machine
    AppUninstall,
    /// A version just became current
    VersionInstalled,
    /// A version is about to be removed
    VersionUninstalling,
}

impl HookPhase {
    /// Argument value passed to the executable
    pub fn as_arg(&self) -> &'static str {
        match self {
            Self::AppInstall => "install",
            Self::AppUninstall => "uninstall",
            Self::VersionInstalled => "version-installed",
            Self::VersionUninstalling => "version-uninstalling",
        }
    }

    /// Install phases are fatal on failure; uninstall phases are swallowed
    pub fn is_install_phase(&self) -> bool {
        matches!(self, Self::AppInstall | Self::VersionInstalled)
    }
}

impl std::fmt::Display for HookPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_arg())
    }
}

/// What a hook-capable executable prints in answer to a probe
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeReply {
    pub shortcut_name: String,
    /// Path of the main executable, relative to the version directory
    pub target: Option<PathBuf>,
    #[serde(default)]
    pub launch_on_setup: bool,
    /// Additional shortcuts beyond the main one
    #[serde(default)]
    pub shortcuts: Vec<ShortcutRequest>,
}

/// A setup participant for one executable
#[derive(Debug, Clone)]
pub enum Setup {
    /// The executable answered the probe and receives lifecycle hooks
    Discovered {
        exe: PathBuf,
        shortcut_name: String,
        target: PathBuf,
        launch_on_setup: bool,
        shortcuts: Vec<ShortcutRequest>,
    },
    /// Synthesized from the file itself; hooks are no-ops
    Default {
        exe: PathBuf,
        shortcut_name: String,
        launch_on_setup: bool,
    },
}

impl Setup {
    pub fn shortcut_name(&self) -> &str {
        match self {
            Self::Discovered { shortcut_name, .. } | Self::Default { shortcut_name, .. } => {
                shortcut_name
            }
        }
    }

    /// Path launched by shortcuts and by launch-on-setup
    pub fn target(&self) -> &Path {
        match self {
            Self::Discovered { target, .. } => target,
            Self::Default { exe, .. } => exe,
        }
    }

    pub fn launch_on_setup(&self) -> bool {
        match self {
            Self::Discovered {
                launch_on_setup, ..
            }
            | Self::Default {
                launch_on_setup, ..
            } => *launch_on_setup,
        }
    }

    /// The shortcut list this setup wants created
    pub fn shortcut_requests(&self) -> Vec<ShortcutRequest> {
        match self {
            Self::Discovered {
                shortcut_name,
                target,
                shortcuts,
                ..
            } => {
                let mut all = vec![ShortcutRequest::new(shortcut_name, target)];
                all.extend(shortcuts.iter().cloned());
                all
            }
            Self::Default {
                exe, shortcut_name, ..
            } => vec![ShortcutRequest::new(shortcut_name, exe)],
        }
    }
}

/// Discovers setups and runs their lifecycle hooks in subprocesses
#[derive(Debug, Clone)]
pub struct SetupRunner {
    timeout: Duration,
}

impl Default for SetupRunner {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_HOOK_TIMEOUT,
        }
    }
}

impl SetupRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enumerate `*.exe` files in a version directory and probe each
    ///
    /// Never fails: an unreadable directory yields no setups, and a probe
    /// failure degrades that executable to a default setup. The first
    /// executable (sorted by name) carries launch-on-setup when it has to be
    /// synthesized.
    pub fn discover(&self, version_dir: &Path) -> Vec<Setup> {
        let mut exes: Vec<PathBuf> = match std::fs::read_dir(version_dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    p.extension()
                        .and_then(|x| x.to_str())
                        .is_some_and(|x| x.eq_ignore_ascii_case("exe"))
                })
                .collect(),
            Err(e) => {
                warn!(
                    "cannot enumerate setups in {}: {}",
                    version_dir.display(),
                    e
                );
                return Vec::new();
            }
        };
        exes.sort();

        let mut setups = Vec::new();
        for (idx, exe) in exes.iter().enumerate() {
            match self.probe(exe) {
                Some(reply) => {
                    let target = match &reply.target {
                        Some(rel) => version_dir.join(rel),
                        None => exe.clone(),
                    };
                    debug!("discovered setup in {}", exe.display());
                    setups.push(Setup::Discovered {
                        exe: exe.clone(),
                        shortcut_name: reply.shortcut_name,
                        target,
                        launch_on_setup: reply.launch_on_setup,
                        shortcuts: reply.shortcuts,
                    });
                }
                None => {
                    let name = exe
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "application".to_string());
                    debug!("synthesized default setup for {}", exe.display());
                    setups.push(Setup::Default {
                        exe: exe.clone(),
                        shortcut_name: name,
                        launch_on_setup: idx == 0,
                    });
                }
            }
        }
        setups
    }

    /// Probe one executable; `None` when it is not hook-capable
    fn probe(&self, exe: &Path) -> Option<ProbeReply> {
        let output = self.run(exe, &[HOOK_FLAG, "probe"]);
        match output {
            Ok(stdout) => match serde_json::from_str::<ProbeReply>(&stdout) {
                Ok(reply) => Some(reply),
                Err(e) => {
                    debug!("{} probe reply not understood: {}", exe.display(), e);
                    None
                }
            },
            Err(e) => {
                // Plugin load failure is non-fatal; fall back to a default.
                warn!("probe of {} failed: {}", exe.display(), e);
                None
            }
        }
    }

    /// Deliver one lifecycle hook to a discovered setup
    ///
    /// Default setups accept every phase as a no-op. Failures surface as
    /// `HookFailed`; the caller decides whether the phase is fatal.
    pub fn run_hook(
        &self,
        setup: &Setup,
        phase: HookPhase,
        version: Option<&PackageVersion>,
    ) -> Result<()> {
        let Setup::Discovered { exe, .. } = setup else {
            return Ok(());
        };

        let version_arg;
        let mut args = vec![HOOK_FLAG, phase.as_arg()];
        if let Some(v) = version {
            version_arg = v.to_string();
            args.push("--version");
            args.push(&version_arg);
        }

        info!("running {} hook: {}", phase, exe.display());
        self.run(exe, &args)
            .map(|_| ())
            .map_err(|reason| Error::HookFailed {
                target: exe.display().to_string(),
                phase: phase.to_string(),
                reason,
            })
    }

    /// Deliver an uninstall-phase hook, swallowing failures
    pub fn run_hook_swallowed(
        &self,
        setup: &Setup,
        phase: HookPhase,
        version: Option<&PackageVersion>,
    ) {
        if let Err(e) = self.run_hook(setup, phase, version) {
            warn!("ignoring {} hook failure: {}", phase, e);
        }
    }

    /// Spawn, bound by the timeout, capture stdout; error string on any
    /// failure
    fn run(&self, exe: &Path, args: &[&str]) -> std::result::Result<String, String> {
        let mut child = Command::new(exe)
            .args(args)
            .current_dir(exe.parent().unwrap_or(Path::new(".")))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format!("failed to spawn: {}", e))?;

        match child
            .wait_timeout(self.timeout)
            .map_err(|e| format!("wait failed: {}", e))?
        {
            Some(status) => {
                let output = child
                    .wait_with_output()
                    .map_err(|e| format!("output capture failed: {}", e))?;
                let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                let stderr = String::from_utf8_lossy(&output.stderr);
                for line in stderr.lines() {
                    debug!("[{}] {}", exe.display(), line);
                }

                if status.success() {
                    Ok(stdout)
                } else {
                    Err(format!(
                        "exit code {}",
                        status.code().unwrap_or(-1)
                    ))
                }
            }
            None => {
                let _ = child.kill();
                Err(format!("timed out after {:?}", self.timeout))
            }
        }
    }
}

// tests/common/mod.rs

//! Shared fixtures for integration tests: release feeds, zip packages, and
//! hook-capable fake executables.

#![allow(dead_code)]

use squall::hash;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// A zip entry for a test package: (archive path, contents, unix mode)
pub struct PackageEntry {
    pub path: String,
    pub data: Vec<u8>,
    pub mode: Option<u32>,
}

impl PackageEntry {
    pub fn file(path: &str, data: &[u8]) -> Self {
        Self {
            path: path.to_string(),
            data: data.to_vec(),
            mode: None,
        }
    }

    pub fn executable(path: &str, data: &[u8]) -> Self {
        Self {
            path: path.to_string(),
            data: data.to_vec(),
            mode: Some(0o755),
        }
    }
}

/// Write a `.nupkg` (zip) with the given entries
pub fn write_package(path: &Path, entries: &[PackageEntry]) {
    let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
    for entry in entries {
        let mut options = zip::write::SimpleFileOptions::default();
        if let Some(mode) = entry.mode {
            options = options.unix_permissions(mode);
        }
        writer.start_file(entry.path.as_str(), options).unwrap();
        writer.write_all(&entry.data).unwrap();
    }
    writer.finish().unwrap();
}

/// Shell script posing as a hook-capable application executable
///
/// Answers the probe with a JSON descriptor and appends every other hook
/// invocation to `log_path` as `<phase> <version>` lines.
pub fn hook_exe_script(shortcut_name: &str, launch_on_setup: bool, log_path: &Path) -> Vec<u8> {
    format!(
        r#"#!/bin/sh
if [ "$1" = "--update-hook" ] && [ "$2" = "probe" ]; then
  echo '{{"shortcut_name": "{name}", "launch_on_setup": {launch}}}'
  exit 0
fi
if [ "$1" = "--update-hook" ]; then
  echo "$2 $4" >> "{log}"
fi
exit 0
"#,
        name = shortcut_name,
        launch = launch_on_setup,
        log = log_path.display()
    )
    .into_bytes()
}

/// A release feed directory under construction
pub struct FeedBuilder {
    pub dir: PathBuf,
    lines: Vec<String>,
}

impl FeedBuilder {
    pub fn new(dir: &Path) -> Self {
        fs::create_dir_all(dir).unwrap();
        Self {
            dir: dir.to_path_buf(),
            lines: Vec::new(),
        }
    }

    /// Add a package built from entries; returns its manifest line
    pub fn add_package(&mut self, filename: &str, entries: &[PackageEntry]) -> String {
        let path = self.dir.join(filename);
        write_package(&path, entries);
        let bytes = fs::read(&path).unwrap();
        let line = format!("{} {} {}", hash::sha1_bytes(&bytes), filename, bytes.len());
        self.lines.push(line.clone());
        self.write_releases();
        line
    }

    /// Add a raw (possibly corrupt) artifact with an advertised digest/size
    /// that may not match the delivered bytes
    pub fn add_raw(&mut self, filename: &str, delivered: &[u8], advertised_line: &str) {
        fs::write(self.dir.join(filename), delivered).unwrap();
        self.lines.push(advertised_line.to_string());
        self.write_releases();
    }

    fn write_releases(&self) {
        let text: String = self.lines.iter().map(|l| format!("{}\n", l)).collect();
        fs::write(self.dir.join("RELEASES"), text).unwrap();
    }
}

/// Standard single-executable application package contents
///
/// The executable answers probes as `shortcut_name` and logs hook calls to
/// `log_path`.
pub fn app_package_entries(
    shortcut_name: &str,
    version_marker: &str,
    log_path: &Path,
) -> Vec<PackageEntry> {
    vec![
        PackageEntry::executable(
            "lib/net45/myapp.exe",
            &hook_exe_script(shortcut_name, true, log_path),
        ),
        PackageEntry::file("lib/net45/version.txt", version_marker.as_bytes()),
    ]
}

/// Read the hook log as lines; empty when no hook has run
pub fn hook_log_lines(log_path: &Path) -> Vec<String> {
    match fs::read_to_string(log_path) {
        Ok(text) => text.lines().map(|l| l.trim().to_string()).collect(),
        Err(_) => Vec::new(),
    }
}

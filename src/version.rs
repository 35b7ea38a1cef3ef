// src/version.rs

//! Package versions and release file naming
//!
//! Versions are up to four numeric components (`major.minor.build.revision`);
//! trailing components default to zero. Package files are named
//! `<packageId>-<version>.nupkg`, with a `-delta` suffix before the extension
//! marking delta packages. The version is always recoverable from the file
//! name.

use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Package file extension
pub const PACKAGE_EXT: &str = ".nupkg";

/// Suffix that marks a delta package, before the extension
pub const DELTA_SUFFIX: &str = "-delta";

/// A four-component package version
///
/// Comparison and equality look at all four components, so `1.0` and
/// `1.0.0.0` are equal. The number of components the version was written
/// with is remembered for display, so directory names like `app-1.0.0`
/// round-trip exactly.
#[derive(Debug, Clone, Copy)]
pub struct PackageVersion {
    parts: [u64; 4],
    shown: u8,
}

impl PackageVersion {
    /// Build a version from explicit components, displayed as written
    pub fn new(major: u64, minor: u64, build: u64, revision: u64) -> Self {
        Self {
            parts: [major, minor, build, revision],
            shown: 4,
        }
    }

    #[inline]
    pub fn major(&self) -> u64 {
        self.parts[0]
    }

    #[inline]
    pub fn minor(&self) -> u64 {
        self.parts[1]
    }

    #[inline]
    pub fn build(&self) -> u64 {
        self.parts[2]
    }

    #[inline]
    pub fn revision(&self) -> u64 {
        self.parts[3]
    }
}

impl FromStr for PackageVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::InvalidPackageName("empty version".to_string()));
        }

        let mut parts = [0u64; 4];
        let mut count = 0usize;
        for component in s.split('.') {
            if count == 4 {
                return Err(Error::InvalidPackageName(format!(
                    "version '{}' has more than four components",
                    s
                )));
            }
            parts[count] = component.parse::<u64>().map_err(|_| {
                Error::InvalidPackageName(format!("non-numeric version component in '{}'", s))
            })?;
            count += 1;
        }

        Ok(Self {
            parts,
            shown: count as u8,
        })
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = self.shown.max(1) as usize;
        let mut first = true;
        for part in &self.parts[..shown] {
            if !first {
                write!(f, ".")?;
            }
            write!(f, "{}", part)?;
            first = false;
        }
        Ok(())
    }
}

impl PartialEq for PackageVersion {
    fn eq(&self, other: &Self) -> bool {
        self.parts == other.parts
    }
}

impl Eq for PackageVersion {}

impl std::hash::Hash for PackageVersion {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.parts.hash(state);
    }
}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.parts.cmp(&other.parts)
    }
}

impl PartialOrd for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The parsed pieces of a release file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageName {
    /// Everything before the trailing `-<version>` suffix
    pub package_id: String,
    /// Version parsed out of the file name
    pub version: PackageVersion,
    /// True iff the name carries the `-delta` suffix
    pub is_delta: bool,
}

impl PackageName {
    /// Parse `<packageId>-<version>(-delta)?.nupkg`, case-insensitively
    pub fn parse(filename: &str) -> Result<Self> {
        let lower = filename.to_ascii_lowercase();

        let stem = lower.strip_suffix(PACKAGE_EXT).ok_or_else(|| {
            Error::InvalidPackageName(format!("'{}' does not end with {}", filename, PACKAGE_EXT))
        })?;

        let (stem, is_delta) = match stem.strip_suffix(DELTA_SUFFIX) {
            Some(rest) => (rest, true),
            None => (stem, false),
        };

        let dash = stem.rfind('-').ok_or_else(|| {
            Error::InvalidPackageName(format!("'{}' has no version suffix", filename))
        })?;
        let (package_id, version_str) = stem.split_at(dash);
        let version: PackageVersion = version_str[1..].parse().map_err(|_| {
            Error::InvalidPackageName(format!("'{}' has no parseable version", filename))
        })?;

        if package_id.is_empty() {
            return Err(Error::InvalidPackageName(format!(
                "'{}' has an empty package id",
                filename
            )));
        }

        Ok(Self {
            package_id: package_id.to_string(),
            version,
            is_delta,
        })
    }

    /// Canonical file name for the full package of this id and version
    pub fn full_filename(&self) -> String {
        format!("{}-{}{}", self.package_id, self.version, PACKAGE_EXT)
    }

    /// Canonical file name for the delta package of this id and version
    pub fn delta_filename(&self) -> String {
        format!(
            "{}-{}{}{}",
            self.package_id, self.version, DELTA_SUFFIX, PACKAGE_EXT
        )
    }
}

/// True iff the file name is a well-formed release package name
pub fn is_package_filename(filename: &str) -> bool {
    PackageName::parse(filename).is_ok()
}

/// Directory name for an installed version, e.g. `app-1.2.3`
pub fn app_dir_name(version: &PackageVersion) -> String {
    format!("app-{}", version)
}

/// Parse the version out of an `app-<version>` directory name
pub fn parse_app_dir_name(name: &str) -> Option<PackageVersion> {
    name.strip_prefix("app-")?.parse().ok()
}

/// Release ordering: by version, full packages before deltas on ties
pub fn release_order(
    a_version: &PackageVersion,
    a_delta: bool,
    b_version: &PackageVersion,
    b_delta: bool,
) -> Ordering {
    a_version
        .cmp(b_version)
        .then_with(|| a_delta.cmp(&b_delta))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parse_defaults() {
        let v: PackageVersion = "1.2".parse().unwrap();
        assert_eq!(v, PackageVersion::new(1, 2, 0, 0));
        assert_eq!(v.to_string(), "1.2");

        let v: PackageVersion = "3".parse().unwrap();
        assert_eq!(v, PackageVersion::new(3, 0, 0, 0));
    }

    #[test]
    fn test_version_parse_four_components() {
        let v: PackageVersion = "1.2.3.4".parse().unwrap();
        assert_eq!(v.major(), 1);
        assert_eq!(v.minor(), 2);
        assert_eq!(v.build(), 3);
        assert_eq!(v.revision(), 4);
        assert_eq!(v.to_string(), "1.2.3.4");
    }

    #[test]
    fn test_version_parse_rejects_junk() {
        assert!("".parse::<PackageVersion>().is_err());
        assert!("1.x".parse::<PackageVersion>().is_err());
        assert!("1.2.3.4.5".parse::<PackageVersion>().is_err());
        assert!("-1.0".parse::<PackageVersion>().is_err());
    }

    #[test]
    fn test_version_equality_ignores_precision() {
        let a: PackageVersion = "1.0".parse().unwrap();
        let b: PackageVersion = "1.0.0.0".parse().unwrap();
        assert_eq!(a, b);
        // Display still differs
        assert_eq!(a.to_string(), "1.0");
        assert_eq!(b.to_string(), "1.0.0.0");
    }

    #[test]
    fn test_version_ordering() {
        let v110: PackageVersion = "1.1.0".parse().unwrap();
        let v120: PackageVersion = "1.2.0".parse().unwrap();
        let v1191: PackageVersion = "1.1.9.1".parse().unwrap();
        assert!(v110 < v120);
        assert!(v110 < v1191);
        assert!(v1191 < v120);
    }

    #[test]
    fn test_package_name_full() {
        let name = PackageName::parse("MyApp-1.2.3.nupkg").unwrap();
        assert_eq!(name.package_id, "myapp");
        assert_eq!(name.version, PackageVersion::new(1, 2, 3, 0));
        assert!(!name.is_delta);
        assert_eq!(name.full_filename(), "myapp-1.2.3.nupkg");
    }

    #[test]
    fn test_package_name_delta() {
        let name = PackageName::parse("MyApp-1.2.3-DELTA.nupkg").unwrap();
        assert!(name.is_delta);
        assert_eq!(name.delta_filename(), "myapp-1.2.3-delta.nupkg");
        assert_eq!(name.full_filename(), "myapp-1.2.3.nupkg");
    }

    #[test]
    fn test_package_name_id_with_dashes() {
        let name = PackageName::parse("my-cool-app-2.0.nupkg").unwrap();
        assert_eq!(name.package_id, "my-cool-app");
        assert_eq!(name.version.to_string(), "2.0");
    }

    #[test]
    fn test_package_name_rejects_malformed() {
        assert!(PackageName::parse("noversion.nupkg").is_err());
        assert!(PackageName::parse("MyApp-1.0.zip").is_err());
        assert!(PackageName::parse("-1.0.nupkg").is_err());
        assert!(PackageName::parse("MyApp-one.two.nupkg").is_err());
    }

    #[test]
    fn test_app_dir_round_trip() {
        let v: PackageVersion = "1.2.3".parse().unwrap();
        let dir = app_dir_name(&v);
        assert_eq!(dir, "app-1.2.3");
        assert_eq!(parse_app_dir_name(&dir).unwrap(), v);
        assert!(parse_app_dir_name("packages").is_none());
        assert!(parse_app_dir_name("app-abc").is_none());
    }

    #[test]
    fn test_release_order_full_before_delta() {
        let v: PackageVersion = "1.0".parse().unwrap();
        assert_eq!(release_order(&v, false, &v, true), Ordering::Less);
        assert_eq!(release_order(&v, true, &v, false), Ordering::Greater);
        let w: PackageVersion = "2.0".parse().unwrap();
        assert_eq!(release_order(&v, true, &w, false), Ordering::Less);
    }
}

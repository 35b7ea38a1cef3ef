// src/fsio.rs

//! Injectable filesystem seam for the data plane
//!
//! The manifest codec, the package store, and the manifest rewrite all route
//! their file traffic through [`FileSystem`] so they can be exercised against
//! an in-memory tree. `RealFs` is the production implementation; `MemFs`
//! backs unit tests. OS-bound operations (archive extraction, the install
//! lock, subprocess hooks) intentionally stay on the real filesystem.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Filesystem operations the data plane needs
pub trait FileSystem: Send + Sync {
    /// Read an entire file
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Open a file for streaming reads
    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>>;

    /// Write a file atomically (write-to-sibling then rename)
    fn write_atomic(&self, path: &Path, data: &[u8]) -> io::Result<()>;

    /// Length of a file in bytes
    fn file_len(&self, path: &Path) -> io::Result<u64>;

    /// Whether a file or directory exists
    fn exists(&self, path: &Path) -> bool;

    /// Paths of entries directly under a directory
    fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Delete a file
    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Create a directory and all missing parents
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;
}

/// Production filesystem backed by `std::fs`
#[derive(Debug, Default, Clone)]
pub struct RealFs;

impl FileSystem for RealFs {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(fs::File::open(path)?))
    }

    fn write_atomic(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp_path = path.with_extension("tmp");
        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(data)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, path)
    }

    fn file_len(&self, path: &Path) -> io::Result<u64> {
        Ok(fs::metadata(path)?.len())
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path)? {
            entries.push(entry?.path());
        }
        entries.sort();
        Ok(entries)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }
}

/// In-memory filesystem for tests
///
/// Files live in a flat map keyed by absolute path; directories exist
/// implicitly as prefixes of stored paths plus any explicitly created ones.
#[derive(Debug, Default)]
pub struct MemFs {
    inner: Mutex<MemFsInner>,
}

#[derive(Debug, Default)]
struct MemFsInner {
    files: HashMap<PathBuf, Vec<u8>>,
    dirs: Vec<PathBuf>,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    fn not_found(path: &Path) -> io::Error {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no such file: {}", path.display()),
        )
    }

    fn is_dir_inner(inner: &MemFsInner, path: &Path) -> bool {
        inner.dirs.iter().any(|d| d == path)
            || inner.files.keys().any(|f| f.parent().is_some_and(|p| p.starts_with(path)))
    }
}

impl FileSystem for MemFs {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        inner
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| Self::not_found(path))
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(self.read(path)?)))
    }

    fn write_atomic(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.files.insert(path.to_path_buf(), data.to_vec());
        Ok(())
    }

    fn file_len(&self, path: &Path) -> io::Result<u64> {
        let inner = self.inner.lock().unwrap();
        inner
            .files
            .get(path)
            .map(|d| d.len() as u64)
            .ok_or_else(|| Self::not_found(path))
    }

    fn exists(&self, path: &Path) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.files.contains_key(path) || Self::is_dir_inner(&inner, path)
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let inner = self.inner.lock().unwrap();
        if !Self::is_dir_inner(&inner, path) {
            return Err(Self::not_found(path));
        }
        let mut entries: Vec<PathBuf> = inner
            .files
            .keys()
            .filter(|f| f.parent() == Some(path))
            .cloned()
            .collect();
        entries.sort();
        Ok(entries)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| Self::not_found(path))
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let path = path.to_path_buf();
        if !inner.dirs.contains(&path) {
            inner.dirs.push(path);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memfs_round_trip() {
        let fs = MemFs::new();
        let path = Path::new("/root/packages/RELEASES");
        fs.write_atomic(path, b"hello").unwrap();

        assert!(fs.exists(path));
        assert_eq!(fs.read(path).unwrap(), b"hello");
        assert_eq!(fs.file_len(path).unwrap(), 5);

        fs.remove_file(path).unwrap();
        assert!(!fs.exists(path));
        assert!(fs.read(path).is_err());
    }

    #[test]
    fn test_memfs_list_dir() {
        let fs = MemFs::new();
        fs.write_atomic(Path::new("/pkg/a.nupkg"), b"a").unwrap();
        fs.write_atomic(Path::new("/pkg/b.nupkg"), b"b").unwrap();
        fs.write_atomic(Path::new("/other/c.nupkg"), b"c").unwrap();

        let listed = fs.list_dir(Path::new("/pkg")).unwrap();
        assert_eq!(
            listed,
            vec![PathBuf::from("/pkg/a.nupkg"), PathBuf::from("/pkg/b.nupkg")]
        );
    }

    #[test]
    fn test_memfs_dirs_exist_after_create() {
        let fs = MemFs::new();
        assert!(!fs.exists(Path::new("/root/packages")));
        fs.create_dir_all(Path::new("/root/packages")).unwrap();
        assert!(fs.exists(Path::new("/root/packages")));
        assert!(fs.list_dir(Path::new("/root/packages")).unwrap().is_empty());
    }

    #[test]
    fn test_realfs_write_atomic_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let fs = RealFs;
        let path = dir.path().join("sub").join("file.txt");

        fs.write_atomic(&path, b"data").unwrap();
        assert_eq!(fs.read(&path).unwrap(), b"data");
        assert_eq!(fs.file_len(&path).unwrap(), 4);

        // No leftover temp sibling
        let listed = fs.list_dir(path.parent().unwrap()).unwrap();
        assert_eq!(listed, vec![path.clone()]);

        let mut reader = fs.open(&path).unwrap();
        let mut buf = String::new();
        reader.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "data");
    }
}

// src/source.rs

//! Unified access to a release feed
//!
//! A feed source is either an `http(s)` base URL or a local directory; both
//! expose the same two reads: the RELEASES manifest, and package artifacts.
//! HTTP fetches stream to a temporary sibling and rename into place, with
//! bounded retries. Local fetches are parallel copies with a fan-out of 4.

use crate::error::{Error, Result};
use crate::manifest::{ReleaseEntry, RELEASES_FILE};
use crate::progress::ProgressTracker;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Timeout for individual HTTP requests
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum attempts for a failing fetch
const MAX_RETRIES: u32 = 3;

/// Delay between retries, scaled linearly by attempt number
const RETRY_DELAY_MS: u64 = 1000;

/// Buffer size for streaming downloads (8 KiB)
const STREAM_BUF_SIZE: usize = 8192;

/// Concurrency cap for local-to-local artifact copies
const LOCAL_COPY_FANOUT: usize = 4;

/// A classified feed source
pub enum UpdateSource {
    /// Remote feed over HTTP(S)
    Http {
        base: String,
        client: reqwest::blocking::Client,
    },
    /// Feed in a local (or UNC) directory
    LocalDir { dir: PathBuf },
}

impl UpdateSource {
    /// Classify a source string: an absolute `http`/`https` URI is remote,
    /// anything else is a local directory path
    pub fn new(source: &str) -> Result<Self> {
        if let Ok(url) = reqwest::Url::parse(source) {
            if url.scheme() == "http" || url.scheme() == "https" {
                let client = reqwest::blocking::Client::builder()
                    .timeout(HTTP_TIMEOUT)
                    .build()
                    .map_err(Error::transport)?;
                return Ok(Self::Http {
                    base: source.trim_end_matches('/').to_string(),
                    client,
                });
            }
        }
        Ok(Self::LocalDir {
            dir: PathBuf::from(source),
        })
    }

    /// True for HTTP(S) sources
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Http { .. })
    }

    /// Fetch the feed's RELEASES manifest text
    pub fn fetch_manifest(&self) -> Result<String> {
        match self {
            Self::Http { base, client } => {
                let url = format!("{}/{}", base, RELEASES_FILE);
                info!("fetching release feed from {}", url);
                let bytes = http_get_with_retry(client, &url)?;
                String::from_utf8(bytes)
                    .map_err(|_| Error::Transport(format!("{} is not valid UTF-8", url)))
            }
            Self::LocalDir { dir } => {
                let path = dir.join(RELEASES_FILE);
                debug!("reading release feed from {}", path.display());
                fs::read_to_string(&path).map_err(|e| {
                    Error::Transport(format!("failed to read {}: {}", path.display(), e))
                })
            }
        }
    }

    /// Fetch one artifact to `dest`, reporting byte progress on the sink
    ///
    /// An entry carrying its own `base_url` is fetched from there instead of
    /// the feed source.
    pub fn fetch_artifact(
        &self,
        entry: &ReleaseEntry,
        dest: &Path,
        progress: &dyn ProgressTracker,
    ) -> Result<()> {
        if let Some(base) = &entry.base_url {
            let url = format!("{}/{}", base.trim_end_matches('/'), entry.filename);
            let client = reqwest::blocking::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .map_err(Error::transport)?;
            return download_to_file(&client, &url, dest, entry.filesize, progress);
        }

        match self {
            Self::Http { base, client } => {
                let url = format!("{}/{}", base, entry.filename);
                download_to_file(client, &url, dest, entry.filesize, progress)
            }
            Self::LocalDir { dir } => {
                copy_local(&dir.join(&entry.filename), dest, progress)
            }
        }
    }

    /// Fetch a batch of artifacts
    ///
    /// `dest_for` maps each entry to its destination path. Local sources
    /// copy in parallel with a fan-out of 4; remote sources download
    /// sequentially, each streaming its own progress. Progress over the
    /// batch is byte-weighted.
    pub fn fetch_artifacts<F>(
        &self,
        entries: &[ReleaseEntry],
        dest_for: F,
        progress: &dyn ProgressTracker,
    ) -> Result<()>
    where
        F: Fn(&ReleaseEntry) -> PathBuf + Sync,
    {
        let total_bytes: u64 = entries.iter().map(|e| e.filesize).sum();
        progress.set_length(total_bytes.max(1));
        let done_bytes = AtomicU64::new(0);

        match self {
            Self::LocalDir { .. } => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(LOCAL_COPY_FANOUT)
                    .build()
                    .map_err(Error::transport)?;
                let results: Vec<Result<()>> = pool.install(|| {
                    use rayon::prelude::*;
                    entries
                        .par_iter()
                        .map(|entry| {
                            let sink = SilentByteSink::default();
                            self.fetch_artifact(entry, &dest_for(entry), &sink)?;
                            let done = done_bytes.fetch_add(entry.filesize, Ordering::Relaxed)
                                + entry.filesize;
                            progress.set_position(done);
                            Ok(())
                        })
                        .collect()
                });
                results.into_iter().collect()
            }
            Self::Http { .. } => {
                for entry in entries {
                    let base = done_bytes.load(Ordering::Relaxed);
                    let forward = ForwardingByteSink {
                        inner: progress,
                        base,
                    };
                    self.fetch_artifact(entry, &dest_for(entry), &forward)?;
                    done_bytes.store(base + entry.filesize, Ordering::Relaxed);
                    progress.set_position(base + entry.filesize);
                }
                Ok(())
            }
        }
    }
}

/// GET a URL into memory with bounded retries
fn http_get_with_retry(client: &reqwest::blocking::Client, url: &str) -> Result<Vec<u8>> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match client.get(url).send() {
            Ok(response) => {
                if !response.status().is_success() {
                    return Err(Error::Transport(format!(
                        "HTTP {} from {}",
                        response.status(),
                        url
                    )));
                }
                return response
                    .bytes()
                    .map(|b| b.to_vec())
                    .map_err(|e| Error::Transport(format!("failed to read {}: {}", url, e)));
            }
            Err(e) => {
                if attempt >= MAX_RETRIES {
                    return Err(Error::Transport(format!(
                        "failed to fetch {} after {} attempts: {}",
                        url, attempt, e
                    )));
                }
                warn!("fetch attempt {} for {} failed: {}, retrying", attempt, url, e);
                std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
            }
        }
    }
}

/// Stream a URL to a file via a `.tmp` sibling, reporting byte progress
fn download_to_file(
    client: &reqwest::blocking::Client,
    url: &str,
    dest: &Path,
    expected_len: u64,
    progress: &dyn ProgressTracker,
) -> Result<()> {
    info!("downloading {} to {}", url, dest.display());
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut attempt = 0;
    loop {
        attempt += 1;
        match client.get(url).send() {
            Ok(mut response) => {
                if !response.status().is_success() {
                    return Err(Error::Transport(format!(
                        "HTTP {} from {}",
                        response.status(),
                        url
                    )));
                }

                let total = response.content_length().unwrap_or(expected_len);
                progress.set_length(total.max(1));

                let temp_path = dest.with_extension("partial");
                let mut file = File::create(&temp_path)?;
                let mut downloaded: u64 = 0;
                let mut buffer = [0u8; STREAM_BUF_SIZE];
                loop {
                    let n = response.read(&mut buffer).map_err(|e| {
                        Error::Transport(format!("read from {} failed: {}", url, e))
                    })?;
                    if n == 0 {
                        break;
                    }
                    file.write_all(&buffer[..n])?;
                    downloaded += n as u64;
                    progress.set_position(downloaded);
                }
                file.sync_all()?;
                drop(file);

                fs::rename(&temp_path, dest)?;
                debug!("downloaded {} bytes from {}", downloaded, url);
                return Ok(());
            }
            Err(e) => {
                if attempt >= MAX_RETRIES {
                    return Err(Error::Transport(format!(
                        "failed to download {} after {} attempts: {}",
                        url, attempt, e
                    )));
                }
                warn!(
                    "download attempt {} for {} failed: {}, retrying",
                    attempt, url, e
                );
                std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
            }
        }
    }
}

/// Copy a local artifact via a `.partial` sibling, reporting byte progress
fn copy_local(src: &Path, dest: &Path, progress: &dyn ProgressTracker) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut reader = File::open(src)
        .map_err(|e| Error::Transport(format!("failed to open {}: {}", src.display(), e)))?;
    let total = reader.metadata().map(|m| m.len()).unwrap_or(0);
    progress.set_length(total.max(1));

    let temp_path = dest.with_extension("partial");
    let mut file = File::create(&temp_path)?;
    let mut copied: u64 = 0;
    let mut buffer = [0u8; STREAM_BUF_SIZE];
    loop {
        let n = reader
            .read(&mut buffer)
            .map_err(|e| Error::Transport(format!("read from {} failed: {}", src.display(), e)))?;
        if n == 0 {
            break;
        }
        file.write_all(&buffer[..n])?;
        copied += n as u64;
        progress.set_position(copied);
    }
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, dest)?;
    debug!("copied {} ({} bytes)", src.display(), copied);
    Ok(())
}

/// Discards per-file byte progress inside the parallel copy pool
#[derive(Default)]
struct SilentByteSink;

impl ProgressTracker for SilentByteSink {
    fn set_message(&self, _message: &str) {}
    fn set_position(&self, _position: u64) {}
    fn set_length(&self, _length: u64) {}
    fn position(&self) -> u64 {
        0
    }
    fn length(&self) -> u64 {
        0
    }
    fn finish_with_message(&self, _message: &str) {}
    fn finish_with_error(&self, _message: &str) {}
    fn is_finished(&self) -> bool {
        false
    }
}

/// Offsets one file's byte progress into a batch-wide position
struct ForwardingByteSink<'a> {
    inner: &'a dyn ProgressTracker,
    base: u64,
}

impl ProgressTracker for ForwardingByteSink<'_> {
    fn set_message(&self, message: &str) {
        self.inner.set_message(message);
    }
    fn set_position(&self, position: u64) {
        self.inner.set_position(self.base + position);
    }
    fn set_length(&self, _length: u64) {}
    fn position(&self) -> u64 {
        self.inner.position()
    }
    fn length(&self) -> u64 {
        self.inner.length()
    }
    fn finish_with_message(&self, _message: &str) {}
    fn finish_with_error(&self, _message: &str) {}
    fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }
}

// src/hash.rs

//! SHA-1 hashing for artifact integrity
//!
//! The release feed identifies every package by its SHA-1 digest, so this is
//! the one algorithm the engine speaks. Digests are emitted as lowercase hex
//! and compared case-insensitively.

use sha1::{Digest, Sha1};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Buffer size for streaming hash computation (8 KiB)
const HASH_BUF_SIZE: usize = 8192;

/// Compute the SHA-1 of a byte slice as lowercase hex
pub fn sha1_bytes(data: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Compute the SHA-1 of everything a reader yields as lowercase hex
///
/// Streams in fixed-size chunks so arbitrarily large artifacts never have to
/// fit in memory.
pub fn sha1_reader<R: Read>(reader: &mut R) -> io::Result<String> {
    let mut hasher = Sha1::new();
    let mut buffer = [0u8; HASH_BUF_SIZE];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Compute the SHA-1 of a file's contents as lowercase hex
pub fn sha1_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    sha1_reader(&mut file)
}

/// Compare two hex digests case-insensitively
pub fn eq_hex(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.chars().zip(b.chars()).all(|(x, y)| x.eq_ignore_ascii_case(&y))
}

/// Check that a string is a well-formed SHA-1 hex digest (40 hex chars)
pub fn is_sha1_hex(s: &str) -> bool {
    s.len() == 40 && s.chars().all(|c| c.is_ascii_hexdigit())
}

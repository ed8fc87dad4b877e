//! Content fingerprints.
//!
//! A fingerprint is the lowercase hex MD5 of a file's bytes. MD5 is used
//! because S3-compatible stores report it as the ETag of single-part uploads,
//! so a local hash can be compared with the remote listing without
//! downloading anything. Multipart ETags (`"<md5>-<parts>"`) never match a
//! plain MD5, which makes such objects look changed and get re-processed.
//!
//! Files are streamed through the hasher in chunks; they are never loaded
//! whole into memory.

use md5::{Digest, Md5};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

const READ_BUFFER: usize = 64 * 1024;

/// MD5 of a file's contents, as lowercase hex.
pub fn fingerprint_file(path: &Path) -> io::Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(READ_BUFFER, file);
    let mut hasher = Md5::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// MD5 of an in-memory buffer, as lowercase hex.
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Md5::digest(bytes))
}

/// [`fingerprint_file`] on the blocking pool, so the caller's task can be
/// suspended while the file is read.
pub async fn fingerprint_file_async(path: PathBuf) -> io::Result<String> {
    tokio::task::spawn_blocking(move || fingerprint_file(&path))
        .await
        .map_err(io::Error::other)?
}

/// Strip the quoting stores put around ETags and lowercase the hex.
pub fn normalize_etag(etag: &str) -> String {
    etag.trim()
        .trim_start_matches("W/")
        .trim_matches('"')
        .to_ascii_lowercase()
}

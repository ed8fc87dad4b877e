//! Local image tree discovery.
//!
//! [`walk`] lazily yields every regular file under the root, recursing into
//! subdirectories. Hidden entries (names starting with `.`) are skipped along
//! with everything beneath them. Symlinks are not followed.
//!
//! Errors come in two severities:
//! - [`WalkError::Root`]: the root itself cannot be read. Nothing can be
//!   diffed, so callers treat this as fatal.
//! - [`WalkError::Unreadable`]: a subdirectory cannot be read. It is skipped
//!   and the walk continues.
//!
//! Order is whatever the filesystem returns; callers must not depend on it.

use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

#[derive(Error, Debug)]
pub enum WalkError {
    #[error("Cannot read image root {path}: {message}")]
    Root { path: PathBuf, message: String },
    #[error("Cannot read {path}: {message}")]
    Unreadable { path: PathBuf, message: String },
}

impl WalkError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, WalkError::Root { .. })
    }
}

/// A source image discovered on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalImageFile {
    /// Path relative to the root, `/`-separated, no leading separator.
    pub relative_path: String,
    pub absolute_path: PathBuf,
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

/// Walk `root`, yielding every regular file beneath it.
pub fn walk(root: &Path) -> impl Iterator<Item = Result<LocalImageFile, WalkError>> {
    let root = root.to_path_buf();
    let root_error = match std::fs::metadata(&root) {
        Ok(meta) if meta.is_dir() => None,
        Ok(_) => Some(WalkError::Root {
            path: root.clone(),
            message: "not a directory".into(),
        }),
        Err(e) => Some(WalkError::Root {
            path: root.clone(),
            message: e.to_string(),
        }),
    };

    let entries = root_error.is_none().then(|| {
        WalkDir::new(&root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !is_hidden(e))
    });

    root_error
        .into_iter()
        .map(Err)
        .chain(entries.into_iter().flatten().filter_map(move |entry| {
            match entry {
                Ok(entry) if entry.file_type().is_file() => {
                    let relative_path = relative_path(&root, entry.path())?;
                    Some(Ok(LocalImageFile {
                        relative_path,
                        absolute_path: entry.into_path(),
                    }))
                }
                Ok(_) => None,
                Err(err) => {
                    let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                    let message = err
                        .io_error()
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| err.to_string());
                    if err.depth() == 0 {
                        Some(Err(WalkError::Root { path, message }))
                    } else {
                        Some(Err(WalkError::Unreadable { path, message }))
                    }
                }
            }
        }))
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Content-addressed local object cache.
//!
//! Two namespaces under the cache root: `obj/md5/<hex[0:2]>/<hex[2:]>`
//! for embedded files and `obj/etag/<etag[0:2]>/<etag[2:]>` for
//! references. A lookup is a hit only when the file exists AND its byte
//! length matches the expected size; size-less etag collisions across
//! partial writes would otherwise poison the cache.
//!
//! Cache files are shared by content and never deleted here. Placement
//! is write-then-rename so concurrent writers of the same object are
//! benign (identical bytes, last rename wins).

use crate::digest::b64_md5_to_hex;
use crate::error::StorageError;
use std::path::{Path, PathBuf};

/// Result of a cache lookup: the content-addressed destination path and
/// whether a valid object is already there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheCheck {
    pub path: PathBuf,
    pub hit: bool,
}

/// Process-wide object cache, constructed once at the composition root
/// and shared via `Arc`.
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    root: PathBuf,
}

impl ArtifactCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Look up an embedded file by its base64 MD5 digest.
    pub fn lookup_md5(&self, b64_md5: &str, size: u64) -> Result<CacheCheck, StorageError> {
        let hex = b64_md5_to_hex(b64_md5)?;
        self.lookup("md5", &hex, size)
    }

    /// Look up a reference by its etag.
    pub fn lookup_etag(&self, etag: &str, size: u64) -> Result<CacheCheck, StorageError> {
        self.lookup("etag", etag, size)
    }

    fn lookup(&self, namespace: &str, key: &str, size: u64) -> Result<CacheCheck, StorageError> {
        if key.len() < 3 || !key.is_char_boundary(2) {
            return Err(StorageError::InvalidDigest(key.to_string()));
        }
        let path = self
            .root
            .join("obj")
            .join(namespace)
            .join(&key[..2])
            .join(&key[2..]);
        let hit = std::fs::metadata(&path)
            .map(|m| m.is_file() && m.len() == size)
            .unwrap_or(false);
        if !hit {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(CacheCheck { path, hit })
    }

    /// Copy `src` into the cache at `dest` atomically (write to a
    /// sibling temp file, then rename).
    pub fn place(&self, src: &Path, dest: &Path) -> Result<(), StorageError> {
        let parent = dest
            .parent()
            .ok_or_else(|| StorageError::FileMissing(dest.to_path_buf()))?;
        std::fs::create_dir_all(parent)?;
        let tmp = tempfile::NamedTempFile::new_in(parent)?;
        std::fs::copy(src, tmp.path())?;
        tmp.persist(dest).map_err(|e| StorageError::Io(e.error))?;
        Ok(())
    }
}

/// Writer handle for streaming a download into a cache slot atomically.
/// Data lands in a temp file; [`CacheWriter::commit`] renames it into
/// its content-addressed destination.
pub struct CacheWriter {
    tmp: tempfile::NamedTempFile,
    dest: PathBuf,
}

impl CacheWriter {
    pub fn create(dest: &Path) -> Result<Self, StorageError> {
        let parent = dest
            .parent()
            .ok_or_else(|| StorageError::FileMissing(dest.to_path_buf()))?;
        std::fs::create_dir_all(parent)?;
        Ok(Self {
            tmp: tempfile::NamedTempFile::new_in(parent)?,
            dest: dest.to_path_buf(),
        })
    }

    pub fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), StorageError> {
        use std::io::Write;
        self.tmp.write_all(chunk)?;
        Ok(())
    }

    pub fn commit(self) -> Result<PathBuf, StorageError> {
        self.tmp
            .persist(&self.dest)
            .map_err(|e| StorageError::Io(e.error))?;
        Ok(self.dest)
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;

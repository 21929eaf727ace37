// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `file://` references: single files or recursively walked directories.

use super::{basename, LoadedPath, StorageHandler, StoreOptions};
use crate::cache::ArtifactCache;
use crate::digest::md5_file_b64;
use crate::error::StorageError;
use crate::manifest::ManifestEntry;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use walkdir::WalkDir;

pub struct LocalFileHandler {
    scheme: String,
    cache: Arc<ArtifactCache>,
}

impl LocalFileHandler {
    pub fn new(cache: Arc<ArtifactCache>) -> Self {
        Self {
            scheme: "file".to_string(),
            cache,
        }
    }
}

/// Filesystem path of a `file://` URI (netloc and path concatenated, so
/// `file://data/x` resolves relative to the cwd like the CLI expects).
fn file_path_of(uri: &str) -> Result<PathBuf, StorageError> {
    let url = url::Url::parse(uri).map_err(|_| StorageError::SchemeUnsupported {
        scheme: uri.to_string(),
    })?;
    Ok(PathBuf::from(format!(
        "{}{}",
        url.host_str().unwrap_or(""),
        url.path()
    )))
}

#[async_trait]
impl StorageHandler for LocalFileHandler {
    fn scheme(&self) -> &str {
        &self.scheme
    }

    async fn store_path(
        &self,
        uri: &str,
        opts: &StoreOptions,
    ) -> Result<Vec<ManifestEntry>, StorageError> {
        let local_path = file_path_of(uri)?;
        if !opts.checksum {
            let name = opts.name.clone().unwrap_or_else(|| basename(uri));
            return Ok(vec![ManifestEntry::reference(name, uri, uri)]);
        }

        if local_path.is_dir() {
            let max_objects = opts.max_objects();
            let start = Instant::now();
            tracing::info!(
                path = %local_path.display(),
                max_objects,
                "generating checksums for directory reference"
            );
            let mut entries = Vec::new();
            for dent in WalkDir::new(&local_path).follow_links(true) {
                let dent = dent.map_err(std::io::Error::from)?;
                if !dent.file_type().is_file() {
                    continue;
                }
                if entries.len() >= max_objects {
                    return Err(StorageError::MaxObjectsExceeded { limit: max_objects });
                }
                let physical = dent.path();
                let rel = physical
                    .strip_prefix(&local_path)
                    .map_err(|_| StorageError::FileMissing(physical.to_path_buf()))?
                    .to_string_lossy()
                    .replace('\\', "/");
                let logical = match &opts.name {
                    Some(prefix) => format!("{prefix}/{rel}"),
                    None => rel.clone(),
                };
                let ref_uri = format!("{}/{}", uri.trim_end_matches('/'), rel);
                let digest = md5_file_b64(physical)?;
                let size = dent.metadata().map_err(std::io::Error::from)?.len();
                entries.push(ManifestEntry::reference(logical, ref_uri, digest).with_size(size));
            }
            tracing::info!(
                count = entries.len(),
                elapsed_secs = start.elapsed().as_secs_f64(),
                "directory reference checksummed"
            );
            Ok(entries)
        } else if local_path.is_file() {
            let name = opts
                .name
                .clone()
                .unwrap_or_else(|| basename(&local_path.to_string_lossy()));
            let digest = md5_file_b64(&local_path)?;
            let size = std::fs::metadata(&local_path)?.len();
            Ok(vec![
                ManifestEntry::reference(name, uri, digest).with_size(size),
            ])
        } else {
            Err(StorageError::FileMissing(local_path))
        }
    }

    async fn load_path(
        &self,
        entry: &ManifestEntry,
        _local: bool,
    ) -> Result<LoadedPath, StorageError> {
        let uri = entry
            .reference
            .as_deref()
            .ok_or_else(|| StorageError::InvalidManifest("entry has no reference".to_string()))?;
        let local_path = file_path_of(uri)?;
        if !local_path.exists() {
            return Err(StorageError::FileMissing(local_path));
        }
        let size = entry
            .size
            .ok_or_else(|| StorageError::InvalidManifest("reference entry missing size".into()))?;

        let check = self.cache.lookup_md5(&entry.digest, size)?;
        if check.hit {
            return Ok(LoadedPath::Local(check.path));
        }

        let md5 = md5_file_b64(&local_path)?;
        if md5 != entry.digest {
            return Err(StorageError::DigestMismatch {
                target: local_path.display().to_string(),
                expected: entry.digest.clone(),
                actual: md5,
            });
        }
        self.cache.place(&local_path, &check.path)?;
        Ok(LoadedPath::Local(check.path))
    }
}

#[cfg(test)]
#[path = "local_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Artifact builder.
//!
//! An artifact is mutable while it is being assembled: files land in a
//! staging directory or are hashed in place, references go through the
//! storage policy. A single `finalize()` computes the content digest
//! and remaps staged files into the cache so uploads still find them
//! after the staging directory is gone. After that, every mutation
//! fails.

use crate::cache::ArtifactCache;
use crate::digest::md5_file_b64;
use crate::error::ArtifactError;
use crate::handlers::StoreOptions;
use crate::manifest::{Manifest, ManifestEntry};
use crate::policy::WandbStoragePolicy;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use walkdir::WalkDir;

/// Bounded worker pool for directory hashing.
const ADD_DIR_WORKERS: usize = 8;

fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

pub struct Artifact {
    name: String,
    artifact_type: String,
    description: Option<String>,
    metadata: Option<serde_json::Value>,
    policy: Arc<WandbStoragePolicy>,
    cache: Arc<ArtifactCache>,
    manifest: Arc<Mutex<Manifest>>,
    staging: tempfile::TempDir,
    finalized: bool,
    added_new: bool,
    digest: Option<String>,
}

impl Artifact {
    pub fn new(
        name: impl Into<String>,
        artifact_type: impl Into<String>,
        policy: Arc<WandbStoragePolicy>,
        cache: Arc<ArtifactCache>,
    ) -> Result<Self, ArtifactError> {
        let name = name.into();
        if !valid_name(&name) {
            return Err(ArtifactError::InvalidName(name));
        }
        let manifest = Manifest::new(policy.name(), policy.config_map());
        Ok(Self {
            name,
            artifact_type: artifact_type.into(),
            description: None,
            metadata: None,
            policy,
            cache,
            manifest: Arc::new(Mutex::new(manifest)),
            staging: tempfile::TempDir::new()?,
            finalized: false,
            added_new: false,
            digest: None,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn artifact_type(&self) -> &str {
        &self.artifact_type
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn metadata(&self) -> Option<&serde_json::Value> {
        self.metadata.as_ref()
    }

    /// Content digest, available once finalized.
    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Snapshot of the manifest (entries, policy, config).
    pub fn manifest(&self) -> Manifest {
        self.manifest.lock().clone()
    }

    fn ensure_can_add(&self) -> Result<(), ArtifactError> {
        if self.finalized {
            Err(ArtifactError::Finalized)
        } else {
            Ok(())
        }
    }

    /// Open a new file under the staging directory for writing. The
    /// file is picked up by `finalize()`.
    pub fn new_file(&mut self, name: &str) -> Result<std::fs::File, ArtifactError> {
        self.ensure_can_add()?;
        let path = self.staging.path().join(name.trim_start_matches('/'));
        if path.exists() {
            return Err(ArtifactError::DuplicateFile(name.to_string()));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        self.added_new = true;
        Ok(file)
    }

    /// Hash one local file into the manifest.
    pub fn add_file(&mut self, local_path: &Path, name: Option<&str>) -> Result<(), ArtifactError> {
        self.ensure_can_add()?;
        if !local_path.is_file() {
            return Err(ArtifactError::NotAFile(local_path.to_path_buf()));
        }
        let name = match name {
            Some(name) => name.to_string(),
            None => local_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        let digest = md5_file_b64(local_path)?;
        let size = std::fs::metadata(local_path)?.len();
        self.manifest
            .lock()
            .add_entry(ManifestEntry::local_file(name, digest, size, local_path));
        Ok(())
    }

    /// Walk a directory (following symlinks) and hash every file on a
    /// bounded worker pool. Entry names are directory-relative,
    /// optionally under a `name` prefix.
    pub async fn add_dir(
        &mut self,
        local_path: &Path,
        name: Option<&str>,
    ) -> Result<(), ArtifactError> {
        self.ensure_can_add()?;
        if !local_path.is_dir() {
            return Err(ArtifactError::NotADirectory(local_path.to_path_buf()));
        }
        tracing::info!(path = %local_path.display(), "adding directory to artifact");
        let start = Instant::now();
        self.hash_dir_into_manifest(local_path, name).await?;
        tracing::info!(
            elapsed_secs = start.elapsed().as_secs_f64(),
            "directory added"
        );
        Ok(())
    }

    async fn hash_dir_into_manifest(
        &self,
        local_path: &Path,
        name: Option<&str>,
    ) -> Result<(), ArtifactError> {
        let mut paths: Vec<(String, PathBuf)> = Vec::new();
        for dent in WalkDir::new(local_path).follow_links(true) {
            let dent = dent.map_err(std::io::Error::from)?;
            if !dent.file_type().is_file() {
                continue;
            }
            let physical = dent.path().to_path_buf();
            let rel = physical
                .strip_prefix(local_path)
                .map_err(|e| ArtifactError::Worker(e.to_string()))?
                .to_string_lossy()
                .replace('\\', "/");
            let logical = match name {
                Some(prefix) => format!("{prefix}/{rel}"),
                None => rel,
            };
            paths.push((logical, physical));
        }

        let semaphore = Arc::new(Semaphore::new(ADD_DIR_WORKERS));
        let mut workers: JoinSet<Result<(), ArtifactError>> = JoinSet::new();
        for (logical, physical) in paths {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| ArtifactError::Worker(e.to_string()))?;
            let manifest = Arc::clone(&self.manifest);
            workers.spawn(async move {
                let _permit = permit;
                let hash_path = physical.clone();
                let (digest, size) =
                    tokio::task::spawn_blocking(move || -> Result<(String, u64), std::io::Error> {
                        let digest = md5_file_b64(&hash_path)?;
                        let size = std::fs::metadata(&hash_path)?.len();
                        Ok((digest, size))
                    })
                    .await
                    .map_err(|e| ArtifactError::Worker(e.to_string()))??;
                manifest
                    .lock()
                    .add_entry(ManifestEntry::local_file(logical, digest, size, physical));
                Ok(())
            });
        }
        while let Some(joined) = workers.join_next().await {
            joined.map_err(|e| ArtifactError::Worker(e.to_string()))??;
        }
        Ok(())
    }

    /// Track a reference by URI through the storage policy.
    pub async fn add_reference(
        &mut self,
        uri: &str,
        opts: StoreOptions,
    ) -> Result<(), ArtifactError> {
        if url::Url::parse(uri).is_err() {
            return Err(ArtifactError::ReferenceRequired);
        }
        self.ensure_can_add()?;
        let entries = self.policy.store_reference(uri, &opts).await?;
        let mut manifest = self.manifest.lock();
        for entry in entries {
            manifest.add_entry(entry);
        }
        Ok(())
    }

    /// Compute the content digest and seal the artifact. Idempotent.
    ///
    /// Files created via `new_file` are hashed now and copied into the
    /// cache; their entries are retargeted at the cache location so the
    /// upload path still finds them after the staging directory is
    /// cleaned up.
    pub async fn finalize(&mut self) -> Result<String, ArtifactError> {
        if let Some(digest) = &self.digest {
            return Ok(digest.clone());
        }

        if self.added_new {
            let staging = self.staging.path().to_path_buf();
            self.hash_dir_into_manifest(&staging, None).await?;
        }

        self.finalized = true;
        let digest = self.manifest.lock().digest();

        if self.added_new {
            self.remap_staged_entries()?;
        }

        self.digest = Some(digest.clone());
        Ok(digest)
    }

    fn remap_staged_entries(&self) -> Result<(), ArtifactError> {
        let staging = self.staging.path();
        let mut manifest = self.manifest.lock();
        for entry in manifest.entries_mut().values_mut() {
            let Some(local) = entry.local_path.clone() else {
                continue;
            };
            if !local.starts_with(staging) {
                continue;
            }
            let Some(size) = entry.size else { continue };
            let check = self.cache.lookup_md5(&entry.digest, size)?;
            if !check.hit {
                self.cache.place(&local, &check.path)?;
            }
            entry.local_path = Some(check.path);
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "artifact_tests.rs"]
mod tests;

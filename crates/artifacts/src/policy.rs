// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Default storage policy: server-managed bucket with a write-through
//! local cache.
//!
//! The policy owns the pooled HTTP session and the full handler
//! registry. Embedded files are uploaded against prepared signed URLs
//! and fetched back from the policy's URL layout; references delegate
//! to the per-scheme handlers.

use crate::cache::{ArtifactCache, CacheWriter};
use crate::digest::b64_md5_to_hex;
use crate::error::StorageError;
use crate::handlers::{
    GcsApi, GcsHandler, HttpHandler, LoadedPath, LocalFileHandler, MultiHandler, S3Api, S3Handler,
    StorageHandler, StoreOptions, TrackingHandler,
};
use crate::manifest::ManifestEntry;
use crate::retry::{send_with_retry, RetryPolicy};
use beacon_core::{ArtifactId, UploadPreparer, UploadSpec};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::io::ReaderStream;

/// Policy name recorded in every manifest this policy produces.
pub const STORAGE_POLICY_NAME: &str = "wandb-storage-policy-v1";

const REQUEST_POOL_MAXSIZE: usize = 64;

/// Layout of server-side file URLs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageLayout {
    #[default]
    V1,
    V2,
}

/// Serialized into the manifest as `storagePolicyConfig`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(rename = "storageLayout", default)]
    pub storage_layout: StorageLayout,
    #[serde(rename = "storageRegion", default, skip_serializing_if = "Option::is_none")]
    pub storage_region: Option<String>,
}

impl PolicyConfig {
    pub fn to_map(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }
}

/// Byte-level progress callback: `(bytes_sent, total_bytes)`.
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

pub struct WandbStoragePolicy {
    cache: Arc<ArtifactCache>,
    config: PolicyConfig,
    session: reqwest::Client,
    retry: RetryPolicy,
    handler: MultiHandler,
    base_url: String,
    api_key: Option<String>,
}

impl WandbStoragePolicy {
    /// Wire the full handler registry: cache first, then handlers
    /// referencing the cache, then the policy referencing the handlers.
    pub fn build(
        cache: Arc<ArtifactCache>,
        s3: Arc<dyn S3Api>,
        gcs: Arc<dyn GcsApi>,
        config: PolicyConfig,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, StorageError> {
        let session = reqwest::Client::builder()
            .pool_max_idle_per_host(REQUEST_POOL_MAXSIZE)
            .build()?;
        let handlers: Vec<Arc<dyn StorageHandler>> = vec![
            Arc::new(S3Handler::new(s3, cache.clone())),
            Arc::new(GcsHandler::new(gcs, cache.clone())),
            Arc::new(HttpHandler::with_scheme(
                session.clone(),
                cache.clone(),
                "http",
            )),
            Arc::new(HttpHandler::with_scheme(
                session.clone(),
                cache.clone(),
                "https",
            )),
            Arc::new(LocalFileHandler::new(cache.clone())),
        ];
        let handler = MultiHandler::new(handlers, Some(Arc::new(TrackingHandler::new())));
        Ok(Self {
            cache,
            config,
            session,
            retry: RetryPolicy::default(),
            handler,
            base_url: base_url.into(),
            api_key,
        })
    }

    pub fn name(&self) -> &'static str {
        STORAGE_POLICY_NAME
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn config_map(&self) -> serde_json::Map<String, serde_json::Value> {
        self.config.to_map()
    }

    /// Upload one embedded file. Returns `true` when the server already
    /// had the object (nothing was uploaded).
    pub async fn store_file(
        &self,
        artifact_id: &ArtifactId,
        entry: &mut ManifestEntry,
        preparer: &dyn UploadPreparer,
        progress: Option<ProgressCallback>,
    ) -> Result<bool, StorageError> {
        let size = entry
            .size
            .ok_or_else(|| StorageError::InvalidManifest("file entry missing size".into()))?;
        let local_path = entry
            .local_path
            .clone()
            .ok_or_else(|| StorageError::InvalidManifest("file entry has no local path".into()))?;

        // Write-through: the cache copy survives staging cleanup.
        let check = self.cache.lookup_md5(&entry.digest, size)?;
        if !check.hit {
            self.cache.place(&local_path, &check.path)?;
        }

        let prepared = preparer
            .prepare(UploadSpec {
                artifact_id: artifact_id.clone(),
                name: entry.path.clone(),
                md5: entry.digest.clone(),
            })
            .await?;
        entry.birth_artifact_id = prepared.birth_artifact_id.clone();

        let Some(upload_url) = prepared.upload_url else {
            return Ok(true);
        };

        let mut attempt: u32 = 0;
        loop {
            let outcome = self
                .upload_once(
                    &upload_url,
                    &prepared.upload_headers,
                    &local_path,
                    size,
                    progress.clone(),
                )
                .await;
            let retriable = match &outcome {
                Ok(resp) => self.retry.is_retriable(resp.status().as_u16()),
                Err(StorageError::Http(err)) => err.is_connect() || err.is_timeout(),
                Err(_) => false,
            };
            if retriable && attempt < self.retry.total {
                attempt += 1;
                tokio::time::sleep(self.retry.delay(attempt)).await;
                continue;
            }
            outcome?.error_for_status()?;
            return Ok(false);
        }
    }

    /// PUT the file body (not the cache copy) once. The signed URL
    /// expires if the first byte is too slow, so the body streams
    /// straight from disk.
    async fn upload_once(
        &self,
        url: &str,
        headers: &[(String, String)],
        path: &Path,
        total: u64,
        progress: Option<ProgressCallback>,
    ) -> Result<reqwest::Response, StorageError> {
        let file = tokio::fs::File::open(path).await?;
        let sent = Arc::new(AtomicU64::new(0));
        let stream = ReaderStream::new(file).inspect(move |chunk| {
            if let (Ok(chunk), Some(cb)) = (chunk, progress.as_ref()) {
                let so_far = sent.fetch_add(chunk.len() as u64, Ordering::Relaxed) + chunk.len() as u64;
                cb(so_far, total);
            }
        });
        let mut req = self.session.put(url).body(reqwest::Body::wrap_stream(stream));
        for (name, value) in headers {
            req = req.header(name.as_str(), value.as_str());
        }
        Ok(req.send().await?)
    }

    /// Fetch one embedded file, preferring the cache.
    pub async fn load_file(
        &self,
        entity: &str,
        entry: &ManifestEntry,
    ) -> Result<PathBuf, StorageError> {
        let size = entry
            .size
            .ok_or_else(|| StorageError::InvalidManifest("file entry missing size".into()))?;
        let check = self.cache.lookup_md5(&entry.digest, size)?;
        if check.hit {
            return Ok(check.path);
        }

        let url = self.file_url(entity, entry)?;
        let mut resp = send_with_retry(&self.retry, || {
            let mut req = self.session.get(&url);
            if let Some(key) = &self.api_key {
                req = req.basic_auth("api", Some(key));
            }
            req.send()
        })
        .await?;

        let mut writer = CacheWriter::create(&check.path)?;
        while let Some(chunk) = resp.chunk().await? {
            writer.write_chunk(&chunk)?;
        }
        Ok(writer.commit()?)
    }

    pub async fn store_reference(
        &self,
        uri: &str,
        opts: &StoreOptions,
    ) -> Result<Vec<ManifestEntry>, StorageError> {
        self.handler.store_path(uri, opts).await
    }

    pub async fn load_reference(
        &self,
        entry: &ManifestEntry,
        local: bool,
    ) -> Result<LoadedPath, StorageError> {
        self.handler.load_path(entry, local).await
    }

    /// Server-side URL of an embedded file under the configured layout.
    fn file_url(&self, entity: &str, entry: &ManifestEntry) -> Result<String, StorageError> {
        let md5_hex = b64_md5_to_hex(&entry.digest)?;
        let base = self.base_url.trim_end_matches('/');
        match self.config.storage_layout {
            StorageLayout::V1 => Ok(format!("{base}/artifacts/{entity}/{md5_hex}")),
            StorageLayout::V2 => {
                let birth = entry.birth_artifact_id.as_ref().ok_or_else(|| {
                    StorageError::InvalidManifest("entry has no birthArtifactID".into())
                })?;
                let birth: String =
                    url::form_urlencoded::byte_serialize(birth.as_str().as_bytes()).collect();
                let region = self.config.storage_region.as_deref().unwrap_or("default");
                Ok(format!(
                    "{base}/artifactsV2/{region}/{entity}/{birth}/{md5_hex}"
                ))
            }
        }
    }
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;

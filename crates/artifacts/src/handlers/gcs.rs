// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `gs://` references.
//!
//! Unlike S3, object digests are the backend-reported base64 MD5, so
//! loads hit the md5 cache namespace. Versions are GCS generations.
//! The backend sits behind [`GcsApi`]; the production implementation
//! speaks the JSON API over the shared HTTP client.

use super::{basename, relative_key, LoadedPath, StorageHandler, StoreOptions};
use crate::cache::ArtifactCache;
use crate::error::StorageError;
use crate::manifest::ManifestEntry;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// One object (or generation) as seen by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcsObject {
    pub name: String,
    pub md5_hash: String,
    pub etag: String,
    pub generation: i64,
    pub size: u64,
}

/// Narrow GCS surface the handler needs; injectable for tests.
#[async_trait]
pub trait GcsApi: Send + Sync {
    /// Fetch object metadata; `None` when the object (or the requested
    /// generation) does not exist.
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        generation: Option<i64>,
    ) -> Result<Option<GcsObject>, StorageError>;

    /// List up to `limit` objects under a prefix.
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<GcsObject>, StorageError>;

    /// Whether object versioning is enabled on the bucket.
    async fn versioning_enabled(&self, bucket: &str) -> Result<bool, StorageError>;

    /// Download one object (latest or a specific generation) to `dest`.
    async fn download(
        &self,
        bucket: &str,
        key: &str,
        generation: Option<i64>,
        dest: &Path,
    ) -> Result<(), StorageError>;
}

const GCS_BASE_URL: &str = "https://storage.googleapis.com/storage/v1";

/// Production [`GcsApi`] over the JSON API.
pub struct HttpGcsApi {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ObjectResource {
    name: String,
    #[serde(default, rename = "md5Hash")]
    md5_hash: Option<String>,
    #[serde(default)]
    etag: Option<String>,
    #[serde(default)]
    generation: Option<String>,
    #[serde(default)]
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectList {
    #[serde(default)]
    items: Vec<ObjectResource>,
}

#[derive(Debug, Deserialize)]
struct BucketResource {
    #[serde(default)]
    versioning: Option<BucketVersioning>,
}

#[derive(Debug, Deserialize)]
struct BucketVersioning {
    #[serde(default)]
    enabled: bool,
}

impl From<ObjectResource> for GcsObject {
    fn from(res: ObjectResource) -> Self {
        Self {
            name: res.name,
            md5_hash: res.md5_hash.unwrap_or_default(),
            etag: res.etag.unwrap_or_default(),
            generation: res
                .generation
                .and_then(|g| g.parse().ok())
                .unwrap_or_default(),
            size: res.size.and_then(|s| s.parse().ok()).unwrap_or_default(),
        }
    }
}

impl HttpGcsApi {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: GCS_BASE_URL.to_string(),
        }
    }

    fn url(&self, segments: &[&str]) -> Result<url::Url, StorageError> {
        let mut url = url::Url::parse(&self.base_url)
            .map_err(|e| StorageError::Backend(format!("invalid GCS base url: {e}")))?;
        {
            let mut parts = url
                .path_segments_mut()
                .map_err(|()| StorageError::Backend("invalid GCS base url".to_string()))?;
            for segment in segments {
                parts.push(segment);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl GcsApi for HttpGcsApi {
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        generation: Option<i64>,
    ) -> Result<Option<GcsObject>, StorageError> {
        let mut url = self.url(&["b", bucket, "o", key])?;
        if let Some(generation) = generation {
            url.query_pairs_mut()
                .append_pair("generation", &generation.to_string());
        }
        let resp = self.client.get(url).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resource: ObjectResource = resp.error_for_status()?.json().await?;
        Ok(Some(resource.into()))
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<GcsObject>, StorageError> {
        let mut url = self.url(&["b", bucket, "o"])?;
        url.query_pairs_mut()
            .append_pair("prefix", prefix)
            .append_pair("maxResults", &limit.to_string());
        let list: ObjectList = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(list.items.into_iter().map(GcsObject::from).collect())
    }

    async fn versioning_enabled(&self, bucket: &str) -> Result<bool, StorageError> {
        let mut url = self.url(&["b", bucket])?;
        url.query_pairs_mut().append_pair("fields", "versioning");
        let resource: BucketResource = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resource.versioning.map(|v| v.enabled).unwrap_or(false))
    }

    async fn download(
        &self,
        bucket: &str,
        key: &str,
        generation: Option<i64>,
        dest: &Path,
    ) -> Result<(), StorageError> {
        let mut url = self.url(&["b", bucket, "o", key])?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("alt", "media");
            if let Some(generation) = generation {
                pairs.append_pair("generation", &generation.to_string());
            }
        }
        let mut resp = self.client.get(url).send().await?.error_for_status()?;
        let mut file = std::fs::File::create(dest)?;
        while let Some(chunk) = resp.chunk().await? {
            file.write_all(&chunk)?;
        }
        Ok(())
    }
}

pub struct GcsHandler {
    scheme: String,
    api: Arc<dyn GcsApi>,
    cache: Arc<ArtifactCache>,
    versioning: parking_lot::Mutex<Option<bool>>,
}

impl GcsHandler {
    pub fn new(api: Arc<dyn GcsApi>, cache: Arc<ArtifactCache>) -> Self {
        Self {
            scheme: "gs".to_string(),
            api,
            cache,
            versioning: parking_lot::Mutex::new(None),
        }
    }

    fn parse_uri(uri: &str) -> Result<(String, String), StorageError> {
        let url = url::Url::parse(uri).map_err(|_| StorageError::SchemeUnsupported {
            scheme: uri.to_string(),
        })?;
        let bucket = url.host_str().unwrap_or_default().to_string();
        let key = url.path().trim_start_matches('/').to_string();
        Ok((bucket, key))
    }

    fn entry_from_object(
        &self,
        obj: &GcsObject,
        uri: &str,
        name: Option<&str>,
        prefix: &str,
        multi: bool,
    ) -> ManifestEntry {
        let rel = relative_key(&obj.name, prefix);
        let (entry_name, entry_ref) = match (name, rel) {
            (None, Some(rel)) => (rel.clone(), format!("{uri}/{rel}")),
            (None, None) => (basename(&obj.name), uri.to_string()),
            (Some(name), Some(rel)) if multi => {
                (format!("{name}/{rel}"), format!("{uri}/{rel}"))
            }
            (Some(name), _) => (name.to_string(), uri.to_string()),
        };

        let mut extra = BTreeMap::new();
        extra.insert("etag".to_string(), serde_json::json!(obj.etag));
        extra.insert("versionID".to_string(), serde_json::json!(obj.generation));
        ManifestEntry::reference(entry_name, entry_ref, obj.md5_hash.clone())
            .with_size(obj.size)
            .with_extra(extra)
    }

    async fn versioning_enabled(&self, bucket: &str) -> Result<bool, StorageError> {
        if let Some(enabled) = *self.versioning.lock() {
            return Ok(enabled);
        }
        let enabled = self.api.versioning_enabled(bucket).await?;
        *self.versioning.lock() = Some(enabled);
        Ok(enabled)
    }
}

#[async_trait]
impl StorageHandler for GcsHandler {
    fn scheme(&self) -> &str {
        &self.scheme
    }

    async fn store_path(
        &self,
        uri: &str,
        opts: &StoreOptions,
    ) -> Result<Vec<ManifestEntry>, StorageError> {
        let (bucket, key) = Self::parse_uri(uri)?;
        if !opts.checksum {
            let name = opts.name.clone().unwrap_or_else(|| key.clone());
            return Ok(vec![ManifestEntry::reference(name, uri, uri)]);
        }

        let max_objects = opts.max_objects();
        let (objects, multi) = match self.api.get_object(&bucket, &key, None).await? {
            Some(obj) => (vec![obj], false),
            None => {
                let start = Instant::now();
                tracing::info!(
                    bucket,
                    prefix = %key,
                    max_objects,
                    "generating checksums for objects under prefix"
                );
                let objects = self.api.list_objects(&bucket, &key, max_objects).await?;
                tracing::info!(
                    count = objects.len(),
                    elapsed_secs = start.elapsed().as_secs_f64(),
                    "prefix listing checksummed"
                );
                (objects, true)
            }
        };

        let entries: Vec<ManifestEntry> = objects
            .iter()
            .map(|o| self.entry_from_object(o, uri, opts.name.as_deref(), &key, multi))
            .collect();
        if entries.len() >= max_objects {
            return Err(StorageError::MaxObjectsExceeded { limit: max_objects });
        }
        Ok(entries)
    }

    async fn load_path(
        &self,
        entry: &ManifestEntry,
        local: bool,
    ) -> Result<LoadedPath, StorageError> {
        let size = entry
            .size
            .ok_or_else(|| StorageError::InvalidManifest("reference entry missing size".into()))?;
        let check = self.cache.lookup_md5(&entry.digest, size)?;
        if check.hit {
            return Ok(LoadedPath::Local(check.path));
        }

        let uri = entry
            .reference
            .as_deref()
            .ok_or_else(|| StorageError::InvalidManifest("entry has no reference".to_string()))?;
        let (bucket, key) = Self::parse_uri(uri)?;

        let recorded_generation = entry.extra.get("versionID").and_then(|v| {
            v.as_i64()
                .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
        });

        // Ask for the recorded generation first; buckets without
        // versioning simply won't have it.
        let mut generation = None;
        let mut found = None;
        if let Some(recorded) = recorded_generation {
            if self.versioning_enabled(&bucket).await? {
                found = self.api.get_object(&bucket, &key, Some(recorded)).await?;
                if found.is_some() {
                    generation = Some(recorded);
                }
            }
        }

        if found.is_none() {
            let obj = self
                .api
                .get_object(&bucket, &key, None)
                .await?
                .ok_or_else(|| StorageError::ObjectMissing(uri.to_string()))?;
            if obj.md5_hash != entry.digest {
                return Err(StorageError::DigestMismatch {
                    target: uri.to_string(),
                    expected: entry.digest.clone(),
                    actual: obj.md5_hash,
                });
            }
        }

        if !local {
            return Ok(LoadedPath::Reference(uri.to_string()));
        }

        let parent = check
            .path
            .parent()
            .ok_or_else(|| StorageError::FileMissing(check.path.clone()))?;
        let tmp = tempfile::NamedTempFile::new_in(parent)?;
        self.api
            .download(&bucket, &key, generation, tmp.path())
            .await?;
        tmp.persist(&check.path)
            .map_err(|e| StorageError::Io(e.error))?;
        Ok(LoadedPath::Local(check.path))
    }
}

#[cfg(test)]
#[path = "gcs_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `s3://` references.
//!
//! Object digests are etags (quotes stripped). The S3 client sits
//! behind [`S3Api`] so tests can run against a fake bucket; the
//! production implementation wraps the AWS SDK.

use super::{basename, relative_key, strip_quotes, LoadedPath, StorageHandler, StoreOptions};
use crate::cache::ArtifactCache;
use crate::error::StorageError;
use crate::manifest::ManifestEntry;
use async_trait::async_trait;
use aws_sdk_s3::types::BucketVersioningStatus;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// One object (or object version) as seen by the backend. Etags are
/// raw, possibly quoted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Object {
    pub key: String,
    pub etag: String,
    pub size: u64,
    pub version_id: Option<String>,
}

/// Narrow S3 surface the handler needs; injectable for tests.
#[async_trait]
pub trait S3Api: Send + Sync {
    /// `HEAD` one object; `None` on 404.
    async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<S3Object>, StorageError>;

    /// List up to `limit` objects under a prefix.
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<S3Object>, StorageError>;

    /// Whether versioning is enabled on the bucket.
    async fn versioning_enabled(&self, bucket: &str) -> Result<bool, StorageError>;

    /// All versions of objects under a prefix.
    async fn list_object_versions(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<S3Object>, StorageError>;

    /// Download one object (latest or a specific version) to `dest`.
    async fn download(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
        dest: &Path,
    ) -> Result<(), StorageError>;
}

/// Production [`S3Api`] over the AWS SDK.
pub struct AwsS3Api {
    client: aws_sdk_s3::Client,
}

impl AwsS3Api {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }

    /// Client from ambient AWS configuration (env, profiles, IMDS).
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(aws_sdk_s3::Client::new(&config))
    }
}

fn backend_err(err: impl std::fmt::Display) -> StorageError {
    StorageError::Backend(format!("unable to connect to S3: {err}"))
}

#[async_trait]
impl S3Api for AwsS3Api {
    async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<S3Object>, StorageError> {
        match self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
        {
            Ok(out) => Ok(Some(S3Object {
                key: key.to_string(),
                etag: out.e_tag().unwrap_or_default().to_string(),
                size: out.content_length().unwrap_or(0).max(0) as u64,
                version_id: out.version_id().map(str::to_string),
            })),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(None),
            Err(err) => Err(backend_err(err)),
        }
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<S3Object>, StorageError> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .into_paginator()
            .send();
        let mut objects = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(backend_err)?;
            for obj in page.contents() {
                objects.push(S3Object {
                    key: obj.key().unwrap_or_default().to_string(),
                    etag: obj.e_tag().unwrap_or_default().to_string(),
                    size: obj.size().unwrap_or(0).max(0) as u64,
                    version_id: None,
                });
                if objects.len() >= limit {
                    return Ok(objects);
                }
            }
        }
        Ok(objects)
    }

    async fn versioning_enabled(&self, bucket: &str) -> Result<bool, StorageError> {
        let out = self
            .client
            .get_bucket_versioning()
            .bucket(bucket)
            .send()
            .await
            .map_err(backend_err)?;
        Ok(matches!(out.status(), Some(BucketVersioningStatus::Enabled)))
    }

    async fn list_object_versions(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<S3Object>, StorageError> {
        let out = self
            .client
            .list_object_versions()
            .bucket(bucket)
            .prefix(prefix)
            .send()
            .await
            .map_err(backend_err)?;
        Ok(out
            .versions()
            .iter()
            .map(|v| S3Object {
                key: v.key().unwrap_or_default().to_string(),
                etag: v.e_tag().unwrap_or_default().to_string(),
                size: v.size().unwrap_or(0).max(0) as u64,
                version_id: v.version_id().map(str::to_string),
            })
            .collect())
    }

    async fn download(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
        dest: &Path,
    ) -> Result<(), StorageError> {
        let mut req = self.client.get_object().bucket(bucket).key(key);
        if let Some(version) = version_id {
            req = req.version_id(version);
        }
        let out = req.send().await.map_err(backend_err)?;
        let bytes = out.body.collect().await.map_err(backend_err)?.into_bytes();
        std::fs::write(dest, &bytes)?;
        Ok(())
    }
}

pub struct S3Handler {
    scheme: String,
    api: Arc<dyn S3Api>,
    cache: Arc<ArtifactCache>,
    versioning: parking_lot::Mutex<Option<bool>>,
}

impl S3Handler {
    pub fn new(api: Arc<dyn S3Api>, cache: Arc<ArtifactCache>) -> Self {
        Self {
            scheme: "s3".to_string(),
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
        obj: &S3Object,
        uri: &str,
        name: Option<&str>,
        prefix: &str,
        multi: bool,
    ) -> ManifestEntry {
        let rel = relative_key(&obj.key, prefix);
        let (entry_name, entry_ref) = match (name, rel) {
            (None, Some(rel)) => (rel.clone(), format!("{uri}/{rel}")),
            (None, None) => (basename(&obj.key), uri.to_string()),
            (Some(name), Some(rel)) if multi => {
                (format!("{name}/{rel}"), format!("{uri}/{rel}"))
            }
            (Some(name), _) => (name.to_string(), uri.to_string()),
        };

        let etag = strip_quotes(&obj.etag).to_string();
        let mut extra = BTreeMap::new();
        extra.insert("etag".to_string(), serde_json::json!(etag));
        if let Some(version) = obj.version_id.as_deref() {
            if version != "null" {
                extra.insert("versionID".to_string(), serde_json::json!(version));
            }
        }
        ManifestEntry::reference(entry_name, entry_ref, etag)
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
impl StorageHandler for S3Handler {
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
        let (objects, multi) = match self.api.head_object(&bucket, &key).await? {
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
            .filter(|o| o.size > 0)
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
        let check = self.cache.lookup_etag(&entry.digest, size)?;
        if check.hit {
            return Ok(LoadedPath::Local(check.path));
        }

        let uri = entry
            .reference
            .as_deref()
            .ok_or_else(|| StorageError::InvalidManifest("entry has no reference".to_string()))?;
        let (bucket, key) = Self::parse_uri(uri)?;

        let mut version: Option<String> = entry
            .extra
            .get("versionID")
            .and_then(|v| v.as_str().map(str::to_string));

        if version.is_none() {
            // No version recorded: take the latest and fall back to
            // listing versions if it no longer matches.
            let obj = self
                .api
                .head_object(&bucket, &key)
                .await?
                .ok_or_else(|| StorageError::ObjectMissing(uri.to_string()))?;
            let etag = strip_quotes(&obj.etag).to_string();
            if etag != entry.digest {
                if self.versioning_enabled(&bucket).await? {
                    let manifest_etag = entry
                        .extra
                        .get("etag")
                        .and_then(|v| v.as_str())
                        .unwrap_or(&entry.digest)
                        .to_string();
                    version = self
                        .api
                        .list_object_versions(&bucket, &key)
                        .await?
                        .into_iter()
                        .find(|v| strip_quotes(&v.etag) == manifest_etag)
                        .and_then(|v| v.version_id);
                    if version.is_none() {
                        return Err(StorageError::VersionNotFound {
                            bucket,
                            key,
                            etag: manifest_etag,
                        });
                    }
                } else {
                    return Err(StorageError::DigestMismatch {
                        target: uri.to_string(),
                        expected: entry.digest.clone(),
                        actual: etag,
                    });
                }
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
            .download(&bucket, &key, version.as_deref(), tmp.path())
            .await?;
        tmp.persist(&check.path)
            .map_err(|e| StorageError::Io(e.error))?;
        Ok(LoadedPath::Local(check.path))
    }
}

#[cfg(test)]
#[path = "s3_tests.rs"]
mod tests;

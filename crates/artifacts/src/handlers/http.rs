// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `http://` and `https://` references.
//!
//! The digest is the server's etag (quotes stripped) and the size the
//! reported content length. Downloads stream into the etag cache.

use super::{basename, strip_quotes, LoadedPath, StorageHandler, StoreOptions};
use crate::cache::{ArtifactCache, CacheWriter};
use crate::error::StorageError;
use crate::manifest::ManifestEntry;
use crate::retry::{send_with_retry, RetryPolicy};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct HttpHandler {
    scheme: String,
    session: reqwest::Client,
    retry: RetryPolicy,
    cache: Arc<ArtifactCache>,
}

impl HttpHandler {
    pub fn new(session: reqwest::Client, cache: Arc<ArtifactCache>) -> Self {
        Self::with_scheme(session, cache, "http")
    }

    /// Same handler registered under another scheme (`https`).
    pub fn with_scheme(
        session: reqwest::Client,
        cache: Arc<ArtifactCache>,
        scheme: impl Into<String>,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            session,
            retry: RetryPolicy::default(),
            cache,
        }
    }
}

/// Digest, size, and extra metadata from response headers.
fn entry_from_headers(
    headers: &reqwest::header::HeaderMap,
) -> (
    Option<String>,
    Option<u64>,
    BTreeMap<String, serde_json::Value>,
) {
    let size = headers
        .get(reqwest::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok());
    let etag = headers
        .get(reqwest::header::ETAG)
        .and_then(|v| v.to_str().ok());
    let mut extra = BTreeMap::new();
    if let Some(etag) = etag {
        extra.insert("etag".to_string(), serde_json::json!(etag));
    }
    let digest = etag.map(|e| strip_quotes(e).to_string());
    (digest, size, extra)
}

#[async_trait]
impl StorageHandler for HttpHandler {
    fn scheme(&self) -> &str {
        &self.scheme
    }

    async fn store_path(
        &self,
        uri: &str,
        opts: &StoreOptions,
    ) -> Result<Vec<ManifestEntry>, StorageError> {
        let name = opts.name.clone().unwrap_or_else(|| basename(uri));
        if !opts.checksum {
            return Ok(vec![ManifestEntry::reference(name, uri, uri)]);
        }

        let resp = send_with_retry(&self.retry, || self.session.get(uri).send()).await?;
        let (digest, size, extra) = entry_from_headers(resp.headers());

        let mut entry =
            ManifestEntry::reference(name, uri, digest.unwrap_or_else(|| uri.to_string()))
                .with_extra(extra);
        if let Some(size) = size {
            entry = entry.with_size(size);
        }
        Ok(vec![entry])
    }

    async fn load_path(
        &self,
        entry: &ManifestEntry,
        local: bool,
    ) -> Result<LoadedPath, StorageError> {
        let uri = entry
            .reference
            .as_deref()
            .ok_or_else(|| StorageError::InvalidManifest("entry has no reference".to_string()))?;
        if !local {
            return Ok(LoadedPath::Reference(uri.to_string()));
        }

        let size = entry
            .size
            .ok_or_else(|| StorageError::InvalidManifest("reference entry missing size".into()))?;
        let check = self.cache.lookup_etag(&entry.digest, size)?;
        if check.hit {
            return Ok(LoadedPath::Local(check.path));
        }

        let mut resp = send_with_retry(&self.retry, || self.session.get(uri).send()).await?;
        let (digest, _, _) = entry_from_headers(resp.headers());
        if let Some(digest) = digest {
            if digest != entry.digest {
                return Err(StorageError::DigestMismatch {
                    target: uri.to_string(),
                    expected: entry.digest.clone(),
                    actual: digest,
                });
            }
        }

        let mut writer = CacheWriter::create(&check.path)?;
        while let Some(chunk) = resp.chunk().await? {
            writer.write_chunk(&chunk)?;
        }
        let path = writer.commit()?;
        Ok(LoadedPath::Local(path))
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;

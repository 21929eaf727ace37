// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-scheme storage handlers.
//!
//! A handler owns one URI scheme and knows how to turn a URI into
//! manifest entries (`store_path`) and a manifest entry back into bytes
//! or a reference (`load_path`). [`MultiHandler`] routes on scheme with
//! a default fallback for anything unrecognized.

use crate::error::StorageError;
use crate::manifest::ManifestEntry;
use async_trait::async_trait;
use std::path::PathBuf;

mod gcs;
mod http;
mod local;
mod multi;
mod s3;
mod tracking;

pub use gcs::{GcsApi, GcsHandler, GcsObject, HttpGcsApi};
pub use http::HttpHandler;
pub use local::LocalFileHandler;
pub use multi::MultiHandler;
pub use s3::{AwsS3Api, S3Api, S3Handler, S3Object};
pub use tracking::TrackingHandler;

/// Cap on entries produced by one directory/prefix walk.
pub const DEFAULT_MAX_OBJECTS: usize = 10_000;

/// Options for `store_path`.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Logical name (or name prefix in multi-object mode) for the
    /// resulting entries. Defaults to a URI-derived name.
    pub name: Option<String>,
    /// When false, track the reference without reading or checksumming
    /// it; the digest is the URI itself.
    pub checksum: bool,
    /// Override for [`DEFAULT_MAX_OBJECTS`].
    pub max_objects: Option<usize>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            name: None,
            checksum: true,
            max_objects: None,
        }
    }
}

impl StoreOptions {
    pub fn max_objects(&self) -> usize {
        self.max_objects.unwrap_or(DEFAULT_MAX_OBJECTS)
    }
}

/// Result of `load_path`: a local file, or the reference itself when no
/// download was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadedPath {
    Local(PathBuf),
    Reference(String),
}

impl LoadedPath {
    /// The local path, if this load produced one.
    pub fn local(&self) -> Option<&std::path::Path> {
        match self {
            LoadedPath::Local(p) => Some(p),
            LoadedPath::Reference(_) => None,
        }
    }
}

/// Capability interface for one URI scheme.
#[async_trait]
pub trait StorageHandler: Send + Sync {
    /// URI scheme this handler serves (e.g. `"s3"`).
    fn scheme(&self) -> &str;

    /// Turn a URI into manifest entries.
    async fn store_path(
        &self,
        uri: &str,
        opts: &StoreOptions,
    ) -> Result<Vec<ManifestEntry>, StorageError>;

    /// Materialize an entry. With `local == false`, handlers that can
    /// serve the reference directly return it without downloading.
    async fn load_path(
        &self,
        entry: &ManifestEntry,
        local: bool,
    ) -> Result<LoadedPath, StorageError>;
}

/// Scheme of a URI, if it parses as one.
pub(crate) fn uri_scheme(uri: &str) -> Option<String> {
    url::Url::parse(uri).ok().map(|u| u.scheme().to_string())
}

/// Filesystem-ish basename of a URI or path string.
pub(crate) fn basename(path: &str) -> String {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
        .to_string()
}

/// Strip one pair of surrounding double quotes (etags arrive quoted).
pub(crate) fn strip_quotes(etag: &str) -> &str {
    etag.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(etag)
}

/// Relative path of `key` under `prefix`, slash-normalized.
pub(crate) fn relative_key(key: &str, prefix: &str) -> Option<String> {
    if key == prefix {
        return None;
    }
    key.strip_prefix(prefix)
        .map(|rest| rest.trim_start_matches('/').to_string())
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

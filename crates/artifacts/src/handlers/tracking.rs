// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fallback handler that tracks paths as-is.
//!
//! Useful when the tracked data lives on a filesystem mounted at a
//! standardized location (say an NFS share on `/data`): recording the
//! path is enough, no reading or checksumming happens.

use super::{uri_scheme, LoadedPath, StorageHandler, StoreOptions};
use crate::error::StorageError;
use crate::manifest::ManifestEntry;
use async_trait::async_trait;

#[derive(Debug, Default)]
pub struct TrackingHandler {
    scheme: String,
}

impl TrackingHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageHandler for TrackingHandler {
    fn scheme(&self) -> &str {
        &self.scheme
    }

    async fn store_path(
        &self,
        uri: &str,
        opts: &StoreOptions,
    ) -> Result<Vec<ManifestEntry>, StorageError> {
        let Some(name) = opts.name.clone() else {
            return Err(StorageError::NameRequired(uri.to_string()));
        };
        tracing::warn!(
            uri,
            "artifact references with unsupported schemes cannot be checksummed"
        );
        Ok(vec![ManifestEntry::reference(name, uri, uri)])
    }

    async fn load_path(
        &self,
        entry: &ManifestEntry,
        local: bool,
    ) -> Result<LoadedPath, StorageError> {
        if local {
            // This handler is oblivious to the underlying bytes, so a
            // download request is almost certainly a user error.
            let uri = entry.reference.clone().unwrap_or_default();
            let scheme = uri_scheme(&uri).unwrap_or_default();
            return Err(StorageError::UntrackedDownload { uri, scheme });
        }
        Ok(LoadedPath::Reference(entry.path.clone()))
    }
}

#[cfg(test)]
#[path = "tracking_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheme-indexed handler registry with a default fallback.

use super::{uri_scheme, LoadedPath, StorageHandler, StoreOptions};
use crate::error::StorageError;
use crate::manifest::ManifestEntry;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

pub struct MultiHandler {
    handlers: HashMap<String, Arc<dyn StorageHandler>>,
    default_handler: Option<Arc<dyn StorageHandler>>,
}

impl MultiHandler {
    pub fn new(
        handlers: Vec<Arc<dyn StorageHandler>>,
        default_handler: Option<Arc<dyn StorageHandler>>,
    ) -> Self {
        let handlers = handlers
            .into_iter()
            .map(|h| (h.scheme().to_string(), h))
            .collect();
        Self {
            handlers,
            default_handler,
        }
    }

    fn route(&self, uri: &str) -> Result<&Arc<dyn StorageHandler>, StorageError> {
        let scheme = uri_scheme(uri).unwrap_or_default();
        if let Some(handler) = self.handlers.get(&scheme) {
            return Ok(handler);
        }
        self.default_handler
            .as_ref()
            .ok_or(StorageError::SchemeUnsupported { scheme })
    }
}

#[async_trait]
impl StorageHandler for MultiHandler {
    fn scheme(&self) -> &str {
        ""
    }

    async fn store_path(
        &self,
        uri: &str,
        opts: &StoreOptions,
    ) -> Result<Vec<ManifestEntry>, StorageError> {
        self.route(uri)?.store_path(uri, opts).await
    }

    async fn load_path(
        &self,
        entry: &ManifestEntry,
        local: bool,
    ) -> Result<LoadedPath, StorageError> {
        let uri = entry.reference.as_deref().unwrap_or_default();
        self.route(uri)?.load_path(entry, local).await
    }
}

#[cfg(test)]
#[path = "multi_tests.rs"]
mod tests;

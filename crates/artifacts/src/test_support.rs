// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fakes for artifact-engine tests.

use crate::cache::ArtifactCache;
use crate::error::StorageError;
use crate::handlers::{GcsApi, GcsObject, S3Api, S3Object};
use crate::policy::{PolicyConfig, StorageLayout, WandbStoragePolicy};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

pub(crate) struct NullS3;

#[async_trait]
impl S3Api for NullS3 {
    async fn head_object(&self, _: &str, _: &str) -> Result<Option<S3Object>, StorageError> {
        Ok(None)
    }
    async fn list_objects(
        &self,
        _: &str,
        _: &str,
        _: usize,
    ) -> Result<Vec<S3Object>, StorageError> {
        Ok(vec![])
    }
    async fn versioning_enabled(&self, _: &str) -> Result<bool, StorageError> {
        Ok(false)
    }
    async fn list_object_versions(&self, _: &str, _: &str) -> Result<Vec<S3Object>, StorageError> {
        Ok(vec![])
    }
    async fn download(
        &self,
        _: &str,
        _: &str,
        _: Option<&str>,
        _: &Path,
    ) -> Result<(), StorageError> {
        Err(StorageError::Backend("no fake content".to_string()))
    }
}

pub(crate) struct NullGcs;

#[async_trait]
impl GcsApi for NullGcs {
    async fn get_object(
        &self,
        _: &str,
        _: &str,
        _: Option<i64>,
    ) -> Result<Option<GcsObject>, StorageError> {
        Ok(None)
    }
    async fn list_objects(
        &self,
        _: &str,
        _: &str,
        _: usize,
    ) -> Result<Vec<GcsObject>, StorageError> {
        Ok(vec![])
    }
    async fn versioning_enabled(&self, _: &str) -> Result<bool, StorageError> {
        Ok(false)
    }
    async fn download(
        &self,
        _: &str,
        _: &str,
        _: Option<i64>,
        _: &Path,
    ) -> Result<(), StorageError> {
        Err(StorageError::Backend("no fake content".to_string()))
    }
}

/// A policy over a temp-dir cache and fake cloud backends.
pub(crate) fn test_policy(
    layout: StorageLayout,
) -> (tempfile::TempDir, Arc<ArtifactCache>, Arc<WandbStoragePolicy>) {
    let cache_dir = tempfile::tempdir().expect("temp cache dir");
    let cache = Arc::new(ArtifactCache::new(cache_dir.path()));
    let policy = WandbStoragePolicy::build(
        cache.clone(),
        Arc::new(NullS3),
        Arc::new(NullGcs),
        PolicyConfig {
            storage_layout: layout,
            storage_region: None,
        },
        "https://api.example.test",
        None,
    )
    .expect("test policy");
    (cache_dir, cache, policy.into())
}

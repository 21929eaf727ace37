// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::handlers::TrackingHandler;

struct RecordingHandler {
    scheme: &'static str,
}

#[async_trait]
impl StorageHandler for RecordingHandler {
    fn scheme(&self) -> &str {
        self.scheme
    }

    async fn store_path(
        &self,
        uri: &str,
        _opts: &StoreOptions,
    ) -> Result<Vec<ManifestEntry>, StorageError> {
        Ok(vec![ManifestEntry::reference(self.scheme, uri, "routed")])
    }

    async fn load_path(
        &self,
        _entry: &ManifestEntry,
        _local: bool,
    ) -> Result<LoadedPath, StorageError> {
        Ok(LoadedPath::Reference(self.scheme.to_string()))
    }
}

fn multi_with_default() -> MultiHandler {
    MultiHandler::new(
        vec![
            Arc::new(RecordingHandler { scheme: "s3" }),
            Arc::new(RecordingHandler { scheme: "gs" }),
        ],
        Some(Arc::new(TrackingHandler::new())),
    )
}

#[tokio::test]
async fn routes_by_scheme() {
    let multi = multi_with_default();
    let entries = multi
        .store_path("s3://bucket/key", &StoreOptions::default())
        .await
        .unwrap();
    assert_eq!(entries[0].path, "s3");

    let entries = multi
        .store_path("gs://bucket/key", &StoreOptions::default())
        .await
        .unwrap();
    assert_eq!(entries[0].path, "gs");
}

#[tokio::test]
async fn unknown_scheme_falls_back_to_default() {
    let multi = multi_with_default();
    let entries = multi
        .store_path(
            "nfs://share/data",
            &StoreOptions {
                name: Some("data".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    // default TrackingHandler: digest is the uri itself
    assert_eq!(entries[0].digest, "nfs://share/data");
}

#[tokio::test]
async fn unknown_scheme_without_default_fails() {
    let multi = MultiHandler::new(vec![Arc::new(RecordingHandler { scheme: "s3" })], None);
    let err = multi
        .store_path("nfs://share/data", &StoreOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::SchemeUnsupported { scheme } if scheme == "nfs"
    ));
}

#[tokio::test]
async fn load_routes_on_entry_reference() {
    let multi = multi_with_default();
    let entry = ManifestEntry::reference("x", "gs://b/k", "d");
    let loaded = multi.load_path(&entry, false).await.unwrap();
    assert_eq!(loaded, LoadedPath::Reference("gs".to_string()));
}

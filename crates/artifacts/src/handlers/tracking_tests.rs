// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn store_requires_a_name() {
    let handler = TrackingHandler::new();
    let err = handler
        .store_path("nfs://share/data", &StoreOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NameRequired(_)));
}

#[tokio::test]
async fn store_tracks_uri_as_digest() {
    let handler = TrackingHandler::new();
    let entries = handler
        .store_path(
            "nfs://share/data",
            &StoreOptions {
                name: Some("data".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].path, "data");
    assert_eq!(entries[0].digest, "nfs://share/data");
    assert_eq!(entries[0].reference.as_deref(), Some("nfs://share/data"));
}

#[tokio::test]
async fn load_returns_tracked_path_when_not_local() {
    let handler = TrackingHandler::new();
    let entry = ManifestEntry::reference("data", "nfs://share/data", "nfs://share/data");
    let loaded = handler.load_path(&entry, false).await.unwrap();
    assert_eq!(loaded, LoadedPath::Reference("data".to_string()));
}

#[tokio::test]
async fn load_local_fails() {
    let handler = TrackingHandler::new();
    let entry = ManifestEntry::reference("data", "nfs://share/data", "nfs://share/data");
    let err = handler.load_path(&entry, true).await.unwrap_err();
    assert!(matches!(err, StorageError::UntrackedDownload { .. }));
}

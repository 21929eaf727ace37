// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use parking_lot::Mutex;

/// In-memory bucket fake. Keys map to (etag, content, versions).
#[derive(Default)]
struct FakeS3 {
    objects: Mutex<Vec<S3Object>>,
    versions: Mutex<Vec<S3Object>>,
    versioning: bool,
    content: Mutex<std::collections::HashMap<String, Vec<u8>>>,
}

impl FakeS3 {
    fn with_objects(objects: Vec<S3Object>) -> Self {
        Self {
            objects: Mutex::new(objects),
            ..Default::default()
        }
    }
}

#[async_trait]
impl S3Api for FakeS3 {
    async fn head_object(
        &self,
        _bucket: &str,
        key: &str,
    ) -> Result<Option<S3Object>, StorageError> {
        Ok(self.objects.lock().iter().find(|o| o.key == key).cloned())
    }

    async fn list_objects(
        &self,
        _bucket: &str,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<S3Object>, StorageError> {
        Ok(self
            .objects
            .lock()
            .iter()
            .filter(|o| o.key.starts_with(prefix))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn versioning_enabled(&self, _bucket: &str) -> Result<bool, StorageError> {
        Ok(self.versioning)
    }

    async fn list_object_versions(
        &self,
        _bucket: &str,
        prefix: &str,
    ) -> Result<Vec<S3Object>, StorageError> {
        Ok(self
            .versions
            .lock()
            .iter()
            .filter(|o| o.key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn download(
        &self,
        _bucket: &str,
        key: &str,
        version_id: Option<&str>,
        dest: &std::path::Path,
    ) -> Result<(), StorageError> {
        let lookup = match version_id {
            Some(v) => format!("{key}@{v}"),
            None => key.to_string(),
        };
        let content = self
            .content
            .lock()
            .get(&lookup)
            .cloned()
            .ok_or_else(|| StorageError::ObjectMissing(lookup))?;
        std::fs::write(dest, content)?;
        Ok(())
    }
}

fn obj(key: &str, etag: &str, size: u64) -> S3Object {
    S3Object {
        key: key.to_string(),
        etag: etag.to_string(),
        size,
        version_id: None,
    }
}

fn handler(api: FakeS3) -> (tempfile::TempDir, S3Handler) {
    let cache_dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(ArtifactCache::new(cache_dir.path()));
    (cache_dir, S3Handler::new(Arc::new(api), cache))
}

#[tokio::test]
async fn single_object_store_uses_basename() {
    let api = FakeS3::with_objects(vec![obj("path/to/model.bin", "\"E1\"", 7)]);
    let (_dir, handler) = handler(api);

    let entries = handler
        .store_path("s3://bucket/path/to/model.bin", &StoreOptions::default())
        .await
        .unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].path, "model.bin");
    assert_eq!(entries[0].digest, "E1");
    assert_eq!(entries[0].size, Some(7));
    assert_eq!(entries[0].extra["etag"], "E1");
    assert_eq!(
        entries[0].reference.as_deref(),
        Some("s3://bucket/path/to/model.bin")
    );
}

#[tokio::test]
async fn multi_object_store_lists_prefix() {
    let api = FakeS3::with_objects(vec![obj("k/x", "\"X\"", 1), obj("k/y", "\"Y\"", 2)]);
    let (_dir, handler) = handler(api);

    let mut entries = handler
        .store_path("s3://b/k", &StoreOptions::default())
        .await
        .unwrap();
    entries.sort_by(|a, b| a.path.cmp(&b.path));

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].path, "x");
    assert_eq!(entries[0].digest, "X");
    assert_eq!(entries[0].reference.as_deref(), Some("s3://b/k/x"));
    assert_eq!(entries[1].path, "y");
    assert_eq!(entries[1].digest, "Y");
}

#[tokio::test]
async fn multi_object_store_with_name_prefixes() {
    let api = FakeS3::with_objects(vec![obj("k/x", "\"X\"", 1)]);
    let (_dir, handler) = handler(api);

    let entries = handler
        .store_path(
            "s3://b/k",
            &StoreOptions {
                name: Some("data".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(entries[0].path, "data/x");
    assert_eq!(entries[0].reference.as_deref(), Some("s3://b/k/x"));
}

#[tokio::test]
async fn zero_byte_objects_are_skipped() {
    let api = FakeS3::with_objects(vec![obj("k/empty", "\"E\"", 0), obj("k/x", "\"X\"", 1)]);
    let (_dir, handler) = handler(api);

    let entries = handler
        .store_path("s3://b/k", &StoreOptions::default())
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].path, "x");
}

#[tokio::test]
async fn store_enforces_max_objects() {
    let api = FakeS3::with_objects(vec![obj("k/x", "\"X\"", 1), obj("k/y", "\"Y\"", 2)]);
    let (_dir, handler) = handler(api);

    let err = handler
        .store_path(
            "s3://b/k",
            &StoreOptions {
                max_objects: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::MaxObjectsExceeded { limit: 2 }));
}

#[tokio::test]
async fn version_id_null_is_omitted_from_extra() {
    let mut o = obj("k", "\"E\"", 1);
    o.version_id = Some("null".to_string());
    let api = FakeS3::with_objects(vec![o]);
    let (_dir, handler) = handler(api);

    let entries = handler
        .store_path("s3://b/k", &StoreOptions::default())
        .await
        .unwrap();
    assert!(entries[0].extra.get("versionID").is_none());
}

#[tokio::test]
async fn load_without_local_returns_reference() {
    let api = FakeS3::with_objects(vec![obj("k", "\"E1\"", 4)]);
    let (_dir, handler) = handler(api);

    let entries = handler
        .store_path("s3://b/k", &StoreOptions::default())
        .await
        .unwrap();
    let loaded = handler.load_path(&entries[0], false).await.unwrap();
    assert_eq!(loaded, LoadedPath::Reference("s3://b/k".to_string()));
}

#[tokio::test]
async fn load_local_downloads_into_cache() {
    let api = FakeS3::with_objects(vec![obj("k", "\"E1\"", 4)]);
    api.content
        .lock()
        .insert("k".to_string(), b"data".to_vec());
    let (_dir, handler) = handler(api);

    let entries = handler
        .store_path("s3://b/k", &StoreOptions::default())
        .await
        .unwrap();
    let loaded = handler.load_path(&entries[0], true).await.unwrap();
    let path = loaded.local().unwrap();
    assert_eq!(std::fs::read(path).unwrap(), b"data");
}

#[tokio::test]
async fn digest_mismatch_without_versioning_fails() {
    let api = FakeS3::with_objects(vec![obj("k", "\"NEWER\"", 4)]);
    let (_dir, handler) = handler(api);

    let entry = ManifestEntry::reference("k", "s3://b/k", "E1").with_size(4);
    let err = handler.load_path(&entry, false).await.unwrap_err();
    assert!(matches!(err, StorageError::DigestMismatch { .. }));
}

#[tokio::test]
async fn digest_mismatch_falls_back_to_version_listing() {
    let mut api = FakeS3::with_objects(vec![obj("k", "\"NEWER\"", 4)]);
    api.versioning = true;
    let mut old = obj("k", "\"E1\"", 4);
    old.version_id = Some("v7".to_string());
    api.versions.lock().push(old);
    api.content
        .lock()
        .insert("k@v7".to_string(), b"data".to_vec());
    let (_dir, handler) = handler(api);

    let mut entry = ManifestEntry::reference("k", "s3://b/k", "E1").with_size(4);
    entry
        .extra
        .insert("etag".to_string(), serde_json::json!("E1"));

    let loaded = handler.load_path(&entry, true).await.unwrap();
    assert_eq!(std::fs::read(loaded.local().unwrap()).unwrap(), b"data");
}

#[tokio::test]
async fn version_fallback_names_parsed_bucket_when_missing() {
    let mut api = FakeS3::with_objects(vec![obj("k", "\"NEWER\"", 4)]);
    api.versioning = true;
    let (_dir, handler) = handler(api);

    let mut entry = ManifestEntry::reference("k", "s3://mybucket/k", "E1").with_size(4);
    entry
        .extra
        .insert("etag".to_string(), serde_json::json!("E1"));

    let err = handler.load_path(&entry, false).await.unwrap_err();
    match err {
        StorageError::VersionNotFound { bucket, key, etag } => {
            assert_eq!(bucket, "mybucket");
            assert_eq!(key, "k");
            assert_eq!(etag, "E1");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn recorded_version_id_is_fetched_directly() {
    let api = FakeS3::default();
    api.content
        .lock()
        .insert("k@v3".to_string(), b"old!".to_vec());
    let (_dir, handler) = handler(api);

    let mut entry = ManifestEntry::reference("k", "s3://b/k", "E1").with_size(4);
    entry
        .extra
        .insert("versionID".to_string(), serde_json::json!("v3"));

    let loaded = handler.load_path(&entry, true).await.unwrap();
    assert_eq!(std::fs::read(loaded.local().unwrap()).unwrap(), b"old!");
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::digest::md5_b64;
use parking_lot::Mutex;

#[derive(Default)]
struct FakeGcs {
    objects: Mutex<Vec<GcsObject>>,
    versioning: bool,
    content: Mutex<std::collections::HashMap<String, Vec<u8>>>,
}

impl FakeGcs {
    fn with_objects(objects: Vec<GcsObject>) -> Self {
        Self {
            objects: Mutex::new(objects),
            ..Default::default()
        }
    }
}

#[async_trait]
impl GcsApi for FakeGcs {
    async fn get_object(
        &self,
        _bucket: &str,
        key: &str,
        generation: Option<i64>,
    ) -> Result<Option<GcsObject>, StorageError> {
        Ok(self
            .objects
            .lock()
            .iter()
            .find(|o| o.name == key && generation.map(|g| g == o.generation).unwrap_or(true))
            .cloned())
    }

    async fn list_objects(
        &self,
        _bucket: &str,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<GcsObject>, StorageError> {
        Ok(self
            .objects
            .lock()
            .iter()
            .filter(|o| o.name.starts_with(prefix))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn versioning_enabled(&self, _bucket: &str) -> Result<bool, StorageError> {
        Ok(self.versioning)
    }

    async fn download(
        &self,
        _bucket: &str,
        key: &str,
        generation: Option<i64>,
        dest: &std::path::Path,
    ) -> Result<(), StorageError> {
        let lookup = match generation {
            Some(g) => format!("{key}@{g}"),
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

fn gcs_obj(name: &str, md5: &str, generation: i64, size: u64) -> GcsObject {
    GcsObject {
        name: name.to_string(),
        md5_hash: md5.to_string(),
        etag: format!("etag-{generation}"),
        generation,
        size,
    }
}

fn handler(api: FakeGcs) -> (tempfile::TempDir, GcsHandler) {
    let cache_dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(ArtifactCache::new(cache_dir.path()));
    (cache_dir, GcsHandler::new(Arc::new(api), cache))
}

#[tokio::test]
async fn single_object_store_uses_md5_digest() {
    let digest = md5_b64(b"weights");
    let api = FakeGcs::with_objects(vec![gcs_obj("models/w.bin", &digest, 3, 7)]);
    let (_dir, handler) = handler(api);

    let entries = handler
        .store_path("gs://bucket/models/w.bin", &StoreOptions::default())
        .await
        .unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].path, "w.bin");
    assert_eq!(entries[0].digest, digest);
    assert_eq!(entries[0].extra["versionID"], 3);
    assert_eq!(entries[0].extra["etag"], "etag-3");
}

#[tokio::test]
async fn multi_object_store_lists_prefix() {
    let api = FakeGcs::with_objects(vec![
        gcs_obj("k/x", "MX", 1, 1),
        gcs_obj("k/y", "MY", 1, 2),
    ]);
    let (_dir, handler) = handler(api);

    let mut entries = handler
        .store_path("gs://b/k", &StoreOptions::default())
        .await
        .unwrap();
    entries.sort_by(|a, b| a.path.cmp(&b.path));

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].path, "x");
    assert_eq!(entries[0].digest, "MX");
    assert_eq!(entries[0].reference.as_deref(), Some("gs://b/k/x"));
}

#[tokio::test]
async fn load_without_local_returns_reference() {
    let digest = md5_b64(b"data");
    let api = FakeGcs::with_objects(vec![gcs_obj("k", &digest, 1, 4)]);
    let (_dir, handler) = handler(api);

    let entries = handler
        .store_path("gs://b/k", &StoreOptions::default())
        .await
        .unwrap();
    let loaded = handler.load_path(&entries[0], false).await.unwrap();
    assert_eq!(loaded, LoadedPath::Reference("gs://b/k".to_string()));
}

#[tokio::test]
async fn load_fetches_recorded_generation_when_versioned() {
    let digest = md5_b64(b"old!");
    let mut api = FakeGcs::with_objects(vec![
        gcs_obj("k", &md5_b64(b"new!"), 9, 4),
        gcs_obj("k", &digest, 3, 4),
    ]);
    api.versioning = true;
    api.content
        .lock()
        .insert("k@3".to_string(), b"old!".to_vec());
    let (_dir, handler) = handler(api);

    let mut entry = ManifestEntry::reference("k", "gs://b/k", digest.clone()).with_size(4);
    entry
        .extra
        .insert("versionID".to_string(), serde_json::json!(3));

    let loaded = handler.load_path(&entry, true).await.unwrap();
    assert_eq!(std::fs::read(loaded.local().unwrap()).unwrap(), b"old!");
}

#[tokio::test]
async fn load_digest_mismatch_without_versioning_fails() {
    let api = FakeGcs::with_objects(vec![gcs_obj("k", &md5_b64(b"new!"), 9, 4)]);
    let (_dir, handler) = handler(api);

    let entry = ManifestEntry::reference("k", "gs://b/k", md5_b64(b"old!")).with_size(4);
    let err = handler.load_path(&entry, true).await.unwrap_err();
    assert!(matches!(err, StorageError::DigestMismatch { .. }));
}

#[tokio::test]
async fn object_resource_parses_string_numbers() {
    let json = serde_json::json!({
        "name": "k/x",
        "md5Hash": "abc==",
        "etag": "CJjh",
        "generation": "1700000000000000",
        "size": "12345"
    });
    let resource: ObjectResource = serde_json::from_value(json).unwrap();
    let obj = GcsObject::from(resource);
    assert_eq!(obj.generation, 1_700_000_000_000_000);
    assert_eq!(obj.size, 12_345);
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::digest::md5_b64;

fn temp_cache() -> (tempfile::TempDir, ArtifactCache) {
    let dir = tempfile::tempdir().unwrap();
    let cache = ArtifactCache::new(dir.path());
    (dir, cache)
}

#[test]
fn md5_lookup_miss_creates_parent_dir() {
    let (_dir, cache) = temp_cache();
    let check = cache.lookup_md5(&md5_b64(b"hello"), 5).unwrap();
    assert!(!check.hit);
    assert!(check.path.parent().unwrap().is_dir());
    // hex md5 of "hello" starts with 5d
    assert!(check.path.to_string_lossy().contains("obj/md5/5d"));
}

#[test]
fn md5_lookup_hits_only_on_matching_size() {
    let (_dir, cache) = temp_cache();
    let digest = md5_b64(b"hello");

    let check = cache.lookup_md5(&digest, 5).unwrap();
    std::fs::write(&check.path, b"hello").unwrap();

    assert!(cache.lookup_md5(&digest, 5).unwrap().hit);
    // same object, wrong expected size: stale/partial write must miss
    assert!(!cache.lookup_md5(&digest, 6).unwrap().hit);
}

#[test]
fn etag_lookup_uses_etag_subtree() {
    let (_dir, cache) = temp_cache();
    let check = cache.lookup_etag("abcdef123", 3).unwrap();
    assert!(check.path.to_string_lossy().contains("obj/etag/ab"));
    std::fs::write(&check.path, b"xyz").unwrap();
    assert!(cache.lookup_etag("abcdef123", 3).unwrap().hit);
}

#[test]
fn lookup_is_stable_for_same_key() {
    let (_dir, cache) = temp_cache();
    let a = cache.lookup_etag("deadbeef", 1).unwrap();
    let b = cache.lookup_etag("deadbeef", 1).unwrap();
    assert_eq!(a.path, b.path);
}

#[test]
fn short_etag_is_rejected() {
    let (_dir, cache) = temp_cache();
    assert!(matches!(
        cache.lookup_etag("ab", 1),
        Err(StorageError::InvalidDigest(_))
    ));
}

#[test]
fn place_copies_atomically() {
    let (_dir, cache) = temp_cache();
    let src_dir = tempfile::tempdir().unwrap();
    let src = src_dir.path().join("src.bin");
    std::fs::write(&src, b"content").unwrap();

    let check = cache.lookup_etag("cafe0123", 7).unwrap();
    cache.place(&src, &check.path).unwrap();

    assert_eq!(std::fs::read(&check.path).unwrap(), b"content");
    assert!(cache.lookup_etag("cafe0123", 7).unwrap().hit);
}

#[test]
fn cache_writer_streams_and_commits() {
    let (_dir, cache) = temp_cache();
    let check = cache.lookup_etag("feed0123", 6).unwrap();

    let mut writer = CacheWriter::create(&check.path).unwrap();
    writer.write_chunk(b"abc").unwrap();
    writer.write_chunk(b"def").unwrap();
    let path = writer.commit().unwrap();

    assert_eq!(path, check.path);
    assert_eq!(std::fs::read(&path).unwrap(), b"abcdef");
}

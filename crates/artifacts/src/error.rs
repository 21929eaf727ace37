// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the artifact engine

use std::path::PathBuf;
use thiserror::Error;

/// Errors from storage handlers, the policy, and the cache.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("no storage handler registered for scheme {scheme:?}")]
    SchemeUnsupported { scheme: String },

    #[error("exceeded {limit} objects tracked, pass max_objects to add_reference")]
    MaxObjectsExceeded { limit: usize },

    #[error("digest mismatch for {target}: expected {expected} but found {actual}")]
    DigestMismatch {
        target: String,
        expected: String,
        actual: String,
    },

    #[error("failed to find file at path {0}")]
    FileMissing(PathBuf),

    #[error("object not found: {0}")]
    ObjectMissing(String),

    #[error("couldn't find object version for {bucket}/{key} matching etag {etag}")]
    VersionNotFound {
        bucket: String,
        key: String,
        etag: String,
    },

    #[error("cannot download {uri}: scheme {scheme:?} not recognized")]
    UntrackedDownload { uri: String, scheme: String },

    #[error("a name is required when tracking references with unknown schemes: {0}")]
    NameRequired(String),

    #[error("invalid digest {0:?}")]
    InvalidDigest(String),

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Comm(#[from] beacon_core::CommError),
}

/// Errors from the artifact builder.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error(
        "artifact name may only contain alphanumeric characters, dashes, \
         underscores, and dots; invalid name: {0:?}"
    )]
    InvalidName(String),

    #[error("cannot modify a finalized artifact")]
    Finalized,

    #[error("file with name {0:?} already exists")]
    DuplicateFile(String),

    #[error("path is not a file: {0}")]
    NotAFile(PathBuf),

    #[error("path is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("references must be URIs; to reference a local file, use file://")]
    ReferenceRequired,

    #[error("directory hash worker failed: {0}")]
    Worker(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

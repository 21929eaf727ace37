// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Artifact manifest (version 1).
//!
//! The manifest is an ordered inventory of an artifact's contents:
//! `path → entry`. Its digest is content-derived and deterministic
//! regardless of insertion order (entries are kept sorted by path).

use crate::digest::md5_hex;
use crate::error::StorageError;
use beacon_core::ArtifactId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Leading bytes of the digest preimage; bumping the manifest version
/// changes every digest.
const DIGEST_HEADER: &str = "wandb-artifact-manifest-v1\n";

const MANIFEST_VERSION: u32 = 1;

/// One logical file in an artifact: either an embedded file (digest is
/// its base64 MD5) or a reference (digest comes from the backend).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// POSIX-relative logical path; the manifest key. Not serialized in
    /// the entry body (it is the key of `contents`).
    #[serde(skip)]
    pub path: String,

    pub digest: String,

    /// Artifact that first uploaded this content, assigned by the server
    /// during upload preparation.
    #[serde(
        rename = "birthArtifactID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub birth_artifact_id: Option<ArtifactId>,

    /// Reference URI; `None` for files stored in the artifact.
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,

    /// Backend-specific metadata (notable keys: `etag`, `versionID`).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    /// Where the bytes live locally while the artifact is being saved.
    /// Never persisted.
    #[serde(skip)]
    pub local_path: Option<PathBuf>,
}

impl ManifestEntry {
    /// Entry for an embedded local file. `size` is required whenever a
    /// local path is recorded.
    pub fn local_file(
        path: impl Into<String>,
        digest: impl Into<String>,
        size: u64,
        local_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            path: path.into(),
            digest: digest.into(),
            birth_artifact_id: None,
            reference: None,
            extra: BTreeMap::new(),
            size: Some(size),
            local_path: Some(local_path.into()),
        }
    }

    /// Entry for a reference tracked by URI.
    pub fn reference(
        path: impl Into<String>,
        uri: impl Into<String>,
        digest: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            digest: digest.into(),
            birth_artifact_id: None,
            reference: Some(uri.into()),
            extra: BTreeMap::new(),
            size: None,
            local_path: None,
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_extra(mut self, extra: BTreeMap<String, serde_json::Value>) -> Self {
        self.extra = extra;
        self
    }
}

/// Version-1 manifest: sorted `path → entry` mapping plus the storage
/// policy that knows how to materialize the entries.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    storage_policy: String,
    storage_policy_config: serde_json::Map<String, serde_json::Value>,
    entries: BTreeMap<String, ManifestEntry>,
}

#[derive(Serialize, Deserialize)]
struct ManifestDoc {
    version: u32,
    #[serde(rename = "storagePolicy")]
    storage_policy: String,
    #[serde(rename = "storagePolicyConfig", default)]
    storage_policy_config: serde_json::Map<String, serde_json::Value>,
    contents: BTreeMap<String, ManifestEntry>,
}

impl Manifest {
    pub fn new(
        storage_policy: impl Into<String>,
        storage_policy_config: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            storage_policy: storage_policy.into(),
            storage_policy_config,
            entries: BTreeMap::new(),
        }
    }

    /// Insert an entry, keyed by its path. Replaces any previous entry
    /// at the same path.
    pub fn add_entry(&mut self, entry: ManifestEntry) {
        self.entries.insert(entry.path.clone(), entry);
    }

    pub fn entries(&self) -> &BTreeMap<String, ManifestEntry> {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut BTreeMap<String, ManifestEntry> {
        &mut self.entries
    }

    pub fn get(&self, path: &str) -> Option<&ManifestEntry> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// MD5 hex over the digest header followed by `"{path}:{digest}\n"`
    /// for every entry in ascending ASCII path order.
    pub fn digest(&self) -> String {
        let mut preimage = String::from(DIGEST_HEADER);
        for (path, entry) in &self.entries {
            preimage.push_str(path);
            preimage.push(':');
            preimage.push_str(&entry.digest);
            preimage.push('\n');
        }
        md5_hex(preimage.as_bytes())
    }

    /// The persisted JSON form. `local_path` never appears.
    pub fn to_json(&self) -> serde_json::Value {
        let doc = ManifestDoc {
            version: MANIFEST_VERSION,
            storage_policy: self.storage_policy.clone(),
            storage_policy_config: self.storage_policy_config.clone(),
            contents: self.entries.clone(),
        };
        // ManifestDoc serialization cannot fail: string keys, no
        // non-finite floats.
        serde_json::to_value(doc).unwrap_or(serde_json::Value::Null)
    }

    /// Parse a persisted manifest, restoring entry paths from the
    /// `contents` keys.
    pub fn from_json(value: serde_json::Value) -> Result<Self, StorageError> {
        let doc: ManifestDoc = serde_json::from_value(value)
            .map_err(|e| StorageError::InvalidManifest(e.to_string()))?;
        if doc.version != MANIFEST_VERSION {
            return Err(StorageError::InvalidManifest(format!(
                "expected manifest version {}, got {}",
                MANIFEST_VERSION, doc.version
            )));
        }
        let entries = doc
            .contents
            .into_iter()
            .map(|(path, mut entry)| {
                entry.path = path.clone();
                (path, entry)
            })
            .collect();
        Ok(Self {
            storage_policy: doc.storage_policy,
            storage_policy_config: doc.storage_policy_config,
            entries,
        })
    }

    pub fn storage_policy(&self) -> &str {
        &self.storage_policy
    }
}

#[cfg(test)]
#[path = "manifest_tests.rs"]
mod tests;

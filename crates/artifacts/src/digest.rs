// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! MD5 digest helpers.
//!
//! Embedded files are identified by the base64 of their raw MD5 (the
//! manifest form); the cache addresses them by the hex form.

use crate::error::StorageError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use md5::{Digest, Md5};
use std::io::Read;
use std::path::Path;

/// Base64-encoded MD5 of a file's contents.
pub fn md5_file_b64(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Md5::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(BASE64.encode(hasher.finalize()))
}

/// Base64-encoded MD5 of a byte string.
pub fn md5_b64(data: &[u8]) -> String {
    BASE64.encode(Md5::digest(data))
}

/// Hex-encoded MD5 of a byte string.
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Convert a base64 MD5 (manifest form) to hex (cache/url form).
pub fn b64_md5_to_hex(b64_md5: &str) -> Result<String, StorageError> {
    let raw = BASE64
        .decode(b64_md5)
        .map_err(|_| StorageError::InvalidDigest(b64_md5.to_string()))?;
    Ok(hex::encode(raw))
}

#[cfg(test)]
#[path = "digest_tests.rs"]
mod tests;

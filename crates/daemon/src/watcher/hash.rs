// File content hashing for the polling detector.
//
// A scan produces a fingerprint table (path → SHA-256 of content); diffing two
// tables yields the change records. Content is compared rather than mtime so
// that a touch without edits does not trigger a sync.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

use super::ChangeKind;

/// Hex-encoded SHA-256 hash of file content.
pub type ContentHash = String;

/// Absolute path → content hash for every non-ignored file seen in one scan.
pub type FingerprintTable = BTreeMap<PathBuf, ContentHash>;

/// Compute the SHA-256 hash of the given bytes, returned as a lowercase hex string.
pub fn sha256_hex(content: &[u8]) -> ContentHash {
    let digest = Sha256::digest(content);
    hex_encode(&digest)
}

/// Compute the SHA-256 hash of a file on disk.
pub fn hash_file(path: &Path) -> Result<ContentHash> {
    let content = std::fs::read(path)
        .with_context(|| format!("failed to read file for hashing: {}", path.display()))?;
    Ok(sha256_hex(&content))
}

/// Changes between two scans, in path order.
///
/// New path → `Created`, different hash → `Modified`, missing now → `Deleted`.
pub fn diff_tables(previous: &FingerprintTable, current: &FingerprintTable) -> Vec<(PathBuf, ChangeKind)> {
    let mut changes = Vec::new();

    for (path, hash) in current {
        match previous.get(path) {
            None => changes.push((path.clone(), ChangeKind::Created)),
            Some(old) if old != hash => changes.push((path.clone(), ChangeKind::Modified)),
            Some(_) => {}
        }
    }
    for path in previous.keys() {
        if !current.contains_key(path) {
            changes.push((path.clone(), ChangeKind::Deleted));
        }
    }

    changes.sort_by(|a, b| a.0.cmp(&b.0));
    changes
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

//! Snapshot Store: persisted per-pair memory of the last reconciled state.
//!
//! This is the only way the planner can tell "file is new on one side" apart
//! from "file was deleted on the other side" — both look identical from the
//! current scan alone.

use crate::pair::Pair;
use crate::paths::snapshot_filename;
use crate::scanner::SideMap;
use ahash::HashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Per-path memory of the last successful reconciliation.
///
/// `None` on a side means the file did not exist there at that time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotEntry {
    #[serde(rename = "A")]
    pub mtime_a: Option<f64>,
    #[serde(rename = "B")]
    pub mtime_b: Option<f64>,
    #[serde(default)]
    pub size_a: u64,
    #[serde(default)]
    pub size_b: u64,
    #[serde(default)]
    pub hash_a: String,
    #[serde(default)]
    pub hash_b: String,
}

impl Default for SnapshotEntry {
    fn default() -> Self {
        Self { mtime_a: None, mtime_b: None, size_a: 0, size_b: 0, hash_a: String::new(), hash_b: String::new() }
    }
}

/// Relative path → last-known state, as persisted to the sidecar JSON document.
pub type SnapshotDocument = HashMap<String, SnapshotEntry>;

fn sidecar_paths(pair: &Pair) -> [PathBuf; 2] {
    let filename = snapshot_filename(&pair.id_hash());
    [Path::new(&pair.root_a).join(&filename), Path::new(&pair.root_b).join(&filename)]
}

/// Load the snapshot for `pair`.
///
/// Tries the A-root copy first, then the B-root copy; the first one that
/// parses to a non-empty mapping wins. Parse or I/O errors on either path
/// are swallowed — a missing or corrupt copy degrades to first-run
/// semantics (empty snapshot), never a hard failure.
pub fn load(pair: &Pair) -> SnapshotDocument {
    for path in sidecar_paths(pair) {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<SnapshotDocument>(&contents) {
                Ok(doc) if !doc.is_empty() => {
                    debug!(path = %path.display(), entries = doc.len(), "loaded snapshot");
                    return doc;
                },
                Ok(_) => trace!(path = %path.display(), "snapshot present but empty, trying next copy"),
                Err(e) => trace!(path = %path.display(), error = %e, "snapshot parse failed, trying next copy"),
            },
            Err(e) => trace!(path = %path.display(), error = %e, "snapshot unreadable, trying next copy"),
        }
    }
    debug!(pair_id = %pair.id_hash(), "no usable snapshot, starting from empty");
    SnapshotDocument::default()
}

/// Save the union of `map_a`/`map_b` as the new snapshot for `pair`.
///
/// Writes both sidecar copies; write failures on either path are swallowed
/// (the next run simply starts from a stale or empty snapshot, which is
/// safe — it only produces more copies, never more deletions).
pub fn save(pair: &Pair, map_a: &SideMap, map_b: &SideMap) {
    let mut keys: std::collections::HashSet<&str> =
        std::collections::HashSet::with_capacity(map_a.len() + map_b.len());
    keys.extend(map_a.keys().map(String::as_str));
    keys.extend(map_b.keys().map(String::as_str));

    let mut document = SnapshotDocument::with_capacity_and_hasher(keys.len(), Default::default());
    for rel in keys {
        let a = map_a.get(rel);
        let b = map_b.get(rel);
        document.insert(
            rel.to_string(),
            SnapshotEntry {
                mtime_a: a.map(|d| d.mtime),
                mtime_b: b.map(|d| d.mtime),
                size_a: a.map(|d| d.size).unwrap_or(0),
                size_b: b.map(|d| d.size).unwrap_or(0),
                hash_a: a.map(|d| d.digest.to_hex()).unwrap_or_default(),
                hash_b: b.map(|d| d.digest.to_hex()).unwrap_or_default(),
            },
        );
    }

    let payload = match serde_json::to_string(&document) {
        Ok(p) => p,
        Err(e) => {
            trace!(error = %e, "failed to serialize snapshot, skipping save");
            return;
        },
    };

    for path in sidecar_paths(pair) {
        if let Err(e) = fs::write(&path, &payload) {
            trace!(path = %path.display(), error = %e, "failed to write snapshot copy");
        }
    }
}

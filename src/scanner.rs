//! Path Scanner: walks one root and produces a side map of relative path to descriptor.

use crate::hash::{self, ContentDigest};
use crate::paths::{is_reserved_component, SNAPSHOT_PREFIX, SNAPSHOT_SUFFIX};
use ahash::HashMap;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use thiserror::Error;
use tracing::{debug, trace, warn};

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("root does not exist: {0}")]
    MissingRoot(PathBuf),

    #[error("invalid glob pattern '{pattern}': {source}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

/// Metadata for a single file as seen by one scan.
#[derive(Debug, Clone, PartialEq)]
pub struct FileDescriptor {
    /// POSIX-style relative path ("/" separators, regardless of host OS).
    pub rel_path: String,
    pub absolute: PathBuf,
    /// Seconds since the epoch, real-valued.
    pub mtime: f64,
    pub size: u64,
    pub digest: ContentDigest,
}

/// Relative path → descriptor, as produced by one scan of one root.
pub type SideMap = HashMap<String, FileDescriptor>;

fn build_glob_set(patterns: &[String]) -> Result<GlobSet, ScanError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|source| ScanError::InvalidGlob {
            pattern: pattern.clone(),
            source,
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| ScanError::InvalidGlob {
        pattern: patterns.join(","),
        source,
    })
}

fn matches_filters(rel: &str, includes: &GlobSet, excludes: &GlobSet, has_includes: bool) -> bool {
    if has_includes && !includes.is_match(rel) {
        return false;
    }
    if excludes.is_match(rel) {
        return false;
    }
    let lower = rel.rsplit('/').next().unwrap_or(rel).to_lowercase();
    if lower.starts_with(SNAPSHOT_PREFIX) && lower.ends_with(SNAPSHOT_SUFFIX) {
        return false;
    }
    if rel.split('/').any(is_reserved_component) {
        return false;
    }
    true
}

/// Scan `root`, applying `include`/`exclude` glob filters (full relative path,
/// non-literal-separator single-star semantics — see SPEC_FULL.md §4.1).
///
/// Directories named `.sync_archive`/`.sync_trash` are pruned entirely, not
/// merely filtered: the walk never descends into them. Symlinks are skipped.
/// Walk and hash happen in the same sequential pass — one file at a time, no
/// concurrent hashing — so the stop flag, checked per entry, actually bounds
/// how much work is done after a stop request; this also keeps disk access
/// predictable on the single removable volume a pair typically lives on.
pub fn scan_root(
    root: &Path,
    include: &[String],
    exclude: &[String],
    stop: &Arc<AtomicBool>,
) -> Result<SideMap, ScanError> {
    if !root.exists() {
        return Err(ScanError::MissingRoot(root.to_path_buf()));
    }

    let includes = build_glob_set(include)?;
    let excludes = build_glob_set(exclude)?;
    let has_includes = !include.is_empty();

    let walker = walkdir::WalkDir::new(root).into_iter().filter_entry(|entry| {
        if entry.depth() == 0 {
            return true;
        }
        !(entry.file_type().is_dir() && is_reserved_component(entry.file_name().to_string_lossy().as_ref()))
    });

    let mut map = HashMap::default();
    for entry in walker {
        if stop.load(Ordering::Relaxed) {
            debug!(root = %root.display(), "scan stopped early");
            break;
        }
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                trace!(error = %e, "skipping unreadable directory entry");
                continue;
            },
        };
        if entry.depth() == 0 {
            continue;
        }
        if entry.path_is_symlink() || !entry.file_type().is_file() {
            continue;
        }

        let rel = match entry.path().strip_prefix(root) {
            Ok(rel) => to_posix(rel),
            Err(_) => continue,
        };
        if !matches_filters(&rel, &includes, &excludes, has_includes) {
            continue;
        }

        if let Some(descriptor) = build_descriptor(&rel, entry.path()) {
            map.insert(descriptor.rel_path.clone(), descriptor);
        }
    }
    Ok(map)
}

fn build_descriptor(rel: &str, absolute: &Path) -> Option<FileDescriptor> {
    let metadata = match std::fs::metadata(absolute) {
        Ok(m) => m,
        Err(e) => {
            trace!(path = %absolute.display(), error = %e, "stat failed, dropping entry");
            return None;
        },
    };
    let size = metadata.len();
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())?;

    let digest = match hash::hash_file(absolute) {
        Ok(d) => d,
        Err(e) => {
            warn!(path = %absolute.display(), error = %e, "hash failed, dropping entry");
            return None;
        },
    };

    Some(FileDescriptor {
        rel_path: rel.to_string(),
        absolute: absolute.to_path_buf(),
        mtime,
        size,
        digest,
    })
}

fn to_posix(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

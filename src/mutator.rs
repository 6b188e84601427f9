//! Safe Mutator: the only code in this crate allowed to touch destination
//! filesystems. Every overwrite is preceded by an archive copy, every delete
//! by a move to trash, and every write to a non-empty destination goes
//! through a temp-file-then-atomic-rename with a recovery journal.
//!
//! Adapted from a single-root copy/remove pair into one that understands
//! archive/trash displacement and per-pair journal naming, since here a
//! filesystem root can be the destination of more than one pair.

use crate::paths::{journal_filename, ARCHIVE_DIR, TRASH_DIR};
use chrono::{Local, NaiveDateTime};
use filetime::FileTime;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, trace, warn};

const COPY_BUFFER_SIZE: usize = 256 * 1024;

#[derive(Error, Debug)]
pub enum MutateError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn io_err(path: &Path, source: io::Error) -> MutateError {
    MutateError::Io { path: path.to_path_buf(), source }
}

/// One timestamp bucket, resolved fresh for each action so that independent
/// displacements never collide inside the same archive/trash directory.
#[derive(Debug, Clone, Copy)]
pub struct TimestampBucket(chrono::DateTime<Local>);

impl TimestampBucket {
    pub fn now() -> Self {
        Self(Local::now())
    }

    fn label(&self) -> String {
        self.0.format("%Y%m%d_%H%M%S").to_string()
    }
}

/// Move an existing file at `dest_root`-relative `rel` into
/// `dest_root/.sync_archive/<bucket>/<rel>`, preserving its relative layout.
/// A no-op if nothing exists at `dest` yet.
pub fn archive_existing(dest_root: &Path, rel: &str, bucket: TimestampBucket) -> Result<(), MutateError> {
    displace(dest_root, rel, ARCHIVE_DIR, bucket)
}

/// Move a file slated for deletion at `root`-relative `rel` into
/// `root/.sync_trash/<bucket>/<rel>` instead of unlinking it.
pub fn move_to_trash(root: &Path, rel: &str, bucket: TimestampBucket) -> Result<(), MutateError> {
    displace(root, rel, TRASH_DIR, bucket)
}

fn displace(root: &Path, rel: &str, reserved_dir: &str, bucket: TimestampBucket) -> Result<(), MutateError> {
    let source = join_rel(root, rel);
    if !source.exists() {
        return Ok(());
    }

    let destination = join_rel(&root.join(reserved_dir).join(bucket.label()), rel);
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }

    match fs::rename(&source, &destination) {
        Ok(()) => Ok(()),
        // Cross-device rename: fall back to copy + remove.
        Err(_) => {
            fs::copy(&source, &destination).map_err(|e| io_err(&source, e))?;
            fs::remove_file(&source).map_err(|e| io_err(&source, e))?;
            Ok(())
        },
    }
}

/// Permanently delete a file at `root`-relative `rel`. Used only when
/// `use_trash == false` for the owning pair.
pub fn remove_permanently(root: &Path, rel: &str) -> Result<(), MutateError> {
    let path = join_rel(root, rel);
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_err(&path, e)),
    }
}

/// Copy `src` to `dest_root`-relative `rel`, archiving whatever previously
/// occupied that path first. Writes through a temp file in the destination
/// directory, fsyncs it, then renames atomically over the final name so a
/// crash mid-copy never leaves a half-written destination file — only an
/// orphaned temp file, which the journal lets a later run clean up.
pub fn copy_with_archive(
    src: &Path,
    dest_root: &Path,
    rel: &str,
    use_archive: bool,
    bucket: TimestampBucket,
    journal: &mut Journal,
) -> Result<(), MutateError> {
    let dest = join_rel(dest_root, rel);
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }

    if use_archive && dest.exists() {
        displace(dest_root, rel, ARCHIVE_DIR, bucket)?;
    }

    let temp_path = temp_path_for(&dest);
    journal.record_pending(&temp_path);

    atomic_copy(src, &temp_path, &dest)?;

    journal.record_committed(&temp_path);
    Ok(())
}

fn atomic_copy(src: &Path, temp: &Path, dest: &Path) -> Result<(), MutateError> {
    let result = (|| -> io::Result<()> {
        let src_metadata = fs::metadata(src)?;
        let mut reader = File::open(src)?;
        let mut writer = File::create(temp)?;
        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            writer.write_all(&buffer[..n])?;
        }
        writer.sync_all()?;
        drop(writer);
        let mtime = FileTime::from_last_modification_time(&src_metadata);
        filetime::set_file_mtime(temp, mtime)?;
        fs::rename(temp, dest)?;
        if let Some(parent) = dest.parent() {
            fsync_directory(parent)?;
        }
        Ok(())
    })();

    result.map_err(|e| io_err(dest, e))
}

#[cfg(unix)]
fn fsync_directory(dir: &Path) -> io::Result<()> {
    let f = File::open(dir)?;
    f.sync_all()
}

#[cfg(not(unix))]
fn fsync_directory(_dir: &Path) -> io::Result<()> {
    Ok(())
}

/// Rename `src` to `dst` within a single root, used for rename propagation.
/// Falls back to copy+remove across filesystem boundaries.
pub fn rename_file(src: &Path, dst: &Path) -> Result<(), MutateError> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(src, dst).map_err(|e| io_err(src, e))?;
            fs::remove_file(src).map_err(|e| io_err(src, e))?;
            Ok(())
        },
    }
}

/// Delete every archive/trash bucket older than `retention_days` under `root`.
/// `retention_days == 0` disables pruning entirely (buckets are kept forever).
pub fn cleanup_retention(root: &Path, retention_days: u32) -> Result<(), MutateError> {
    if retention_days == 0 {
        return Ok(());
    }
    for reserved in [ARCHIVE_DIR, TRASH_DIR] {
        let subtree = root.join(reserved);
        if !subtree.exists() {
            continue;
        }
        let entries = fs::read_dir(&subtree).map_err(|e| io_err(&subtree, e))?;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            if is_expired(&path, retention_days) {
                debug!(path = %path.display(), "pruning expired retention bucket");
                if let Err(e) = fs::remove_dir_all(&path) {
                    warn!(path = %path.display(), error = %e, "failed to prune retention bucket");
                }
            }
        }
    }
    Ok(())
}

/// A bucket is expired once it's older than `retention_days`. Prefer the
/// timestamp encoded in the directory name; only fall back to the
/// directory's own mtime if the name doesn't parse as one we wrote.
fn is_expired(bucket_dir: &Path, retention_days: u32) -> bool {
    let cutoff_secs = u64::from(retention_days) * 24 * 3600;

    let name = bucket_dir.file_name().and_then(|n| n.to_str());
    if let Some(name) = name {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(name, "%Y%m%d_%H%M%S") {
            let now = Local::now().naive_local();
            let age_secs = now.signed_duration_since(parsed).num_seconds();
            return age_secs > 0 && age_secs as u64 > cutoff_secs;
        }
    }

    let Ok(metadata) = fs::metadata(bucket_dir) else { return false };
    let Ok(modified) = metadata.modified() else { return false };
    let Ok(age) = SystemTime::now().duration_since(modified) else { return false };
    age.as_secs() > cutoff_secs
}

fn join_rel(root: &Path, rel: &str) -> PathBuf {
    let mut path = root.to_path_buf();
    for component in rel.split('/') {
        path.push(component);
    }
    path
}

fn temp_path_for(dest: &Path) -> PathBuf {
    let file_name = dest.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let pid = std::process::id();
    dest.with_file_name(format!(".{file_name}.duosync-tmp-{pid}"))
}

/// Append-only recovery journal: records temp files that are mid-write so an
/// interrupted run leaves a trail an orphan sweep can follow. One file per
/// pair per root (`.sync_journal_<pair-id>`), not shared across pairs.
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    pub fn open(root: &Path, pair_id: &str) -> Self {
        Self { path: root.join(journal_filename(pair_id)) }
    }

    fn append(&self, line: &str) {
        if let Ok(mut file) = fs::OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(file, "{line}");
        }
    }

    pub fn record_pending(&mut self, temp_path: &Path) {
        self.append(&format!("P\t{}", temp_path.display()));
    }

    pub fn record_committed(&mut self, temp_path: &Path) {
        self.append(&format!("C\t{}", temp_path.display()));
    }

    /// Remove orphaned temp files from a previous run that never reached
    /// `record_committed`, then truncate the journal. Safe to call at the
    /// start of every run, even with no prior journal.
    pub fn recover_orphans(root: &Path, pair_id: &str) {
        let path = root.join(journal_filename(pair_id));
        let Ok(contents) = fs::read_to_string(&path) else { return };

        let mut pending: std::collections::HashSet<String> = std::collections::HashSet::new();
        for line in contents.lines() {
            let Some((marker, rest)) = line.split_once('\t') else { continue };
            match marker {
                "P" => {
                    pending.insert(rest.to_string());
                },
                "C" => {
                    pending.remove(rest);
                },
                _ => {},
            }
        }

        for orphan in pending {
            trace!(path = %orphan, "removing orphaned temp file from interrupted run");
            let _ = fs::remove_file(&orphan);
        }
        let _ = fs::remove_file(&path);
    }
}

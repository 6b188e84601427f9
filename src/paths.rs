//! Reserved names shared by the scanner, snapshot store, and mutator.
//!
//! Kept in one place so "is this path part of our own bookkeeping" is answered
//! identically everywhere — a file placed under either reserved subtree must
//! never be visible to a side map, a plan, or rename detection (spec invariant
//! on reserved-directory immunity).

/// Per-root archive subtree: victims of an overwrite land here.
pub const ARCHIVE_DIR: &str = ".sync_archive";

/// Per-root trash subtree: victims of an explicit delete land here.
pub const TRASH_DIR: &str = ".sync_trash";

/// Snapshot sidecar filename prefix/suffix: `.bisync_state_<pair-id>.json`.
pub const SNAPSHOT_PREFIX: &str = ".bisync_state_";
pub const SNAPSHOT_SUFFIX: &str = ".json";

/// Crash-recovery journal filename prefix, one per pair per root.
pub const JOURNAL_PREFIX: &str = ".sync_journal_";

pub fn snapshot_filename(pair_id: &str) -> String {
    format!("{SNAPSHOT_PREFIX}{pair_id}{SNAPSHOT_SUFFIX}")
}

pub fn journal_filename(pair_id: &str) -> String {
    format!("{JOURNAL_PREFIX}{pair_id}")
}

pub fn is_reserved_component(component: &str) -> bool {
    component == ARCHIVE_DIR || component == TRASH_DIR
}

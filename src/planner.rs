//! Planner: three-way diff (current A, current B, last-reconciled snapshot)
//! into an ordered list of actions.
//!
//! Clock skew between roots is an accepted limitation: `MTIME_FUZZ` absorbs
//! coarse filesystem mtime granularity (notably FAT/exFAT's 2s ticks), not
//! an arbitrarily wrong system clock on one side.

use crate::hash::ContentDigest;
use crate::pair::{ConflictPolicy, Pair};
use crate::scanner::{FileDescriptor, SideMap};
use crate::snapshot::{SnapshotDocument, SnapshotEntry};
use std::collections::HashSet;
use std::path::PathBuf;

/// Tolerance, in seconds, applied to every mtime comparison.
pub const MTIME_FUZZ: f64 = 1.0;

/// One unit of reconciliation work, fully resolved: which file, which
/// direction, where the bytes come from and go to.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    CopyAtoB { rel: String, src: PathBuf, dst: PathBuf, size: u64 },
    CopyBtoA { rel: String, src: PathBuf, dst: PathBuf, size: u64 },
    DeleteA { rel: String, size: u64 },
    DeleteB { rel: String, size: u64 },
    RenameA { rel: String, from_rel: String, src: PathBuf, dst: PathBuf },
    RenameB { rel: String, from_rel: String, src: PathBuf, dst: PathBuf },
}

impl Action {
    pub fn size(&self) -> u64 {
        match self {
            Action::CopyAtoB { size, .. } | Action::CopyBtoA { size, .. } => *size,
            Action::DeleteA { size, .. } | Action::DeleteB { size, .. } => *size,
            Action::RenameA { .. } | Action::RenameB { .. } => 0,
        }
    }

    pub fn rel_path(&self) -> &str {
        match self {
            Action::CopyAtoB { rel, .. }
            | Action::CopyBtoA { rel, .. }
            | Action::DeleteA { rel, .. }
            | Action::DeleteB { rel, .. }
            | Action::RenameA { rel, .. }
            | Action::RenameB { rel, .. } => rel,
        }
    }
}

/// Build the ordered action list for one pair from its two current side maps
/// and its loaded snapshot.
pub fn plan(pair: &Pair, map_a: &SideMap, map_b: &SideMap, snapshot: &SnapshotDocument) -> Vec<Action> {
    let mut actions = Vec::new();
    let mut handled: HashSet<String> = HashSet::new();

    detect_renames(pair, map_a, map_b, snapshot, &mut actions, &mut handled);
    reconcile_remaining(pair, map_a, map_b, snapshot, &handled, &mut actions);

    actions
}

/// Step 1 — rename detection across the symmetric difference.
///
/// Files unique to one side are indexed by content digest. A digest present
/// in both `onlyA` and `onlyB` (and not ambiguous — no duplicates on either
/// side) is a rename candidate; the snapshot decides which side is
/// "following" the other's rename. A rename accompanied by a content edit
/// cannot be detected this way and degrades to plain copy+delete on the next
/// run — that is intentional, not a bug.
fn detect_renames(
    pair: &Pair,
    map_a: &SideMap,
    map_b: &SideMap,
    snapshot: &SnapshotDocument,
    actions: &mut Vec<Action>,
    handled: &mut HashSet<String>,
) {
    let only_a: Vec<&FileDescriptor> = map_a.values().filter(|d| !map_b.contains_key(&d.rel_path)).collect();
    let only_b: Vec<&FileDescriptor> = map_b.values().filter(|d| !map_a.contains_key(&d.rel_path)).collect();

    let index_a = unique_digest_index(&only_a);
    let index_b = unique_digest_index(&only_b);

    for (digest, rel_a) in &index_a {
        let Some(rel_b) = index_b.get(digest) else { continue };

        let prev_a = snapshot.get(rel_a);
        let prev_b = snapshot.get(rel_b);

        match (prev_a.is_some(), prev_b.is_some()) {
            (false, true) => {
                // B knew this path before, A didn't — B follows A's rename.
                actions.push(Action::RenameB {
                    rel: rel_a.clone(),
                    from_rel: rel_b.clone(),
                    src: path_in(pair.b_root(), rel_b),
                    dst: path_in(pair.b_root(), rel_a),
                });
                handled.insert(rel_a.clone());
                handled.insert(rel_b.clone());
            },
            (true, false) => {
                // A knew this path before, B didn't — A follows B's rename.
                actions.push(Action::RenameA {
                    rel: rel_b.clone(),
                    from_rel: rel_a.clone(),
                    src: path_in(pair.a_root(), rel_a),
                    dst: path_in(pair.a_root(), rel_b),
                });
                handled.insert(rel_a.clone());
                handled.insert(rel_b.clone());
            },
            // Both or neither known previously: ambiguous, fall through to Step 2.
            _ => {},
        }
    }
}

/// Map digest → rel path, but only for digests unique within this side
/// (duplicate content on one side makes rename inference ambiguous, so
/// those digests are dropped from the index entirely).
fn unique_digest_index(descriptors: &[&FileDescriptor]) -> std::collections::HashMap<ContentDigest, String> {
    let mut counts: std::collections::HashMap<&ContentDigest, u32> = std::collections::HashMap::new();
    for d in descriptors {
        if d.digest.is_empty() {
            continue;
        }
        *counts.entry(&d.digest).or_insert(0) += 1;
    }

    let mut index = std::collections::HashMap::new();
    for d in descriptors {
        if d.digest.is_empty() {
            continue;
        }
        if counts[&d.digest] == 1 {
            index.insert(d.digest.clone(), d.rel_path.clone());
        }
    }
    index
}

/// Step 2 — iterate the union of keys in lexicographic order, skipping
/// anything already handled by rename detection.
fn reconcile_remaining(
    pair: &Pair,
    map_a: &SideMap,
    map_b: &SideMap,
    snapshot: &SnapshotDocument,
    handled: &HashSet<String>,
    actions: &mut Vec<Action>,
) {
    let mut rels: Vec<&String> = map_a.keys().chain(map_b.keys()).collect();
    rels.sort();
    rels.dedup();

    let empty_entry = SnapshotEntry::default();

    for rel in rels {
        if handled.contains(rel) {
            continue;
        }
        let a = map_a.get(rel);
        let b = map_b.get(rel);
        let prev = snapshot.get(rel).unwrap_or(&empty_entry);

        match (a, b) {
            (Some(a), None) => plan_only_a(pair, rel, a, prev, actions),
            (None, Some(b)) => plan_only_b(pair, rel, b, prev, actions),
            (Some(a), Some(b)) => plan_both_present(pair, rel, a, b, actions),
            (None, None) => unreachable!("rel came from the union of both maps' keys"),
        }
    }
}

fn plan_only_a(pair: &Pair, rel: &str, a: &FileDescriptor, prev: &SnapshotEntry, actions: &mut Vec<Action>) {
    if pair.conservative {
        actions.push(copy_a_to_b(pair, rel, a));
        return;
    }

    let was_in_b = prev.mtime_b.is_some();
    let unchanged_since_last = (a.mtime - prev.mtime_a.unwrap_or(a.mtime)).abs() <= MTIME_FUZZ;

    if was_in_b && unchanged_since_last {
        actions.push(Action::DeleteA { rel: rel.to_string(), size: a.size });
    } else {
        actions.push(copy_a_to_b(pair, rel, a));
    }
}

fn plan_only_b(pair: &Pair, rel: &str, b: &FileDescriptor, prev: &SnapshotEntry, actions: &mut Vec<Action>) {
    if pair.conservative {
        actions.push(copy_b_to_a(pair, rel, b));
        return;
    }

    let was_in_a = prev.mtime_a.is_some();
    let unchanged_since_last = (b.mtime - prev.mtime_b.unwrap_or(b.mtime)).abs() <= MTIME_FUZZ;

    if was_in_a && unchanged_since_last {
        actions.push(Action::DeleteB { rel: rel.to_string(), size: b.size });
    } else {
        actions.push(copy_b_to_a(pair, rel, b));
    }
}

fn plan_both_present(pair: &Pair, rel: &str, a: &FileDescriptor, b: &FileDescriptor, actions: &mut Vec<Action>) {
    if (a.mtime - b.mtime).abs() <= MTIME_FUZZ && a.size == b.size {
        return;
    }

    let action = match pair.conflict_policy {
        ConflictPolicy::PreferA => copy_a_to_b(pair, rel, a),
        ConflictPolicy::PreferB => copy_b_to_a(pair, rel, b),
        ConflictPolicy::NewestWins => {
            if a.mtime - b.mtime > MTIME_FUZZ {
                copy_a_to_b(pair, rel, a)
            } else if b.mtime - a.mtime > MTIME_FUZZ {
                copy_b_to_a(pair, rel, b)
            } else if a.size >= b.size {
                copy_a_to_b(pair, rel, a)
            } else {
                copy_b_to_a(pair, rel, b)
            }
        },
    };
    actions.push(action);
}

fn copy_a_to_b(pair: &Pair, rel: &str, a: &FileDescriptor) -> Action {
    Action::CopyAtoB { rel: rel.to_string(), src: a.absolute.clone(), dst: path_in(pair.b_root(), rel), size: a.size }
}

fn copy_b_to_a(pair: &Pair, rel: &str, b: &FileDescriptor) -> Action {
    Action::CopyBtoA { rel: rel.to_string(), src: b.absolute.clone(), dst: path_in(pair.a_root(), rel), size: b.size }
}

fn path_in(root: &std::path::Path, rel: &str) -> PathBuf {
    let mut path = root.to_path_buf();
    for component in rel.split('/') {
        path.push(component);
    }
    path
}

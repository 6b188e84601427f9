//! Pair configuration: the immutable description of one reconciled (A, B) root pair.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// How a conflict (both sides present, differing) is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictPolicy {
    NewestWins,
    PreferA,
    PreferB,
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        ConflictPolicy::NewestWins
    }
}

/// Default exclude-glob seed applied on top of whatever the caller supplies.
pub const DEFAULT_EXCLUDES: &[&str] =
    &["*.tmp", "*.temp", "*.swp", "Thumbs.db", ".DS_Store", "desktop.ini"];

/// A configured pair of roots together with its reconciliation policy.
///
/// Immutable for the duration of one run. Passed by value into the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pair {
    pub root_a: String,
    pub root_b: String,

    /// true = treat one-sided presence as "missing file to restore".
    /// false = treat one-sided presence as a possible deletion to propagate.
    pub conservative: bool,

    /// Only meaningful when deletions may be issued (`conservative == false`).
    pub use_trash: bool,

    pub conflict_policy: ConflictPolicy,

    pub include: Vec<String>,
    pub exclude: Vec<String>,

    /// Consumed only by an external scheduler; the engine never reads these.
    pub interval_secs: Option<u64>,
    pub silent_hours: Option<String>,

    /// Free-text passthrough for a driving GUI; the engine never reads this.
    pub notes: Option<String>,
}

impl Pair {
    pub fn new(root_a: impl Into<String>, root_b: impl Into<String>) -> Self {
        Self {
            root_a: root_a.into(),
            root_b: root_b.into(),
            conservative: true,
            use_trash: true,
            conflict_policy: ConflictPolicy::NewestWins,
            include: Vec::new(),
            exclude: DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect(),
            interval_secs: None,
            silent_hours: None,
            notes: None,
        }
    }

    pub fn a_root(&self) -> &Path {
        Path::new(&self.root_a)
    }

    pub fn b_root(&self) -> &Path {
        Path::new(&self.root_b)
    }

    /// Stable short identity used solely to name the snapshot sidecar.
    ///
    /// First 10 hex chars of MD5 over `lowercase(root_a) + "|" + lowercase(root_b)`,
    /// with both roots normalized to forward slashes first so the id is stable
    /// across platforms.
    pub fn id_hash(&self) -> String {
        let key = format!(
            "{}|{}",
            normalize_for_identity(&self.root_a),
            normalize_for_identity(&self.root_b)
        );
        let digest = md5::compute(key.as_bytes());
        format!("{digest:x}")[..10].to_string()
    }
}

fn normalize_for_identity(root: &str) -> String {
    root.replace('\\', "/").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_hash_is_stable_and_platform_independent() {
        let p1 = Pair::new("/mnt/data/Docs", "/mnt/usb/Docs");
        let p2 = Pair::new(r"\mnt\data\Docs", r"\mnt\usb\Docs");
        assert_eq!(p1.id_hash(), p2.id_hash());
        assert_eq!(p1.id_hash().len(), 10);
    }

    #[test]
    fn id_hash_is_case_insensitive() {
        let p1 = Pair::new("/A", "/B");
        let p2 = Pair::new("/a", "/b");
        assert_eq!(p1.id_hash(), p2.id_hash());
    }

    #[test]
    fn id_hash_differs_for_different_pairs() {
        let p1 = Pair::new("/a", "/b");
        let p2 = Pair::new("/a", "/c");
        assert_ne!(p1.id_hash(), p2.id_hash());
    }
}

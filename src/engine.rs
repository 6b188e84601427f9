//! Engine Facade: the single entry point an external driver (CLI, GUI,
//! scheduler) calls to reconcile a list of pairs.
//!
//! One worker thread of control, sequential across pairs, files, and
//! actions. Suspension only happens between files during scan and between
//! actions during execution; nothing here spawns its own threads for
//! orchestration, and the scanner never hashes concurrently either.

use crate::mutator::Journal;
use crate::pair::Pair;
use crate::planner::{self, Action};
use crate::scanner::{self, ScanError};
use crate::snapshot;
use crate::executor::{self, ExecutionReport, Progress};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("root A does not exist: {0}")]
    MissingRootA(String),

    #[error("root B does not exist: {0}")]
    MissingRootB(String),

    #[error("scan failed: {0}")]
    Scan(#[from] ScanError),
}

/// Outcome of reconciling one pair.
pub struct PairReport {
    pub pair: Pair,
    pub execution: Option<ExecutionReport>,
    pub error: Option<EngineError>,
}

/// Callbacks an external driver injects; the engine never assumes a UI,
/// a log file, or a specific thread model on the other end.
pub struct Callbacks<'a> {
    pub on_log: &'a mut dyn FnMut(&str),
    pub on_progress: &'a mut dyn FnMut(&str, Progress),
    pub on_pair_status: &'a mut dyn FnMut(&str, &str),
}

pub struct Engine {
    stop: Arc<AtomicBool>,
    pause: Arc<AtomicBool>,
    retention_days: u32,
}

impl Engine {
    pub fn new(stop: Arc<AtomicBool>, pause: Arc<AtomicBool>, retention_days: u32) -> Self {
        Self { stop, pause, retention_days }
    }

    /// Reconcile every pair in order. A pair that fails (missing root, scan
    /// error) is recorded and skipped; the batch always continues to the
    /// next pair. Returns one report per pair, in input order.
    pub fn run(&self, pairs: &[Pair], callbacks: &mut Callbacks) -> Vec<PairReport> {
        let mut reports = Vec::with_capacity(pairs.len());

        for pair in pairs {
            if self.stop.load(Ordering::Relaxed) {
                info!("stop requested, halting before remaining pairs");
                break;
            }

            (callbacks.on_pair_status)(&pair.root_a, "starting");
            match self.run_pair(pair, callbacks) {
                Ok(execution) => {
                    (callbacks.on_pair_status)(&pair.root_a, "done");
                    reports.push(PairReport { pair: pair.clone(), execution: Some(execution), error: None });
                },
                Err(e) => {
                    warn!(root_a = %pair.root_a, root_b = %pair.root_b, error = %e, "pair failed");
                    (callbacks.on_pair_status)(&pair.root_a, "failed");
                    reports.push(PairReport { pair: pair.clone(), execution: None, error: Some(e) });
                },
            }
        }

        reports
    }

    fn run_pair(&self, pair: &Pair, callbacks: &mut Callbacks) -> Result<ExecutionReport, EngineError> {
        if !pair.a_root().exists() {
            return Err(EngineError::MissingRootA(pair.root_a.clone()));
        }
        if !pair.b_root().exists() {
            return Err(EngineError::MissingRootB(pair.root_b.clone()));
        }

        let pair_id = pair.id_hash();
        Journal::recover_orphans(pair.a_root(), &pair_id);
        Journal::recover_orphans(pair.b_root(), &pair_id);

        (callbacks.on_log)(&format!("scanning {}", pair.root_a));
        let map_a = scanner::scan_root(pair.a_root(), &pair.include, &pair.exclude, &self.stop)?;
        (callbacks.on_log)(&format!("scanning {}", pair.root_b));
        let map_b = scanner::scan_root(pair.b_root(), &pair.include, &pair.exclude, &self.stop)?;

        let previous = snapshot::load(pair);
        let actions: Vec<Action> = planner::plan(pair, &map_a, &map_b, &previous);
        (callbacks.on_log)(&format!("{} action(s) planned", actions.len()));

        let root_a = pair.root_a.clone();
        let execution = executor::execute(
            pair,
            actions,
            &self.stop,
            &self.pause,
            |line| (callbacks.on_log)(line),
            |progress| (callbacks.on_progress)(&root_a, progress),
        );

        // Rescan so the persisted snapshot reflects what actually landed on
        // disk, not what the plan intended (an action may have failed).
        let post_a = scanner::scan_root(pair.a_root(), &pair.include, &pair.exclude, &self.stop)?;
        let post_b = scanner::scan_root(pair.b_root(), &pair.include, &pair.exclude, &self.stop)?;
        snapshot::save(pair, &post_a, &post_b);

        if let Err(e) = crate::mutator::cleanup_retention(pair.a_root(), self.retention_days) {
            warn!(root = %pair.root_a, error = %e, "retention cleanup failed");
        }
        if let Err(e) = crate::mutator::cleanup_retention(pair.b_root(), self.retention_days) {
            warn!(root = %pair.root_b, error = %e, "retention cleanup failed");
        }

        Ok(execution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn engine() -> Engine {
        Engine::new(Arc::new(AtomicBool::new(false)), Arc::new(AtomicBool::new(false)), 30)
    }

    #[test]
    fn first_run_copies_new_file_to_other_side() {
        let dir_a = tempdir().unwrap();
        let dir_b = tempdir().unwrap();
        fs::write(dir_a.path().join("doc.txt"), b"hello").unwrap();

        let pair = Pair::new(dir_a.path().to_str().unwrap(), dir_b.path().to_str().unwrap());
        let e = engine();
        let mut log = |_: &str| {};
        let mut progress = |_: &str, _: Progress| {};
        let mut status = |_: &str, _: &str| {};
        let mut callbacks = Callbacks { on_log: &mut log, on_progress: &mut progress, on_pair_status: &mut status };

        let reports = e.run(&[pair], &mut callbacks);
        assert_eq!(reports.len(), 1);
        assert!(reports[0].error.is_none());
        assert_eq!(fs::read(dir_b.path().join("doc.txt")).unwrap(), b"hello");
    }

    #[test]
    fn missing_root_is_reported_without_aborting_batch() {
        let dir_b = tempdir().unwrap();
        let dir_other_a = tempdir().unwrap();
        let dir_other_b = tempdir().unwrap();
        fs::write(dir_other_a.path().join("f.txt"), b"x").unwrap();

        let missing = Pair::new("/no/such/root/duosync", dir_b.path().to_str().unwrap());
        let ok_pair = Pair::new(dir_other_a.path().to_str().unwrap(), dir_other_b.path().to_str().unwrap());

        let e = engine();
        let mut log = |_: &str| {};
        let mut progress = |_: &str, _: Progress| {};
        let mut status = |_: &str, _: &str| {};
        let mut callbacks = Callbacks { on_log: &mut log, on_progress: &mut progress, on_pair_status: &mut status };

        let reports = e.run(&[missing, ok_pair], &mut callbacks);
        assert_eq!(reports.len(), 2);
        assert!(reports[0].error.is_some());
        assert!(reports[1].error.is_none());
        assert!(dir_other_b.path().join("f.txt").exists());
    }

    #[test]
    fn second_run_is_a_no_op_once_converged() {
        let dir_a = tempdir().unwrap();
        let dir_b = tempdir().unwrap();
        fs::write(dir_a.path().join("doc.txt"), b"hello").unwrap();

        let pair = Pair::new(dir_a.path().to_str().unwrap(), dir_b.path().to_str().unwrap());
        let e = engine();
        let mut log = |_: &str| {};
        let mut progress = |_: &str, _: Progress| {};
        let mut status = |_: &str, _: &str| {};

        {
            let mut callbacks = Callbacks { on_log: &mut log, on_progress: &mut progress, on_pair_status: &mut status };
            e.run(&[pair.clone()], &mut callbacks);
        }
        let mut callbacks = Callbacks { on_log: &mut log, on_progress: &mut progress, on_pair_status: &mut status };
        let reports = e.run(&[pair], &mut callbacks);

        assert_eq!(reports[0].execution.as_ref().unwrap().outcomes.len(), 0);
    }
}

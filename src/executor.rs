//! Executor: walks a plan in order, dispatching each action to the mutator,
//! isolating per-file failures, and reporting progress through the engine's
//! injected callbacks.

use crate::mutator::{self, Journal, MutateError, TimestampBucket};
use crate::pair::Pair;
use crate::planner::Action;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Progress snapshot emitted after each action.
#[derive(Debug, Clone)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub bytes_done: u64,
    pub bytes_total: u64,
    pub eta_secs: Option<f64>,
}

/// One action's outcome, for the executor's own bookkeeping and for a
/// caller that wants a post-run report rather than only live callbacks.
#[derive(Debug)]
pub struct ActionOutcome {
    pub action: Action,
    pub error: Option<MutateError>,
}

pub struct ExecutionReport {
    pub outcomes: Vec<ActionOutcome>,
    pub stopped_early: bool,
}

impl ExecutionReport {
    pub fn failures(&self) -> impl Iterator<Item = &ActionOutcome> {
        self.outcomes.iter().filter(|o| o.error.is_some())
    }
}

const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Execute `actions` against `pair`'s two roots in order.
///
/// A single action's failure is logged and recorded in the report but never
/// aborts the batch — a locked file on one path must not block every other
/// reconciliation in the plan. `stop` is checked between actions; `pause`
/// busy-waits between actions without consuming the stop signal.
pub fn execute<F, G>(
    pair: &Pair,
    actions: Vec<Action>,
    stop: &Arc<AtomicBool>,
    pause: &Arc<AtomicBool>,
    mut on_log: F,
    mut on_progress: G,
) -> ExecutionReport
where
    F: FnMut(&str),
    G: FnMut(Progress),
{
    let pair_id = pair.id_hash();
    let mut journal_a = Journal::open(pair.a_root(), &pair_id);
    let mut journal_b = Journal::open(pair.b_root(), &pair_id);

    let total = actions.len();
    let bytes_total: u64 = actions.iter().map(Action::size).sum();
    let mut bytes_done: u64 = 0;
    let start = Instant::now();

    let mut outcomes = Vec::with_capacity(total);
    let mut stopped_early = false;

    for (index, action) in actions.into_iter().enumerate() {
        while pause.load(Ordering::Relaxed) && !stop.load(Ordering::Relaxed) {
            thread::sleep(PAUSE_POLL_INTERVAL);
        }
        if stop.load(Ordering::Relaxed) {
            stopped_early = true;
            break;
        }

        on_log(&describe(&action));
        let size = action.size();
        let bucket = TimestampBucket::now();
        let result = dispatch(pair, &action, bucket, &mut journal_a, &mut journal_b);
        if let Err(ref e) = result {
            error!(action = ?action, error = %e, "action failed");
        }
        bytes_done += size;

        let eta_secs = estimate_eta(start.elapsed(), bytes_done, bytes_total);
        on_progress(Progress { completed: index + 1, total, bytes_done, bytes_total, eta_secs });

        outcomes.push(ActionOutcome { action, error: result.err() });
    }

    info!(completed = outcomes.len(), total, stopped_early, "execution finished");
    ExecutionReport { outcomes, stopped_early }
}

fn dispatch(
    pair: &Pair,
    action: &Action,
    bucket: TimestampBucket,
    journal_a: &mut Journal,
    journal_b: &mut Journal,
) -> Result<(), MutateError> {
    match action {
        Action::CopyAtoB { src, rel, .. } => {
            mutator::copy_with_archive(src, pair.b_root(), rel, true, bucket, journal_b)
        },
        Action::CopyBtoA { src, rel, .. } => {
            mutator::copy_with_archive(src, pair.a_root(), rel, true, bucket, journal_a)
        },
        Action::DeleteA { rel, .. } => {
            if pair.use_trash {
                mutator::move_to_trash(pair.a_root(), rel, bucket)
            } else {
                mutator::remove_permanently(pair.a_root(), rel)
            }
        },
        Action::DeleteB { rel, .. } => {
            if pair.use_trash {
                mutator::move_to_trash(pair.b_root(), rel, bucket)
            } else {
                mutator::remove_permanently(pair.b_root(), rel)
            }
        },
        Action::RenameA { src, dst, .. } => mutator::rename_file(src, dst),
        Action::RenameB { src, dst, .. } => mutator::rename_file(src, dst),
    }
}

fn describe(action: &Action) -> String {
    match action {
        Action::CopyAtoB { rel, .. } => format!("copy  A->B  {rel}"),
        Action::CopyBtoA { rel, .. } => format!("copy  B->A  {rel}"),
        Action::DeleteA { rel, .. } => format!("del   A     {rel}"),
        Action::DeleteB { rel, .. } => format!("del   B     {rel}"),
        Action::RenameA { rel, from_rel, .. } => format!("rename A   {from_rel} -> {rel}"),
        Action::RenameB { rel, from_rel, .. } => format!("rename B   {from_rel} -> {rel}"),
    }
}

fn estimate_eta(elapsed: Duration, bytes_done: u64, bytes_total: u64) -> Option<f64> {
    if bytes_done == 0 || bytes_total == 0 {
        return None;
    }
    let rate = bytes_done as f64 / elapsed.as_secs_f64().max(0.001);
    let remaining = bytes_total.saturating_sub(bytes_done) as f64;
    Some(remaining / rate)
}

/// Human-readable byte count with binary prefixes, shared by executor log
/// lines and the CLI's run summary.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::Action;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn flag(v: bool) -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(v))
    }

    #[test]
    fn executes_copy_action_and_reports_progress() {
        let dir_a = tempdir().unwrap();
        let dir_b = tempdir().unwrap();
        fs::write(dir_a.path().join("f.txt"), b"hello").unwrap();

        let pair = Pair::new(dir_a.path().to_str().unwrap(), dir_b.path().to_str().unwrap());
        let action = Action::CopyAtoB {
            rel: "f.txt".into(),
            src: dir_a.path().join("f.txt"),
            dst: dir_b.path().join("f.txt"),
            size: 5,
        };

        let mut progress_calls = 0;
        let report = execute(
            &pair,
            vec![action],
            &flag(false),
            &flag(false),
            |_| {},
            |_| progress_calls += 1,
        );

        assert_eq!(progress_calls, 1);
        assert_eq!(report.outcomes.len(), 1);
        assert!(report.outcomes[0].error.is_none());
        assert_eq!(fs::read(dir_b.path().join("f.txt")).unwrap(), b"hello");
    }

    #[test]
    fn stop_flag_halts_before_remaining_actions() {
        let dir_a = tempdir().unwrap();
        let dir_b = tempdir().unwrap();
        fs::write(dir_a.path().join("a.txt"), b"1").unwrap();
        fs::write(dir_a.path().join("b.txt"), b"2").unwrap();

        let pair = Pair::new(dir_a.path().to_str().unwrap(), dir_b.path().to_str().unwrap());
        let stop = flag(true);
        let actions = vec![
            Action::CopyAtoB { rel: "a.txt".into(), src: dir_a.path().join("a.txt"), dst: dir_b.path().join("a.txt"), size: 1 },
            Action::CopyAtoB { rel: "b.txt".into(), src: dir_a.path().join("b.txt"), dst: dir_b.path().join("b.txt"), size: 1 },
        ];

        let report = execute(&pair, actions, &stop, &flag(false), |_| {}, |_| {});
        assert!(report.stopped_early);
        assert!(report.outcomes.is_empty());
    }

    #[test]
    fn failed_action_does_not_abort_remaining_actions() {
        let dir_a = tempdir().unwrap();
        let dir_b = tempdir().unwrap();
        fs::write(dir_a.path().join("ok.txt"), b"data").unwrap();

        let pair = Pair::new(dir_a.path().to_str().unwrap(), dir_b.path().to_str().unwrap());
        let actions = vec![
            Action::CopyAtoB {
                rel: "missing.txt".into(),
                src: PathBuf::from("/nonexistent/missing.txt"),
                dst: dir_b.path().join("missing.txt"),
                size: 1,
            },
            Action::CopyAtoB {
                rel: "ok.txt".into(),
                src: dir_a.path().join("ok.txt"),
                dst: dir_b.path().join("ok.txt"),
                size: 4,
            },
        ];

        let report = execute(&pair, actions, &flag(false), &flag(false), |_| {}, |_| {});
        assert_eq!(report.outcomes.len(), 2);
        assert!(report.outcomes[0].error.is_some());
        assert!(report.outcomes[1].error.is_none());
        assert!(dir_b.path().join("ok.txt").exists());
    }

    #[test]
    fn format_bytes_uses_binary_prefixes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.00 KiB");
        assert_eq!(format_bytes(1024 * 1024 * 3), "3.00 MiB");
    }
}

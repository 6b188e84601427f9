use anyhow::{bail, Result};
use clap::Parser;
use duosync::{format_bytes, Callbacks, ConflictPolicy, Engine, Pair, Progress};
use owo_colors::OwoColorize;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "duo", version, about = "Bidirectional folder reconciliation with versioned safety")]
struct Cli {
    /// Left-hand root
    root_a: PathBuf,

    /// Right-hand root
    root_b: PathBuf,

    /// Never delete; treat one-sided presence as "missing, restore it"
    #[arg(long)]
    conservative: bool,

    /// Delete permanently instead of moving into .sync_trash
    #[arg(long)]
    no_trash: bool,

    /// How to resolve a conflict where both sides changed
    #[arg(long, value_enum, default_value = "newest")]
    conflict: ConflictArg,

    /// Exclude files matching glob patterns (repeatable)
    #[arg(short, long, value_name = "PATTERN")]
    exclude: Vec<String>,

    /// Only sync files matching glob patterns (repeatable)
    #[arg(short, long, value_name = "PATTERN")]
    include: Vec<String>,

    /// Days to retain archived/trashed files before pruning (0 disables pruning)
    #[arg(long, default_value_t = 30)]
    retention_days: u32,

    /// Quiet mode (no progress)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose output (also enable with RUST_LOG)
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ConflictArg {
    Newest,
    PreferA,
    PreferB,
}

impl From<ConflictArg> for ConflictPolicy {
    fn from(value: ConflictArg) -> Self {
        match value {
            ConflictArg::Newest => ConflictPolicy::NewestWins,
            ConflictArg::PreferA => ConflictPolicy::PreferA,
            ConflictArg::PreferB => ConflictPolicy::PreferB,
        }
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{} {e:#}", "Error:".red());
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if !cli.root_a.exists() {
        bail!("root does not exist: {}", cli.root_a.display());
    }
    if !cli.root_b.exists() {
        bail!("root does not exist: {}", cli.root_b.display());
    }

    let mut pair = Pair::new(cli.root_a.to_string_lossy(), cli.root_b.to_string_lossy());
    pair.conservative = cli.conservative;
    pair.use_trash = !cli.no_trash;
    pair.conflict_policy = cli.conflict.into();
    pair.include = cli.include;
    if !cli.exclude.is_empty() {
        pair.exclude.extend(cli.exclude);
    }

    let stop = Arc::new(AtomicBool::new(false));
    let pause = Arc::new(AtomicBool::new(false));
    install_ctrlc_handler(Arc::clone(&stop));

    let engine = Engine::new(Arc::clone(&stop), Arc::clone(&pause), cli.retention_days);

    let quiet = cli.quiet;
    let mut on_log = |line: &str| {
        if !quiet {
            println!("{line}");
        }
    };
    let mut on_progress = |_root: &str, progress: Progress| {
        if !quiet && cli.verbose {
            println!("  {}/{} ({} / {})", progress.completed, progress.total, format_bytes(progress.bytes_done), format_bytes(progress.bytes_total));
        }
    };
    let mut on_pair_status = |root: &str, status: &str| {
        if !quiet {
            println!("{}: {status}", root.bold());
        }
    };
    let mut callbacks = Callbacks { on_log: &mut on_log, on_progress: &mut on_progress, on_pair_status: &mut on_pair_status };

    let start = Instant::now();
    let reports = engine.run(&[pair], &mut callbacks);
    let elapsed = start.elapsed();

    let mut failures = 0;
    let mut total_actions = 0;
    let mut total_errors = 0;
    for report in &reports {
        if let Some(err) = &report.error {
            failures += 1;
            eprintln!("{} {} <-> {}: {err:#}", "Error:".red(), report.pair.root_a, report.pair.root_b);
            continue;
        }
        if let Some(execution) = &report.execution {
            total_actions += execution.outcomes.len();
            total_errors += execution.failures().count();
        }
    }

    if !quiet {
        println!("{} {total_actions} action(s), {total_errors} error(s), in {:.2}s", "Done.".green().bold(), elapsed.as_secs_f64());
    }

    if failures > 0 || total_errors > 0 {
        process::exit(1);
    }
    Ok(())
}

fn install_ctrlc_handler(stop: Arc<AtomicBool>) {
    let _ = ctrlc::set_handler(move || {
        stop.store(true, Ordering::Relaxed);
    });
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if verbose {
        EnvFilter::new("duosync=debug")
    } else {
        EnvFilter::new("duosync=warn")
    };

    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init();
}

//! batchgate - command-line interface for the capacity-gated transfer engine.
//!
//! Loads the settings file, sets up logging and the interrupt handler, then
//! runs either the transfer loop or the indexing pool. Each way a run can end
//! maps to its own exit code.

mod logging;

use anyhow::Result;
use batchgate_engine::{
    plan_index, plan_transfer, run_index, run_transfer, CancellationToken, CommandIndexer,
    CycleReport, EngineError, ItemState, ProgressCallback, QueuedItem, RunContext, RunOutcome,
    Settings, ThreadSleeper, DEFAULT_SETTINGS_FILE,
};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{error, info, info_span, warn};

/// batchgate - feed files to a capacity-limited destination
#[derive(Parser, Debug)]
#[command(name = "batchgate")]
#[command(version)]
#[command(about = "Copy or index files without exceeding a downstream capacity limit")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Settings file
    #[arg(long, value_name = "PATH", default_value = DEFAULT_SETTINGS_FILE, global = true)]
    config: PathBuf,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Don't draw the progress line
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Copy files into the destinations, respecting the limit
    Transfer,
    /// Hand files to the indexing command with a worker pool
    Index,
}

/// Process exit codes, one per terminal path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Success = 0,
    Fatal = 1,
    Config = 2,
    Exhausted = 3,
    Cancelled = 4,
    AuthFailed = 5,
    ItemsFailed = 6,
}

impl From<Exit> for ExitCode {
    fn from(exit: Exit) -> Self {
        ExitCode::from(exit as u8)
    }
}

/// Progress line on stderr
struct CliProgress {
    enabled: bool,
    total: AtomicUsize,
    done: AtomicUsize,
    failed: AtomicUsize,
    last_draw: Mutex<Option<Instant>>,
}

impl CliProgress {
    fn new(enabled: bool) -> Self {
        CliProgress {
            enabled,
            total: AtomicUsize::new(0),
            done: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            last_draw: Mutex::new(None),
        }
    }

    fn print_progress_bar(percent: u32) -> String {
        let filled = (percent.min(100) / 5) as usize;
        let empty = 20 - filled;
        format!("[{}{}] {}%", "=".repeat(filled), " ".repeat(empty), percent)
    }

    /// Redraw at most every 200ms unless `force`.
    fn draw(&self, force: bool, suffix: &str) {
        if !self.enabled {
            return;
        }
        let mut last = match self.last_draw.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !force && last.is_some_and(|t| t.elapsed() < Duration::from_millis(200)) {
            return;
        }
        *last = Some(Instant::now());

        let total = self.total.load(Ordering::Relaxed).max(1);
        let done = self.done.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let percent = ((done + failed) as f64 / total as f64 * 100.0) as u32;
        eprint!(
            "\rProgress: {} | {}/{} done, {} failed{}    ",
            Self::print_progress_bar(percent),
            done,
            self.total.load(Ordering::Relaxed),
            failed,
            suffix
        );
        let _ = std::io::stderr().flush();
    }
}

impl ProgressCallback for CliProgress {
    fn on_run_started(&self, total: usize) {
        self.total.store(total, Ordering::Relaxed);
        self.draw(true, "");
    }

    fn on_cycle(&self, report: &CycleReport) {
        let suffix = match report.delay {
            Some(delay) if report.admitted == 0 => format!(
                " | limit reached, retry #{} in {}",
                report.consecutive_exhaustions,
                format_duration(delay)
            ),
            _ => String::new(),
        };
        self.draw(true, &suffix);
    }

    fn on_item_completed(&self, item: &QueuedItem) {
        match item.state {
            ItemState::Done => {
                self.done.fetch_add(1, Ordering::Relaxed);
            }
            ItemState::Failed => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
        self.draw(false, "");
    }

    fn on_item_indexed(&self, success: bool) {
        let counter = if success { &self.done } else { &self.failed };
        counter.fetch_add(1, Ordering::Relaxed);
        self.draw(false, "");
    }

    fn on_run_completed(&self) {
        self.draw(true, "");
        if self.enabled {
            eprintln!();
        }
    }
}

fn format_duration(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let settings = match Settings::load(&args.config) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Exit::Config.into();
        }
    };

    if let Err(e) = logging::setup_logging(&settings, args.verbose) {
        eprintln!("Error: {:#}", e);
        return Exit::Config.into();
    }
    eprintln!("Log file at {}", settings.log_path.display());

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\nStop signal received, saving progress...");
        handler_token.cancel();
    }) {
        eprintln!("Error: failed to set signal handler: {}", e);
        return Exit::Fatal.into();
    }

    let ctx = RunContext::with_token(settings, cancel);
    let exit = match run_cli(&args, &ctx) {
        Ok(exit) => exit,
        Err(e) => {
            error!("{:#}. Total elapsed seconds: {:.3}.", e, ctx.elapsed().as_secs_f64());
            eprintln!("Error: {:#}", e);
            exit_for_error(&e)
        }
    };
    exit.into()
}

fn exit_for_error(err: &anyhow::Error) -> Exit {
    match err.downcast_ref::<EngineError>() {
        Some(EngineError::Authentication(_)) => Exit::AuthFailed,
        Some(e) if e.is_config() => Exit::Config,
        _ => Exit::Fatal,
    }
}

/// Main CLI logic - separated from process setup for testability
fn run_cli(args: &Args, ctx: &RunContext) -> Result<Exit> {
    let span = info_span!("run", run_id = %ctx.run_id);
    let _enter = span.enter();

    let settings = &ctx.settings;
    info!("===START OF RUN=== {}", ctx.started_at.format("%Y-%m-%d %H:%M:%S"));
    info!(
        "From {}: SLEEP={:?}, LIMIT={}, len(DATA)={}.",
        args.config.display(),
        settings.sleep,
        settings.limit,
        settings.data.len()
    );

    let progress = CliProgress::new(!args.quiet);
    match args.command {
        Command::Transfer => transfer(ctx, &progress),
        Command::Index => index(ctx, &progress),
    }
}

fn transfer(ctx: &RunContext, progress: &CliProgress) -> Result<Exit> {
    let mut job = plan_transfer(ctx)?;
    let report = run_transfer(ctx, &mut job, &ThreadSleeper, Some(progress))?;

    let elapsed = report.elapsed.as_secs_f64();
    let checkpoint = report.checkpoint_path.display();
    let log = ctx.settings.log_path.display();
    let exit = match report.outcome {
        RunOutcome::Drained => {
            info!(
                "DONE. Copied {} file(s), {} byte(s). Total elapsed seconds: {:.3}.",
                report.copied, report.bytes_copied, elapsed
            );
            eprintln!(
                "Done. Copied {} of {} file(s) ({}) in {}.",
                report.copied,
                report.total,
                format_bytes(report.bytes_copied),
                format_duration(report.elapsed)
            );
            Exit::Success
        }
        RunOutcome::Incomplete => {
            error!(
                "INCOMPLETE. {} file(s) failed and were saved to {}. Total elapsed seconds: {:.3}.",
                report.failed, checkpoint, elapsed
            );
            eprintln!(
                "{} file(s) could not be copied; saved to {}. See logs at {}.",
                report.failed, checkpoint, log
            );
            Exit::ItemsFailed
        }
        RunOutcome::Exhausted => {
            info!("INCOMPLETE. Total elapsed seconds: {:.3}.", elapsed);
            eprintln!(
                "No more retry attempts left. {} file(s) saved to {}. See logs at {}.",
                report.saved, checkpoint, log
            );
            Exit::Exhausted
        }
        RunOutcome::Cancelled => {
            warn!("CANCELLED. Total elapsed seconds: {:.3}.", elapsed);
            eprintln!(
                "Cancelled. {} file(s) saved to {}. Run again to resume.",
                report.saved, checkpoint
            );
            Exit::Cancelled
        }
    };
    Ok(exit)
}

fn index(ctx: &RunContext, progress: &CliProgress) -> Result<Exit> {
    let settings = ctx.settings.index_settings().map_err(EngineError::from)?;
    let job = plan_index(ctx)?;
    let checkpoint = job.checkpoint_path();
    let indexer = CommandIndexer::from_settings(settings);

    let report = run_index(ctx, job, &indexer, &ThreadSleeper, Some(progress))?;

    let elapsed = report.elapsed.as_secs_f64();
    if report.cancelled {
        warn!(
            "CANCELLED. dispatched={}, success={}, failure={}. Total elapsed seconds: {:.3}.",
            report.dispatched, report.success, report.failure, elapsed
        );
        eprintln!(
            "Cancelled. {} succeeded, {} failed; {} file(s) saved to {}.",
            report.success,
            report.failure,
            report.undispatched.len(),
            checkpoint.display()
        );
        return Ok(Exit::Cancelled);
    }

    info!(
        "DONE. total={}, success={}, failure={}. Total elapsed seconds: {:.3}.",
        report.total, report.success, report.failure, elapsed
    );
    eprintln!(
        "Done. Indexed {} file(s): {} succeeded, {} failed in {}.",
        report.total,
        report.success,
        report.failure,
        format_duration(report.elapsed)
    );
    Ok(Exit::Success)
}

//! Transfer job orchestration.
//!
//! This module provides the transfer lifecycle:
//! - Planning a job: resume the saved queue, or discover it from settings
//! - Running a job: admit items under the capacity limit, copy them, back off
//!   while the destinations are full, and persist what is left on any exit
//!   other than a full drain

use crate::backoff::{BackoffScheduler, Sleeper};
use crate::checkpoint::Checkpoint;
use crate::context::RunContext;
use crate::error::EngineError;
use crate::fs_ops;
use crate::gate;
use crate::model::{ItemState, QueuedItem, RunOutcome, TransferItem, WorkQueue};
use crate::progress::{CycleReport, ProgressCallback};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Where a job's work list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobSource {
    /// Loaded from an existing checkpoint
    Resumed,
    /// Expanded from the `[[data]]` patterns
    Discovered,
}

/// The state of a transfer job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Planned, not yet started
    Pending,
    /// Currently executing
    Running,
    /// Reached a terminal outcome
    Completed,
}

/// A planned transfer: the queue plus the bookkeeping needed to report on it.
#[derive(Debug)]
pub struct TransferJob {
    pub queue: WorkQueue,
    pub source: JobSource,
    pub state: JobState,
    /// Items in the queue when the job was planned
    pub total: usize,
    /// Items copied so far
    pub copied: usize,
    /// Bytes copied so far
    pub bytes_copied: u64,
    /// Items that failed on every allowed attempt
    pub failed: Vec<QueuedItem>,
    checkpoint: Checkpoint<TransferItem>,
}

impl TransferJob {
    /// Everything that has not been copied, in the order it would be retried.
    pub fn remaining(&self) -> Vec<TransferItem> {
        let mut rows = self.queue.snapshot();
        rows.extend(self.failed.iter().map(|q| q.item.clone()));
        rows
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.checkpoint.path().to_path_buf()
    }
}

/// Summary of a finished transfer run.
#[derive(Debug, Clone)]
pub struct TransferReport {
    pub outcome: RunOutcome,
    pub source: JobSource,
    pub total: usize,
    pub copied: usize,
    pub bytes_copied: u64,
    /// Items that failed on every allowed attempt (saved to the checkpoint)
    pub failed: usize,
    /// Items written to the checkpoint, failed ones included
    pub saved: usize,
    pub cycles: u64,
    pub elapsed: Duration,
    pub checkpoint_path: PathBuf,
}

/// Plan a transfer: resume the checkpoint if one exists, otherwise discover.
///
/// A present checkpoint is authoritative; the `[[data]]` source patterns are
/// not consulted at all in that case.
///
/// # Errors
/// Returns EngineError if the checkpoint cannot be read or a pattern is invalid.
pub fn plan_transfer(ctx: &RunContext) -> Result<TransferJob, EngineError> {
    let checkpoint = Checkpoint::new(&ctx.settings.checkpoint_path);

    let (items, source) = if checkpoint.exists() {
        info!(
            "Saved file list found! Reading {}.",
            checkpoint.path().display()
        );
        (checkpoint.load()?, JobSource::Resumed)
    } else {
        info!("Saved file list not found. Discovering files from settings.");
        (
            fs_ops::expand_sources(&ctx.settings.data)?,
            JobSource::Discovered,
        )
    };

    info!("Total {} file(s).", items.len());
    let total = items.len();
    Ok(TransferJob {
        queue: items.into_iter().collect(),
        source,
        state: JobState::Pending,
        total,
        copied: 0,
        bytes_copied: 0,
        failed: Vec::new(),
        checkpoint,
    })
}

/// Run a planned transfer to a terminal outcome.
///
/// Cancellation is checked at the top of every cycle, between items and
/// during the backoff wait. Every outcome other than `Drained` writes the
/// remaining items to the checkpoint before returning; `Drained` deletes it.
///
/// # Errors
/// Returns EngineError for run-level failures (unreadable destination,
/// checkpoint I/O). The remaining queue is saved on a best-effort basis
/// before such an error is returned.
pub fn run_transfer(
    ctx: &RunContext,
    job: &mut TransferJob,
    sleeper: &dyn Sleeper,
    progress: Option<&dyn ProgressCallback>,
) -> Result<TransferReport, EngineError> {
    if job.state != JobState::Pending {
        return Err(EngineError::InvalidState {
            reason: format!("Job must be in Pending state to run; current state: {:?}", job.state),
        });
    }
    job.state = JobState::Running;

    if let Some(callback) = progress {
        callback.on_run_started(job.total);
    }

    let mut cycles = 0;
    let outcome = match drive(ctx, job, sleeper, progress, &mut cycles) {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("{}: {}. Saving remaining file list.", cycles, e);
            if let Err(save_err) = job.checkpoint.save(&job.remaining()) {
                error!("Failed to save remaining file list: {}", save_err);
            }
            job.state = JobState::Completed;
            return Err(e);
        }
    };

    let saved = if outcome.saved_checkpoint() {
        let remaining = job.remaining();
        job.checkpoint.save(&remaining)?;
        remaining.len()
    } else {
        job.checkpoint.delete()?;
        0
    };
    job.state = JobState::Completed;

    if let Some(callback) = progress {
        callback.on_run_completed();
    }

    Ok(TransferReport {
        outcome,
        source: job.source,
        total: job.total,
        copied: job.copied,
        bytes_copied: job.bytes_copied,
        failed: job.failed.len(),
        saved,
        cycles,
        elapsed: ctx.elapsed(),
        checkpoint_path: job.checkpoint_path(),
    })
}

/// The cycle loop. Returns the terminal outcome; persistence is left to the caller.
fn drive(
    ctx: &RunContext,
    job: &mut TransferJob,
    sleeper: &dyn Sleeper,
    progress: Option<&dyn ProgressCallback>,
    cycles: &mut u64,
) -> Result<RunOutcome, EngineError> {
    let settings = &ctx.settings;
    let mut backoff = BackoffScheduler::new(settings.sleep_schedule());

    loop {
        // An empty queue wins over a late cancellation: nothing is left to save.
        if job.queue.is_empty() {
            if job.failed.is_empty() {
                return Ok(RunOutcome::Drained);
            }
            for entry in &job.failed {
                error!(
                    "{}: {} not copied after {} attempt(s): {}",
                    cycles,
                    entry.item.source_path.display(),
                    entry.attempts,
                    entry.error_message.as_deref().unwrap_or("unknown error")
                );
            }
            return Ok(RunOutcome::Incomplete);
        }
        if ctx.cancel.is_cancelled() {
            warn!("{}: Cancellation requested.", cycles);
            return Ok(RunOutcome::Cancelled);
        }

        let cycle = *cycles;
        let occupancy = fs_ops::measure_occupancy(&settings.data)?;
        let admitted = gate::admit(job.queue.len(), settings.limit, occupancy);
        info!(
            cycle,
            occupancy,
            admitted,
            "{}: Total number of files found: {}.",
            cycle,
            occupancy
        );

        let mut copied_this_cycle = 0;
        for _ in 0..admitted {
            if ctx.cancel.is_cancelled() {
                break;
            }
            let Some(entry) = job.queue.pop_front() else {
                break;
            };
            if copy_entry(job, entry, settings.max_item_attempts, cycle, progress) {
                copied_this_cycle += 1;
            }
        }

        // A cycle whose admitted items all failed is neither a success nor
        // backpressure; per-item attempts bound that case.
        if copied_this_cycle > 0 {
            backoff.reset();
        } else if admitted == 0 {
            backoff.advance();
            debug!(
                "{}: LIMIT={} reached. Retry attempt #{}.",
                cycle,
                settings.limit,
                backoff.consecutive_exhaustions()
            );
        }

        *cycles += 1;
        let exhausted = backoff.exhausted();
        let delay = (!exhausted && !job.queue.is_empty()).then(|| backoff.next_delay());

        if let Some(callback) = progress {
            callback.on_cycle(&CycleReport {
                cycle,
                occupancy,
                admitted,
                queued: job.queue.len(),
                consecutive_exhaustions: backoff.consecutive_exhaustions(),
                delay,
            });
        }

        if exhausted {
            error!(
                "{}: No more retry attempts left. Saving remaining file list (length={}) to {}.",
                cycle,
                job.queue.len() + job.failed.len(),
                job.checkpoint.path().display()
            );
            return Ok(RunOutcome::Exhausted);
        }

        if let Some(delay) = delay {
            debug!("{}: Sleeping for {:?}.", cycle, delay);
            sleeper.sleep(delay, &ctx.cancel);
        }
    }
}

/// Copy one dequeued entry and route it to done, the back of the queue, or failed.
///
/// Returns true if the copy succeeded.
fn copy_entry(
    job: &mut TransferJob,
    mut entry: QueuedItem,
    max_attempts: u32,
    cycle: u64,
    progress: Option<&dyn ProgressCallback>,
) -> bool {
    entry.attempts += 1;
    let copied = match fs_ops::copy_item(&entry.item) {
        Ok(bytes) => {
            info!(
                "{}: Copied {} to {}.",
                cycle,
                entry.item.source_path.display(),
                entry.item.destination.display()
            );
            entry.state = ItemState::Done;
            entry.error_message = None;
            job.copied += 1;
            job.bytes_copied += bytes;
            true
        }
        Err(e) => {
            entry.error_message = Some(e.to_string());
            if entry.attempts >= max_attempts {
                error!(
                    "{}: Giving up on {} after {} attempt(s): {}",
                    cycle,
                    entry.item.source_path.display(),
                    entry.attempts,
                    e
                );
                entry.state = ItemState::Failed;
            } else {
                warn!(
                    "{}: Copy of {} failed (attempt {}/{}), requeueing: {}",
                    cycle,
                    entry.item.source_path.display(),
                    entry.attempts,
                    max_attempts,
                    e
                );
                entry.state = ItemState::Requeued;
            }
            false
        }
    };

    if let Some(callback) = progress {
        callback.on_item_completed(&entry);
    }

    match entry.state {
        ItemState::Requeued => job.queue.push_back(entry),
        ItemState::Failed => job.failed.push(entry),
        _ => {}
    }
    copied
}

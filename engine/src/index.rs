//! Indexing worker pool.
//!
//! A fixed number of worker threads drain a pre-populated channel of
//! `IndexItem`s, hand each one to an `Indexer`, and tally the result in a
//! pair of atomic counters. A failed item is logged and counted, never
//! retried. After every item the worker pauses for a fixed delay so the
//! shared indexing system is not flooded.
//!
//! Cancellation stops workers from taking new items; items already handed to
//! the indexer run to completion. Whatever was never dispatched is returned
//! so it can be checkpointed.

use crate::backoff::Sleeper;
use crate::checkpoint::Checkpoint;
use crate::context::{CancellationToken, RunContext};
use crate::error::EngineError;
use crate::fs_ops;
use crate::indexer::Indexer;
use crate::job::JobSource;
use crate::model::IndexItem;
use crate::progress::ProgressCallback;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Success/failure tallies shared by all workers.
#[derive(Debug, Default)]
pub struct IndexCounters {
    success: AtomicU64,
    failure: AtomicU64,
    dispatched: AtomicU64,
}

impl IndexCounters {
    pub fn record_dispatch(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failure.fetch_add(1, Ordering::Relaxed);
    }

    pub fn success(&self) -> u64 {
        self.success.load(Ordering::Relaxed)
    }

    pub fn failure(&self) -> u64 {
        self.failure.load(Ordering::Relaxed)
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }
}

/// Result of a pool run.
#[derive(Debug, Clone)]
pub struct IndexReport {
    pub total: usize,
    pub dispatched: u64,
    pub success: u64,
    pub failure: u64,
    /// Items no worker picked up (non-empty only after cancellation)
    pub undispatched: Vec<IndexItem>,
    /// True when cancellation left items undispatched
    pub cancelled: bool,
    pub elapsed: Duration,
}

/// Fixed-size pool of indexing workers.
#[derive(Debug, Clone)]
pub struct IndexPool {
    threads: usize,
    delay: Duration,
}

impl IndexPool {
    /// Create a pool; a thread count of zero is raised to one.
    pub fn new(threads: usize, delay: Duration) -> Self {
        Self {
            threads: threads.max(1),
            delay,
        }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Index every item once.
    ///
    /// # Errors
    /// Returns EngineError::Authentication if the pre-flight handshake fails;
    /// nothing is dispatched in that case. Individual item failures are only
    /// counted.
    pub fn run(
        &self,
        items: Vec<IndexItem>,
        indexer: &dyn Indexer,
        sleeper: &dyn Sleeper,
        cancel: &CancellationToken,
        progress: Option<&dyn ProgressCallback>,
    ) -> Result<IndexReport, EngineError> {
        let started = Instant::now();
        indexer.authenticate().map_err(EngineError::Authentication)?;
        info!("Authenticated with the indexing system.");

        let total = items.len();
        if let Some(callback) = progress {
            callback.on_run_started(total);
        }

        let (tx, rx) = crossbeam_channel::unbounded();
        for item in items {
            // The receiver is alive for the whole function; send cannot fail.
            let _ = tx.send(item);
        }
        drop(tx);

        let counters = IndexCounters::default();
        info!(
            "Dispatching {} item(s) to {} worker(s).",
            total, self.threads
        );

        thread::scope(|scope| {
            for worker_id in 0..self.threads {
                let rx = rx.clone();
                let counters = &counters;
                scope.spawn(move || {
                    while !cancel.is_cancelled() {
                        let Ok(item) = rx.recv() else {
                            break;
                        };
                        counters.record_dispatch();
                        index_one(worker_id, &item, indexer, counters, progress);
                        if !self.delay.is_zero() {
                            sleeper.sleep(self.delay, cancel);
                        }
                    }
                    debug!("Worker {} finished.", worker_id);
                });
            }
        });

        let undispatched: Vec<IndexItem> = rx.try_iter().collect();
        // A cancellation that lands after the last dispatch leaves nothing behind.
        let cancelled = cancel.is_cancelled() && !undispatched.is_empty();
        if cancelled {
            warn!(
                "Cancelled with {} item(s) not dispatched.",
                undispatched.len()
            );
        }
        if let Some(callback) = progress {
            callback.on_run_completed();
        }

        Ok(IndexReport {
            total,
            dispatched: counters.dispatched(),
            success: counters.success(),
            failure: counters.failure(),
            undispatched,
            cancelled,
            elapsed: started.elapsed(),
        })
    }
}

fn index_one(
    worker_id: usize,
    item: &IndexItem,
    indexer: &dyn Indexer,
    counters: &IndexCounters,
    progress: Option<&dyn ProgressCallback>,
) {
    let success = match indexer.index(item) {
        Ok(()) => {
            counters.record_success();
            info!(
                "Worker {}: indexed {} into index={} sourcetype={}.",
                worker_id,
                item.file_path.display(),
                item.index,
                item.sourcetype
            );
            true
        }
        Err(e) => {
            counters.record_failure();
            error!(
                "Worker {}: failed to index {}: {}",
                worker_id,
                item.file_path.display(),
                e
            );
            false
        }
    };
    if let Some(callback) = progress {
        callback.on_item_indexed(success);
    }
}

/// A planned indexing run.
#[derive(Debug)]
pub struct IndexJob {
    pub items: Vec<IndexItem>,
    pub source: JobSource,
    checkpoint: Checkpoint<IndexItem>,
}

impl IndexJob {
    pub fn checkpoint_path(&self) -> PathBuf {
        self.checkpoint.path().to_path_buf()
    }
}

/// Load the index checkpoint if present, otherwise expand `[[index.data]]`.
pub fn plan_index(ctx: &RunContext) -> Result<IndexJob, EngineError> {
    let settings = ctx.settings.index_settings()?;
    let checkpoint = Checkpoint::new(&settings.checkpoint_path);

    let (items, source) = if checkpoint.exists() {
        info!(
            "Saved index list found! Reading {}.",
            checkpoint.path().display()
        );
        (checkpoint.load()?, JobSource::Resumed)
    } else {
        info!("Saved index list not found. Discovering files from settings.");
        (
            fs_ops::expand_index_sources(&settings.data)?,
            JobSource::Discovered,
        )
    };
    info!("Total {} file(s) to index.", items.len());

    Ok(IndexJob {
        items,
        source,
        checkpoint,
    })
}

/// Run a planned indexing job through a pool sized from the settings.
///
/// On cancellation the undispatched items are saved to the index
/// checkpoint; otherwise the checkpoint is removed.
pub fn run_index(
    ctx: &RunContext,
    job: IndexJob,
    indexer: &dyn Indexer,
    sleeper: &dyn Sleeper,
    progress: Option<&dyn ProgressCallback>,
) -> Result<IndexReport, EngineError> {
    let settings = ctx.settings.index_settings()?;
    let pool = IndexPool::new(settings.threads, settings.delay());

    let report = pool.run(job.items, indexer, sleeper, &ctx.cancel, progress)?;
    finish_checkpoint(&job.checkpoint, &report)?;
    Ok(report)
}

/// Save what a cancelled run left undispatched; otherwise remove the checkpoint.
fn finish_checkpoint(
    checkpoint: &Checkpoint<IndexItem>,
    report: &IndexReport,
) -> Result<(), EngineError> {
    if report.cancelled {
        checkpoint.save(&report.undispatched)
    } else {
        checkpoint.delete()
    }
}

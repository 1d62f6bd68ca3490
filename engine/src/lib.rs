//! # batchgate engine - capacity-gated file transfer and indexing
//!
//! A headless library for feeding files into a downstream system that can
//! only hold so much at once (for example a batch-ingest directory watched by
//! a log indexer). Designed as the foundation for the `batchgate` CLI.
//!
//! ## Overview
//!
//! The engine provides:
//! - Discovery of work items from glob patterns
//! - A transfer loop that admits files only while the destinations are under
//!   a configured limit, backing off along a finite schedule while they are full
//! - Crash-safe CSV checkpoints of the remaining queue, resumed on the next run
//! - A fixed-size worker pool that hands files to an external indexing command
//! - Progress reporting via callbacks (decoupled from UI technology)
//!
//! ## Basic Usage
//!
//! ```no_run
//! use std::path::Path;
//! use batchgate_engine::{plan_transfer, run_transfer, RunContext, Settings, ThreadSleeper};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::load(Path::new("settings.toml"))?;
//! let ctx = RunContext::new(settings);
//!
//! // Resume the checkpoint, or discover files from the settings
//! let mut job = plan_transfer(&ctx)?;
//! println!("{} file(s) queued", job.total);
//!
//! // Copy until drained, out of retries, or cancelled
//! let report = run_transfer(&ctx, &mut job, &ThreadSleeper, None)?;
//! println!("{}: copied {}, saved {}", report.outcome, report.copied, report.saved);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Work items, configuration entries, the work queue
//! - **config**: TOML settings
//! - **context**: Run context and cancellation token
//! - **error**: Error types and handling
//! - **fs_ops**: Discovery, occupancy and copying
//! - **gate**: Capacity gate
//! - **backoff**: Backoff scheduler and sleepers
//! - **checkpoint**: CSV checkpoint persistence
//! - **job**: Transfer loop (plan, run)
//! - **indexer**: Indexing-system seam and the command-backed implementation
//! - **index**: Indexing worker pool
//! - **progress**: Progress callback trait

pub mod backoff;
pub mod checkpoint;
pub mod config;
pub mod context;
pub mod error;
pub mod fs_ops;
pub mod gate;
pub mod index;
pub mod indexer;
pub mod job;
pub mod model;
pub mod progress;

// Re-export main types and functions
pub use backoff::{BackoffScheduler, Sleeper, ThreadSleeper};
pub use checkpoint::{Checkpoint, CheckpointRow};
pub use config::{IndexSettings, Settings, DEFAULT_SETTINGS_FILE};
pub use context::{CancellationToken, RunContext};
pub use error::{ConfigError, CopyError, EngineError, IndexError};
pub use index::{plan_index, run_index, IndexCounters, IndexJob, IndexPool, IndexReport};
pub use indexer::{CommandIndexer, Indexer};
pub use job::{plan_transfer, run_transfer, JobSource, JobState, TransferJob, TransferReport};
pub use model::{
    DestinationSpec, IndexItem, IndexSpec, ItemState, QueuedItem, RunOutcome, TransferItem,
    WorkQueue,
};
pub use progress::{CycleReport, ProgressCallback};

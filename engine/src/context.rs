//! Run context shared by every component of a run.
//!
//! A `RunContext` is built once at startup from the loaded settings and
//! passed by reference into the transfer loop and the indexing pool. It is
//! read-only after construction apart from the cancellation token, which a
//! signal handler may trip at any time.

use crate::config::Settings;
use chrono::{DateTime, Local};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Cooperative cancellation flag.
///
/// Cloning yields a handle to the same flag. Components poll it at
/// well-defined points; nothing is saved from inside the signal handler.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Everything a run needs that is decided before the run starts.
#[derive(Debug)]
pub struct RunContext {
    /// Identifies this run in the log
    pub run_id: Uuid,

    /// Loaded, validated settings
    pub settings: Settings,

    /// Set on interrupt
    pub cancel: CancellationToken,

    /// Wall-clock start, for the log
    pub started_at: DateTime<Local>,

    started: Instant,
}

impl RunContext {
    pub fn new(settings: Settings) -> Self {
        Self::with_token(settings, CancellationToken::new())
    }

    /// Build a context around an existing token (e.g. one already wired to a signal handler).
    pub fn with_token(settings: Settings, cancel: CancellationToken) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            settings,
            cancel,
            started_at: Local::now(),
            started: Instant::now(),
        }
    }

    /// Time since the context was created.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

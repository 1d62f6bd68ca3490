//! Progress reporting trait.
//!
//! This module defines the ProgressCallback trait, which decouples the
//! transfer loop and the indexing pool from any particular display. The CLI
//! renders a progress line on stderr; tests record the calls.

use crate::model::QueuedItem;
use std::time::Duration;

/// Snapshot of one transfer cycle, passed to `on_cycle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Zero-based cycle counter
    pub cycle: u64,
    /// Entries found across all destinations at the start of the cycle
    pub occupancy: u64,
    /// Items the capacity gate let through
    pub admitted: usize,
    /// Items left in the queue after the cycle
    pub queued: usize,
    /// Exhaustion cycles in a row, including this one
    pub consecutive_exhaustions: usize,
    /// Wait before the next cycle, if there is one
    pub delay: Option<Duration>,
}

/// Trait for receiving progress updates from a run.
///
/// All methods are called synchronously; indexing workers call
/// `on_item_indexed` from their own threads, hence `Sync`.
pub trait ProgressCallback: Send + Sync {
    /// Called once the work list is known.
    fn on_run_started(&self, total: usize);

    /// Called at the end of every transfer cycle.
    fn on_cycle(&self, _report: &CycleReport) {}

    /// Called after each copy attempt, whatever its result.
    fn on_item_completed(&self, _item: &QueuedItem) {}

    /// Called after each indexing attempt.
    fn on_item_indexed(&self, _success: bool) {}

    /// Called when the run reaches a terminal state.
    fn on_run_completed(&self) {}
}

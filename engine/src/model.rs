//! Core data model for transfer and indexing runs.
//!
//! This module defines the structures that flow through a run:
//! - TransferItem / IndexItem: a single unit of work, as persisted in a checkpoint
//! - DestinationSpec / IndexSpec: configuration entries that expand into work items
//! - QueuedItem / WorkQueue: the in-memory FIFO the transfer loop drains
//! - ItemState, RunOutcome: enums describing per-item and per-run results

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;

/// A single file waiting to be copied into a destination directory.
///
/// Column names match the checkpoint header `file,dst`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferItem {
    /// Full source path
    #[serde(rename = "file")]
    pub source_path: PathBuf,

    /// Destination directory the file is copied into
    #[serde(rename = "dst")]
    pub destination: PathBuf,
}

/// A single file waiting to be handed to the indexing system.
///
/// Column names match the checkpoint header `file_path,index,sourcetype`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexItem {
    pub file_path: PathBuf,
    pub index: String,
    pub sourcetype: String,
}

/// A `[[data]]` entry: files matching `src` are copied into `dst`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationSpec {
    /// Glob selecting the source files
    pub src: String,

    /// Destination directory
    pub dst: PathBuf,

    /// File-name glob counted as occupancy of `dst`
    #[serde(default = "default_occupancy_pattern")]
    pub pattern: String,
}

fn default_occupancy_pattern() -> String {
    "*".to_string()
}

/// An `[[index.data]]` entry: files matching `file_path` go to `index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub index: String,
    pub sourcetype: String,
    /// Glob selecting the files to index
    pub file_path: String,
}

/// State of an item as seen by the transfer loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    /// Waiting in the queue
    Pending,
    /// Copied into its destination
    Done,
    /// Copy failed; sent to the back of the queue
    Requeued,
    /// Copy failed on every allowed attempt
    Failed,
}

/// An item in the work queue together with its in-memory retry bookkeeping.
///
/// Attempt counts are not persisted; a resumed run starts every item fresh.
#[derive(Debug, Clone)]
pub struct QueuedItem {
    pub item: TransferItem,
    pub attempts: u32,
    pub state: ItemState,
    pub error_message: Option<String>,
}

impl QueuedItem {
    pub fn new(item: TransferItem) -> Self {
        Self {
            item,
            attempts: 0,
            state: ItemState::Pending,
            error_message: None,
        }
    }
}

/// FIFO of pending transfer items; the source of truth during a run.
#[derive(Debug, Default)]
pub struct WorkQueue {
    items: VecDeque<QueuedItem>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Take the item at the front of the queue.
    pub fn pop_front(&mut self) -> Option<QueuedItem> {
        self.items.pop_front()
    }

    /// Append an item (new or requeued) at the back of the queue.
    pub fn push_back(&mut self, item: QueuedItem) {
        self.items.push_back(item);
    }

    /// Snapshot of the remaining items in queue order, for persistence.
    pub fn snapshot(&self) -> Vec<TransferItem> {
        self.items.iter().map(|q| q.item.clone()).collect()
    }
}

impl FromIterator<TransferItem> for WorkQueue {
    fn from_iter<I: IntoIterator<Item = TransferItem>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().map(QueuedItem::new).collect(),
        }
    }
}

/// How a transfer run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Queue fully drained; checkpoint removed
    Drained,
    /// Queue drained except for items that failed on every attempt; those were saved
    Incomplete,
    /// Backoff schedule spent with no admission; remaining items saved
    Exhausted,
    /// Cancellation requested; remaining items saved
    Cancelled,
}

impl RunOutcome {
    /// True if the run left resumable state in the checkpoint.
    pub fn saved_checkpoint(&self) -> bool {
        !matches!(self, RunOutcome::Drained)
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Drained => write!(f, "DONE"),
            RunOutcome::Incomplete => write!(f, "INCOMPLETE (failed items)"),
            RunOutcome::Exhausted => write!(f, "INCOMPLETE (retries exhausted)"),
            RunOutcome::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

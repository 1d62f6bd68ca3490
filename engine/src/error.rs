//! Error types for the batchgate engine.
//!
//! The primary error type is `EngineError`, which represents run-level errors
//! that stop a transfer or indexing run. Per-item errors (a failed copy, a
//! failed indexing command) are recorded against the item and counted, not
//! raised as EngineError.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that stop a run before it can reach a terminal outcome.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Configuration could not be loaded or failed validation
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A destination directory could not be read while measuring occupancy
    #[error("Destination is unreadable: {}", path.display())]
    DestinationUnreadable { path: PathBuf, source: io::Error },

    /// A source or destination glob pattern is malformed
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Failed to enumerate the files matching a source pattern
    #[error("Failed to enumerate '{pattern}': {reason}")]
    EnumerationFailed { pattern: String, reason: String },

    /// Reading or writing the checkpoint file failed
    #[error("Checkpoint I/O failed at {}", path.display())]
    CheckpointIo { path: PathBuf, source: io::Error },

    /// The checkpoint file exists but its rows could not be decoded
    #[error("Checkpoint at {} is malformed: {source}", path.display())]
    CheckpointFormat { path: PathBuf, source: csv::Error },

    /// The checkpoint file's header does not match the expected columns
    #[error("Checkpoint at {} has header '{found}', expected '{expected}'", path.display())]
    CheckpointHeader {
        path: PathBuf,
        expected: String,
        found: String,
    },

    /// A job was driven out of order (e.g. run twice)
    #[error("Invalid job state: {reason}")]
    InvalidState { reason: String },

    /// Pre-flight handshake with the indexing system failed
    #[error("Authentication with the indexing system failed: {0}")]
    Authentication(IndexError),
}

/// Errors raised while loading or validating the settings file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The settings file does not exist
    #[error("Settings file {} doesn't exist. Copy settings.toml.template to settings.toml and edit it.", path.display())]
    Missing { path: PathBuf },

    /// The settings file exists but could not be read
    #[error("Failed to read settings file {}", path.display())]
    Unreadable { path: PathBuf, source: io::Error },

    /// The settings file is not valid TOML for the expected schema
    #[error("Failed to parse settings file {}: {source}", path.display())]
    Parse { path: PathBuf, source: toml::de::Error },

    /// A setting holds a value the engine cannot run with
    #[error("Invalid setting '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Failure of a single call into the indexing system.
///
/// Terminal for the item it belongs to; the pool counts it and moves on.
#[derive(Error, Debug)]
pub enum IndexError {
    /// The indexing program could not be started
    #[error("Failed to launch '{program}': {source}")]
    Launch { program: String, source: io::Error },

    /// The indexing program ran and exited unsuccessfully
    #[error("'{program}' exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },

    /// Rejected by an in-process indexer
    #[error("{0}")]
    Rejected(String),
}

impl EngineError {
    /// True for errors caused by the settings rather than the environment.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::InvalidPattern { .. } | Self::DestinationUnreadable { .. }
        )
    }
}

/// Errors raised while copying a single file.
///
/// Recorded on the queued item; the transfer loop decides whether to
/// requeue it or give up on it.
#[derive(Error, Debug)]
pub enum CopyError {
    /// Failed to read from the source file
    #[error("Failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    /// Failed to write to the destination file
    #[error("Failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    /// Failed to create the destination directory
    #[error("Failed to create directory {}: {source}", path.display())]
    DirectoryCreation { path: PathBuf, source: io::Error },

    /// The source path has no file name to copy under
    #[error("Source has no file name: {}", path.display())]
    NoFileName { path: PathBuf },
}

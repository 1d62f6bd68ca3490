//! Durable snapshot of the remaining work queue.
//!
//! A checkpoint is a CSV file with a header row followed by one row per
//! pending item, in queue order. Its presence at startup means "resume";
//! its absence means "discover from settings".
//!
//! Writes go to a temporary file in the same directory which is fsynced and
//! then renamed over the target, so a crash never leaves a half-written
//! checkpoint behind.

use crate::error::EngineError;
use crate::model::{IndexItem, TransferItem};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Checkpoint file holding rows of `T`.
#[derive(Debug, Clone)]
pub struct Checkpoint<T> {
    path: PathBuf,
    _row: PhantomData<fn() -> T>,
}

impl<T: CheckpointRow> Checkpoint<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _row: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Read every row back in file order.
    pub fn load(&self) -> Result<Vec<T>, EngineError> {
        let file = fs::File::open(&self.path).map_err(|e| self.io_error(e))?;
        let mut reader = csv::Reader::from_reader(io::BufReader::new(file));

        let found: Vec<String> = reader
            .headers()
            .map_err(|e| self.format_error(e))?
            .iter()
            .map(str::to_string)
            .collect();
        if found != T::HEADER {
            return Err(EngineError::CheckpointHeader {
                path: self.path.clone(),
                expected: T::HEADER.join(","),
                found: found.join(","),
            });
        }

        let mut rows = Vec::new();
        for record in reader.deserialize() {
            rows.push(record.map_err(|e| self.format_error(e))?);
        }
        debug!("Loaded {} row(s) from {}", rows.len(), self.path.display());
        Ok(rows)
    }

    /// Replace the checkpoint with `rows`.
    pub fn save(&self, rows: &[T]) -> Result<(), EngineError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| self.io_error(e))?;

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "checkpoint".to_string());
        let temp_path = dir.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

        let result = self.write_rows(&temp_path, rows).and_then(|()| {
            fs::rename(&temp_path, &self.path).map_err(|e| self.io_error(e))
        });
        if result.is_err() {
            let _ = fs::remove_file(&temp_path);
            return result;
        }

        // Persist the rename itself; not every filesystem supports this.
        if let Ok(dir) = fs::File::open(&dir) {
            let _ = dir.sync_all();
        }

        info!("Saved {} row(s) to {}", rows.len(), self.path.display());
        Ok(())
    }

    fn write_rows(&self, temp_path: &Path, rows: &[T]) -> Result<(), EngineError> {
        let file = fs::File::create(temp_path).map_err(|e| self.io_error(e))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(io::BufWriter::new(file));

        // Written by hand so an empty queue still produces a header row.
        writer
            .write_record(T::HEADER)
            .map_err(|e| self.format_error(e))?;
        for row in rows {
            writer.serialize(row).map_err(|e| self.format_error(e))?;
        }

        let buffered = writer
            .into_inner()
            .map_err(|e| self.io_error(e.into_error()))?;
        let file = buffered
            .into_inner()
            .map_err(|e| self.io_error(e.into_error()))?;
        file.sync_all().map_err(|e| self.io_error(e))?;
        Ok(())
    }

    /// Remove the checkpoint; a missing file is not an error.
    pub fn delete(&self) -> Result<(), EngineError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Deleted checkpoint {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn io_error(&self, source: io::Error) -> EngineError {
        EngineError::CheckpointIo {
            path: self.path.clone(),
            source,
        }
    }

    fn format_error(&self, source: csv::Error) -> EngineError {
        EngineError::CheckpointFormat {
            path: self.path.clone(),
            source,
        }
    }
}

/// Column layout of a checkpoint row type.
pub trait CheckpointRow: Serialize + DeserializeOwned {
    /// Header row, in column order.
    const HEADER: &'static [&'static str];
}

impl CheckpointRow for TransferItem {
    const HEADER: &'static [&'static str] = &["file", "dst"];
}

impl CheckpointRow for IndexItem {
    const HEADER: &'static [&'static str] = &["file_path", "index", "sourcetype"];
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer_items(n: usize) -> Vec<TransferItem> {
        (0..n)
            .map(|i| TransferItem {
                source_path: PathBuf::from(format!("/data/in/file-{:03}.log", i)),
                destination: PathBuf::from(if i % 2 == 0 { "/data/foo/" } else { "/data/bar/" }),
            })
            .collect()
    }

    #[test]
    fn test_round_trip_preserves_order_and_fields() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let checkpoint = Checkpoint::new(temp_dir.path().join("saved.csv"));
        let items = transfer_items(25);

        checkpoint.save(&items).expect("Failed to save");
        assert!(checkpoint.exists());
        assert_eq!(checkpoint.load().expect("Failed to load"), items);
    }

    #[test]
    fn test_header_matches_schema() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let checkpoint = Checkpoint::new(temp_dir.path().join("saved.csv"));
        checkpoint.save(&transfer_items(1)).expect("Failed to save");

        let content = fs::read_to_string(checkpoint.path()).expect("Failed to read");
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("file,dst"));
        assert_eq!(lines.next(), Some("/data/in/file-000.log,/data/foo/"));
    }

    #[test]
    fn test_empty_queue_still_writes_header() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let checkpoint: Checkpoint<IndexItem> = Checkpoint::new(temp_dir.path().join("idx.csv"));
        checkpoint.save(&[]).expect("Failed to save");

        let content = fs::read_to_string(checkpoint.path()).expect("Failed to read");
        assert_eq!(content.trim_end(), "file_path,index,sourcetype");
        assert!(checkpoint.load().expect("Failed to load").is_empty());
    }

    #[test]
    fn test_index_rows_round_trip() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let checkpoint = Checkpoint::new(temp_dir.path().join("idx.csv"));
        let items = vec![IndexItem {
            file_path: PathBuf::from("/logs/a, b.log"),
            index: "main".to_string(),
            sourcetype: "access_combined".to_string(),
        }];

        checkpoint.save(&items).expect("Failed to save");
        assert_eq!(checkpoint.load().expect("Failed to load"), items);
    }

    #[test]
    fn test_save_replaces_previous_contents_without_leftovers() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let checkpoint = Checkpoint::new(temp_dir.path().join("saved.csv"));
        checkpoint.save(&transfer_items(10)).expect("Failed to save");
        checkpoint.save(&transfer_items(3)).expect("Failed to save");

        assert_eq!(checkpoint.load().expect("Failed to load").len(), 3);
        let entries = fs::read_dir(temp_dir.path()).expect("Failed to list").count();
        assert_eq!(entries, 1, "temporary files must not be left behind");
    }

    #[test]
    fn test_wrong_header_is_rejected() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("saved.csv");
        fs::write(&path, "path,destination\n/a,/b\n").expect("Failed to write");

        let checkpoint: Checkpoint<TransferItem> = Checkpoint::new(&path);
        assert!(matches!(
            checkpoint.load(),
            Err(EngineError::CheckpointHeader { .. })
        ));
    }

    #[test]
    fn test_delete_missing_is_ok() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let checkpoint: Checkpoint<TransferItem> =
            Checkpoint::new(temp_dir.path().join("never-written.csv"));
        checkpoint.delete().expect("Deleting a missing checkpoint should succeed");

        checkpoint.save(&transfer_items(2)).expect("Failed to save");
        checkpoint.delete().expect("Failed to delete");
        assert!(!checkpoint.exists());
    }
}

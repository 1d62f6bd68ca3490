//! Filesystem operations module.
//!
//! This module provides low-level operations for:
//! - Expanding source glob patterns into work items
//! - Measuring destination occupancy
//! - Copying files into a destination directory with metadata preservation
//! - Creating directories recursively

use crate::error::{CopyError, EngineError};
use crate::model::{DestinationSpec, IndexItem, IndexSpec, TransferItem};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Expand a glob into the regular files it matches, in sorted order.
fn glob_files(pattern: &str) -> Result<Vec<PathBuf>, EngineError> {
    let paths = glob::glob(pattern).map_err(|e| EngineError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;

    let mut files = Vec::new();
    for entry in paths {
        let path = entry.map_err(|e| EngineError::EnumerationFailed {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        if path.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}

/// Expand every `[[data]]` entry into transfer items, in configuration order.
///
/// # Errors
/// Returns EngineError if a pattern is malformed or a matched path cannot be read.
pub fn expand_sources(specs: &[DestinationSpec]) -> Result<Vec<TransferItem>, EngineError> {
    let mut items = Vec::new();
    for (i, spec) in specs.iter().enumerate() {
        let files = glob_files(&spec.src)?;
        debug!(
            "DATA #{}: src={}, dst={}, files={}",
            i,
            spec.src,
            spec.dst.display(),
            files.len()
        );
        items.extend(files.into_iter().map(|source_path| TransferItem {
            source_path,
            destination: spec.dst.clone(),
        }));
    }
    Ok(items)
}

/// Expand every `[[index.data]]` entry into index items, in configuration order.
pub fn expand_index_sources(specs: &[IndexSpec]) -> Result<Vec<IndexItem>, EngineError> {
    let mut items = Vec::new();
    for (i, spec) in specs.iter().enumerate() {
        let files = glob_files(&spec.file_path)?;
        debug!(
            "INDEX DATA #{}: file_path={}, index={}, sourcetype={}, files={}",
            i,
            spec.file_path,
            spec.index,
            spec.sourcetype,
            files.len()
        );
        items.extend(files.into_iter().map(|file_path| IndexItem {
            file_path,
            index: spec.index.clone(),
            sourcetype: spec.sourcetype.clone(),
        }));
    }
    Ok(items)
}

/// Count the entries in `dir` whose file name matches `pattern`.
///
/// Hidden entries (leading dot) are not counted, matching shell `*`.
///
/// # Errors
/// Returns EngineError::DestinationUnreadable if the directory cannot be listed.
pub fn count_entries(dir: &Path, pattern: &str) -> Result<u64, EngineError> {
    let matcher = glob::Pattern::new(pattern).map_err(|e| EngineError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;
    let unreadable = |e: io::Error| EngineError::DestinationUnreadable {
        path: dir.to_path_buf(),
        source: e,
    };

    let mut count = 0;
    for entry in fs::read_dir(dir).map_err(unreadable)? {
        let entry = entry.map_err(unreadable)?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') {
            continue;
        }
        if matcher.matches(&name) {
            count += 1;
        }
    }
    Ok(count)
}

/// Total occupancy across all configured destinations.
///
/// Each distinct `(dst, pattern)` pair is counted once, however many
/// `[[data]]` entries share it. Re-read on every call.
pub fn measure_occupancy(specs: &[DestinationSpec]) -> Result<u64, EngineError> {
    let mut seen = HashSet::new();
    let mut total = 0;
    for spec in specs {
        if !seen.insert((spec.dst.as_path(), spec.pattern.as_str())) {
            continue;
        }
        let count = count_entries(&spec.dst, &spec.pattern)?;
        debug!("{} currently has {} file(s)", spec.dst.display(), count);
        total += count;
    }
    Ok(total)
}

/// Where `item` lands inside its destination directory.
pub fn destination_file(item: &TransferItem) -> Result<PathBuf, CopyError> {
    let name = item
        .source_path
        .file_name()
        .ok_or_else(|| CopyError::NoFileName {
            path: item.source_path.clone(),
        })?;
    Ok(item.destination.join(name))
}

/// Copy a work item's file into its destination directory.
///
/// # Returns
/// Number of bytes copied
pub fn copy_item(item: &TransferItem) -> Result<u64, CopyError> {
    let dst = destination_file(item)?;
    copy_file_with_metadata(&item.source_path, &dst)
}

/// Copy a file from source to destination with metadata preservation.
///
/// The content is written to a hidden temporary file next to `dst` and
/// renamed into place, so a watcher on the destination directory never sees
/// a partial file. The temporary file is removed if any step fails.
///
/// # Returns
/// Number of bytes copied
///
/// # Errors
/// Returns CopyError if the copy fails
pub fn copy_file_with_metadata(src: &Path, dst: &Path) -> Result<u64, CopyError> {
    ensure_parent_dir_exists(dst)?;

    let mut src_file = fs::File::open(src).map_err(|e| CopyError::Read {
        path: src.to_path_buf(),
        source: e,
    })?;

    let src_metadata = src_file.metadata().map_err(|e| CopyError::Read {
        path: src.to_path_buf(),
        source: e,
    })?;

    let temp_path = partial_path(dst);
    let result = write_partial(&mut src_file, src, &src_metadata, &temp_path).and_then(|bytes| {
        fs::rename(&temp_path, dst).map_err(|e| CopyError::Write {
            path: dst.to_path_buf(),
            source: e,
        })?;
        Ok(bytes)
    });
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

/// Hidden sibling of `dst` used while the copy is in flight.
fn partial_path(dst: &Path) -> PathBuf {
    let name = dst
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dst.with_file_name(format!(".{}.{}.part", name, uuid::Uuid::new_v4()))
}

fn write_partial(
    src_file: &mut fs::File,
    src: &Path,
    src_metadata: &fs::Metadata,
    temp_path: &Path,
) -> Result<u64, CopyError> {
    let mut temp_file = fs::File::create(temp_path).map_err(|e| CopyError::Write {
        path: temp_path.to_path_buf(),
        source: e,
    })?;

    let bytes_copied = io::copy(src_file, &mut temp_file).map_err(|e| {
        if e.kind() == io::ErrorKind::PermissionDenied {
            CopyError::Write {
                path: temp_path.to_path_buf(),
                source: e,
            }
        } else {
            CopyError::Read {
                path: src.to_path_buf(),
                source: e,
            }
        }
    })?;
    drop(temp_file);

    // Permissions and mtime are best effort; rename carries them over.
    let _ = fs::set_permissions(temp_path, src_metadata.permissions());
    if let Ok(mtime) = src_metadata.modified() {
        let _ = filetime::set_file_mtime(temp_path, filetime::FileTime::from_system_time(mtime));
    }

    Ok(bytes_copied)
}

/// Ensure the parent directory of a path exists, creating it if necessary.
///
/// # Errors
/// Returns CopyError if directory creation fails
pub fn ensure_parent_dir_exists(path: &Path) -> Result<(), CopyError> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    match fs::metadata(parent) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(CopyError::DirectoryCreation {
            path: parent.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::InvalidInput,
                "Parent path exists but is not a directory",
            ),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(parent).map_err(|e| CopyError::DirectoryCreation {
                path: parent.to_path_buf(),
                source: e,
            })
        }
        Err(e) => Err(CopyError::DirectoryCreation {
            path: parent.to_path_buf(),
            source: e,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn data_entry(src: &Path, pattern: &str, dst: &Path) -> DestinationSpec {
        DestinationSpec {
            src: src.join(pattern).to_string_lossy().into_owned(),
            dst: dst.to_path_buf(),
            pattern: "*".to_string(),
        }
    }

    #[test]
    fn test_expand_sources_matches_glob_in_order() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        fs::create_dir(&src).expect("Failed to create src dir");
        for name in ["b.log", "a.log", "c.txt"] {
            fs::write(src.join(name), name).expect("Failed to write file");
        }
        fs::create_dir(src.join("dir.log")).expect("Failed to create dir");
        let dst = temp_dir.path().join("dst");

        let items = expand_sources(&[data_entry(&src, "*.log", &dst)]).expect("Failed to expand");

        let names: Vec<_> = items
            .iter()
            .map(|i| i.source_path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.log", "b.log"]);
        assert!(items.iter().all(|i| i.destination == dst));
    }

    #[test]
    fn test_expand_sources_rejects_bad_pattern() {
        let specs = [DestinationSpec {
            src: "/tmp/[".to_string(),
            dst: PathBuf::from("/tmp"),
            pattern: "*".to_string(),
        }];
        assert!(matches!(
            expand_sources(&specs),
            Err(EngineError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_expand_index_sources_carries_metadata() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        fs::write(temp_dir.path().join("one.log"), "x").expect("Failed to write file");

        let specs = [IndexSpec {
            index: "main".to_string(),
            sourcetype: "syslog".to_string(),
            file_path: temp_dir.path().join("*.log").to_string_lossy().into_owned(),
        }];
        let items = expand_index_sources(&specs).expect("Failed to expand");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].index, "main");
        assert_eq!(items[0].sourcetype, "syslog");
    }

    #[test]
    fn test_count_entries_skips_hidden_and_applies_pattern() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        for name in ["one.log", "two.log", "three.txt", ".hidden.log"] {
            fs::write(temp_dir.path().join(name), "x").expect("Failed to write file");
        }

        assert_eq!(count_entries(temp_dir.path(), "*").unwrap(), 3);
        assert_eq!(count_entries(temp_dir.path(), "*.log").unwrap(), 2);
    }

    #[test]
    fn test_count_entries_missing_destination_is_fatal() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let result = count_entries(&temp_dir.path().join("missing"), "*");
        assert!(matches!(result, Err(EngineError::DestinationUnreadable { .. })));
    }

    #[test]
    fn test_measure_occupancy_counts_shared_destination_once() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let dst = temp_dir.path().join("dst");
        fs::create_dir(&dst).expect("Failed to create dst dir");
        fs::write(dst.join("existing"), "x").expect("Failed to write file");

        let specs = [
            data_entry(Path::new("/a"), "*.log", &dst),
            data_entry(Path::new("/b"), "*.log", &dst),
        ];
        assert_eq!(measure_occupancy(&specs).unwrap(), 1);
    }

    #[test]
    fn test_copy_item_lands_in_destination_dir() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src_file = temp_dir.path().join("source.txt");
        let mut file = fs::File::create(&src_file).expect("Failed to create source");
        file.write_all(b"test content").expect("Failed to write source");
        drop(file);

        let item = TransferItem {
            source_path: src_file,
            destination: temp_dir.path().join("out"),
        };
        let bytes = copy_item(&item).expect("Failed to copy");
        assert_eq!(bytes, 12);

        let content = fs::read_to_string(temp_dir.path().join("out").join("source.txt"))
            .expect("Failed to read dest");
        assert_eq!(content, "test content");
    }

    #[test]
    fn test_copy_preserves_mtime() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src_file = temp_dir.path().join("old.txt");
        fs::write(&src_file, "old").expect("Failed to write source");
        let old = filetime::FileTime::from_unix_time(1_000_000_000, 0);
        filetime::set_file_mtime(&src_file, old).expect("Failed to set mtime");

        let dst_file = temp_dir.path().join("copy.txt");
        copy_file_with_metadata(&src_file, &dst_file).expect("Failed to copy");

        let meta = fs::metadata(&dst_file).expect("Failed to stat copy");
        assert_eq!(filetime::FileTime::from_last_modification_time(&meta), old);
    }

    #[test]
    fn test_copy_missing_source_is_read_error() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let result = copy_file_with_metadata(
            &temp_dir.path().join("missing.txt"),
            &temp_dir.path().join("dst.txt"),
        );
        assert!(matches!(result, Err(CopyError::Read { .. })));
    }

    #[test]
    fn test_copy_leaves_no_partial_files() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src_file = temp_dir.path().join("data.log");
        fs::write(&src_file, "payload").expect("Failed to write source");
        let out = temp_dir.path().join("out");

        copy_file_with_metadata(&src_file, &out.join("data.log")).expect("Failed to copy");

        let names: Vec<_> = fs::read_dir(&out)
            .expect("Failed to list dest")
            .map(|e| e.expect("Failed to read entry").file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("data.log")]);
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_copy_removes_partial_file() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        // Opening a directory succeeds on unix but reading it fails mid-copy.
        let src_dir = temp_dir.path().join("not-a-file");
        fs::create_dir(&src_dir).expect("Failed to create src dir");
        let out = temp_dir.path().join("out");
        fs::create_dir(&out).expect("Failed to create dest dir");

        let result = copy_file_with_metadata(&src_dir, &out.join("not-a-file"));

        assert!(matches!(result, Err(CopyError::Read { .. })));
        assert_eq!(fs::read_dir(&out).expect("Failed to list dest").count(), 0);
    }

    #[test]
    fn test_ensure_parent_dir_exists() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("subdir").join("file.txt");

        ensure_parent_dir_exists(&path).expect("Failed to create parent");

        assert!(path.parent().unwrap().exists());
    }
}

//! The seam between the worker pool and the external indexing system.
//!
//! `Indexer` is implemented by `CommandIndexer`, which shells out to a
//! configured program once per item, and by in-process fakes in tests.

use crate::config::IndexSettings;
use crate::error::IndexError;
use crate::model::IndexItem;
use std::process::{Command, Output};
use tracing::debug;

/// Something that can ingest one file into an index.
pub trait Indexer: Send + Sync {
    /// Pre-flight handshake, run once before any item is dispatched.
    fn authenticate(&self) -> Result<(), IndexError> {
        Ok(())
    }

    /// Index a single file. Blocking.
    fn index(&self, item: &IndexItem) -> Result<(), IndexError>;
}

/// Runs an external program per item.
///
/// Arguments are taken from a template in which `{file}`, `{index}` and
/// `{sourcetype}` are replaced with the item's fields.
#[derive(Debug, Clone)]
pub struct CommandIndexer {
    program: String,
    args: Vec<String>,
    auth_args: Option<Vec<String>>,
}

impl CommandIndexer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            auth_args: None,
        }
    }

    pub fn with_auth_args(mut self, auth_args: Vec<String>) -> Self {
        self.auth_args = Some(auth_args);
        self
    }

    pub fn from_settings(settings: &IndexSettings) -> Self {
        Self {
            program: settings.program.clone(),
            args: settings.args.clone(),
            auth_args: settings.auth_args.clone(),
        }
    }

    /// Arguments for `item`, with placeholders substituted.
    pub fn render_args(&self, item: &IndexItem) -> Vec<String> {
        let file = item.file_path.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{file}", &file)
                    .replace("{index}", &item.index)
                    .replace("{sourcetype}", &item.sourcetype)
            })
            .collect()
    }

    fn run(&self, args: &[String]) -> Result<(), IndexError> {
        debug!("Running {} {:?}", self.program, args);
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|e| IndexError::Launch {
                program: self.program.clone(),
                source: e,
            })?;
        self.check(output)
    }

    fn check(&self, output: Output) -> Result<(), IndexError> {
        if output.status.success() {
            return Ok(());
        }
        Err(IndexError::CommandFailed {
            program: self.program.clone(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

impl Indexer for CommandIndexer {
    fn authenticate(&self) -> Result<(), IndexError> {
        match &self.auth_args {
            Some(args) => self.run(args),
            None => Ok(()),
        }
    }

    fn index(&self, item: &IndexItem) -> Result<(), IndexError> {
        self.run(&self.render_args(item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn item() -> IndexItem {
        IndexItem {
            file_path: PathBuf::from("/var/log/app.log"),
            index: "main".to_string(),
            sourcetype: "syslog".to_string(),
        }
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_render_args_substitutes_placeholders() {
        let indexer = CommandIndexer::new(
            "splunk",
            strings(&[
                "add",
                "oneshot",
                "{file}",
                "-index",
                "{index}",
                "-sourcetype",
                "{sourcetype}",
            ]),
        );
        assert_eq!(
            indexer.render_args(&item()),
            strings(&[
                "add",
                "oneshot",
                "/var/log/app.log",
                "-index",
                "main",
                "-sourcetype",
                "syslog",
            ])
        );
    }

    #[test]
    fn test_missing_program_is_launch_error() {
        let indexer = CommandIndexer::new("/nonexistent/batchgate-indexer", Vec::new());
        assert!(matches!(
            indexer.index(&item()),
            Err(IndexError::Launch { .. })
        ));
    }

    #[test]
    fn test_no_auth_args_skips_handshake() {
        let indexer = CommandIndexer::new("/nonexistent/batchgate-indexer", Vec::new());
        assert!(indexer.authenticate().is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_status_decides_outcome() {
        let ok = CommandIndexer::new("sh", strings(&["-c", "test -n '{file}'"]));
        assert!(ok.index(&item()).is_ok());

        let failing = CommandIndexer::new("sh", strings(&["-c", "echo denied >&2; exit 3"]));
        match failing.index(&item()) {
            Err(IndexError::CommandFailed { stderr, .. }) => assert_eq!(stderr, "denied"),
            other => panic!("expected CommandFailed, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_handshake_is_reported() {
        let indexer =
            CommandIndexer::new("sh", Vec::new()).with_auth_args(strings(&["-c", "exit 1"]));
        assert!(indexer.authenticate().is_err());
    }
}

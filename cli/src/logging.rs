//! Log file setup.
//!
//! Engine and CLI events go to a size-rotated file named in the settings.
//! The terminal only gets the progress line and the one-line summaries.

use anyhow::{anyhow, Context, Result};
use batchgate_engine::Settings;
use rolling_file::{BasicRollingFileAppender, RollingConditionBasic};
use std::fs;
use std::sync::Mutex;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
pub fn setup_logging(settings: &Settings, verbose: bool) -> Result<()> {
    if let Some(parent) = settings.log_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create log directory {}", parent.display())
            })?;
        }
    }

    let appender = BasicRollingFileAppender::new(
        &settings.log_path,
        RollingConditionBasic::new().max_size(settings.log_rotation_bytes),
        settings.log_rotation_limit,
    )
    .with_context(|| format!("Failed to open log file {}", settings.log_path.display()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("batchgate=debug,warn")
        } else {
            EnvFilter::new("batchgate=info,warn")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(appender))
        .with_ansi(false)
        .with_target(false)
        .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()))
        .try_init()
        .map_err(|e| anyhow!("Failed to install log subscriber: {}", e))?;

    Ok(())
}

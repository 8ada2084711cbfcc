//! Tracing setup: a daily rolling log file, plus stderr output when asked for.
//!
//! The filter comes from `SEEKPREVIEW_LOG` (falling back to `RUST_LOG`, then `info`).

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::constants::constants;

fn env_filter() -> EnvFilter {
  EnvFilter::try_from_env("SEEKPREVIEW_LOG")
    .or_else(|_| EnvFilter::try_from_default_env())
    .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Keep the returned guard alive until exit so buffered
/// lines get flushed.
pub fn init(log_dir: &Path, verbose: bool) -> Result<WorkerGuard> {
  std::fs::create_dir_all(log_dir).with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

  let appender = RollingFileAppender::new(Rotation::DAILY, log_dir, &constants().log_file_prefix);
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let file_layer = fmt::layer().with_writer(writer).with_ansi(false).with_target(true);
  let stderr_layer = verbose.then(|| fmt::layer().with_writer(std::io::stderr).with_target(false));

  tracing_subscriber::registry()
    .with(env_filter())
    .with(file_layer)
    .with(stderr_layer)
    .try_init()
    .context("Logging was already initialized")?;

  Ok(guard)
}

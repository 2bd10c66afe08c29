//! Logging setup for filedepot.
//!
//! `RUST_LOG` wins over the configured level. Without it, the service and
//! HTTP tracing run at the configured level and sqlx is kept at `warn`.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::Result;

fn level_of(name: &str) -> Level {
    name.trim().parse().unwrap_or(Level::INFO)
}

/// Build the event filter for a configured level name.
fn build_filter(level: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let level = level_of(level).as_str().to_lowercase();
    EnvFilter::new(format!(
        "{level},filedepot={level},tower_http={level},sqlx=warn"
    ))
}

/// Open (or create) the log file in append mode, creating its directory.
fn open_log_file(path: &str) -> Result<std::fs::File> {
    if let Some(dir) = Path::new(path).parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// Initialize logging from configuration.
///
/// Events go to stdout and, when `file` is set, are appended to that file
/// as well.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let Some(path) = config.file.as_deref() else {
        init_console_only(&config.level);
        return Ok(());
    };

    let log_file = Arc::new(open_log_file(path)?);

    tracing_subscriber::registry()
        .with(build_filter(&config.level))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout.and(log_file))
                .with_ansi(false)
                .with_target(true),
        )
        .init();

    Ok(())
}

/// Stdout-only logging, used when the configured file cannot be opened.
pub fn init_console_only(level: &str) {
    tracing_subscriber::registry()
        .with(build_filter(level))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

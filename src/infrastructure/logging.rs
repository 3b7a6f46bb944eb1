//! Logging system configuration and initialization
//!
//! This module provides the logging setup with:
//! - File logging through a non-blocking appender
//! - Configuration file based log level control, `RUST_LOG` override
//! - Structured JSON logging (optional)
//! - Rotation of the previous run's log file and pruning of old files

#![allow(clippy::uninlined_format_args)]

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use chrono::Utc;
use once_cell::sync::Lazy;
use tracing::subscriber::DefaultGuard;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingConfig;

pub const LOG_FILE_NAME: &str = "studbook-scraper.log";

// Keeps the log file writer alive for the lifetime of the process
static LOG_GUARDS: Lazy<Mutex<Vec<WorkerGuard>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// UTC timestamps with millisecond precision
struct UtcTimeFormatter;

impl FormatTime for UtcTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Utc::now().format("%Y-%m-%d %H:%M:%S%.3fZ"))
    }
}

/// Console subscriber for the current thread while the configuration that
/// drives `init_logging_with_config` is still being loaded. Drop the guard
/// before installing the configured subscriber.
#[must_use]
pub fn bootstrap_console_logging() -> DefaultGuard {
    let subscriber = fmt::Subscriber::builder()
        .with_timer(UtcTimeFormatter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_default(subscriber)
}

/// Rename the previous run's log file with its modification timestamp
fn rotate_existing_log_file(log_dir: &Path) -> Result<()> {
    let log_file_path = log_dir.join(LOG_FILE_NAME);
    if !log_file_path.exists() {
        return Ok(());
    }

    let metadata = std::fs::metadata(&log_file_path).map_err(|e| anyhow!("Failed to get log file metadata: {}", e))?;
    let file_time = metadata.modified().unwrap_or_else(|_| std::time::SystemTime::now());
    let datetime: chrono::DateTime<Utc> = file_time.into();

    let file_stem = LOG_FILE_NAME.trim_end_matches(".log");
    let timestamped_name = format!("{}.{}.log", file_stem, datetime.format("%Y%m%dT%H%M%S"));
    let timestamped_path = log_dir.join(&timestamped_name);

    std::fs::rename(&log_file_path, &timestamped_path).map_err(|e| {
        anyhow!(
            "Failed to rotate log file {} to {}: {}",
            log_file_path.display(),
            timestamped_path.display(),
            e
        )
    })?;
    Ok(())
}

/// Delete the oldest `.log` files beyond `max_files`
fn cleanup_old_logs(log_dir: &Path, max_files: usize) -> Result<usize> {
    if !log_dir.exists() {
        return Ok(0);
    }

    let mut log_files = Vec::new();
    for entry in std::fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_log = path.is_file() && path.extension().is_some_and(|ext| ext == "log");
        if !is_log {
            continue;
        }
        if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
            log_files.push((path, modified));
        }
    }

    // newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    let mut removed = 0;
    for (path, _) in log_files.iter().skip(max_files) {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Failed to remove old log file {:?}: {}", path, e);
        } else {
            removed += 1;
        }
    }
    Ok(removed)
}

/// Application level plus dependency noise suppression
///
/// Unless the level is `trace`, SQL, HTTP and HTML tokenizer internals are
/// capped. `RUST_LOG` replaces the whole filter when set:
/// ```bash
/// RUST_LOG="debug,sqlx::query=debug" studbook-scraper 1 100
/// ```
fn build_env_filter(level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut filter = EnvFilter::try_new(level)?;
    if !level.to_lowercase().contains("trace") {
        for directive in [
            "sqlx::query=warn",
            "sqlx::sqlite=warn",
            "reqwest=info",
            "hyper=warn",
            "hyper_util=warn",
            "h2=warn",
            "html5ever=warn",
            "selectors=warn",
            "tokio=info",
        ] {
            filter = filter.add_directive(directive.parse()?);
        }
        filter = filter.add_directive(format!("studbook_scraper_lib={}", level).parse()?);
    }
    Ok(filter)
}

/// Initialize logging with custom configuration
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    let env_filter = build_env_filter(&config.level)?;
    let registry = Registry::default().with(env_filter);

    let file_writer = if config.file_output {
        std::fs::create_dir_all(&config.log_dir)
            .map_err(|e| anyhow!("Failed to create log directory {:?}: {}", config.log_dir, e))?;
        rotate_existing_log_file(&config.log_dir)?;
        cleanup_old_logs(&config.log_dir, config.max_files)?;

        let file_appender = rolling::never(&config.log_dir, LOG_FILE_NAME);
        let (file_writer, file_guard) = non_blocking(file_appender);
        LOG_GUARDS
            .lock()
            .map_err(|_| anyhow!("Log guard registry poisoned"))?
            .push(file_guard);
        Some(file_writer)
    } else {
        None
    };

    let result = match (file_writer, config.console_output, config.json_format) {
        (Some(file_writer), console, true) => {
            let file_layer = fmt::Layer::new()
                .json()
                .with_writer(file_writer)
                .with_timer(UtcTimeFormatter)
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false);
            let console_layer = console.then(|| {
                fmt::Layer::new()
                    .with_writer(std::io::stdout)
                    .with_timer(UtcTimeFormatter)
                    .with_target(false)
            });
            registry.with(file_layer).with(console_layer).try_init()
        }
        (Some(file_writer), console, false) => {
            let file_layer = fmt::Layer::new()
                .with_writer(file_writer)
                .with_timer(UtcTimeFormatter)
                .with_target(false)
                .with_ansi(false);
            let console_layer = console.then(|| {
                fmt::Layer::new()
                    .with_writer(std::io::stdout)
                    .with_timer(UtcTimeFormatter)
                    .with_target(false)
            });
            registry.with(file_layer).with(console_layer).try_init()
        }
        (None, true, _) => {
            let console_layer = fmt::Layer::new()
                .with_writer(std::io::stdout)
                .with_timer(UtcTimeFormatter)
                .with_target(false);
            registry.with(console_layer).try_init()
        }
        (None, false, _) => return Err(anyhow!("No logging output configured")),
    };
    result.map_err(|e| anyhow!("Failed to install global subscriber: {}", e))?;

    info!(
        level = %config.level,
        json = config.json_format,
        file = config.file_output,
        console = config.console_output,
        log_dir = ?config.log_dir,
        "Logging system initialized"
    );
    Ok(())
}

/// Log system information for diagnostics
pub fn log_system_info() {
    info!("=== Studbook Scraper ===");
    info!("Application version: {}", env!("CARGO_PKG_VERSION"));
    info!("Operating system: {}", std::env::consts::OS);
    if let Ok(current_dir) = std::env::current_dir() {
        info!("Working directory: {:?}", current_dir);
    }
}

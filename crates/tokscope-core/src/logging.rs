//! Logging infrastructure for tokscope.
//!
//! Structured logging uses the `tracing` ecosystem. Library crates only emit
//! events; the binary calls [`init_logging`] once at startup.
//!
//! ## Features
//!
//! - JSON lines written to `~/.tokscope/logs/tokscope.log` (rotated daily)
//! - Compact console output on stderr
//! - `--verbose` raises the tokscope crates to DEBUG
//! - `RUST_LOG` overrides the default filter entirely
//!
//! ## Example
//!
//! ```no_run
//! use tokscope_core::logging;
//!
//! let _guard = logging::init_logging(None, false).expect("logging init");
//!
//! tracing::info!("tokscope started");
//! tracing::debug!(tool = "codex", files = 12, "scanned source");
//! ```

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::error::{Result, TokscopeError};

/// Crate targets that receive the default level; everything else stays at WARN.
const TOKSCOPE_TARGETS: &[&str] = &[
    "tokscope",
    "tokscope_core",
    "tokscope_config",
    "tokscope_cost",
    "tokscope_ingest",
    "tokscope_analysis",
];

/// Guard that must be held to ensure log flushing on shutdown.
///
/// Keep this guard alive for the lifetime of the application.
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize the tokscope logging system.
///
/// This sets up:
/// - File logging to `<log_dir>/tokscope.log` (JSON lines format)
/// - Console logging to stderr (human-readable format)
///
/// # Arguments
///
/// * `log_dir` - Optional custom log directory. Defaults to `~/.tokscope/logs/`
/// * `verbose` - If true, sets the tokscope crates to DEBUG. Otherwise INFO.
pub fn init_logging(log_dir: Option<PathBuf>, verbose: bool) -> Result<LogGuard> {
    let log_dir = match log_dir {
        Some(dir) => dir,
        None => default_log_dir()?,
    };

    std::fs::create_dir_all(&log_dir).map_err(|e| TokscopeError::DirectoryCreation {
        path: log_dir.clone(),
        source: e,
    })?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "tokscope.log");
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(default_level)));

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .json()
        .with_span_events(FmtSpan::CLOSE)
        .with_current_span(true)
        .with_span_list(true);

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(verbose)
        .with_line_number(verbose)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    tracing::debug!(log_dir = %log_dir.display(), verbose, "logging initialized");

    Ok(LogGuard {
        _file_guard: Some(file_guard),
    })
}

/// Initialize minimal console-only logging for testing.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

/// Build the default filter directive string for a level.
fn default_filter(level: &str) -> String {
    let mut directive = String::from("warn");
    for target in TOKSCOPE_TARGETS {
        directive.push_str(&format!(",{target}={level}"));
    }
    directive
}

/// Get the tokscope state directory.
///
/// Returns `~/.tokscope/`
pub fn default_state_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").map_err(|_| TokscopeError::Internal {
        message: "HOME environment variable not set".into(),
    })?;

    Ok(PathBuf::from(home).join(".tokscope"))
}

/// Get the default log directory path.
///
/// Returns `~/.tokscope/logs/`
pub fn default_log_dir() -> Result<PathBuf> {
    Ok(default_state_dir()?.join("logs"))
}

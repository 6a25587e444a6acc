//! Structured logging setup (console + optional rolling file).
//!
//! Embedding applications call `init_logging` once at startup and keep the
//! returned guard alive; dropping it flushes the file writer.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Maximum number of log files to retain.
pub const MAX_LOG_FILES: usize = 10;

const LOG_FILE_PREFIX: &str = "integrations";

const DEFAULT_FILTER: &str = "info,truongphat_integrations=debug";

#[derive(Debug, Clone)]
pub struct LogSettings {
    /// `None` logs to the console only.
    pub log_dir: Option<PathBuf>,
    pub keep_files: usize,
    /// JSON lines instead of human-readable output in the file layer.
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            log_dir: Some(default_log_dir()),
            keep_files: MAX_LOG_FILES,
            json: false,
        }
    }
}

/// Platform data directory + `truongphat/logs`.
pub fn default_log_dir() -> PathBuf {
    let base = std::env::var("LOCALAPPDATA")
        .or_else(|_| std::env::var("XDG_DATA_HOME"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            #[cfg(target_os = "windows")]
            {
                PathBuf::from(std::env::var("USERPROFILE").unwrap_or_else(|_| ".".into()))
                    .join("AppData")
                    .join("Local")
            }
            #[cfg(not(target_os = "windows"))]
            {
                PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()))
                    .join(".local")
                    .join("share")
            }
        });
    base.join("truongphat").join("logs")
}

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
///
/// Returns the file writer guard when a log directory is configured and
/// usable; otherwise logging stays console-only. Calling this twice is
/// harmless; the second call leaves the first subscriber in place.
pub fn init_logging(settings: &LogSettings) -> Option<WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let console_layer = fmt::layer().with_target(true);

    let prepared = settings
        .log_dir
        .as_deref()
        .map(|dir| prepare_log_dir(dir, settings.keep_files).map(|_| dir));

    let log_dir = match prepared {
        Some(Ok(dir)) => dir,
        unusable => {
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .try_init();
            if let (Some(Err(e)), Some(dir)) = (unusable, settings.log_dir.as_deref()) {
                tracing::warn!(path = %dir.display(), error = %e, "log directory unusable, logging to console only");
            }
            return None;
        }
    };

    // Daily rolling file: integrations.YYYY-MM-DD
    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);
    let installed = if settings.json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(non_blocking)
                    .with_target(true),
            )
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .with_target(true),
            )
            .try_init()
    };

    installed.ok().map(|_| guard)
}

/// Prune old files and make sure the directory exists.
fn prepare_log_dir(log_dir: &Path, keep: usize) -> io::Result<()> {
    prune_old_logs(log_dir, keep);
    fs::create_dir_all(log_dir)
}

/// Rolling files are named `integrations.YYYY-MM-DD`.
fn is_log_file_name(name: &str) -> bool {
    name.strip_prefix(LOG_FILE_PREFIX)
        .is_some_and(|rest| rest.starts_with('.'))
}

/// Delete all but the newest `keep` log files in `log_dir`.
pub fn prune_old_logs(log_dir: &Path, keep: usize) {
    if !log_dir.exists() {
        return;
    }

    let mut log_files: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();
    if let Ok(entries) = fs::read_dir(log_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let is_log = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(is_log_file_name);
            if is_log {
                let modified = entry
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .unwrap_or(std::time::UNIX_EPOCH);
                log_files.push((path, modified));
            }
        }
    }

    // Sort newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    for (path, _) in log_files.into_iter().skip(keep) {
        if let Err(e) = fs::remove_file(&path) {
            tracing::warn!(path = %path.display(), error = %e, "failed to prune log file");
        }
    }
}

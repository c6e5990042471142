//! Structured logging: console plus a daily rolling file.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Maximum number of log files to keep.
pub const MAX_LOG_FILES: usize = 10;

const LOG_FILE_PREFIX: &str = "backoffice";
const APP_DIR: &str = "com.thesmall.backoffice";
const DEFAULT_FILTER: &str = "info,pos_backoffice=debug";

/// Flushes buffered file output when dropped. Hold it for the life of the
/// process.
pub struct LogGuard {
    _worker: WorkerGuard,
}

/// Per-user log directory.
pub fn log_dir() -> PathBuf {
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
    base.join(APP_DIR).join("logs")
}

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
///
/// Fails if a global subscriber is already installed.
pub fn init(log_dir: &Path) -> crate::Result<LogGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    prune_old_logs(log_dir);
    fs::create_dir_all(log_dir)
        .map_err(|e| crate::Error::Config(format!("failed to create log dir: {e}")))?;

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (non_blocking, worker) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer().with_target(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| crate::Error::Config(format!("logging already initialised: {e}")))?;

    info!("Starting back office v{}", env!("CARGO_PKG_VERSION"));
    Ok(LogGuard { _worker: worker })
}

/// Delete all but the newest `MAX_LOG_FILES` log files in `dir`.
pub fn prune_old_logs(dir: &Path) {
    if !dir.exists() {
        return;
    }

    let mut log_files: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let is_log = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| name.starts_with(&format!("{LOG_FILE_PREFIX}.")));
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

    // Newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    for (path, _) in log_files.iter().skip(MAX_LOG_FILES) {
        if let Err(e) = fs::remove_file(path) {
            warn!("Failed to prune log file {}: {e}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    #[test]
    fn test_log_dir_is_stable() {
        let d1 = log_dir();
        let d2 = log_dir();
        assert_eq!(d1, d2);
        assert!(d1.ends_with(Path::new(APP_DIR).join("logs")));
    }

    #[test]
    fn test_prune_keeps_newest_log_files() {
        let dir = std::env::temp_dir().join(format!("backoffice_logs_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();

        let base = SystemTime::now() - Duration::from_secs(3600);
        for i in 0..(MAX_LOG_FILES + 3) {
            let path = dir.join(format!("{LOG_FILE_PREFIX}.2026-01-{:02}", i + 1));
            fs::write(&path, b"line\n").unwrap();
            let file = fs::File::options().write(true).open(&path).unwrap();
            file.set_modified(base + Duration::from_secs(i as u64 * 60)).unwrap();
        }
        fs::write(dir.join("notes.txt"), b"keep").unwrap();

        prune_old_logs(&dir);

        let mut remaining: Vec<String> = fs::read_dir(&dir)
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        remaining.sort();
        assert_eq!(remaining.len(), MAX_LOG_FILES + 1);
        assert!(remaining.contains(&"notes.txt".to_string()));
        // The three oldest went.
        for day in 1..=3 {
            assert!(!remaining.contains(&format!("{LOG_FILE_PREFIX}.2026-01-{day:02}")));
        }

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_prune_missing_dir_is_noop() {
        let dir = std::env::temp_dir().join(format!("backoffice_absent_{}", uuid::Uuid::new_v4()));
        prune_old_logs(&dir);
        assert!(!dir.exists());
    }
}

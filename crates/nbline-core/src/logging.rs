use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use nbline_config::LogSettings;
use tracing_appender::rolling;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const LOG_FILE_PREFIX: &str = "nbline.log";
const SECS_PER_DAY: u64 = 86_400;

/// Return the log directory, or `None` when file logging is disabled.
///
/// Precedence: `NBLINE_LOG_DIR` env var > `log.dir` from the config file.
pub fn log_dir(settings: &LogSettings) -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os("NBLINE_LOG_DIR") {
        return Some(PathBuf::from(dir));
    }
    settings.dir.clone()
}

/// Remove nbline log files older than `max_age_days` from the given directory.
///
/// Only deletes files whose name starts with `nbline.log` (the prefix used by
/// the daily rolling appender) so a shared log directory is left alone.
/// Nothing is removed when the cutoff falls outside the representable range.
fn cleanup_old_logs(log_path: &Path, max_age_days: u64) {
    let Some(cutoff) = retention_cutoff(SystemTime::now(), max_age_days) else {
        return;
    };
    if let Ok(entries) = std::fs::read_dir(log_path) {
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with(LOG_FILE_PREFIX) {
                continue;
            }
            if let Ok(meta) = entry.metadata() {
                if let Ok(modified) = meta.modified() {
                    if modified < cutoff {
                        let _ = std::fs::remove_file(entry.path());
                    }
                }
            }
        }
    }
}

fn retention_cutoff(now: SystemTime, max_age_days: u64) -> Option<SystemTime> {
    let secs = max_age_days.checked_mul(SECS_PER_DAY)?;
    now.checked_sub(Duration::from_secs(secs))
}

fn env_filter(settings: &LogSettings) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_env("NBLINE_LOG") {
        return Ok(filter);
    }
    if let Ok(filter) = EnvFilter::try_from_env("RUST_LOG") {
        return Ok(filter);
    }
    EnvFilter::try_new(&settings.filter)
        .with_context(|| format!("invalid log.filter directive: {}", settings.filter))
}

/// Initialize the logging subsystem.
///
/// Filter controlled by `NBLINE_LOG` or `RUST_LOG` (default: `log.filter`).
/// Events go to stderr since stdout carries program output. When `log_dir()`
/// yields a path, a daily rotated file is written there as well and files
/// older than `log.retention_days` are removed.
pub fn init(settings: &LogSettings) -> Result<()> {
    let filter = env_filter(settings)?;

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    let file_layer = match log_dir(settings) {
        Some(log_path) => {
            if let Err(e) = std::fs::create_dir_all(&log_path) {
                eprintln!(
                    "warning: failed to create log directory {:?}: {}",
                    log_path, e
                );
            }
            cleanup_old_logs(&log_path, settings.retention_days);

            let file_appender = rolling::daily(&log_path, LOG_FILE_PREFIX);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(file_appender)
                    .with_ansi(false)
                    .with_target(true)
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    // Serialize env-mutating tests to avoid data races.
    static ENV_LOCK: StdMutex<()> = StdMutex::new(());

    #[test]
    fn log_dir_respects_env_override() {
        let _guard = ENV_LOCK.lock().unwrap();
        let original = std::env::var("NBLINE_LOG_DIR").ok();

        std::env::set_var("NBLINE_LOG_DIR", "/tmp/nbline-test-logs");
        let settings = LogSettings {
            dir: Some(PathBuf::from("/ignored")),
            ..LogSettings::default()
        };
        assert_eq!(
            log_dir(&settings),
            Some(PathBuf::from("/tmp/nbline-test-logs"))
        );

        match original {
            Some(v) => std::env::set_var("NBLINE_LOG_DIR", v),
            None => std::env::remove_var("NBLINE_LOG_DIR"),
        }
    }

    #[test]
    fn log_dir_falls_back_to_settings() {
        let _guard = ENV_LOCK.lock().unwrap();
        let original = std::env::var("NBLINE_LOG_DIR").ok();

        std::env::remove_var("NBLINE_LOG_DIR");
        assert_eq!(log_dir(&LogSettings::default()), None);

        let settings = LogSettings {
            dir: Some(PathBuf::from("/var/log/nbline")),
            ..LogSettings::default()
        };
        assert_eq!(log_dir(&settings), Some(PathBuf::from("/var/log/nbline")));

        if let Some(v) = original {
            std::env::set_var("NBLINE_LOG_DIR", v);
        }
    }

    #[test]
    fn invalid_filter_directive_is_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        let saved: Vec<_> = ["NBLINE_LOG", "RUST_LOG"]
            .iter()
            .map(|key| (*key, std::env::var(key).ok()))
            .collect();
        for (key, _) in &saved {
            std::env::remove_var(key);
        }

        let settings = LogSettings {
            filter: "nbline=notalevel".into(),
            ..LogSettings::default()
        };
        let err = env_filter(&settings).unwrap_err().to_string();
        assert!(err.contains("invalid log.filter directive"));
        assert!(env_filter(&LogSettings::default()).is_ok());

        for (key, value) in saved {
            if let Some(v) = value {
                std::env::set_var(key, v);
            }
        }
    }

    #[test]
    fn cleanup_old_logs_removes_stale_files() {
        let tmp = tempfile::tempdir().unwrap();

        let log_a = tmp.path().join("nbline.log.2025-01-01");
        let log_b = tmp.path().join("nbline.log.2025-01-02");
        let other = tmp.path().join("other.txt");
        std::fs::write(&log_a, "a").unwrap();
        std::fs::write(&log_b, "b").unwrap();
        std::fs::write(&other, "c").unwrap();

        // max_age_days=0 means cutoff is "now", so all matching files get cleaned
        cleanup_old_logs(tmp.path(), 0);
        assert!(!log_a.exists(), "nbline log file should be deleted");
        assert!(!log_b.exists(), "nbline log file should be deleted");
        assert!(other.exists(), "unrelated file should be preserved");
    }

    #[test]
    fn retention_cutoff_handles_out_of_range_ages() {
        let now = SystemTime::now();
        assert_eq!(
            retention_cutoff(now, 1),
            now.checked_sub(Duration::from_secs(SECS_PER_DAY))
        );
        assert_eq!(retention_cutoff(now, u64::MAX), None);
        assert_eq!(retention_cutoff(now, u64::MAX / SECS_PER_DAY), None);
    }

    #[test]
    fn cleanup_with_overflowing_age_keeps_files() {
        let tmp = tempfile::tempdir().unwrap();
        let log = tmp.path().join("nbline.log.2025-01-01");
        std::fs::write(&log, "a").unwrap();

        cleanup_old_logs(tmp.path(), i64::MAX as u64);
        assert!(log.exists(), "unrepresentable cutoff must not delete anything");
    }
}

use std::path::PathBuf;
use std::sync::{Once, OnceLock};

use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Structured logging backed by `tracing`.
///
/// Installs the global subscriber once: stderr plus an optional daily-rotated
/// file under the data directory.

static INIT_LOGGING: Once = Once::new();
static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

fn resolve_log_dir(cfg: &LoggingConfig) -> PathBuf {
    cfg.dir.clone().unwrap_or_else(|| {
        dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("data-gpt")
            .join("logs")
    })
}

fn build_file_appender(cfg: &LoggingConfig) -> Option<(RollingFileAppender, PathBuf)> {
    let log_dir = resolve_log_dir(cfg);
    if let Err(err) = std::fs::create_dir_all(&log_dir) {
        eprintln!(
            "[data-gpt][WARN] Failed to create log directory {}: {}",
            log_dir.display(),
            err
        );
        return None;
    }

    Some((RollingFileAppender::new(Rotation::DAILY, &log_dir, "data-gpt.log"), log_dir))
}

pub fn init_logging(cfg: &LoggingConfig) {
    INIT_LOGGING.call_once(|| {
        let (file_layer, log_dir) = match cfg.file.then(|| build_file_appender(cfg)).flatten() {
            Some((appender, dir)) => {
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);
                let layer = fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_timer(UtcTime::rfc_3339())
                    .with_writer(non_blocking);
                LOG_GUARD.set(guard).ok();
                (Some(layer), Some(dir))
            }
            None => (None, None),
        };

        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&cfg.level))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let stderr_layer = fmt::layer()
            .with_target(true)
            .with_ansi(true)
            .with_timer(UtcTime::rfc_3339())
            .with_writer(std::io::stderr);

        let registry = tracing_subscriber::registry().with(filter).with(stderr_layer);
        if let Some(file_layer) = file_layer {
            registry.with(file_layer).init();
        } else {
            registry.init();
        }

        match log_dir {
            Some(dir) => info!("Logging initialized; daily log files under {}", dir.display()),
            None => warn!("Logging initialized without file sink (stderr only)"),
        }
    });
}

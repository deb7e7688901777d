//! Logging setup for the command line tool.
//!
//! Everything goes to stderr. A copy is kept in a daily rolling file so a
//! long migration can be inspected afterwards.

use anyhow::Result;
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the logging system.
///
/// The level comes from `CATALOG_BRIDGE_LOG` (default `info`). `verbose`
/// forces `debug`.
///
/// Log files go to `log_dir`, or `catalog-bridge/logs` below the local data
/// directory. If that directory cannot be created only stderr is used.
pub fn init(log_dir: Option<PathBuf>, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("CATALOG_BRIDGE_LOG").unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let log_dir = log_dir.unwrap_or_else(|| {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("catalog-bridge")
            .join("logs")
    });

    let file_layer = match std::fs::create_dir_all(&log_dir) {
        Ok(()) => {
            let file_appender = tracing_appender::rolling::daily(&log_dir, "catalog-bridge.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            // The guard flushes the file on drop, so it has to outlive main.
            static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
                std::sync::OnceLock::new();
            let _ = GUARD.set(guard);

            Some(fmt::layer().with_writer(non_blocking).with_ansi(false))
        }
        Err(e) => {
            eprintln!("Cannot create log directory {:?}: {}", log_dir, e);
            None
        }
    };
    let has_file = file_layer.is_some();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()?;

    if has_file {
        tracing::debug!("Logging to {:?}", log_dir);
    }
    Ok(())
}

//! Process-wide `tracing` subscriber setup.

use std::sync::OnceLock;

use gscx_shared::errors::{GscxError, GscxResult};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::runtime::layout::FilesystemLayout;

/// Keeps the file writer flushing for the lifetime of the process.
static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const LOG_FILE_PREFIX: &str = "gscx.log";

/// Install stderr + rolling file logging under `<home>/logs`.
///
/// Filter comes from `RUST_LOG` (default `info`). Calling this more than once,
/// or after the host application installed its own subscriber, is a no-op.
pub fn init_logging_for(layout: &FilesystemLayout) -> GscxResult<()> {
    if LOG_GUARD.get().is_some() {
        return Ok(());
    }

    let logs_dir = layout.logs_dir();
    std::fs::create_dir_all(&logs_dir).map_err(|e| {
        GscxError::Storage(format!(
            "Failed to create log directory {}: {}",
            logs_dir.display(),
            e
        ))
    })?;

    let file_appender = tracing_appender::rolling::daily(&logs_dir, LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .try_init();

    match result {
        Ok(()) => {
            let _ = LOG_GUARD.set(guard);
            tracing::debug!(logs_dir = %logs_dir.display(), "logging initialized");
        }
        Err(e) => {
            tracing::debug!("tracing subscriber already installed: {}", e);
        }
    }

    Ok(())
}

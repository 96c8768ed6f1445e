//! Console log sink.
//!
//! Two kinds of output leave the core:
//!
//! - `tracing` events for diagnostics (structured, filtered by `RUST_LOG`).
//! - Console lines: the human-readable boot log a front-end shows to the user.
//!   These go through a [`LogSink`], which is also what native modules write to
//!   through the host services table.
//!
//! A sink is invoked from the loader, the orchestrator, and native callback
//! trampolines, possibly on a different thread than the one that created it.

mod init;

pub use init::init_logging_for;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Severity of a console line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// One console line, as delivered to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub level: LogLevel,
    pub message: String,
}

/// Destination for console lines.
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);

    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}

pub type SharedLogSink = Arc<dyn LogSink>;

/// Default sink: forwards console lines to `tracing` under the
/// `gscx::console` target.
#[derive(Debug, Default, Clone)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: LogLevel, message: &str) {
        let message = message.trim_end();
        match level {
            LogLevel::Info => tracing::info!(target: "gscx::console", "{}", message),
            LogLevel::Warn => tracing::warn!(target: "gscx::console", "{}", message),
            LogLevel::Error => tracing::error!(target: "gscx::console", "{}", message),
        }
    }
}

/// Sink that hands lines to an observer over an unbounded channel.
///
/// Sending never blocks, so it is safe to call from inside a native module
/// callback. Lines are dropped once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: UnboundedSender<LogLine>,
}

impl ChannelSink {
    pub fn new() -> (Self, UnboundedReceiver<LogLine>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl LogSink for ChannelSink {
    fn log(&self, level: LogLevel, message: &str) {
        let _ = self.tx.send(LogLine {
            level,
            message: message.to_string(),
        });
    }
}

/// Sink backed by a closure.
pub struct FnSink<F>(pub F);

impl<F> LogSink for FnSink<F>
where
    F: Fn(LogLevel, &str) + Send + Sync,
{
    fn log(&self, level: LogLevel, message: &str) {
        (self.0)(level, message)
    }
}

/// Convenience constructor for the default sink.
pub fn tracing_sink() -> SharedLogSink {
    Arc::new(TracingSink)
}

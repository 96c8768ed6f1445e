//! Error taxonomy for the firmware boot core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used across the GSCX crates.
pub type GscxResult<T> = Result<T, GscxError>;

/// All failures surfaced by the boot core.
///
/// Component boundaries log a failure through the active sink before
/// returning one of these, so callers only need to decide what to do next.
#[derive(Debug, Error)]
pub enum GscxError {
    /// Malformed bundle container (bad magic, truncated header or table).
    #[error("bundle format error: {0}")]
    BundleFormat(String),

    /// A native module file could not be loaded.
    #[error("module load error: {0}")]
    ModuleLoad(String),

    /// A native initializer reported failure.
    #[error("initialization error: {0}")]
    Initialization(String),

    /// A named entry point is not exported by a module.
    #[error("entry point {symbol} not found in {module}")]
    EntryPoint { symbol: String, module: String },

    /// Virtual flash filesystem failure.
    #[error("flash error: {0}")]
    Flash(String),

    /// A boot stage precondition was not met; the sequence halted here.
    #[error("boot stage {stage} failed: {reason}")]
    BootStage { stage: String, reason: String },

    /// No ROS slot passed selection and verification, even after fallback.
    #[error("ROS validation error: {0}")]
    RosValidation(String),

    /// Recovery media provisioning failed.
    #[error("recovery error: {0}")]
    Recovery(String),

    /// Host storage failure outside the virtual flash (virtual HDD, staging).
    #[error("storage error: {0}")]
    Storage(String),

    /// Invalid configuration.
    #[error("config error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl GscxError {
    /// Stage name for boot failures, used by front-ends to point at the
    /// stage that halted the sequence.
    pub fn failed_stage(&self) -> Option<&str> {
        match self {
            GscxError::BootStage { stage, .. } => Some(stage),
            _ => None,
        }
    }
}

/// Coarse error category, stable across versions for front-end display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    BundleFormat,
    ModuleLoad,
    Initialization,
    EntryPoint,
    Flash,
    BootStage,
    RosValidation,
    Recovery,
    Storage,
    Config,
    Internal,
    Io,
}

impl From<&GscxError> for ErrorKind {
    fn from(err: &GscxError) -> Self {
        match err {
            GscxError::BundleFormat(_) => ErrorKind::BundleFormat,
            GscxError::ModuleLoad(_) => ErrorKind::ModuleLoad,
            GscxError::Initialization(_) => ErrorKind::Initialization,
            GscxError::EntryPoint { .. } => ErrorKind::EntryPoint,
            GscxError::Flash(_) => ErrorKind::Flash,
            GscxError::BootStage { .. } => ErrorKind::BootStage,
            GscxError::RosValidation(_) => ErrorKind::RosValidation,
            GscxError::Recovery(_) => ErrorKind::Recovery,
            GscxError::Storage(_) => ErrorKind::Storage,
            GscxError::Config(_) => ErrorKind::Config,
            GscxError::Internal(_) => ErrorKind::Internal,
            GscxError::Io(_) => ErrorKind::Io,
        }
    }
}

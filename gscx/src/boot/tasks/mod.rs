//! Boot pipeline tasks, one per stage.
//!
//! Each task pulls what it needs out of [`BootCtx`], calls a plain stage
//! function, and stores the stage output back into the context. The stage
//! functions are also what the orchestrator's single-stage operations call.

mod chain;
mod flash_mount;
mod hardware;
mod levels;
mod syscon;

pub(crate) use chain::{BootChainValidateTask, validate_boot_chain};
pub(crate) use flash_mount::{FlashMountTask, mount_flash};
pub(crate) use hardware::{HardwareDetectTask, detect_hardware};
pub(crate) use levels::{Lv0Task, Lv1Task, Lv2Task, boot_lv0, boot_lv1, boot_lv2};
pub(crate) use syscon::{SysconInitTask, initialize_syscon};

use gscx_shared::errors::{GscxError, GscxResult};

use super::types::BootStage;
use crate::logging::LogSink;
use crate::module::ModuleLoader;

fn task_start(stage: BootStage) {
    tracing::debug!(stage = %stage, task = stage.task_name(), "Boot task starting");
}

fn log_task_error(stage: BootStage, err: &GscxError) {
    tracing::warn!(stage = %stage, "Boot task failed: {}", err);
}

/// A `bool (void)` stage entry exported by one module.
struct StageEntry {
    /// Log prefix, e.g. `LV0`.
    tag: &'static str,
    /// Human name of the module in log lines.
    label: &'static str,
    module: &'static str,
    symbol: &'static str,
}

/// Resolve and call a stage entry. Missing module, missing entry and a
/// `false` return are all failures, each logged before returning.
fn call_stage_entry(
    loader: &ModuleLoader,
    entry: &StageEntry,
    sink: &dyn LogSink,
) -> GscxResult<()> {
    let Some(record) = loader.find(entry.module) else {
        sink.error(&format!("[{}] {} module not loaded", entry.tag, entry.label));
        return Err(GscxError::ModuleLoad(format!("{} not loaded", entry.module)));
    };

    if !record.module().has_entry(entry.symbol) {
        sink.error(&format!(
            "[{}] Entry point not found in {} module",
            entry.tag,
            entry.label.to_ascii_lowercase()
        ));
        return Err(GscxError::EntryPoint {
            symbol: entry.symbol.to_string(),
            module: record.name().to_string(),
        });
    }

    let ok = record.module().call_bool(entry.symbol).inspect_err(|e| {
        sink.error(&format!("[{}] Error during initialization: {}", entry.tag, e));
    })?;
    if !ok {
        sink.error(&format!("[{}] Initialization failed", entry.tag));
        return Err(GscxError::Initialization(format!(
            "{} returned false",
            entry.symbol
        )));
    }
    Ok(())
}

//! Task: system controller initialization.

use super::{BootStage, StageEntry, call_stage_entry, log_task_error, task_start};
use crate::boot::types::BootCtx;
use crate::logging::LogSink;
use crate::module::{ModuleLoader, entry, names};
use crate::pipeline::PipelineTask;
use gscx_shared::errors::GscxResult;

const SYSCON: StageEntry = StageEntry {
    tag: "SYSCON",
    label: "SYSCON",
    module: names::SYSCON,
    symbol: entry::SYSCON_INITIALIZE,
};

pub struct SysconInitTask;

impl<'a> PipelineTask<BootCtx<'a>> for SysconInitTask {
    fn run(self: Box<Self>, ctx: &mut BootCtx<'a>) -> GscxResult<()> {
        task_start(BootStage::SysconInit);
        initialize_syscon(ctx.loader, ctx.sink.as_ref())
            .inspect_err(|e| log_task_error(BootStage::SysconInit, e))
    }

    fn name(&self) -> &str {
        BootStage::SysconInit.task_name()
    }
}

/// Bring up the system controller.
///
/// Without a SYSCON module a virtual controller is simulated and the stage
/// succeeds. A loaded module must export the entry and return `true`.
pub(crate) fn initialize_syscon(loader: &ModuleLoader, sink: &dyn LogSink) -> GscxResult<()> {
    sink.info("[SYSCON] Initializing System Controller...");

    if !loader.is_loaded(names::SYSCON) {
        sink.info("[SYSCON] Using virtual SYSCON simulation");
        sink.info("[SYSCON] Virtual power management active");
        sink.info("[SYSCON] Virtual temperature monitoring active");
        return Ok(());
    }

    call_stage_entry(loader, &SYSCON, sink)?;
    sink.info("[SYSCON] Power management initialized");
    sink.info("[SYSCON] Temperature monitoring active");
    sink.info("[SYSCON] Fan control enabled");
    sink.info("[SYSCON] System controller ready");
    Ok(())
}

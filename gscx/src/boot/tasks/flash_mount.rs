//! Task: virtual flash mount.

use super::{BootStage, log_task_error, task_start};
use crate::boot::types::BootCtx;
use crate::flash::VirtualFlashController;
use crate::logging::LogSink;
use crate::pipeline::PipelineTask;
use gscx_shared::errors::{GscxError, GscxResult};
use std::path::PathBuf;

pub struct FlashMountTask;

impl<'a> PipelineTask<BootCtx<'a>> for FlashMountTask {
    fn run(self: Box<Self>, ctx: &mut BootCtx<'a>) -> GscxResult<()> {
        task_start(BootStage::FlashMount);
        let path = mount_flash(ctx.flash, ctx.sink.as_ref())
            .inspect_err(|e| log_task_error(BootStage::FlashMount, e))?;
        ctx.flash_path = Some(path);
        Ok(())
    }

    fn name(&self) -> &str {
        BootStage::FlashMount.task_name()
    }
}

/// Initialize and mount the flash, returning its base path.
pub(crate) fn mount_flash(
    flash: &mut VirtualFlashController,
    sink: &dyn LogSink,
) -> GscxResult<PathBuf> {
    sink.info("[BOOT] Initializing virtual flash (NAND/NOR emulation)...");
    let path = flash.initialize()?.base_path().to_path_buf();

    if !flash.mount() {
        sink.error("[BOOT] Virtual flash mount failed");
        return Err(GscxError::Flash("virtual flash mount failed".into()));
    }

    sink.info(&format!("[BOOT] Virtual flash ready at {}", path.display()));
    Ok(path)
}

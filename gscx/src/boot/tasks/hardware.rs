//! Task: hardware detection.

use super::{BootStage, task_start};
use crate::boot::types::{BootCtx, HardwareSummary};
use crate::logging::LogSink;
use crate::pipeline::PipelineTask;
use gscx_shared::errors::GscxResult;

pub struct HardwareDetectTask;

impl<'a> PipelineTask<BootCtx<'a>> for HardwareDetectTask {
    fn run(self: Box<Self>, ctx: &mut BootCtx<'a>) -> GscxResult<()> {
        task_start(BootStage::HardwareDetect);
        ctx.hardware = Some(detect_hardware(ctx.sink.as_ref()));
        Ok(())
    }

    fn name(&self) -> &str {
        BootStage::HardwareDetect.task_name()
    }
}

/// Report the fixed console capabilities. Never fails.
pub(crate) fn detect_hardware(sink: &dyn LogSink) -> HardwareSummary {
    sink.info("[HW] Starting hardware detection...");
    let hw = HardwareSummary::ps3();
    sink.info(&format!("[HW] CPU: {}", hw.cpu.kind));
    sink.info(&format!("[HW] Memory: {} total", hw.memory.total));
    sink.info(&format!("[HW] GPU: {}", hw.gpu.kind));
    sink.info(&format!("[HW] Storage: {}", hw.storage.optical_drive));
    sink.info("[HW] Hardware detection completed");
    hw
}

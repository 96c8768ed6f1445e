//! Tasks: LV0 (bootloader), LV1 (hypervisor) and LV2 (Game OS).

use super::{BootStage, StageEntry, call_stage_entry, log_task_error, task_start};
use crate::boot::types::BootCtx;
use crate::logging::LogSink;
use crate::module::{ModuleLoader, entry, names};
use crate::pipeline::PipelineTask;
use gscx_shared::errors::{GscxError, GscxResult};

const LV0: StageEntry = StageEntry {
    tag: "LV0",
    label: "Bootloader",
    module: names::BOOTLOADER,
    symbol: entry::LV0,
};

const LV1: StageEntry = StageEntry {
    tag: "LV1",
    label: "Hypervisor",
    module: names::HYPERVISOR,
    symbol: entry::LV1,
};

pub struct Lv0Task;

impl<'a> PipelineTask<BootCtx<'a>> for Lv0Task {
    fn run(self: Box<Self>, ctx: &mut BootCtx<'a>) -> GscxResult<()> {
        task_start(BootStage::Lv0);
        boot_lv0(ctx.loader, ctx.sink.as_ref()).inspect_err(|e| log_task_error(BootStage::Lv0, e))
    }

    fn name(&self) -> &str {
        BootStage::Lv0.task_name()
    }
}

pub struct Lv1Task;

impl<'a> PipelineTask<BootCtx<'a>> for Lv1Task {
    fn run(self: Box<Self>, ctx: &mut BootCtx<'a>) -> GscxResult<()> {
        task_start(BootStage::Lv1);
        boot_lv1(ctx.loader, ctx.sink.as_ref()).inspect_err(|e| log_task_error(BootStage::Lv1, e))
    }

    fn name(&self) -> &str {
        BootStage::Lv1.task_name()
    }
}

pub struct Lv2Task;

impl<'a> PipelineTask<BootCtx<'a>> for Lv2Task {
    fn run(self: Box<Self>, ctx: &mut BootCtx<'a>) -> GscxResult<()> {
        task_start(BootStage::Lv2);
        boot_lv2(ctx.loader, ctx.sink.as_ref()).inspect_err(|e| log_task_error(BootStage::Lv2, e))
    }

    fn name(&self) -> &str {
        BootStage::Lv2.task_name()
    }
}

pub(crate) fn boot_lv0(loader: &ModuleLoader, sink: &dyn LogSink) -> GscxResult<()> {
    sink.info("[BOOTLOADER] Starting LV0 - Primary Kernel...");
    call_stage_entry(loader, &LV0, sink)?;
    sink.info("[LV0] Hardware initialization completed");
    sink.info("[LV0] Security validation passed");
    sink.info("[LV0] Memory setup completed");
    Ok(())
}

pub(crate) fn boot_lv1(loader: &ModuleLoader, sink: &dyn LogSink) -> GscxResult<()> {
    sink.info("[BOOTLOADER] Starting LV1 - Hypervisor...");
    call_stage_entry(loader, &LV1, sink)?;
    sink.info("[LV1] Hypervisor initialization completed");
    sink.info("[LV1] Virtual memory management active");
    sink.info("[LV1] System services initialized");
    Ok(())
}

/// Game OS has no native entry; it needs the CPU and GPU modules present.
pub(crate) fn boot_lv2(loader: &ModuleLoader, sink: &dyn LogSink) -> GscxResult<()> {
    sink.info("[BOOTLOADER] Starting LV2 - Game OS...");
    sink.info("[LV2] Game OS kernel loading...");
    sink.info("[LV2] Device drivers initialization...");
    sink.info("[LV2] User services startup...");

    let missing: Vec<&str> = [names::CPU_CELL, names::GPU_RSX]
        .into_iter()
        .filter(|name| !loader.is_loaded(name))
        .collect();
    if !missing.is_empty() {
        sink.error("[LV2] Missing required modules (CPU/GPU)");
        return Err(GscxError::ModuleLoad(format!(
            "required modules not loaded: {}",
            missing.join(", ")
        )));
    }

    sink.info("[LV2] All required modules loaded");
    sink.info("[LV2] System ready for game execution");
    Ok(())
}

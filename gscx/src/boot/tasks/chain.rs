//! Task: boot chain validation and ROS slot selection.

use super::{BootStage, log_task_error, task_start};
use crate::boot::types::BootCtx;
use crate::flash::{RosSlot, VirtualFlashController};
use crate::logging::LogSink;
use crate::pipeline::PipelineTask;
use gscx_shared::errors::{GscxError, GscxResult};

/// Named integrity assertions. All of them pass in the virtual console.
const CHECKLIST: &[(&str, bool)] = &[
    ("Boot ROM signature", true),
    ("LV0 integrity check", true),
    ("LV1 signature verification", true),
    ("LV2 authenticity check", true),
    ("Hardware authenticity", true),
    ("Anti-tampering detection", true),
];

pub struct BootChainValidateTask;

impl<'a> PipelineTask<BootCtx<'a>> for BootChainValidateTask {
    fn run(self: Box<Self>, ctx: &mut BootCtx<'a>) -> GscxResult<()> {
        task_start(BootStage::BootChainValidate);
        let slot = validate_boot_chain(ctx.flash, ctx.preferred_ros, ctx.sink.as_ref())
            .inspect_err(|e| log_task_error(BootStage::BootChainValidate, e))?;
        ctx.active_ros = Some(slot);
        Ok(())
    }

    fn name(&self) -> &str {
        BootStage::BootChainValidate.task_name()
    }
}

/// Run the checklist, then select and verify a ROS slot.
///
/// If the selected slot fails verification the other slot is tried once.
/// On failure the flash is left without an active slot.
pub(crate) fn validate_boot_chain(
    flash: &mut VirtualFlashController,
    preferred: Option<RosSlot>,
    sink: &dyn LogSink,
) -> GscxResult<RosSlot> {
    sink.info("[SEC] Starting boot chain validation...");

    let mut failed_checks = Vec::new();
    for (name, passed) in CHECKLIST {
        if *passed {
            sink.info(&format!("[SEC] {}: PASSED", name));
        } else {
            sink.error(&format!("[SEC] {}: FAILED", name));
            failed_checks.push(*name);
        }
    }

    let slot = select_verified_slot(flash, preferred, sink);

    match (slot, failed_checks.is_empty()) {
        (Ok(slot), true) => {
            sink.info("[SEC] Boot chain validation completed successfully");
            sink.info("[SEC] System integrity verified");
            Ok(slot)
        }
        (Ok(_), false) => {
            flash.clear_active_ros();
            sink.error("[SEC] Boot chain validation failed");
            Err(GscxError::BootStage {
                stage: BootStage::BootChainValidate.to_string(),
                reason: format!("checks failed: {}", failed_checks.join(", ")),
            })
        }
        (Err(e), _) => {
            flash.clear_active_ros();
            sink.error("[SEC] Boot chain validation failed");
            Err(e)
        }
    }
}

fn select_verified_slot(
    flash: &mut VirtualFlashController,
    preferred: Option<RosSlot>,
    sink: &dyn LogSink,
) -> GscxResult<RosSlot> {
    let Some(selected) = flash.select_ros_slot(preferred) else {
        sink.error("[SEC] No valid ROS slot available");
        return Err(GscxError::RosValidation("no valid ROS slot available".into()));
    };
    sink.info(&format!("[SEC] ROS slot selected: {}", selected));

    if flash.verify_active_slot() {
        sink.info("[SEC] LV0/Appldr verification: PASSED");
        return Ok(selected);
    }

    sink.warn("[SEC] LV0/Appldr verification failed for selected ROS");
    match flash.select_ros_slot(Some(selected.other())) {
        Some(alt) if flash.verify_active_slot() => {
            sink.info(&format!("[SEC] Fallback to {} succeeded", alt));
            Ok(alt)
        }
        _ => {
            sink.error("[SEC] Fallback ROS verification failed");
            Err(GscxError::RosValidation(format!(
                "{} failed verification and fallback to {} did not recover",
                selected,
                selected.other()
            )))
        }
    }
}

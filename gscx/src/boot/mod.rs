//! Boot chain orchestration.
//!
//! ## Architecture
//!
//! The boot chain is one fixed execution plan, run by the pipeline executor:
//!
//! ```text
//!   1. HardwareDetect       (static capability summary)
//!   2. SysconInit           (gscx_syscon, or virtual SYSCON)
//!   3. BootChainValidate    (checklist + ROS slot selection with fallback)
//!   4. FlashMount           (initialize + mount virtual flash)
//!   5. LV0                  (gscx_bootloader)
//!   6. LV1                  (gscx_hypervisor)
//!   7. LV2                  (gscx_cpu_cell + gscx_gpu_rsx loaded)
//! ```
//!
//! The first failing stage halts the run. No stage is retried.

mod tasks;
mod types;

pub use types::{
    BootCtx, BootReport, BootStage, ConnectivitySummary, CpuSummary, GpuSummary,
    HardwareSummary, MemorySummary, StageTiming, StorageSummary,
};

use chrono::Utc;
use gscx_shared::errors::{ErrorKind, GscxError, GscxResult};
use std::path::PathBuf;

use crate::flash::{RosSlot, VirtualFlashController};
use crate::logging::SharedLogSink;
use crate::module::ModuleLoader;
use crate::pipeline::{
    BoxedTask, ExecutionPlan, PipelineBuilder, PipelineExecutor, PipelineFailure, PipelineMetrics,
};
use tasks::{
    BootChainValidateTask, FlashMountTask, HardwareDetectTask, Lv0Task, Lv1Task, Lv2Task,
    SysconInitTask,
};

// ============================================================================
// EXECUTION PLAN
// ============================================================================

fn execution_plan<'a>() -> ExecutionPlan<BootCtx<'a>> {
    let tasks: Vec<BoxedTask<BootCtx<'a>>> = vec![
        Box::new(HardwareDetectTask),
        Box::new(SysconInitTask),
        Box::new(BootChainValidateTask),
        Box::new(FlashMountTask),
        Box::new(Lv0Task),
        Box::new(Lv1Task),
        Box::new(Lv2Task),
    ];
    ExecutionPlan::new(tasks)
}

fn stage_timings(metrics: &PipelineMetrics) -> Vec<StageTiming> {
    BootStage::ORDER
        .into_iter()
        .filter_map(|stage| {
            metrics
                .task_duration_ms(stage.task_name())
                .map(|duration_ms| StageTiming { stage, duration_ms })
        })
        .collect()
}

/// Sequences the boot stages against a module set and a virtual flash.
///
/// # Example
///
/// ```ignore
/// let mut orchestrator = BootChainOrchestrator::new(sink.clone());
/// let report = orchestrator.run_full_sequence(&loader, &mut flash)?;
/// println!("booted from {}", report.active_ros);
/// ```
pub struct BootChainOrchestrator {
    sink: SharedLogSink,
    preferred_ros: Option<RosSlot>,
}

impl BootChainOrchestrator {
    pub fn new(sink: SharedLogSink) -> Self {
        Self {
            sink,
            preferred_ros: None,
        }
    }

    /// Slot tried first during boot chain validation.
    pub fn with_preferred_ros(mut self, slot: Option<RosSlot>) -> Self {
        self.preferred_ros = slot;
        self
    }

    pub fn preferred_ros(&self) -> Option<RosSlot> {
        self.preferred_ros
    }

    /// Run all seven stages in order.
    ///
    /// Returns `GscxError::BootStage` naming the first stage that failed.
    pub fn run_full_sequence(
        &mut self,
        loader: &ModuleLoader,
        flash: &mut VirtualFlashController,
    ) -> GscxResult<BootReport> {
        let started_at = Utc::now();
        self.sink.info("[BOOT] Starting complete PS3 boot sequence...");

        let mut ctx = BootCtx::new(loader, flash, self.sink.clone(), self.preferred_ros);
        let pipeline = PipelineBuilder::from_plan(execution_plan());
        let metrics = PipelineExecutor::execute(pipeline, &mut ctx)
            .map_err(|failure| self.stage_failure(failure))?;

        let report = BootReport {
            started_at,
            total_duration_ms: metrics.total_duration_ms,
            stages: stage_timings(&metrics),
            hardware: ctx.hardware.take().ok_or_else(|| {
                GscxError::Internal("hardware_detect task must run first".into())
            })?,
            active_ros: ctx.active_ros.take().ok_or_else(|| {
                GscxError::Internal("boot_chain_validate task must run first".into())
            })?,
            flash_path: ctx.flash_path.take().ok_or_else(|| {
                GscxError::Internal("flash_mount task must run first".into())
            })?,
        };

        for timing in &report.stages {
            tracing::debug!(stage = %timing.stage, duration_ms = timing.duration_ms, "Boot stage timing");
        }
        tracing::info!(
            total_ms = report.total_duration_ms,
            ros = %report.active_ros,
            "Boot sequence completed"
        );
        self.sink
            .info("[BOOT] Complete boot sequence finished successfully");
        self.sink.info("[BOOT] PS3 system ready for operation");
        Ok(report)
    }

    fn stage_failure(&self, failure: PipelineFailure) -> GscxError {
        let stage = BootStage::from_task_name(&failure.task);
        let stage_name = stage
            .map(|s| s.to_string())
            .unwrap_or_else(|| failure.task.clone());

        let line = match stage {
            Some(BootStage::HardwareDetect) => "[BOOT] Hardware detection failed".to_string(),
            Some(BootStage::SysconInit) => "[BOOT] SYSCON initialization failed".to_string(),
            Some(BootStage::BootChainValidate) => "[BOOT] Boot chain validation failed".to_string(),
            Some(BootStage::FlashMount) => "[BOOT] Virtual flash mount failed".to_string(),
            _ => format!("[BOOT] {} stage failed", stage_name),
        };
        self.sink.error(&line);

        tracing::warn!(
            stage = %stage_name,
            kind = ?ErrorKind::from(&failure.error),
            completed = failure.metrics.tasks.len(),
            "Boot sequence halted"
        );

        match failure.error {
            // Already tagged with its stage.
            GscxError::BootStage { stage, reason } => GscxError::BootStage { stage, reason },
            other => GscxError::BootStage {
                stage: stage_name,
                reason: other.to_string(),
            },
        }
    }

    pub fn detect_hardware(&self) -> HardwareSummary {
        tasks::detect_hardware(self.sink.as_ref())
    }

    pub fn initialize_syscon(&self, loader: &ModuleLoader) -> GscxResult<()> {
        tasks::initialize_syscon(loader, self.sink.as_ref())
    }

    /// Checklist plus ROS selection, returning the verified slot.
    pub fn validate_boot_chain(&self, flash: &mut VirtualFlashController) -> GscxResult<RosSlot> {
        tasks::validate_boot_chain(flash, self.preferred_ros, self.sink.as_ref())
    }

    pub fn mount_flash(&self, flash: &mut VirtualFlashController) -> GscxResult<PathBuf> {
        tasks::mount_flash(flash, self.sink.as_ref())
    }

    pub fn boot_lv0(&self, loader: &ModuleLoader) -> GscxResult<()> {
        tasks::boot_lv0(loader, self.sink.as_ref())
    }

    pub fn boot_lv1(&self, loader: &ModuleLoader) -> GscxResult<()> {
        tasks::boot_lv1(loader, self.sink.as_ref())
    }

    pub fn boot_lv2(&self, loader: &ModuleLoader) -> GscxResult<()> {
        tasks::boot_lv2(loader, self.sink.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::testing::RecordingSink;
    use crate::module::fake::{CallLog, FakeOpener, FakeSpec, touch_modules};
    use crate::module::{entry, names};
    use crate::test_support::lock_global_state;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Rig {
        temp: TempDir,
        sink: Arc<RecordingSink>,
        loader: ModuleLoader,
        flash: VirtualFlashController,
        calls: CallLog,
    }

    fn full_console() -> Vec<(&'static str, FakeSpec)> {
        vec![
            (names::CPU_CELL, FakeSpec::standard()),
            (names::GPU_RSX, FakeSpec::standard()),
            (
                names::BOOTLOADER,
                FakeSpec::standard().with_bool(entry::LV0, true),
            ),
            (
                names::SYSCON,
                FakeSpec::standard().with_bool(entry::SYSCON_INITIALIZE, true),
            ),
            (
                names::HYPERVISOR,
                FakeSpec::standard().with_bool(entry::LV1, true),
            ),
        ]
    }

    fn rig(modules: Vec<(&'static str, FakeSpec)>) -> Rig {
        let temp = TempDir::new().unwrap();
        let module_dir = temp.path().join("build");
        let module_names: Vec<&str> = modules.iter().map(|(n, _)| *n).collect();
        touch_modules(&module_dir, &module_names);

        let mut opener = FakeOpener::new();
        for (name, spec) in modules {
            opener = opener.with(name, spec);
        }
        let calls = opener.calls();

        let sink = RecordingSink::new();
        let mut loader = ModuleLoader::with_opener(sink.clone(), Box::new(opener), None);
        loader.load_all(&[module_dir]);
        calls.lock().clear();

        let flash = VirtualFlashController::new(temp.path().join("vflash"), sink.clone());
        Rig {
            temp,
            sink,
            loader,
            flash,
            calls,
        }
    }

    fn replace(modules: &mut [(&'static str, FakeSpec)], name: &str, spec: FakeSpec) {
        for (n, s) in modules.iter_mut() {
            if *n == name {
                *s = spec.clone();
            }
        }
    }

    #[test]
    fn test_full_sequence_succeeds() {
        let _lock = lock_global_state();
        let mut rig = rig(full_console());
        let mut orchestrator = BootChainOrchestrator::new(rig.sink.clone());

        let report = orchestrator
            .run_full_sequence(&rig.loader, &mut rig.flash)
            .unwrap();

        let stages: Vec<BootStage> = report.stages.iter().map(|t| t.stage).collect();
        assert_eq!(stages, BootStage::ORDER);
        assert_eq!(report.active_ros, RosSlot::Ros0);
        assert_eq!(report.hardware, HardwareSummary::ps3());
        assert!(report.flash_path.starts_with(fs::canonicalize(rig.temp.path()).unwrap()));
        assert_eq!(
            rig.calls.lock().as_slice(),
            [
                "gscx_syscon:GSCX_SYSCON_Initialize".to_string(),
                "gscx_bootloader:GSCX_LV0_Entry".to_string(),
                "gscx_hypervisor:GSCX_LV1_Entry".to_string(),
            ]
        );
        assert!(rig.sink.contains("[BOOT] PS3 system ready for operation"));
    }

    #[test]
    fn test_lv0_false_halts_before_lv1() {
        let _lock = lock_global_state();
        let mut modules = full_console();
        replace(
            &mut modules,
            names::BOOTLOADER,
            FakeSpec::standard().with_bool(entry::LV0, false),
        );
        let mut rig = rig(modules);
        let mut orchestrator = BootChainOrchestrator::new(rig.sink.clone());

        let err = orchestrator
            .run_full_sequence(&rig.loader, &mut rig.flash)
            .unwrap_err();

        assert_eq!(err.failed_stage(), Some("LV0"));
        assert!(
            !rig.calls
                .lock()
                .iter()
                .any(|c| c.ends_with(entry::LV1))
        );
        assert!(rig.sink.contains("[LV0] Initialization failed"));
        assert!(rig.sink.contains("[BOOT] LV0 stage failed"));
        assert!(!rig.sink.contains("[LV2]"));
    }

    #[test]
    fn test_ros0_invalid_selects_ros1() {
        let _lock = lock_global_state();
        let mut rig = rig(full_console());
        let base = rig.flash.initialize().unwrap().base_path().to_path_buf();
        fs::write(base.join("ros0/lv0.self"), b"").unwrap();

        let mut orchestrator = BootChainOrchestrator::new(rig.sink.clone());
        let report = orchestrator
            .run_full_sequence(&rig.loader, &mut rig.flash)
            .unwrap();

        assert_eq!(report.active_ros, RosSlot::Ros1);
        assert_eq!(rig.flash.active_ros(), Some(RosSlot::Ros1));
        assert!(rig.sink.contains("[SEC] ROS slot selected: ROS1"));
    }

    #[test]
    fn test_verification_falls_back_to_other_slot() {
        let _lock = lock_global_state();
        let mut rig = rig(full_console());
        let base = rig.flash.initialize().unwrap().base_path().to_path_buf();
        // lv0 intact keeps ROS0 selectable, missing appldr fails verification
        fs::remove_file(base.join("ros0/appldr.self")).unwrap();

        let orchestrator = BootChainOrchestrator::new(rig.sink.clone());
        let slot = orchestrator.validate_boot_chain(&mut rig.flash).unwrap();

        assert_eq!(slot, RosSlot::Ros1);
        assert!(rig.sink.contains("LV0/Appldr verification failed for selected ROS"));
        assert!(rig.sink.contains("[SEC] Fallback to ROS1 succeeded"));
    }

    #[test]
    fn test_both_slots_invalid_fails_validation() {
        let _lock = lock_global_state();
        let mut rig = rig(full_console());
        let base = rig.flash.initialize().unwrap().base_path().to_path_buf();
        fs::write(base.join("ros0/lv0.self"), b"").unwrap();
        fs::remove_file(base.join("ros1/lv0.self")).unwrap();

        let mut orchestrator = BootChainOrchestrator::new(rig.sink.clone());
        let err = orchestrator
            .run_full_sequence(&rig.loader, &mut rig.flash)
            .unwrap_err();

        assert_eq!(err.failed_stage(), Some("BootChainValidate"));
        assert!(err.to_string().contains("no valid ROS slot"));
        assert_eq!(rig.flash.active_ros(), None);
        assert!(
            !rig.calls
                .lock()
                .iter()
                .any(|c| c.ends_with(entry::LV0))
        );
    }

    #[test]
    fn test_failed_fallback_clears_active_slot() {
        let _lock = lock_global_state();
        let mut rig = rig(full_console());
        let base = rig.flash.initialize().unwrap().base_path().to_path_buf();
        fs::write(base.join("ros0/appldr.self"), b"").unwrap();
        fs::write(base.join("ros1/appldr.self"), b"").unwrap();

        let orchestrator = BootChainOrchestrator::new(rig.sink.clone());
        let err = orchestrator.validate_boot_chain(&mut rig.flash).unwrap_err();

        assert!(matches!(err, GscxError::RosValidation(_)));
        assert_eq!(rig.flash.active_ros(), None);
        assert!(rig.sink.contains("[SEC] Fallback ROS verification failed"));
    }

    #[test]
    fn test_preferred_slot_is_tried_first() {
        let _lock = lock_global_state();
        let mut rig = rig(full_console());
        let orchestrator =
            BootChainOrchestrator::new(rig.sink.clone()).with_preferred_ros(Some(RosSlot::Ros1));

        assert_eq!(
            orchestrator.validate_boot_chain(&mut rig.flash).unwrap(),
            RosSlot::Ros1
        );
    }

    #[test]
    fn test_virtual_syscon_without_module() {
        let _lock = lock_global_state();
        let mut modules = full_console();
        modules.retain(|(n, _)| *n != names::SYSCON);
        let rig = rig(modules);

        let orchestrator = BootChainOrchestrator::new(rig.sink.clone());
        orchestrator.initialize_syscon(&rig.loader).unwrap();
        assert!(rig.sink.contains("[SYSCON] Using virtual SYSCON simulation"));
    }

    #[test]
    fn test_syscon_without_entry_fails() {
        let _lock = lock_global_state();
        let mut modules = full_console();
        replace(&mut modules, names::SYSCON, FakeSpec::standard());
        let mut rig = rig(modules);

        let mut orchestrator = BootChainOrchestrator::new(rig.sink.clone());
        let err = orchestrator
            .run_full_sequence(&rig.loader, &mut rig.flash)
            .unwrap_err();

        assert_eq!(err.failed_stage(), Some("SysconInit"));
        assert!(err.to_string().contains("GSCX_SYSCON_Initialize"));
        assert!(rig.sink.contains("[BOOT] SYSCON initialization failed"));
    }

    #[test]
    fn test_lv1_missing_module() {
        let _lock = lock_global_state();
        let mut modules = full_console();
        modules.retain(|(n, _)| *n != names::HYPERVISOR);
        let rig = rig(modules);

        let orchestrator = BootChainOrchestrator::new(rig.sink.clone());
        let err = orchestrator.boot_lv1(&rig.loader).unwrap_err();
        assert!(matches!(err, GscxError::ModuleLoad(_)));
        assert!(rig.sink.contains("[LV1] Hypervisor module not loaded"));
    }

    #[test]
    fn test_lv2_requires_cpu_and_gpu() {
        let _lock = lock_global_state();
        let mut modules = full_console();
        modules.retain(|(n, _)| *n != names::GPU_RSX);
        let mut rig = rig(modules);

        let mut orchestrator = BootChainOrchestrator::new(rig.sink.clone());
        let err = orchestrator
            .run_full_sequence(&rig.loader, &mut rig.flash)
            .unwrap_err();

        assert_eq!(err.failed_stage(), Some("LV2"));
        assert!(err.to_string().contains("gscx_gpu_rsx"));
        assert!(rig.sink.contains("[LV2] Missing required modules (CPU/GPU)"));
    }

    #[test]
    fn test_detect_hardware_logs_summary() {
        let sink = RecordingSink::new();
        let orchestrator = BootChainOrchestrator::new(sink.clone());
        let hw = orchestrator.detect_hardware();
        assert_eq!(hw.cpu.spu_cores, 8);
        assert!(sink.contains("[HW] CPU: Cell Broadband Engine"));
        assert!(sink.contains("[HW] Hardware detection completed"));
    }
}

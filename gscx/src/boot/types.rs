//! Type definitions for the boot pipeline.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::flash::{RosSlot, VirtualFlashController};
use crate::logging::SharedLogSink;
use crate::module::ModuleLoader;

/// Boot stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BootStage {
    HardwareDetect,
    SysconInit,
    BootChainValidate,
    FlashMount,
    #[serde(rename = "LV0")]
    Lv0,
    #[serde(rename = "LV1")]
    Lv1,
    #[serde(rename = "LV2")]
    Lv2,
}

impl BootStage {
    pub const ORDER: [BootStage; 7] = [
        BootStage::HardwareDetect,
        BootStage::SysconInit,
        BootStage::BootChainValidate,
        BootStage::FlashMount,
        BootStage::Lv0,
        BootStage::Lv1,
        BootStage::Lv2,
    ];

    /// Pipeline task name for this stage.
    pub fn task_name(self) -> &'static str {
        match self {
            BootStage::HardwareDetect => "hardware_detect",
            BootStage::SysconInit => "syscon_init",
            BootStage::BootChainValidate => "boot_chain_validate",
            BootStage::FlashMount => "flash_mount",
            BootStage::Lv0 => "lv0",
            BootStage::Lv1 => "lv1",
            BootStage::Lv2 => "lv2",
        }
    }

    pub fn from_task_name(name: &str) -> Option<BootStage> {
        Self::ORDER.into_iter().find(|s| s.task_name() == name)
    }
}

impl fmt::Display for BootStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BootStage::HardwareDetect => "HardwareDetect",
            BootStage::SysconInit => "SysconInit",
            BootStage::BootChainValidate => "BootChainValidate",
            BootStage::FlashMount => "FlashMount",
            BootStage::Lv0 => "LV0",
            BootStage::Lv1 => "LV1",
            BootStage::Lv2 => "LV2",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CpuSummary {
    pub kind: &'static str,
    pub ppu_cores: u8,
    pub spu_cores: u8,
    pub frequency: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemorySummary {
    pub xdr_ram: &'static str,
    pub gddr3_vram: &'static str,
    pub total: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GpuSummary {
    pub kind: &'static str,
    pub frequency: &'static str,
    pub memory_interface: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageSummary {
    pub hdd_interface: &'static str,
    pub optical_drive: &'static str,
    pub flash_memory: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectivitySummary {
    pub ethernet: &'static str,
    pub wifi: &'static str,
    pub bluetooth: &'static str,
    pub usb: &'static str,
}

/// Static capability summary of the emulated console.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HardwareSummary {
    pub cpu: CpuSummary,
    pub memory: MemorySummary,
    pub gpu: GpuSummary,
    pub storage: StorageSummary,
    pub connectivity: ConnectivitySummary,
}

impl HardwareSummary {
    pub fn ps3() -> Self {
        Self {
            cpu: CpuSummary {
                kind: "Cell Broadband Engine",
                ppu_cores: 1,
                spu_cores: 8,
                frequency: "3.2 GHz",
            },
            memory: MemorySummary {
                xdr_ram: "256 MB",
                gddr3_vram: "256 MB",
                total: "512 MB",
            },
            gpu: GpuSummary {
                kind: "RSX Reality Synthesizer",
                frequency: "500 MHz",
                memory_interface: "128-bit GDDR3",
            },
            storage: StorageSummary {
                hdd_interface: "SATA",
                optical_drive: "Blu-ray/DVD/CD",
                flash_memory: "NAND/NOR",
            },
            connectivity: ConnectivitySummary {
                ethernet: "10/100/1000 Mbps",
                wifi: "802.11b/g (optional)",
                bluetooth: "2.0 + EDR",
                usb: "4x USB 2.0",
            },
        }
    }
}

/// Shared state for one run of the boot pipeline.
///
/// Tasks fill the output fields as they complete.
pub struct BootCtx<'a> {
    pub loader: &'a ModuleLoader,
    pub flash: &'a mut VirtualFlashController,
    pub sink: SharedLogSink,
    pub preferred_ros: Option<RosSlot>,

    pub hardware: Option<HardwareSummary>,
    pub active_ros: Option<RosSlot>,
    pub flash_path: Option<PathBuf>,
}

impl<'a> BootCtx<'a> {
    pub fn new(
        loader: &'a ModuleLoader,
        flash: &'a mut VirtualFlashController,
        sink: SharedLogSink,
        preferred_ros: Option<RosSlot>,
    ) -> Self {
        Self {
            loader,
            flash,
            sink,
            preferred_ros,
            hardware: None,
            active_ros: None,
            flash_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageTiming {
    pub stage: BootStage,
    pub duration_ms: u128,
}

/// Outcome of a completed boot sequence.
#[derive(Debug, Clone, Serialize)]
pub struct BootReport {
    pub started_at: DateTime<Utc>,
    pub total_duration_ms: u128,
    /// Every stage, in execution order.
    pub stages: Vec<StageTiming>,
    pub hardware: HardwareSummary,
    pub active_ros: RosSlot,
    pub flash_path: PathBuf,
}

impl BootReport {
    pub fn stage_duration_ms(&self, stage: BootStage) -> Option<u128> {
        self.stages
            .iter()
            .find(|t| t.stage == stage)
            .map(|t| t.duration_ms)
    }
}

//! GSCX firmware boot core.
//!
//! Loads native emulation modules, materializes the virtual flash, and runs
//! the console boot chain:
//!
//! ```text
//! GscxRuntime
//!   ├── ModuleLoader            (native modules, optionally from a bundle)
//!   ├── VirtualFlashController  (dev_flash*, ros0/ros1, registry)
//!   ├── BootChainOrchestrator   (HW → SYSCON → chain → flash → LV0 → LV1 → LV2)
//!   └── RecoveryProvisioner     (PS3UPDAT.PUP on virtual USB)
//! ```

pub mod boot;
pub mod bundle;
pub mod flash;
pub mod logging;
pub mod module;
pub mod pipeline;
pub mod recovery;
pub mod runtime;
pub mod storage;

pub use boot::{BootChainOrchestrator, BootReport, BootStage};
pub use flash::{RosSlot, VirtualFlashController, VirtualFlashLayout};
pub use gscx_shared::errors::{GscxError, GscxResult};
pub use logging::{ChannelSink, LogLevel, LogLine, LogSink, SharedLogSink, init_logging_for};
pub use module::{ModuleLoader, ModuleRecord};
pub use recovery::RecoveryProvisioner;
pub use runtime::{FilesystemLayout, GscxOptions, GscxRuntime};

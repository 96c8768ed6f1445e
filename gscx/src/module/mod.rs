//! Native emulation modules.
//!
//! ## Architecture
//!
//! - **ModuleOpener**: turns a module file into a `NativeModule` (the default
//!   opener uses the platform dynamic loader).
//! - **NativeModule**: calls into one loaded module by entry point name.
//! - **ModuleLoader**: probes search directories for the module catalog, runs
//!   initializers with the host services table, and owns the loaded set.
//!
//! The opener/module split mirrors the spawn-vs-runtime split of a VM
//! controller: the loader only opens, everything afterwards talks to the
//! module handle.

mod host_services;
mod library;
mod loader;

pub use host_services::{HostServicesC, HostServicesTable, LogFn, SinkBinding, active_sink};
pub use library::{DylibModule, DylibOpener, Library, LoadError};
pub use loader::{ModuleLoader, ModuleRecord, ResolvedEntries};

use gscx_shared::errors::GscxResult;
use std::path::{Path, PathBuf};

/// Module identifiers probed by the loader, in load order.
pub const MODULE_CATALOG: &[&str] = &[
    names::CPU_CELL,
    names::GPU_RSX,
    names::RECOVERY,
    names::BOOTLOADER,
    names::SYSCON,
    names::HYPERVISOR,
];

/// Canonical module names.
pub mod names {
    pub const CPU_CELL: &str = "gscx_cpu_cell";
    pub const GPU_RSX: &str = "gscx_gpu_rsx";
    pub const RECOVERY: &str = "gscx_recovery";
    pub const BOOTLOADER: &str = "gscx_bootloader";
    pub const SYSCON: &str = "gscx_syscon";
    pub const HYPERVISOR: &str = "gscx_hypervisor";
}

/// Exported entry point names.
pub mod entry {
    /// `ModuleInfo GSCX_GetModuleInfo(void)`, optional, only resolved.
    pub const GET_MODULE_INFO: &str = "GSCX_GetModuleInfo";
    /// `bool GSCX_Initialize(const HostServicesC*)`
    pub const INITIALIZE: &str = "GSCX_Initialize";
    /// `void GSCX_Shutdown(void)`
    pub const SHUTDOWN: &str = "GSCX_Shutdown";
    /// `bool GSCX_SYSCON_Initialize(void)`
    pub const SYSCON_INITIALIZE: &str = "GSCX_SYSCON_Initialize";
    /// `bool GSCX_LV0_Entry(void)`
    pub const LV0: &str = "GSCX_LV0_Entry";
    /// `bool GSCX_LV1_Entry(void)`
    pub const LV1: &str = "GSCX_LV1_Entry";
    /// `void GSCX_RecoveryEntry(void)`
    pub const RECOVERY: &str = "GSCX_RecoveryEntry";
}

/// File name of a module under the platform naming convention
/// (`libgscx_cpu_cell.so`, `libgscx_cpu_cell.dylib`, `gscx_cpu_cell.dll`).
pub fn module_file_name(name: &str) -> String {
    format!(
        "{}{}{}",
        std::env::consts::DLL_PREFIX,
        name,
        std::env::consts::DLL_SUFFIX
    )
}

/// Default build output locations, relative to `cwd`.
pub fn default_search_dirs(cwd: &Path) -> Vec<PathBuf> {
    vec![
        cwd.join("build"),
        cwd.join("cpp").join("build"),
        cwd.join("bin"),
    ]
}

/// A loaded native module.
///
/// Every call blocks until the native side returns. Implementations must not
/// be called concurrently.
pub trait NativeModule: Send {
    /// Whether `symbol` is exported.
    fn has_entry(&self, symbol: &str) -> bool;

    /// Call the initializer with the host services table.
    ///
    /// Returns `GscxError::EntryPoint` if the module does not export one.
    fn initialize(&self, host: &HostServicesTable) -> GscxResult<bool>;

    /// Call a `bool (void)` entry point.
    fn call_bool(&self, symbol: &str) -> GscxResult<bool>;

    /// Call a `void (void)` entry point.
    fn call_void(&self, symbol: &str) -> GscxResult<()>;
}

/// Opens module files.
pub trait ModuleOpener: Send {
    fn open(&self, name: &str, path: &Path) -> GscxResult<Box<dyn NativeModule>>;
}

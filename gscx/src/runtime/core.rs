//! High-level runtime facade.

use std::path::{Path, PathBuf};

use gscx_shared::errors::{GscxError, GscxResult};

use crate::boot::{BootChainOrchestrator, BootReport};
use crate::flash::{VirtualFlashController, VirtualFlashLayout};
use crate::init_logging_for;
use crate::logging::{SharedLogSink, tracing_sink};
use crate::module::{DylibOpener, ModuleLoader, ModuleOpener};
use crate::recovery::{ProvisionedMedia, RecoveryProvisioner};
use crate::runtime::layout::{DEFAULT_HDD_IMAGE, FilesystemLayout};
use crate::runtime::options::GscxOptions;
use crate::storage::allocate_virtual_hdd;

/// Entry point for front-ends: one module set, one virtual flash, one boot
/// chain.
///
/// **Single instance**: the module loader binds the process-wide native log
/// slot, so only one runtime should exist per process.
///
/// **Blocking**: every call runs native code or filesystem work on the
/// calling thread. Front-ends run the runtime on a worker thread and observe
/// progress through the sink (see `ChannelSink`).
pub struct GscxRuntime {
    options: GscxOptions,
    layout: FilesystemLayout,
    sink: SharedLogSink,
    loader: ModuleLoader,
    flash: VirtualFlashController,
    orchestrator: BootChainOrchestrator,
    recovery: RecoveryProvisioner,
    last_hdd_path: Option<PathBuf>,
}

impl GscxRuntime {
    /// Create a runtime that loads modules through the platform dynamic
    /// loader.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - `options` fail validation
    /// - the home directory cannot be prepared
    /// - logging setup fails
    pub fn new(options: GscxOptions, sink: SharedLogSink) -> GscxResult<Self> {
        Self::with_opener(options, sink, Box::new(DylibOpener))
    }

    /// Like [`GscxRuntime::new`], with console lines routed to `tracing`.
    pub fn open(options: GscxOptions) -> GscxResult<Self> {
        Self::new(options, tracing_sink())
    }

    pub fn with_opener(
        options: GscxOptions,
        sink: SharedLogSink,
        opener: Box<dyn ModuleOpener>,
    ) -> GscxResult<Self> {
        options.sanitize()?;

        let layout = FilesystemLayout::new(options.home_dir.clone());
        layout.prepare().map_err(|e| {
            GscxError::Storage(format!(
                "Failed to initialize filesystem at {}: {}",
                layout.home_dir().display(),
                e
            ))
        })?;

        if options.init_logging {
            init_logging_for(&layout)?;
        }

        let loader = ModuleLoader::with_opener(sink.clone(), opener, options.staging_dir.clone());
        let vflash_dir = options
            .vflash_dir
            .clone()
            .unwrap_or_else(|| layout.vflash_dir());
        let flash = VirtualFlashController::new(vflash_dir, sink.clone());
        let orchestrator =
            BootChainOrchestrator::new(sink.clone()).with_preferred_ros(options.preferred_ros);
        let recovery = RecoveryProvisioner::new(sink.clone()).with_usb_root(Some(layout.usb_dir()));

        tracing::info!(home = %layout.home_dir().display(), "GSCX runtime ready");

        Ok(Self {
            options,
            layout,
            sink,
            loader,
            flash,
            orchestrator,
            recovery,
            last_hdd_path: None,
        })
    }

    pub fn options(&self) -> &GscxOptions {
        &self.options
    }

    pub fn layout(&self) -> &FilesystemLayout {
        &self.layout
    }

    pub fn sink(&self) -> &SharedLogSink {
        &self.sink
    }

    pub fn loader(&self) -> &ModuleLoader {
        &self.loader
    }

    pub fn flash(&mut self) -> &mut VirtualFlashController {
        &mut self.flash
    }

    pub fn orchestrator(&self) -> &BootChainOrchestrator {
        &self.orchestrator
    }

    /// Load modules from the build locations under `cwd` plus the configured
    /// module directories.
    pub fn load_modules(&mut self, cwd: &Path) -> usize {
        self.loader.load_default(cwd, &self.options.module_dirs)
    }

    pub fn load_bundle(&mut self, bundle: &Path) -> GscxResult<usize> {
        self.loader.load_bundle(bundle)
    }

    pub fn unload_modules(&mut self) {
        self.loader.unload_all();
    }

    pub fn boot(&mut self) -> GscxResult<BootReport> {
        self.orchestrator
            .run_full_sequence(&self.loader, &mut self.flash)
    }

    pub fn boot_recovery(
        &mut self,
        pup: Option<&Path>,
        usb_dir: Option<&Path>,
    ) -> GscxResult<Option<ProvisionedMedia>> {
        self.recovery.boot_recovery(&self.loader, pup, usb_dir)
    }

    pub fn last_usb_dir(&self) -> Option<&Path> {
        self.recovery.last_usb_dir()
    }

    pub fn flash_info(&mut self) -> GscxResult<&VirtualFlashLayout> {
        self.flash.info()
    }

    /// Allocate a virtual HDD, under `<home>/hdd/hdd0.img` unless `path` is given.
    pub fn allocate_virtual_hdd(
        &mut self,
        path: Option<&Path>,
        size_gb: u64,
    ) -> GscxResult<PathBuf> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.layout.hdd_dir().join(DEFAULT_HDD_IMAGE));
        let allocated = allocate_virtual_hdd(&path, size_gb, self.sink.as_ref())?;
        self.last_hdd_path = Some(allocated.clone());
        Ok(allocated)
    }

    /// Image produced by the last successful [`GscxRuntime::allocate_virtual_hdd`].
    pub fn last_hdd_path(&self) -> Option<&Path> {
        self.last_hdd_path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boot::BootStage;
    use crate::flash::RosSlot;
    use crate::logging::testing::RecordingSink;
    use crate::module::fake::{FakeOpener, FakeSpec, touch_modules};
    use crate::module::{entry, names};
    use crate::test_support::lock_global_state;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn options(temp: &TempDir) -> GscxOptions {
        GscxOptions {
            init_logging: false,
            staging_dir: Some(temp.path().join("staging")),
            ..GscxOptions::with_home_dir(temp.path().join("home"))
        }
    }

    fn console_opener() -> FakeOpener {
        FakeOpener::new()
            .with(names::CPU_CELL, FakeSpec::standard())
            .with(names::GPU_RSX, FakeSpec::standard())
            .with(names::BOOTLOADER, FakeSpec::standard().with_bool(entry::LV0, true))
            .with(names::HYPERVISOR, FakeSpec::standard().with_bool(entry::LV1, true))
            .with(names::RECOVERY, FakeSpec::standard().with_void(entry::RECOVERY))
    }

    fn runtime(options: GscxOptions) -> (GscxRuntime, Arc<RecordingSink>) {
        let sink = RecordingSink::new();
        let rt = GscxRuntime::with_opener(options, sink.clone(), Box::new(console_opener()))
            .unwrap();
        (rt, sink)
    }

    #[test]
    fn test_runtime_prepares_home() {
        let _lock = lock_global_state();
        let temp = TempDir::new().unwrap();
        let (rt, _sink) = runtime(options(&temp));

        assert!(rt.layout().logs_dir().is_dir());
        assert!(rt.layout().usb_dir().is_dir());
        assert_eq!(rt.layout().home_dir(), temp.path().join("home"));
    }

    #[test]
    fn test_relative_home_rejected() {
        let _lock = lock_global_state();
        let sink = RecordingSink::new();
        let options = GscxOptions {
            init_logging: false,
            ..GscxOptions::with_home_dir("not/absolute")
        };
        assert!(matches!(
            GscxRuntime::new(options, sink),
            Err(GscxError::Config(_))
        ));
    }

    #[test]
    fn test_load_and_boot() {
        let _lock = lock_global_state();
        let temp = TempDir::new().unwrap();
        let cwd = temp.path().join("project");
        touch_modules(
            &cwd.join("build"),
            &[names::CPU_CELL, names::GPU_RSX, names::BOOTLOADER, names::HYPERVISOR],
        );
        let mut opts = options(&temp);
        opts.preferred_ros = Some(RosSlot::Ros1);
        let (mut rt, sink) = runtime(opts);

        assert_eq!(rt.load_modules(&cwd), 4);
        let report = rt.boot().unwrap();

        assert_eq!(report.active_ros, RosSlot::Ros1);
        assert_eq!(report.stages.len(), BootStage::ORDER.len());
        assert!(report.flash_path.ends_with("vflash"));
        assert!(sink.contains("[SYSCON] Using virtual SYSCON simulation"));

        let info = rt.flash_info().unwrap();
        assert_eq!(info.active_ros(), Some(RosSlot::Ros1));
    }

    #[test]
    fn test_configured_module_dirs_are_probed() {
        let _lock = lock_global_state();
        let temp = TempDir::new().unwrap();
        let extra = temp.path().join("extra-modules");
        touch_modules(&extra, &[names::RECOVERY]);
        let mut opts = options(&temp);
        opts.module_dirs = vec![extra];
        let (mut rt, _sink) = runtime(opts);

        assert_eq!(rt.load_modules(&temp.path().join("project")), 1);
        assert!(rt.loader().is_loaded(names::RECOVERY));
    }

    #[test]
    fn test_recovery_media_lands_under_home() {
        let _lock = lock_global_state();
        let temp = TempDir::new().unwrap();
        let pup = temp.path().join("update.pup");
        std::fs::write(&pup, b"PUP").unwrap();
        let (mut rt, _sink) = runtime(options(&temp));

        let media = rt.boot_recovery(Some(&pup), None).unwrap().unwrap();
        assert!(media.usb_dir.starts_with(rt.layout().usb_dir()));
        assert_eq!(rt.last_usb_dir(), Some(media.usb_dir.as_path()));
    }

    #[test]
    fn test_default_hdd_location() {
        let _lock = lock_global_state();
        let temp = TempDir::new().unwrap();
        let (mut rt, _sink) = runtime(options(&temp));
        assert_eq!(rt.last_hdd_path(), None);

        let path = rt.allocate_virtual_hdd(None, 1).unwrap();
        assert_eq!(path, rt.layout().hdd_dir().join("hdd0.img"));
        assert_eq!(rt.last_hdd_path(), Some(path.as_path()));
    }

    #[test]
    fn test_failed_allocation_keeps_last_hdd_path() {
        let _lock = lock_global_state();
        let temp = TempDir::new().unwrap();
        let (mut rt, sink) = runtime(options(&temp));
        let first = rt.allocate_virtual_hdd(None, 1).unwrap();

        let blocker = temp.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();
        assert!(rt.allocate_virtual_hdd(Some(&blocker.join("hdd1.img")), 1).is_err());
        assert!(rt.allocate_virtual_hdd(None, u64::MAX).is_err());

        assert_eq!(rt.last_hdd_path(), Some(first.as_path()));
        assert!(sink.contains("virtual HDD size overflows"));
    }

    #[test]
    fn test_open_uses_tracing_sink() {
        let _lock = lock_global_state();
        let temp = TempDir::new().unwrap();
        let rt = GscxRuntime::open(options(&temp)).unwrap();

        assert!(rt.loader().modules().is_empty());
        assert!(rt.layout().hdd_dir().is_dir());
    }
}

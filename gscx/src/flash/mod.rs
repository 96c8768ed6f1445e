//! Virtual persistent flash (NAND/NOR partitions plus redundant ROS slots).
//!
//! ```text
//! <base>/
//! ├── dev_flash/  dev_flash2/  dev_flash3/
//! ├── ros0/ {lv0.self, appldr.self}
//! ├── ros1/ {lv0.self, appldr.self}
//! ├── bootloader/version.txt
//! └── registry/xRegistry.sys
//! ```
//!
//! Lifecycle: `Uninitialized → Initialized → Mounted`. `format` rebuilds the
//! tree and mounts again; the `clean_*` operations only touch contents.

mod layout;

pub use layout::{PARTITIONS, RosSlot, VirtualFlashLayout, dirs, files};

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use gscx_shared::errors::{GscxError, GscxResult};

use crate::logging::SharedLogSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashState {
    Uninitialized,
    Initialized,
    Mounted,
}

pub struct VirtualFlashController {
    base_path: PathBuf,
    sink: SharedLogSink,
    layout: Option<VirtualFlashLayout>,
    state: FlashState,
}

impl VirtualFlashController {
    pub fn new(base_path: impl Into<PathBuf>, sink: SharedLogSink) -> Self {
        Self {
            base_path: base_path.into(),
            sink,
            layout: None,
            state: FlashState::Uninitialized,
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn state(&self) -> FlashState {
        self.state
    }

    pub fn active_ros(&self) -> Option<RosSlot> {
        self.layout.as_ref().and_then(|l| l.active_ros())
    }

    /// Create the directory tree and seed placeholder files.
    ///
    /// A cached layout is returned as is, without looking at the disk.
    pub fn initialize(&mut self) -> GscxResult<&VirtualFlashLayout> {
        if self.layout.is_none() {
            let layout = self.build_layout().map_err(|e| {
                let err = GscxError::Flash(format!(
                    "failed to initialize virtual flash at {}: {}",
                    self.base_path.display(),
                    e
                ));
                self.sink.error(&format!("[VFLASH] {}", err));
                err
            })?;
            self.sink.info(&format!(
                "[VFLASH] Virtual flash initialized at {}",
                layout.base_path().display()
            ));
            self.layout = Some(layout);
            self.state = FlashState::Initialized;
        }

        self.cached()
    }

    fn build_layout(&self) -> io::Result<VirtualFlashLayout> {
        fs::create_dir_all(&self.base_path)?;
        let base_path = fs::canonicalize(&self.base_path)?;
        let layout = VirtualFlashLayout::new(base_path);

        for dir in layout.all_dirs() {
            fs::create_dir_all(&dir)?;
        }

        fs::write(
            layout.bootloader_dir().join(files::VERSION),
            files::VERSION_CONTENT,
        )?;
        for slot in layout.ros_slots() {
            let dir = layout.ros_dir(*slot);
            fs::write(dir.join(files::LV0), files::SELF_STUB)?;
            fs::write(dir.join(files::APPLDR), files::SELF_STUB)?;
        }
        fs::write(
            layout.registry_dir().join(files::REGISTRY),
            [0u8; files::REGISTRY_SIZE],
        )?;

        tracing::debug!(base = %layout.base_path().display(), "Virtual flash tree created");
        Ok(layout)
    }

    fn cached(&self) -> GscxResult<&VirtualFlashLayout> {
        self.layout
            .as_ref()
            .ok_or_else(|| GscxError::Internal("virtual flash layout not cached".into()))
    }

    /// Mount every partition, initializing first if needed.
    pub fn mount(&mut self) -> bool {
        let layout = match self.initialize() {
            Ok(layout) => layout,
            Err(e) => {
                self.sink
                    .error(&format!("[VFLASH] Failed to mount virtual flash: {}", e));
                return false;
            }
        };

        let missing: Vec<&str> = layout
            .partitions()
            .iter()
            .filter(|p| !layout.partition_dir(p).is_dir())
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            let message = format!(
                "[VFLASH] Failed to mount virtual flash: missing partitions {}",
                missing.join(", ")
            );
            self.sink.error(&message);
            return false;
        }

        let mounted = layout.partitions().join(", ");
        self.sink
            .info(&format!("[VFLASH] Partitions mounted: {}", mounted));
        self.state = FlashState::Mounted;
        true
    }

    fn ensure_mounted(&mut self) -> GscxResult<()> {
        if self.mount() {
            return Ok(());
        }
        let err = GscxError::Flash(format!(
            "virtual flash at {} could not be mounted",
            self.base_path.display()
        ));
        self.sink
            .error(&format!("[VFLASH] Error formatting virtual flash: {}", err));
        Err(err)
    }

    /// Wipe the flash, then initialize and mount it again.
    ///
    /// Deletion is best-effort: every entry is attempted, and if any could
    /// not be removed the tree is still rebuilt before `Flash` is returned.
    pub fn format(&mut self) -> GscxResult<&VirtualFlashLayout> {
        let base = self.initialize()?.base_path().to_path_buf();

        let mut failures = 0usize;
        let entries = fs::read_dir(&base).map_err(|e| {
            let err = GscxError::Flash(format!("failed to list {}: {}", base.display(), e));
            self.sink.error(&format!("[VFLASH] Error formatting virtual flash: {}", err));
            err
        })?;
        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) => {
                    failures += 1;
                    tracing::warn!("Unreadable entry under {}: {}", base.display(), e);
                    continue;
                }
            };
            if let Err(e) = remove_entry(&path) {
                failures += 1;
                self.sink.warn(&format!(
                    "[VFLASH] Could not remove {}: {}",
                    path.display(),
                    e
                ));
            }
        }

        self.layout = None;
        self.state = FlashState::Uninitialized;
        self.initialize()?;
        self.ensure_mounted()?;

        if failures > 0 {
            let err = GscxError::Flash(format!(
                "{} entries could not be removed while formatting",
                failures
            ));
            self.sink
                .error(&format!("[VFLASH] Error formatting virtual flash: {}", err));
            return Err(err);
        }

        self.sink.info("[VFLASH] Virtual flash formatted");
        self.cached()
    }

    /// Delete the contents of one partition directory, keeping the directory.
    pub fn clean_partition(&mut self, name: &str) -> GscxResult<()> {
        let base = self.initialize()?.base_path().to_path_buf();

        let mut components = Path::new(name).components();
        let single = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        let target = base.join(name);
        if !single || !target.is_dir() {
            let err = GscxError::Flash(format!("partition not found: {}", name));
            self.sink
                .error(&format!("[VFLASH] Partition not found: {}", name));
            return Err(err);
        }

        let listing_error = |e: io::Error| {
            GscxError::Flash(format!("error cleaning partition {}: {}", name, e))
        };
        let entries = fs::read_dir(&target).map_err(listing_error).map_err(|err| {
            self.sink.error(&format!("[VFLASH] {}", err));
            err
        })?;

        let mut failures = 0usize;
        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) => {
                    let err = listing_error(e);
                    self.sink.error(&format!("[VFLASH] {}", err));
                    return Err(err);
                }
            };
            if let Err(e) = remove_entry(&path) {
                failures += 1;
                self.sink.warn(&format!(
                    "[VFLASH] Could not remove {}: {}",
                    path.display(),
                    e
                ));
            }
        }

        if failures > 0 {
            let err = GscxError::Flash(format!(
                "error cleaning partition {}: {} entries left",
                name, failures
            ));
            self.sink.error(&format!("[VFLASH] {}", err));
            return Err(err);
        }

        self.sink
            .info(&format!("[VFLASH] Partition cleaned: {}", name));
        Ok(())
    }

    /// Clean every partition. Returns `true` only if all of them succeeded.
    pub fn clean_all(&mut self) -> bool {
        let partitions = match self.initialize() {
            Ok(layout) => layout.partitions().to_vec(),
            Err(_) => return false,
        };

        let mut ok = true;
        for partition in &partitions {
            ok &= self.clean_partition(partition).is_ok();
        }
        ok
    }

    /// The cached layout, initializing on first use.
    pub fn info(&mut self) -> GscxResult<&VirtualFlashLayout> {
        self.initialize()
    }

    /// Pick the first valid ROS slot, trying `preferred` first.
    ///
    /// A slot is valid when its `lv0.self` exists and is non-empty. With no
    /// valid slot the active slot is cleared.
    pub fn select_ros_slot(&mut self, preferred: Option<RosSlot>) -> Option<RosSlot> {
        if let Err(e) = self.initialize() {
            self.sink
                .error(&format!("[ROS] Error selecting slot: {}", e));
            return None;
        }
        let layout = self.layout.as_mut()?;

        let selected = RosSlot::candidates(preferred)
            .into_iter()
            .find(|slot| non_empty_file(&layout.ros_dir(*slot).join(files::LV0)));
        layout.set_active_ros(selected);

        match selected {
            Some(slot) => self
                .sink
                .info(&format!("[ROS] Selected slot: {}", slot)),
            None => self.sink.warn("[ROS] No valid slot found"),
        }
        selected
    }

    /// Check that the active slot holds non-empty `lv0.self` and `appldr.self`.
    pub fn verify_active_slot(&self) -> bool {
        let Some(layout) = self.layout.as_ref() else {
            return false;
        };
        let Some(slot) = layout.active_ros() else {
            self.sink.warn("[SEC] No active ROS slot");
            return false;
        };

        let dir = layout.ros_dir(slot);
        let mut ok = true;
        if !non_empty_file(&dir.join(files::LV0)) {
            self.sink.error("[SEC] LV0 missing or invalid");
            ok = false;
        }
        if !non_empty_file(&dir.join(files::APPLDR)) {
            self.sink.error("[SEC] Appldr missing or invalid");
            ok = false;
        }
        ok
    }

    /// Forget the active slot, e.g. after a failed verification.
    pub fn clear_active_ros(&mut self) {
        if let Some(layout) = self.layout.as_mut() {
            layout.set_active_ros(None);
        }
    }
}

fn non_empty_file(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

fn remove_entry(path: &Path) -> io::Result<()> {
    if fs::symlink_metadata(path)?.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::testing::RecordingSink;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn controller(temp: &TempDir) -> (VirtualFlashController, std::sync::Arc<RecordingSink>) {
        let sink = RecordingSink::new();
        let flash = VirtualFlashController::new(temp.path().join("vflash"), sink.clone());
        (flash, sink)
    }

    fn listing(dir: &Path) -> BTreeSet<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_initialize_seeds_tree() {
        let temp = TempDir::new().unwrap();
        let (mut flash, sink) = controller(&temp);
        assert_eq!(flash.state(), FlashState::Uninitialized);

        let base = flash.initialize().unwrap().base_path().to_path_buf();
        assert_eq!(flash.state(), FlashState::Initialized);
        assert_eq!(
            listing(&base),
            [
                "bootloader",
                "dev_flash",
                "dev_flash2",
                "dev_flash3",
                "registry",
                "ros0",
                "ros1"
            ]
            .iter()
            .map(|s| s.to_string())
            .collect()
        );
        assert_eq!(
            fs::read(base.join("bootloader/version.txt")).unwrap(),
            b"GSCX PS3 Bootloader (virtual)\n"
        );
        assert_eq!(fs::read(base.join("ros1/appldr.self")).unwrap(), b"stub");
        assert_eq!(
            fs::read(base.join("registry/xRegistry.sys")).unwrap(),
            vec![0u8; 1024]
        );
        assert!(sink.contains("Virtual flash initialized at"));
    }

    #[test]
    fn test_initialize_is_cached() {
        let temp = TempDir::new().unwrap();
        let (mut flash, _sink) = controller(&temp);
        let base = flash.initialize().unwrap().base_path().to_path_buf();

        fs::write(base.join("ros0/lv0.self"), b"").unwrap();
        flash.initialize().unwrap();
        // Cached: placeholders were not re-seeded
        assert_eq!(fs::metadata(base.join("ros0/lv0.self")).unwrap().len(), 0);
    }

    #[test]
    fn test_mount_auto_initializes() {
        let temp = TempDir::new().unwrap();
        let (mut flash, sink) = controller(&temp);

        assert!(flash.mount());
        assert_eq!(flash.state(), FlashState::Mounted);
        assert!(sink.contains("Partitions mounted: dev_flash, dev_flash2, dev_flash3"));
    }

    #[test]
    fn test_mount_fails_on_missing_partition() {
        let temp = TempDir::new().unwrap();
        let (mut flash, sink) = controller(&temp);
        let base = flash.initialize().unwrap().base_path().to_path_buf();
        fs::remove_dir_all(base.join("dev_flash3")).unwrap();

        assert!(!flash.mount());
        assert_eq!(flash.state(), FlashState::Initialized);
        assert!(sink.contains("missing partitions dev_flash3"));
    }

    #[test]
    fn test_format_matches_fresh_initialize() {
        let temp = TempDir::new().unwrap();
        let (mut flash, sink) = controller(&temp);
        let fresh = flash.initialize().unwrap().clone();
        let base = fresh.base_path().to_path_buf();

        fs::write(base.join("dev_flash/game.bin"), b"data").unwrap();
        fs::write(base.join("stray.txt"), b"x").unwrap();
        fs::create_dir_all(base.join("extra/nested")).unwrap();
        flash.select_ros_slot(Some(RosSlot::Ros1));

        let formatted = flash.format().unwrap().clone();
        assert_eq!(formatted.partitions(), fresh.partitions());
        assert_eq!(formatted.ros_slots(), fresh.ros_slots());
        assert_eq!(formatted.active_ros(), None);
        assert_eq!(flash.info().unwrap(), &fresh);
        assert_eq!(flash.state(), FlashState::Mounted);

        assert!(!base.join("stray.txt").exists());
        assert!(!base.join("extra").exists());
        assert!(listing(&base.join("dev_flash")).is_empty());
        assert!(sink.contains("Virtual flash formatted"));
    }

    #[test]
    fn test_clean_partition_only_touches_target() {
        let temp = TempDir::new().unwrap();
        let (mut flash, sink) = controller(&temp);
        let base = flash.initialize().unwrap().base_path().to_path_buf();

        for p in PARTITIONS {
            fs::write(base.join(p).join("file.dat"), b"1").unwrap();
        }
        fs::create_dir_all(base.join("dev_flash2/sub/dir")).unwrap();

        flash.clean_partition("dev_flash2").unwrap();

        assert!(base.join("dev_flash2").is_dir());
        assert!(listing(&base.join("dev_flash2")).is_empty());
        assert!(base.join("dev_flash/file.dat").exists());
        assert!(base.join("dev_flash3/file.dat").exists());
        assert!(sink.contains("Partition cleaned: dev_flash2"));
    }

    #[test]
    fn test_clean_partition_rejects_unknown_and_escaping_names() {
        let temp = TempDir::new().unwrap();
        let (mut flash, sink) = controller(&temp);
        flash.initialize().unwrap();

        for name in ["dev_flash9", "..", "../vflash", "/tmp", "dev_flash/.."] {
            let err = flash.clean_partition(name).unwrap_err();
            assert!(matches!(err, GscxError::Flash(_)), "{}", name);
        }
        assert!(sink.contains("Partition not found: dev_flash9"));
    }

    #[test]
    fn test_unmountable_flash_is_flash_error() {
        let temp = TempDir::new().unwrap();
        let (mut flash, sink) = controller(&temp);
        let base = flash.initialize().unwrap().base_path().to_path_buf();
        fs::remove_dir_all(base.join("dev_flash2")).unwrap();
        fs::write(base.join("dev_flash2"), b"not a dir").unwrap();

        let err = flash.ensure_mounted().unwrap_err();
        assert!(matches!(err, GscxError::Flash(_)));
        assert_ne!(flash.state(), FlashState::Mounted);
        assert!(sink.contains("could not be mounted"));
    }

    #[cfg(unix)]
    #[test]
    fn test_clean_partition_unreadable_is_logged() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let (mut flash, sink) = controller(&temp);
        let dir = flash.initialize().unwrap().partition_dir("dev_flash");
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o000)).unwrap();

        // Privileged users can still list the directory.
        let readable = fs::read_dir(&dir).is_ok();
        let result = flash.clean_partition("dev_flash");
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o755)).unwrap();
        if readable {
            return;
        }

        assert!(matches!(result, Err(GscxError::Flash(_))));
        assert!(sink.contains("error cleaning partition dev_flash"));
    }

    #[test]
    fn test_clean_all_keeps_partitions() {
        let temp = TempDir::new().unwrap();
        let (mut flash, _sink) = controller(&temp);
        let before = flash.initialize().unwrap().clone();
        assert!(flash.mount());

        fs::write(before.partition_dir("dev_flash3").join("a"), b"a").unwrap();
        assert!(flash.clean_all());

        let after = flash.info().unwrap();
        assert_eq!(after.partitions(), before.partitions());
        for p in after.partitions() {
            assert!(after.partition_dir(p).is_dir());
            assert!(listing(&after.partition_dir(p)).is_empty());
        }
        // ROS slots are not partitions
        assert!(after.ros_dir(RosSlot::Ros0).join("lv0.self").exists());
    }

    #[test]
    fn test_select_prefers_requested_slot() {
        let temp = TempDir::new().unwrap();
        let (mut flash, _sink) = controller(&temp);

        assert_eq!(flash.select_ros_slot(None), Some(RosSlot::Ros0));
        assert_eq!(flash.select_ros_slot(Some(RosSlot::Ros1)), Some(RosSlot::Ros1));
        assert_eq!(flash.active_ros(), Some(RosSlot::Ros1));
        assert!(flash.verify_active_slot());
    }

    #[test]
    fn test_select_skips_empty_lv0() {
        let temp = TempDir::new().unwrap();
        let (mut flash, sink) = controller(&temp);
        let base = flash.initialize().unwrap().base_path().to_path_buf();
        fs::write(base.join("ros0/lv0.self"), b"").unwrap();

        assert_eq!(flash.select_ros_slot(None), Some(RosSlot::Ros1));
        assert!(sink.contains("Selected slot: ROS1"));
    }

    #[test]
    fn test_select_none_valid_clears_active() {
        let temp = TempDir::new().unwrap();
        let (mut flash, _sink) = controller(&temp);
        let base = flash.initialize().unwrap().base_path().to_path_buf();
        assert_eq!(flash.select_ros_slot(None), Some(RosSlot::Ros0));

        fs::remove_file(base.join("ros0/lv0.self")).unwrap();
        fs::write(base.join("ros1/lv0.self"), b"").unwrap();

        assert_eq!(flash.select_ros_slot(None), None);
        assert_eq!(flash.active_ros(), None);
        assert!(!flash.verify_active_slot());
    }

    #[test]
    fn test_verify_checks_appldr() {
        let temp = TempDir::new().unwrap();
        let (mut flash, sink) = controller(&temp);
        let base = flash.initialize().unwrap().base_path().to_path_buf();
        fs::write(base.join("ros0/appldr.self"), b"").unwrap();

        // lv0 alone decides selection
        assert_eq!(flash.select_ros_slot(None), Some(RosSlot::Ros0));
        assert!(!flash.verify_active_slot());
        assert!(sink.contains("Appldr missing or invalid"));
    }
}

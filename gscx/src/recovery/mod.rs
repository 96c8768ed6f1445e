//! Recovery media provisioning.
//!
//! The native recovery module looks for a firmware image on a USB stick. The
//! host fakes the stick with a directory holding `PS3UPDAT.PUP` and tells the
//! module where it is through `GSCX_RECOVERY_PUP`, set only while the
//! recovery entry runs.

use std::path::{Path, PathBuf};

use gscx_shared::errors::{GscxError, GscxResult};

use crate::logging::SharedLogSink;
use crate::module::{ModuleLoader, entry, names};

/// Environment variable the recovery module reads.
pub const RECOVERY_PUP_ENV: &str = "GSCX_RECOVERY_PUP";

/// File name the console expects on the USB root.
pub const RECOVERY_FILE_NAME: &str = "PS3UPDAT.PUP";

const USB_DIR_PREFIX: &str = "gscx_usb_";

/// A firmware image staged onto virtual USB media.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedMedia {
    pub usb_dir: PathBuf,
    pub image_path: PathBuf,
}

/// Sets or clears [`RECOVERY_PUP_ENV`] and removes it again on drop.
struct RecoveryEnvBinding;

impl RecoveryEnvBinding {
    fn bind(image: &Path) -> Self {
        // SAFETY: the core runs on a single thread of control and native
        // modules only read the variable inside the recovery entry.
        unsafe { std::env::set_var(RECOVERY_PUP_ENV, image) };
        Self
    }

    fn cleared() -> Self {
        // SAFETY: see `bind`.
        unsafe { std::env::remove_var(RECOVERY_PUP_ENV) };
        Self
    }
}

impl Drop for RecoveryEnvBinding {
    fn drop(&mut self) {
        // SAFETY: see `bind`.
        unsafe { std::env::remove_var(RECOVERY_PUP_ENV) };
    }
}

pub struct RecoveryProvisioner {
    sink: SharedLogSink,
    /// Parent for auto-created USB directories; system temp when unset.
    usb_root: Option<PathBuf>,
    last_usb_dir: Option<PathBuf>,
}

impl RecoveryProvisioner {
    pub fn new(sink: SharedLogSink) -> Self {
        Self {
            sink,
            usb_root: None,
            last_usb_dir: None,
        }
    }

    pub fn with_usb_root(mut self, root: Option<PathBuf>) -> Self {
        self.usb_root = root;
        self
    }

    /// Most recent directory a firmware image was copied into.
    pub fn last_usb_dir(&self) -> Option<&Path> {
        self.last_usb_dir.as_deref()
    }

    /// Copy `pup` into `usb_dir` (or a fresh kept temp directory) as
    /// `PS3UPDAT.PUP`.
    ///
    /// The directory is never removed by the core.
    pub fn provision(&mut self, pup: &Path, usb_dir: Option<&Path>) -> GscxResult<ProvisionedMedia> {
        let media = self.stage(pup, usb_dir).map_err(|e| {
            let err = GscxError::Recovery(format!(
                "failed to prepare virtual USB for {}: {}",
                pup.display(),
                e
            ));
            self.sink.error(&format!("[RECOVERY] {}", err));
            err
        })?;

        self.sink.info(&format!(
            "[RECOVERY] Virtual USB prepared at {}",
            media.usb_dir.display()
        ));
        self.sink.info(&format!(
            "[RECOVERY] Firmware copied to {}",
            media.image_path.display()
        ));
        self.last_usb_dir = Some(media.usb_dir.clone());
        Ok(media)
    }

    fn stage(&self, pup: &Path, usb_dir: Option<&Path>) -> std::io::Result<ProvisionedMedia> {
        if !pup.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "firmware image not found",
            ));
        }

        let usb_dir = match usb_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                std::path::absolute(dir)?
            }
            None => {
                let root = self.usb_root.clone().unwrap_or_else(std::env::temp_dir);
                std::fs::create_dir_all(&root)?;
                tempfile::Builder::new()
                    .prefix(USB_DIR_PREFIX)
                    .tempdir_in(&root)?
                    .keep()
            }
        };

        let image_path = usb_dir.join(RECOVERY_FILE_NAME);
        std::fs::copy(pup, &image_path)?;
        tracing::debug!(src = %pup.display(), dst = %image_path.display(), "Recovery image staged");

        Ok(ProvisionedMedia {
            usb_dir,
            image_path,
        })
    }

    /// Provision (if `pup` is given) and run the recovery entry.
    ///
    /// Without `pup` any inherited binding is removed first, so the module
    /// waits for real media. The binding never outlives this call.
    pub fn boot_recovery(
        &mut self,
        loader: &ModuleLoader,
        pup: Option<&Path>,
        usb_dir: Option<&Path>,
    ) -> GscxResult<Option<ProvisionedMedia>> {
        let (media, _binding) = match pup {
            Some(pup) => {
                let media = self.provision(pup, usb_dir)?;
                let binding = RecoveryEnvBinding::bind(&media.image_path);
                (Some(media), binding)
            }
            None => (None, RecoveryEnvBinding::cleared()),
        };

        self.call_recovery_entry(loader);
        Ok(media)
    }

    /// Call `GSCX_RecoveryEntry` on the first loaded recovery module.
    ///
    /// Returns whether the entry ran. A missing module or entry is only
    /// logged.
    pub fn call_recovery_entry(&self, loader: &ModuleLoader) -> bool {
        let Some(record) = loader.find(names::RECOVERY) else {
            self.sink.warn("[RECOVERY] Recovery module not loaded");
            return false;
        };

        if !record.module().has_entry(entry::RECOVERY) {
            self.sink.warn(&format!(
                "[RECOVERY] Entry point {} not found in {}",
                entry::RECOVERY,
                record.name()
            ));
            return false;
        }

        self.sink
            .info(&format!("[RECOVERY] Calling {}...", entry::RECOVERY));
        match record.module().call_void(entry::RECOVERY) {
            Ok(()) => {
                self.sink.info("[RECOVERY] Recovery entry finished");
                true
            }
            Err(e) => {
                self.sink
                    .error(&format!("[RECOVERY] Recovery entry failed: {}", e));
                false
            }
        }
    }
}

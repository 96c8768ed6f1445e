//! Home directory layout.
//!
//! ```text
//! ~/.gscx/
//! ├── logs/     gscx.log.<date>
//! ├── vflash/   virtual flash (default location)
//! ├── hdd/      virtual HDD images
//! └── usb/      provisioned recovery media
//! ```

use std::path::{Path, PathBuf};

pub mod dirs {
    pub const LOGS: &str = "logs";
    pub const VFLASH: &str = "vflash";
    pub const HDD: &str = "hdd";
    pub const USB: &str = "usb";
}

/// Default virtual HDD image name.
pub const DEFAULT_HDD_IMAGE: &str = "hdd0.img";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilesystemLayout {
    home_dir: PathBuf,
}

impl FilesystemLayout {
    pub fn new(home_dir: PathBuf) -> Self {
        Self { home_dir }
    }

    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.home_dir.join(dirs::LOGS)
    }

    pub fn vflash_dir(&self) -> PathBuf {
        self.home_dir.join(dirs::VFLASH)
    }

    pub fn hdd_dir(&self) -> PathBuf {
        self.home_dir.join(dirs::HDD)
    }

    pub fn usb_dir(&self) -> PathBuf {
        self.home_dir.join(dirs::USB)
    }

    /// Create the home directory and its fixed subdirectories.
    ///
    /// The flash tree itself is created by the flash controller.
    pub fn prepare(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.home_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        std::fs::create_dir_all(self.hdd_dir())?;
        std::fs::create_dir_all(self.usb_dir())?;
        Ok(())
    }
}

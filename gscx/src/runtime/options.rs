//! Runtime configuration.

use std::path::{Path, PathBuf};

use gscx_shared::errors::{GscxError, GscxResult};
use serde::{Deserialize, Serialize};

use crate::flash::RosSlot;

/// Overrides the default home directory.
pub const HOME_ENV: &str = "GSCX_HOME";

const DEFAULT_HOME_DIR_NAME: &str = ".gscx";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GscxOptions {
    /// Root for logs, virtual flash, HDD images and USB media. Must be absolute.
    pub home_dir: PathBuf,
    /// Extra module directories, probed after the default build locations.
    pub module_dirs: Vec<PathBuf>,
    /// ROS slot tried first during boot chain validation.
    pub preferred_ros: Option<RosSlot>,
    /// Virtual flash base; `<home>/vflash` when unset.
    pub vflash_dir: Option<PathBuf>,
    /// Parent of bundle staging directories; system temp when unset.
    pub staging_dir: Option<PathBuf>,
    /// Install the stderr + file `tracing` subscriber on runtime creation.
    pub init_logging: bool,
}

impl Default for GscxOptions {
    fn default() -> Self {
        Self {
            home_dir: default_home_dir(),
            module_dirs: Vec::new(),
            preferred_ros: None,
            vflash_dir: None,
            staging_dir: None,
            init_logging: true,
        }
    }
}

fn default_home_dir() -> PathBuf {
    if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(home);
    }
    dirs::home_dir()
        .map(|h| h.join(DEFAULT_HOME_DIR_NAME))
        .unwrap_or_else(|| std::env::temp_dir().join("gscx"))
}

impl GscxOptions {
    pub fn with_home_dir(home_dir: impl Into<PathBuf>) -> Self {
        Self {
            home_dir: home_dir.into(),
            ..Self::default()
        }
    }

    /// Load options from a JSON file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> GscxResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            GscxError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let options: Self = serde_json::from_str(&text).map_err(|e| {
            GscxError::Config(format!("invalid options in {}: {}", path.display(), e))
        })?;
        options.sanitize()?;
        Ok(options)
    }

    pub fn sanitize(&self) -> GscxResult<()> {
        if !self.home_dir.is_absolute() {
            return Err(GscxError::Config(format!(
                "home_dir must be absolute path, got: {}",
                self.home_dir.display()
            )));
        }
        if let Some(dir) = &self.vflash_dir
            && dir.as_os_str().is_empty()
        {
            return Err(GscxError::Config("vflash_dir must not be empty".into()));
        }
        if self.module_dirs.iter().any(|d| d.as_os_str().is_empty()) {
            return Err(GscxError::Config("module_dirs must not contain empty paths".into()));
        }
        Ok(())
    }
}

//! Bundle extraction into a staging directory.

use std::path::{Component, Path, PathBuf};

use gscx_shared::errors::{GscxError, GscxResult};

use super::BundleEntry;
use super::format::parse;
use crate::logging::LogSink;

const STAGING_PREFIX: &str = "gscx_bundle_";

/// Owns the directory a bundle was last extracted into.
///
/// Each extraction discards the previous staging directory in full before
/// writing the new one, so at most one exists per owner.
#[derive(Debug, Default)]
pub struct BundleStaging {
    /// Parent for staging directories; the system temp dir when `None`.
    root: Option<PathBuf>,
    current: Option<PathBuf>,
}

impl BundleStaging {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self {
            root,
            current: None,
        }
    }

    /// Directory of the last successful extraction, if still present.
    pub fn current(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    /// Validate `bytes` and write every entry under a fresh staging directory.
    ///
    /// A malformed container fails before anything touches the disk. Entries
    /// that cannot be written are logged and skipped.
    pub fn extract(&mut self, bytes: &[u8], sink: &dyn LogSink) -> GscxResult<PathBuf> {
        let table = parse(bytes).inspect_err(|e| sink.error(&format!("[BUNDLE] {}", e)))?;

        self.discard();
        let dir = self.create_dir().inspect_err(|e| sink.error(&format!("[BUNDLE] {}", e)))?;

        tracing::debug!(
            staging = %dir.display(),
            version = table.version,
            entries = table.entries.len(),
            "Extracting bundle"
        );

        for entry in &table.entries {
            match write_entry(&dir, entry, bytes) {
                Ok(_) => sink.info(&format!(
                    "[BUNDLE] Extracted {} ({} bytes)",
                    entry.name, entry.size
                )),
                Err(e) => sink.warn(&format!(
                    "[BUNDLE] Failed to extract {}: {}",
                    entry.name, e
                )),
            }
        }

        self.current = Some(dir.clone());
        Ok(dir)
    }

    /// Remove the current staging directory, if any.
    pub fn discard(&mut self) {
        if let Some(dir) = self.current.take()
            && let Err(e) = std::fs::remove_dir_all(&dir)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(staging = %dir.display(), "Failed to remove staging directory: {}", e);
        }
    }

    fn create_dir(&self) -> GscxResult<PathBuf> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(STAGING_PREFIX);
        let temp = match &self.root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .map_err(|e| GscxError::Storage(format!("Failed to create staging directory: {}", e)))?;

        Ok(temp.keep())
    }
}

/// Write one payload to `dir/name`, creating parent directories.
fn write_entry(dir: &Path, entry: &BundleEntry, bytes: &[u8]) -> GscxResult<PathBuf> {
    let relative = Path::new(&entry.name);
    let escapes = relative.as_os_str().is_empty()
        || relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
    if escapes {
        return Err(GscxError::BundleFormat(format!(
            "entry name '{}' is not a relative path",
            entry.name
        )));
    }

    let out_path = dir.join(relative);
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&out_path, &bytes[entry.payload_range()])?;
    Ok(out_path)
}

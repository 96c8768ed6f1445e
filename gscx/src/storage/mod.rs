//! Virtual HDD images.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use gscx_shared::errors::{GscxError, GscxResult};

use crate::logging::LogSink;

/// Smallest image handed out, in GiB.
pub const MIN_HDD_SIZE_GB: u64 = 1;

const GIB: u64 = 1024 * 1024 * 1024;

/// Create (or resize) a sparse HDD image of `size_gb` GiB at `path`.
///
/// Sizes below [`MIN_HDD_SIZE_GB`] are raised to it. Returns the absolute
/// path of the image.
pub fn allocate_virtual_hdd(path: &Path, size_gb: u64, sink: &dyn LogSink) -> GscxResult<PathBuf> {
    let size_gb = size_gb.max(MIN_HDD_SIZE_GB);
    let Some(bytes) = size_gb.checked_mul(GIB) else {
        let err = GscxError::Storage(format!("virtual HDD size overflows: {} GB", size_gb));
        sink.error(&format!("[STORAGE] {}", err));
        return Err(err);
    };

    let result = create_sparse(path, bytes);
    match result {
        Ok(abs) => {
            sink.info(&format!(
                "[STORAGE] Virtual HDD allocated: {} ({} GB)",
                abs.display(),
                size_gb
            ));
            Ok(abs)
        }
        Err(e) => {
            let err = GscxError::Storage(format!(
                "failed to allocate virtual HDD at {}: {}",
                path.display(),
                e
            ));
            sink.error(&format!("[STORAGE] {}", err));
            Err(err)
        }
    }
}

fn create_sparse(path: &Path, bytes: u64) -> std::io::Result<PathBuf> {
    let abs = std::path::absolute(path)?;
    if let Some(parent) = abs.parent() {
        fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&abs)?;
    file.set_len(bytes)?;
    tracing::debug!(path = %abs.display(), bytes, "Sparse image created");
    Ok(abs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::testing::RecordingSink;
    use tempfile::TempDir;

    #[test]
    fn test_allocates_sparse_image() {
        let temp = TempDir::new().unwrap();
        let sink = RecordingSink::new();
        let path = temp.path().join("hdd/nested/hdd0.img");

        let abs = allocate_virtual_hdd(&path, 2, sink.as_ref()).unwrap();

        assert!(abs.is_absolute());
        assert_eq!(fs::metadata(&abs).unwrap().len(), 2 * GIB);
        assert!(sink.contains("(2 GB)"));
    }

    #[test]
    fn test_size_clamped_to_minimum() {
        let temp = TempDir::new().unwrap();
        let sink = RecordingSink::new();
        let abs = allocate_virtual_hdd(&temp.path().join("hdd0.img"), 0, sink.as_ref()).unwrap();
        assert_eq!(fs::metadata(&abs).unwrap().len(), GIB);
    }

    #[test]
    fn test_reallocation_resizes() {
        let temp = TempDir::new().unwrap();
        let sink = RecordingSink::new();
        let path = temp.path().join("hdd0.img");
        allocate_virtual_hdd(&path, 3, sink.as_ref()).unwrap();
        allocate_virtual_hdd(&path, 1, sink.as_ref()).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), GIB);
    }

    #[test]
    fn test_failure_is_storage_error() {
        let temp = TempDir::new().unwrap();
        let sink = RecordingSink::new();
        // Parent is a regular file
        let blocker = temp.path().join("blocker");
        fs::write(&blocker, b"x").unwrap();

        let err = allocate_virtual_hdd(&blocker.join("hdd0.img"), 1, sink.as_ref()).unwrap_err();
        assert!(matches!(err, GscxError::Storage(_)));
        assert!(sink.contains("failed to allocate virtual HDD"));
    }

    #[test]
    fn test_oversized_request_is_storage_error() {
        let temp = TempDir::new().unwrap();
        let sink = RecordingSink::new();
        let path = temp.path().join("hdd0.img");

        let err = allocate_virtual_hdd(&path, u64::MAX / 1024, sink.as_ref()).unwrap_err();
        assert!(matches!(err, GscxError::Storage(_)));
        assert!(sink.contains("virtual HDD size overflows"));
        assert!(!path.exists());
    }
}

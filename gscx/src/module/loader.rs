//! Module discovery, initialization and lifetime.

use std::path::{Path, PathBuf};

use gscx_shared::errors::{GscxError, GscxResult};

use super::{
    DylibOpener, HostServicesTable, MODULE_CATALOG, ModuleOpener, NativeModule, SinkBinding,
    default_search_dirs, entry, module_file_name,
};
use crate::bundle::BundleStaging;
use crate::logging::SharedLogSink;

/// Which standard entry points a module exported when it was loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolvedEntries {
    pub info: bool,
    pub initialize: bool,
    pub shutdown: bool,
}

/// A loaded module.
///
/// Dropping the record releases the native handle.
pub struct ModuleRecord {
    name: String,
    path: PathBuf,
    entries: ResolvedEntries,
    /// Value returned by the initializer; `None` when it was not exported.
    init_result: Option<bool>,
    module: Box<dyn NativeModule>,
}

impl ModuleRecord {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> ResolvedEntries {
        self.entries
    }

    pub fn init_result(&self) -> Option<bool> {
        self.init_result
    }

    pub fn module(&self) -> &dyn NativeModule {
        self.module.as_ref()
    }
}

impl std::fmt::Debug for ModuleRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRecord")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("entries", &self.entries)
            .field("init_result", &self.init_result)
            .finish()
    }
}

/// Loads the module catalog and owns the loaded set.
///
/// # Partial success
///
/// A module whose initializer is missing or returns `false` is still kept as
/// loaded. Callers that need a working module check
/// [`ModuleRecord::init_result`].
///
/// # Log routing
///
/// Construction binds `sink` as the process-wide target of the host services
/// callbacks, so native log lines interleave with the loader's own.
pub struct ModuleLoader {
    sink: SharedLogSink,
    opener: Box<dyn ModuleOpener>,
    host_services: HostServicesTable,
    modules: Vec<ModuleRecord>,
    staging: BundleStaging,
    _binding: SinkBinding,
}

impl ModuleLoader {
    /// Loader backed by the platform dynamic loader, staging bundles under
    /// the system temp directory.
    pub fn new(sink: SharedLogSink) -> Self {
        Self::with_opener(sink, Box::new(DylibOpener), None)
    }

    pub fn with_opener(
        sink: SharedLogSink,
        opener: Box<dyn ModuleOpener>,
        staging_root: Option<PathBuf>,
    ) -> Self {
        let binding = SinkBinding::install(sink.clone());
        Self {
            sink,
            opener,
            host_services: HostServicesTable::new(),
            modules: Vec::new(),
            staging: BundleStaging::new(staging_root),
            _binding: binding,
        }
    }

    pub fn sink(&self) -> &SharedLogSink {
        &self.sink
    }

    /// Probe `dirs` in order for every catalog module and load what exists.
    ///
    /// Returns the number of modules added. Failures are logged and skipped.
    pub fn load_all(&mut self, dirs: &[PathBuf]) -> usize {
        let before = self.modules.len();
        for dir in dirs {
            for name in MODULE_CATALOG {
                let path = dir.join(module_file_name(name));
                if !path.is_file() {
                    continue;
                }
                self.load_one(name, &path);
            }
        }
        self.modules.len() - before
    }

    /// Load from the default build locations under `cwd`, then `extra_dirs`.
    pub fn load_default(&mut self, cwd: &Path, extra_dirs: &[PathBuf]) -> usize {
        let found: Vec<PathBuf> = default_search_dirs(cwd)
            .into_iter()
            .chain(extra_dirs.iter().cloned())
            .filter(|d| d.is_dir())
            .collect();

        if found.is_empty() {
            self.sink.warn(&format!(
                "[MODULES] No module directories found under {} (looked for build/, cpp/build/, bin/)",
                cwd.display()
            ));
            return 0;
        }

        self.load_all(&found)
    }

    /// Read a bundle file, extract it, and load modules from the extraction.
    pub fn load_bundle(&mut self, bundle_path: &Path) -> GscxResult<usize> {
        let bytes = std::fs::read(bundle_path).map_err(|e| {
            let err = GscxError::BundleFormat(format!(
                "failed to open bundle {}: {}",
                bundle_path.display(),
                e
            ));
            self.sink.error(&format!("[BUNDLE] {}", err));
            err
        })?;
        self.load_bundle_bytes(&bytes)
    }

    /// Extract an in-memory bundle and load modules from it.
    pub fn load_bundle_bytes(&mut self, bytes: &[u8]) -> GscxResult<usize> {
        let dir = self.staging.extract(bytes, self.sink.as_ref())?;
        Ok(self.load_all(&[dir]))
    }

    fn load_one(&mut self, name: &str, path: &Path) {
        let module = match self.opener.open(name, path) {
            Ok(module) => module,
            Err(e) => {
                tracing::warn!(module = %name, path = %path.display(), "Module load failed: {}", e);
                self.sink
                    .error(&format!("[MODULES] Failed to load {}: {}", path.display(), e));
                return;
            }
        };
        self.sink
            .info(&format!("[MODULES] Loaded {}", path.display()));

        let file = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.to_string());

        let mut entries = ResolvedEntries {
            info: module.has_entry(entry::GET_MODULE_INFO),
            initialize: false,
            shutdown: module.has_entry(entry::SHUTDOWN),
        };
        if !entries.info {
            self.sink.warn(&format!(
                "[MODULES] Entry point {} not found in {}",
                entry::GET_MODULE_INFO,
                file
            ));
        }

        let init_result = match module.initialize(&self.host_services) {
            Ok(ok) => {
                entries.initialize = true;
                self.sink
                    .info(&format!("[MODULES] {} returned {}", entry::INITIALIZE, ok));
                if !ok {
                    let err = GscxError::Initialization(format!("{} reported failure", name));
                    tracing::warn!(module = %name, "{}", err);
                }
                Some(ok)
            }
            Err(e) => {
                tracing::debug!(module = %name, "Initializer unavailable: {}", e);
                self.sink.warn(&format!(
                    "[MODULES] Entry point {} not found in {}",
                    entry::INITIALIZE,
                    file
                ));
                None
            }
        };

        tracing::debug!(module = %name, ?entries, ?init_result, "Module recorded");
        self.modules.push(ModuleRecord {
            name: name.to_string(),
            path: path.to_path_buf(),
            entries,
            init_result,
            module,
        });
    }

    /// Shut down and release every module (most recent first), then remove
    /// the bundle staging directory.
    pub fn unload_all(&mut self) {
        while let Some(record) = self.modules.pop() {
            if let Err(e) = record.module.call_void(entry::SHUTDOWN) {
                tracing::debug!(module = %record.name, "Shutdown skipped: {}", e);
                self.sink.warn(&format!(
                    "[MODULES] {} unavailable in {}",
                    entry::SHUTDOWN,
                    record.name
                ));
            }
            self.sink
                .info(&format!("[MODULES] Unloaded {}", record.name));
        }
        self.staging.discard();
    }

    /// Loaded modules in load order.
    pub fn modules(&self) -> &[ModuleRecord] {
        &self.modules
    }

    /// First loaded module whose name starts with `prefix`.
    pub fn find(&self, prefix: &str) -> Option<&ModuleRecord> {
        self.modules.iter().find(|m| m.name.starts_with(prefix))
    }

    pub fn is_loaded(&self, prefix: &str) -> bool {
        self.find(prefix).is_some()
    }

    /// Directory the last bundle was extracted into.
    pub fn staging_dir(&self) -> Option<&Path> {
        self.staging.current()
    }
}

impl Drop for ModuleLoader {
    fn drop(&mut self) {
        if !self.modules.is_empty() || self.staging.current().is_some() {
            self.unload_all();
        }
    }
}

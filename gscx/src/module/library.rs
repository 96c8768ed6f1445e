//! Dynamic library loading for native modules.
//!
//! Thin cross-platform wrapper over `dlopen`/`LoadLibraryW`, plus the
//! `NativeModule` implementation backed by it.

use std::ffi::{CStr, CString, c_void};
use std::path::Path;

use gscx_shared::errors::{GscxError, GscxResult};
use thiserror::Error;

use super::{HostServicesC, HostServicesTable, ModuleOpener, NativeModule, entry};

/// Errors that can occur during library loading.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Library file not found or could not be loaded (bad format, missing
    /// dependencies).
    #[error("library could not be loaded: {path}")]
    NotFound { path: String },

    #[error("symbol not found: {symbol} in {library}")]
    SymbolNotFound { symbol: String, library: String },

    #[error("platform error: {0}")]
    PlatformError(String),

    #[error("invalid UTF-8 in path: {0}")]
    InvalidPath(String),
}

impl From<LoadError> for GscxError {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::SymbolNotFound { symbol, library } => GscxError::EntryPoint {
                symbol,
                module: library,
            },
            other => GscxError::ModuleLoad(other.to_string()),
        }
    }
}

/// Cross-platform dynamic library handle. Unloaded on drop.
pub struct Library {
    handle: LibraryHandle,
    path: String,
}

impl Library {
    /// Load a dynamic library.
    ///
    /// - **Unix**: `dlopen(RTLD_NOW | RTLD_LOCAL)`
    /// - **Windows**: `LoadLibraryW`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let path_ref = path.as_ref();
        let path_str = path_ref
            .to_str()
            .ok_or_else(|| LoadError::InvalidPath(format!("{:?}", path_ref)))?;

        let handle = LibraryHandle::load(path_str)?;

        Ok(Library {
            handle,
            path: path_str.to_string(),
        })
    }

    /// Get a symbol by name.
    ///
    /// # Safety
    ///
    /// `T` must match the exported symbol's real type, and the value must not
    /// outlive this library.
    pub unsafe fn get<T>(&self, symbol: &str) -> Result<T, LoadError> {
        // SAFETY: forwarded from the caller.
        unsafe { self.handle.symbol(symbol, &self.path) }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

type BoolEntry = unsafe extern "C" fn() -> bool;
type VoidEntry = unsafe extern "C" fn();
type InitEntry = unsafe extern "C" fn(*const HostServicesC) -> bool;

/// `NativeModule` backed by a dynamically loaded library.
pub struct DylibModule {
    name: String,
    library: Library,
}

impl DylibModule {
    pub fn new(name: impl Into<String>, library: Library) -> Self {
        Self {
            name: name.into(),
            library,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl NativeModule for DylibModule {
    fn has_entry(&self, symbol: &str) -> bool {
        // SAFETY: only the address is inspected, never called.
        unsafe { self.library.get::<*mut c_void>(symbol) }.is_ok()
    }

    fn initialize(&self, host: &HostServicesTable) -> GscxResult<bool> {
        // SAFETY: module ABI fixes `bool GSCX_Initialize(const HostServicesC*)`.
        let init: InitEntry = unsafe { self.library.get(entry::INITIALIZE) }?;
        // SAFETY: the table outlives the call; the loader keeps it boxed.
        Ok(unsafe { init(host.as_ptr()) })
    }

    fn call_bool(&self, symbol: &str) -> GscxResult<bool> {
        // SAFETY: stage entries are `bool (void)` by contract.
        let func: BoolEntry = unsafe { self.library.get(symbol) }?;
        Ok(unsafe { func() })
    }

    fn call_void(&self, symbol: &str) -> GscxResult<()> {
        // SAFETY: shutdown and recovery entries are `void (void)` by contract.
        let func: VoidEntry = unsafe { self.library.get(symbol) }?;
        unsafe { func() };
        Ok(())
    }
}

/// Opens modules with the platform dynamic loader.
#[derive(Debug, Default, Clone, Copy)]
pub struct DylibOpener;

impl ModuleOpener for DylibOpener {
    fn open(&self, name: &str, path: &Path) -> GscxResult<Box<dyn NativeModule>> {
        let library = Library::open(path)?;
        Ok(Box::new(DylibModule::new(name, library)))
    }
}

// Platform-specific implementations

#[cfg(unix)]
type LibraryHandle = UnixLibrary;

#[cfg(windows)]
type LibraryHandle = WindowsLibrary;

// ============================================================================
// Unix Implementation (Linux, macOS, BSD)
// ============================================================================

#[cfg(unix)]
struct UnixLibrary {
    handle: *mut c_void,
}

#[cfg(unix)]
impl UnixLibrary {
    fn load(path: &str) -> Result<Self, LoadError> {
        let c_path = CString::new(path)
            .map_err(|e| LoadError::PlatformError(format!("Invalid path: {}", e)))?;

        // RTLD_NOW: fail at load time on unresolved dependencies
        // RTLD_LOCAL: keep module symbols out of the global namespace
        let handle = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };

        if handle.is_null() {
            return Err(LoadError::NotFound {
                path: format!("{}: {}", path, last_dl_error()),
            });
        }

        Ok(UnixLibrary { handle })
    }

    unsafe fn symbol<T>(&self, name: &str, lib_path: &str) -> Result<T, LoadError> {
        let c_name = CString::new(name)
            .map_err(|e| LoadError::PlatformError(format!("Invalid symbol name: {}", e)))?;

        // SAFETY: handle is a live dlopen handle; dlerror is reset first so a
        // stale error is not misreported.
        let symbol = unsafe {
            libc::dlerror();
            libc::dlsym(self.handle, c_name.as_ptr())
        };

        if symbol.is_null() {
            return Err(LoadError::SymbolNotFound {
                symbol: name.to_string(),
                library: lib_path.to_string(),
            });
        }

        // SAFETY: caller guarantees T is the symbol's pointer type.
        Ok(unsafe { std::mem::transmute_copy(&symbol) })
    }
}

#[cfg(unix)]
fn last_dl_error() -> String {
    // SAFETY: dlerror returns a thread-local string or null.
    unsafe {
        let err_ptr = libc::dlerror();
        if err_ptr.is_null() {
            "unknown error".to_string()
        } else {
            CStr::from_ptr(err_ptr).to_string_lossy().into_owned()
        }
    }
}

#[cfg(unix)]
impl Drop for UnixLibrary {
    fn drop(&mut self) {
        unsafe {
            libc::dlclose(self.handle);
        }
    }
}

#[cfg(unix)]
unsafe impl Send for UnixLibrary {}

// ============================================================================
// Windows Implementation
// ============================================================================

#[cfg(windows)]
struct WindowsLibrary {
    handle: *mut c_void,
}

#[cfg(windows)]
impl WindowsLibrary {
    fn load(path: &str) -> Result<Self, LoadError> {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;

        let wide: Vec<u16> = OsStr::new(path)
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        let handle = unsafe { LoadLibraryW(wide.as_ptr()) };

        if handle.is_null() {
            let error = unsafe { GetLastError() };
            return Err(LoadError::NotFound {
                path: format!("{} (error code: {})", path, error),
            });
        }

        Ok(WindowsLibrary { handle })
    }

    unsafe fn symbol<T>(&self, name: &str, lib_path: &str) -> Result<T, LoadError> {
        let c_name = CString::new(name)
            .map_err(|e| LoadError::PlatformError(format!("Invalid symbol name: {}", e)))?;

        let symbol = unsafe { GetProcAddress(self.handle, c_name.as_ptr()) };

        if symbol.is_null() {
            return Err(LoadError::SymbolNotFound {
                symbol: name.to_string(),
                library: lib_path.to_string(),
            });
        }

        Ok(unsafe { std::mem::transmute_copy(&symbol) })
    }
}

#[cfg(windows)]
impl Drop for WindowsLibrary {
    fn drop(&mut self) {
        unsafe {
            FreeLibrary(self.handle);
        }
    }
}

#[cfg(windows)]
unsafe impl Send for WindowsLibrary {}

#[cfg(windows)]
unsafe extern "system" {
    fn LoadLibraryW(filename: *const u16) -> *mut c_void;
    fn GetProcAddress(module: *mut c_void, procname: *const c_char) -> *mut c_void;
    fn FreeLibrary(module: *mut c_void) -> i32;
    fn GetLastError() -> u32;
}

#[cfg(windows)]
use std::ffi::c_char;

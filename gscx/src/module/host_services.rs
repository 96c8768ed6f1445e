//! Host services table handed to native initializers.
//!
//! The C ABI carries no context pointer, so the log callbacks are plain
//! functions that forward into a process-wide sink slot. A `ModuleLoader`
//! owns the slot through a [`SinkBinding`]; one active loader per process is
//! assumed.

use std::ffi::{CStr, c_char};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::logging::{LogLevel, SharedLogSink};

/// `void (*)(const char*)` with the platform's system calling convention
/// (`stdcall` on 32-bit Windows, C everywhere else).
pub type LogFn = extern "system" fn(*const c_char);

/// C layout of the services table, field order is ABI.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct HostServicesC {
    pub log_info: LogFn,
    pub log_warn: LogFn,
    pub log_error: LogFn,
}

/// Owned services table with a stable address for the lifetime of the loader.
pub struct HostServicesTable {
    raw: Box<HostServicesC>,
}

impl HostServicesTable {
    /// Table whose three callbacks forward into the active sink.
    pub fn new() -> Self {
        Self {
            raw: Box::new(HostServicesC {
                log_info: host_log_info,
                log_warn: host_log_warn,
                log_error: host_log_error,
            }),
        }
    }

    /// Pointer passed to `GSCX_Initialize`.
    pub fn as_ptr(&self) -> *const HostServicesC {
        &*self.raw
    }
}

impl Default for HostServicesTable {
    fn default() -> Self {
        Self::new()
    }
}

static ACTIVE_SINK: RwLock<Option<SharedLogSink>> = parking_lot::const_rwlock(None);

/// Currently bound sink, if any.
pub fn active_sink() -> Option<SharedLogSink> {
    ACTIVE_SINK.read().clone()
}

/// Binds a sink into the process-wide slot; unbinds on drop unless another
/// binding replaced it in the meantime.
pub struct SinkBinding {
    sink: SharedLogSink,
}

impl SinkBinding {
    pub fn install(sink: SharedLogSink) -> Self {
        let previous = ACTIVE_SINK.write().replace(Arc::clone(&sink));
        if previous.is_some() {
            tracing::debug!("replacing active log sink");
        }
        Self { sink }
    }
}

impl Drop for SinkBinding {
    fn drop(&mut self) {
        let mut slot = ACTIVE_SINK.write();
        if slot.as_ref().is_some_and(|s| Arc::ptr_eq(s, &self.sink)) {
            *slot = None;
        }
    }
}

fn forward(level: LogLevel, message: *const c_char) {
    if message.is_null() {
        return;
    }
    // SAFETY: modules pass NUL-terminated strings that stay valid for the call.
    let text = unsafe { CStr::from_ptr(message) }.to_string_lossy();

    // Clone out of the lock so a sink may log re-entrantly.
    let sink = active_sink();
    let result = catch_unwind(AssertUnwindSafe(|| match sink {
        Some(sink) => sink.log(level, &text),
        None => tracing::debug!(target: "gscx::native", severity = %level, "{}", text.trim_end()),
    }));
    if result.is_err() {
        tracing::error!("log sink panicked while handling native message");
    }
}

extern "system" fn host_log_info(message: *const c_char) {
    forward(LogLevel::Info, message);
}

extern "system" fn host_log_warn(message: *const c_char) {
    forward(LogLevel::Warn, message);
}

extern "system" fn host_log_error(message: *const c_char) {
    forward(LogLevel::Error, message);
}

//! GSCore bundle container.
//!
//! A bundle packages several native module files into one blob:
//!
//! ```text
//! +---------------------------+
//! | magic  u32  0x47534352    |  "GSCR", little-endian
//! | version u16               |
//! | count  u16                |
//! +---------------------------+
//! | count x entry:            |
//! |   kind     u16            |
//! |   name_len u16            |
//! |   name     [name_len] u8  |  UTF-8, may contain '/'
//! |   offset   u32            |  absolute offset into the bundle
//! |   size     u32            |
//! +---------------------------+
//! | payloads                  |  addressed by (offset, size)
//! +---------------------------+
//! ```
//!
//! Payloads are not inline after their entry header; each entry points into
//! the buffer by absolute offset.

mod extract;
mod format;

pub use extract::BundleStaging;
pub use format::{BundleTable, pack, parse};

/// Bundle magic, `'GSCR'` read as a little-endian `u32`.
pub const GSCORE_MAGIC: u32 = 0x4753_4352;

/// Version written by [`pack`].
pub const GSCORE_VERSION: u16 = 1;

/// Size of the fixed header (magic + version + count).
pub const HEADER_LEN: usize = 8;

/// Known entry kinds. Other values are carried through untouched.
pub mod kinds {
    pub const CPU_CELL: u16 = 1;
    pub const GPU_RSX: u16 = 2;
    pub const RECOVERY: u16 = 3;
}

/// One entry of the bundle table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleEntry {
    pub kind: u16,
    pub name: String,
    pub payload_offset: u32,
    pub size: u32,
}

impl BundleEntry {
    /// Byte range of the payload inside the bundle.
    pub fn payload_range(&self) -> std::ops::Range<usize> {
        let start = self.payload_offset as usize;
        start..start + self.size as usize
    }
}

/// Input for [`pack`]: a named payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackInput {
    pub kind: u16,
    pub name: String,
    pub data: Vec<u8>,
}

impl PackInput {
    pub fn new(kind: u16, name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            name: name.into(),
            data: data.into(),
        }
    }
}

//! Types shared between the GSCX core and its front-ends.

pub mod errors;

pub use errors::{GscxError, GscxResult};

pub mod core;
pub mod layout;
pub mod options;

pub use self::core::GscxRuntime;
pub use layout::FilesystemLayout;
pub use options::{GscxOptions, HOME_ENV};

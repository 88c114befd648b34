//! Public types shared across the crate

mod config;
mod error;
mod version;

pub use config::NotebookConfig;
pub use error::{ErrorCode, NotebookError, Result, Severity};
pub use version::ManimVersion;

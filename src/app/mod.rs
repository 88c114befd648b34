//! The `manim-notebook` application
//!
//! This module wires the library together for the binary:
//! - Building the controller, terminal host and settings watcher
//! - Parsing and running notebook commands read from stdin
//! - Logging setup and signal handling

mod core;
mod handlers;
mod runner;

pub use core::NotebookApp;
pub use handlers::{CommandContext, ParseError, ReplCommand, parse_command};
pub use runner::run_with_cli;

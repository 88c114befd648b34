//! ManimGL session management
//!
//! This module handles:
//! - The session state machine (`SessionController`): which terminal hosts
//!   the REPL, the unit-of-work counter, startup and executing locks
//! - Command dispatch with completion detection
//! - Building the ManimGL command line
//! - Resolving configuration from settings and environment

mod command;
mod config;
mod confirm;
mod controller;
mod dispatch;
mod events;
mod state;

#[cfg(test)]
pub(crate) mod test_support;

pub use command::{BootstrapTarget, CLEAR_COMMAND, CheckpointMode, ManimCommand, reload_command};
pub use config::{DEFAULT_PROGRAM, DEFAULT_TERMINAL_NAME, InterruptPolicy, SessionConfig};
pub use confirm::{AutoConfirm, ConfirmPrompt, auto_confirm};
pub use controller::SessionController;
pub use dispatch::{CommandHandlers, CommandRequest};
pub use events::{CommandOutcome, SessionEvent};
pub use state::{SessionHandle, SessionSnapshot, SessionState};

//! ManimGL Notebook
//!
//! Drives an interactive ManimGL session hosted in a terminal from
//! notebook-style editor commands.
//!
//! ## Features
//!
//! - Session state machine that infers the REPL's lifecycle from its output
//! - Command dispatch with completion detection, interrupts and restarts
//! - Manim cell (`##`) and scene class locators
//! - Process-backed and in-memory terminal hosts
//! - Layered settings with live reload
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use manim_notebook::session::{BootstrapTarget, CommandRequest, SessionConfig, SessionController};
//! use manim_notebook::terminal::ProcessTerminalHost;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let host = Arc::new(ProcessTerminalHost::new());
//!     let controller = SessionController::new(host, SessionConfig::default());
//!
//!     let target = BootstrapTarget::new("scenes/intro.py", "Intro", Some(12));
//!     controller
//!         .execute_in_session_or_bootstrap(CommandRequest::new("self.play(FadeIn(circle))"), &target)
//!         .await?;
//!
//!     controller.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! - `MANIMGL_PATH`: ManimGL executable (default: `manimgl`)
//! - `MANIM_NOTEBOOK_SHELL`: Shell for new terminals
//! - `MANIM_NOTEBOOK_STARTUP_TIMEOUT_MS`: How long to wait for the welcome banner
//! - `MANIM_NOTEBOOK_DELAY_NEW_TERMINAL_MS`: Pause before starting ManimGL in a new terminal
//!
//! ## Configuration Loading Priority
//!
//! 1. **Environment Variables** - Override all other sources
//! 2. **Settings Files** - Merged, local over project over user
//! 3. **Defaults** - Fallback values
//!
//! Settings files are loaded from:
//! - `~/.manim-notebook/settings.json` (user settings)
//! - `.manim-notebook/settings.json` (project settings)
//! - `.manim-notebook/settings.local.json` (local settings, highest priority among settings files)
//!
//! ### Example settings.json
//!
//! ```json
//! {
//!   "manimglPath": "/opt/manim/bin/manimgl",
//!   "confirmKillingActiveScene": false,
//!   "autoreload": true,
//!   "env": { "PYTHONWARNINGS": "ignore" }
//! }
//! ```

pub mod app;
pub mod cells;
pub mod classifier;
pub mod cli;
pub mod notebook;
pub mod session;
pub mod settings;
pub mod terminal;
pub mod tracing;
pub mod types;

pub use app::{NotebookApp, run_with_cli};
pub use cli::Cli;
pub use notebook::{Clipboard, Notebook};
pub use session::{CommandOutcome, CommandRequest, SessionConfig, SessionController, SessionEvent};
pub use settings::{Settings, SettingsManager};
pub use terminal::{HostTerminal, MemoryTerminalHost, ProcessTerminalHost, TerminalHost};
pub use types::{NotebookConfig, NotebookError, Result};

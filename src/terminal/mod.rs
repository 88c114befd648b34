//! Host terminal abstraction
//!
//! The session controller never owns a process directly. It asks a
//! `TerminalHost` for a terminal, sends text into it and listens to the
//! terminal's event stream:
//! - `Output`: a chunk of raw, control-code-laden output
//! - `ExecutionEnded`: a structured command finished (shell integration)
//! - `Closed`: the terminal itself went away
//!
//! Two hosts are provided: `ProcessTerminalHost` runs a real shell in its own
//! process group, `MemoryTerminalHost` is driven by hand (tests, embedders
//! that bridge an editor's terminal).

mod child;
pub mod memory;
mod process;

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::types::Result;

pub use child::WrappedChild;
pub use memory::{MemoryTerminal, MemoryTerminalHost, SentText};
pub use process::{ProcessTerminal, ProcessTerminalHost};

/// Event emitted by a host terminal, in emission order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalEvent {
    /// Raw output chunk
    Output(String),
    /// A command sent with structured execution finished
    ExecutionEnded { exit_code: Option<i32> },
    /// The terminal was closed (by the user or because its shell exited)
    Closed,
}

/// Receiving end of a terminal's event stream
pub type TerminalEvents = mpsc::UnboundedReceiver<TerminalEvent>;

/// Unique terminal identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TerminalId(Arc<str>);

impl TerminalId {
    /// Fresh random id
    pub fn generate() -> Self {
        Self(format!("term-{}", Uuid::new_v4().simple()).into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TerminalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TerminalId {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}

/// Options for creating a terminal
#[derive(Debug, Clone, Default)]
pub struct TerminalOptions {
    /// Display name
    pub name: String,
    /// Shell program; host default when unset
    pub shell: Option<String>,
    /// Working directory
    pub cwd: Option<PathBuf>,
    /// Extra environment variables
    pub env: HashMap<String, String>,
}

impl TerminalOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = Some(shell.into());
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }
}

/// A terminal owned by the host
#[async_trait]
pub trait HostTerminal: Send + Sync + fmt::Debug {
    fn id(&self) -> &TerminalId;

    fn name(&self) -> &str;

    /// Send a line of text; a newline is appended
    ///
    /// With `structured`, the host runs the text as a shell command and emits
    /// `ExecutionEnded` when it finishes, if it can. Otherwise the text is
    /// injected as raw input.
    async fn send_text(&self, text: &str, structured: bool) -> Result<()>;

    /// Interrupt whatever runs in the terminal (Ctrl+C)
    async fn interrupt(&self) -> Result<()>;

    /// Exit status of the terminal's own process, once it has exited
    fn exit_status(&self) -> Option<i32>;

    /// Bring the terminal into view
    fn reveal(&self) {}

    /// Tear the terminal down; further calls are no-ops
    async fn dispose(&self);
}

/// Factory for host terminals
#[async_trait]
pub trait TerminalHost: Send + Sync + fmt::Debug {
    async fn create(&self, options: TerminalOptions)
    -> Result<(Arc<dyn HostTerminal>, TerminalEvents)>;
}

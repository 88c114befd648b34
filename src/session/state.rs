//! Session state guarded by the controller's lock

use std::collections::HashMap;
use std::sync::Arc;

use crate::classifier::ProgressTracker;
use crate::terminal::{HostTerminal, TerminalId};
use crate::types::ManimVersion;

/// Which terminal, if any, the session lives in
#[derive(Debug, Clone, Default)]
pub enum SessionHandle {
    #[default]
    None,
    /// Spawned and sent the start command, banner not seen yet
    Bootstrapping(Arc<dyn HostTerminal>),
    /// Hosting a running REPL
    Active(Arc<dyn HostTerminal>),
}

impl SessionHandle {
    pub fn terminal(&self) -> Option<&Arc<dyn HostTerminal>> {
        match self {
            Self::None => None,
            Self::Bootstrapping(terminal) | Self::Active(terminal) => Some(terminal),
        }
    }

    pub fn active(&self) -> Option<&Arc<dyn HostTerminal>> {
        match self {
            Self::Active(terminal) => Some(terminal),
            _ => None,
        }
    }

    /// Whether output from `id` may change session state
    pub fn is_current(&self, id: &TerminalId) -> bool {
        self.terminal().is_some_and(|t| t.id() == id)
    }

    pub fn is_bootstrapping(&self, id: &TerminalId) -> bool {
        matches!(self, Self::Bootstrapping(t) if t.id() == id)
    }

    pub fn is_active(&self, id: &TerminalId) -> bool {
        matches!(self, Self::Active(t) if t.id() == id)
    }

    pub fn take(&mut self) -> Option<Arc<dyn HostTerminal>> {
        match std::mem::take(self) {
            Self::None => None,
            Self::Bootstrapping(terminal) | Self::Active(terminal) => Some(terminal),
        }
    }
}

/// Coarse state for status displays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NoSession,
    Bootstrapping,
    Idle,
    Busy,
}

/// Point-in-time copy of the session state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub terminal: Option<TerminalId>,
    pub unit_counter: u64,
    pub startup_lock: bool,
    pub executing_lock: bool,
    pub pending_restart: bool,
    pub version: Option<ManimVersion>,
    pub generation: u64,
}

#[derive(Debug, Default)]
pub(crate) struct SessionInner {
    pub handle: SessionHandle,
    /// Terminals whose banner may start (or take over) the session
    pub known: HashMap<TerminalId, Arc<dyn HostTerminal>>,
    /// Terminals whose start failed, disposed by the next start
    pub failed_bootstraps: Vec<TerminalId>,
    pub unit_counter: u64,
    pub pending_restart: bool,
    pub startup_lock: bool,
    pub executing_lock: bool,
    /// Identifies the command holding the executing lock
    pub command_ticket: u64,
    pub suppress_close_detection: bool,
    /// Version from the most recent banner; survives resets
    pub version: Option<ManimVersion>,
    /// Bumped on every reset, so stale guards and waiters can tell
    pub generation: u64,
    pub progress: ProgressTracker,
}

impl SessionInner {
    /// Clear the session, keeping `known` terminals, failed starts and the last version
    pub fn clear(&mut self) {
        self.handle = SessionHandle::None;
        self.unit_counter = 0;
        self.pending_restart = false;
        self.startup_lock = false;
        self.executing_lock = false;
        self.suppress_close_detection = false;
        self.generation += 1;
        self.progress.reset();
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = match &self.handle {
            SessionHandle::None => SessionState::NoSession,
            SessionHandle::Bootstrapping(_) => SessionState::Bootstrapping,
            SessionHandle::Active(_) if self.executing_lock => SessionState::Busy,
            SessionHandle::Active(_) => SessionState::Idle,
        };
        SessionSnapshot {
            state,
            terminal: self.handle.terminal().map(|t| t.id().clone()),
            unit_counter: self.unit_counter,
            startup_lock: self.startup_lock,
            executing_lock: self.executing_lock,
            pending_restart: self.pending_restart,
            version: self.version,
            generation: self.generation,
        }
    }
}

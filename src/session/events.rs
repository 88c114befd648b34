//! Events published by the session controller

use std::time::Duration;

use crate::classifier::ProgressUpdate;
use crate::terminal::TerminalId;
use crate::types::ManimVersion;

/// Everything observers can learn about the session
///
/// Events are published on a broadcast channel in the order the controller
/// processed them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A terminal printed the welcome banner and now hosts the session
    BannerDetected {
        terminal: TerminalId,
        version: Option<ManimVersion>,
    },
    /// The REPL showed prompt `In [unit]:`
    UnitStarted { unit: u64 },
    /// The awaited restart after `reload()` happened
    Restarted,
    /// An `INFO` log line was printed
    InfoLogged,
    /// The running command was aborted with a KeyboardInterrupt
    Interrupted,
    /// A traceback from inside the REPL
    ErrorDetected { cell: u64, line: u64 },
    /// Output of the hosting terminal, control sequences removed
    Data(String),
    Progress(ProgressUpdate),
    /// A command was written to the REPL
    CommandIssued { command: String },
    /// Still waiting for the welcome banner
    StartupProgress { elapsed: Duration, timeout: Duration },
    /// The session could not be started, or a command was cut off by the
    /// terminal closing
    StartFailed { reason: String },
    /// ManimGL exited on its own
    SessionEnded { exit_code: Option<i32> },
    /// All session state was cleared
    Reset,
}

impl SessionEvent {
    /// Whether the event ends a session generation
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::SessionEnded { .. } | Self::Reset)
    }
}

/// How a waited-for command came to an end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// A new unit of work started after the command was sent
    Finished,
    /// The command was aborted
    Interrupted,
    /// The session went away before the command finished
    SessionEnded,
    /// The command was sent without waiting
    Issued,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_events() {
        assert!(SessionEvent::Reset.is_terminal());
        assert!(SessionEvent::SessionEnded { exit_code: Some(0) }.is_terminal());
        assert!(!SessionEvent::Interrupted.is_terminal());
        assert!(!SessionEvent::UnitStarted { unit: 3 }.is_terminal());
    }
}

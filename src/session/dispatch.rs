//! Command dispatch
//!
//! The outward-facing way to run code in the session. A command counts as
//! finished when a prompt numbered higher than the counter at send time
//! shows up, or immediately when it is interrupted.
//!
//! Each command owns a `CommandWaiter` from the moment the executing lock is
//! taken. The waiter holds the command's handlers and releases the lock when
//! dropped, so neither the lock nor the handlers outlive the command, whether
//! it finishes, is interrupted, or the session goes away.

use std::fmt;
use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};

use super::command::{BootstrapTarget, reload_command};
use super::config::InterruptPolicy;
use super::controller::SessionController;
use super::events::{CommandOutcome, SessionEvent};
use crate::types::{ManimVersion, NotebookError, Result};

type Callback = Box<dyn FnMut() + Send>;
type DataCallback = Box<dyn FnMut(&str) + Send>;

/// Callbacks scoped to one command
#[derive(Default)]
pub struct CommandHandlers {
    on_command_issued: Option<Callback>,
    on_data: Option<DataCallback>,
    on_reset: Option<Callback>,
}

impl fmt::Debug for CommandHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandHandlers")
            .field("on_command_issued", &self.on_command_issued.is_some())
            .field("on_data", &self.on_data.is_some())
            .field("on_reset", &self.on_reset.is_some())
            .finish()
    }
}

impl CommandHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once the command text was written to the REPL
    pub fn on_command_issued(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_command_issued = Some(Box::new(f));
        self
    }

    /// Called with each output chunk until the command completes
    pub fn on_data(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_data = Some(Box::new(f));
        self
    }

    /// Called if the session goes away before the command completes
    pub fn on_reset(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_reset = Some(Box::new(f));
        self
    }

    fn command_issued(&mut self) {
        if let Some(f) = self.on_command_issued.as_mut() {
            f();
        }
    }

    fn data(&mut self, chunk: &str) {
        if let Some(f) = self.on_data.as_mut() {
            f(chunk);
        }
    }

    fn reset(&mut self) {
        if let Some(f) = self.on_reset.as_mut() {
            f();
        }
    }
}

/// Code to run in the session
#[derive(Debug)]
pub struct CommandRequest {
    pub command: String,
    /// Block until the command finished
    pub wait: bool,
    pub handlers: CommandHandlers,
    /// Completion is the REPL restarting at prompt 1
    restart: bool,
}

impl CommandRequest {
    /// A command that is waited for
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            wait: true,
            handlers: CommandHandlers::default(),
            restart: false,
        }
    }

    pub fn wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }

    pub fn handlers(mut self, handlers: CommandHandlers) -> Self {
        self.handlers = handlers;
        self
    }

    fn expect_restart(mut self) -> Self {
        self.restart = true;
        self
    }
}

/// Watches session events until one command completes
struct CommandWaiter {
    controller: Arc<SessionController>,
    rx: broadcast::Receiver<SessionEvent>,
    baseline: u64,
    generation: u64,
    ticket: u64,
    restart: bool,
    handlers: CommandHandlers,
}

impl CommandWaiter {
    async fn run(mut self) -> CommandOutcome {
        let outcome = loop {
            match self.rx.recv().await {
                Ok(SessionEvent::Data(chunk)) => self.handlers.data(&chunk),
                Ok(SessionEvent::Interrupted) => break CommandOutcome::Interrupted,
                Ok(SessionEvent::UnitStarted { unit }) if !self.restart && unit > self.baseline => {
                    break CommandOutcome::Finished;
                }
                Ok(SessionEvent::Restarted) if self.restart => break CommandOutcome::Finished,
                Ok(event) if event.is_terminal() => break CommandOutcome::SessionEnded,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Command waiter lagged behind session events");
                    if let Some(outcome) = self.controller.command_status(
                        self.generation,
                        self.baseline,
                        self.restart,
                    ) {
                        break outcome;
                    }
                }
                Err(RecvError::Closed) => break CommandOutcome::SessionEnded,
            }
        };
        if outcome == CommandOutcome::SessionEnded {
            self.handlers.reset();
        }
        tracing::debug!(outcome = ?outcome, "Command completed");
        outcome
    }
}

impl Drop for CommandWaiter {
    fn drop(&mut self) {
        self.controller
            .finish_command(self.generation, self.ticket, self.restart);
    }
}

impl SessionController {
    /// Run `request`, starting a session at `target` first if none is running
    ///
    /// Fails with `LockedStartup` while another start is in progress; the
    /// caller has to retry.
    pub async fn execute_in_session_or_bootstrap(
        self: &Arc<Self>,
        request: CommandRequest,
        target: &BootstrapTarget,
    ) -> Result<CommandOutcome> {
        if !self.has_active_session() {
            if self.lock().startup_lock {
                return Err(NotebookError::LockedStartup);
            }
            self.start_session(target).await?;
        }
        self.execute_require_active(request, false).await
    }

    /// Run `request` in the running session
    ///
    /// If a command is still executing it is interrupted first, unless
    /// interrupting is destructive on this platform: then the request is
    /// rejected with `ConcurrentExecution` unless `force` is set.
    pub async fn execute_require_active(
        self: &Arc<Self>,
        request: CommandRequest,
        force: bool,
    ) -> Result<CommandOutcome> {
        self.ensure_ready(force).await?;
        self.send_command(request).await
    }

    /// `reload()` the scene file and restart the REPL at one-based `line`
    ///
    /// Needs ManimGL 1.7.2 or newer.
    pub async fn reload_and_restart(
        self: &Arc<Self>,
        line: usize,
        wait: bool,
    ) -> Result<CommandOutcome> {
        if !self.has_active_session() {
            return Err(NotebookError::NoActiveSession);
        }
        let found = self.version();
        if !found.is_some_and(|v| v.at_least(ManimVersion::RELOAD)) {
            return Err(NotebookError::UnsupportedVersion {
                required: ManimVersion::RELOAD.to_string(),
                found: found.map_or_else(|| "unknown".to_string(), |v| v.to_string()),
            });
        }
        let request = CommandRequest::new(reload_command(line))
            .wait(wait)
            .expect_restart();
        self.execute_require_active(request, false).await
    }

    async fn ensure_ready(&self, force: bool) -> Result<()> {
        let busy = {
            let inner = self.lock();
            if inner.startup_lock {
                return Err(NotebookError::LockedStartup);
            }
            let Some(terminal) = inner
                .handle
                .active()
                .filter(|terminal| terminal.exit_status().is_none())
            else {
                return Err(NotebookError::NoActiveSession);
            };
            inner.executing_lock.then(|| terminal.clone())
        };
        let Some(terminal) = busy else {
            return Ok(());
        };

        let config = self.config();
        if config.interrupt_policy == InterruptPolicy::Destructive && !force {
            tracing::warn!("Rejecting command while another one is executing");
            return Err(NotebookError::ConcurrentExecution);
        }
        tracing::info!(terminal_id = %terminal.id(), "Interrupting running command");
        terminal.interrupt().await?;
        tokio::time::sleep(config.interrupt_settle).await;
        Ok(())
    }

    async fn send_command(self: &Arc<Self>, mut request: CommandRequest) -> Result<CommandOutcome> {
        let (terminal, mut waiter) = {
            let mut inner = self.lock();
            let Some(terminal) = inner.handle.active().cloned() else {
                return Err(NotebookError::NoActiveSession);
            };
            inner.executing_lock = true;
            inner.command_ticket += 1;
            inner.suppress_close_detection = true;
            if request.restart {
                inner.pending_restart = true;
            }
            inner.progress.reset();
            let waiter = CommandWaiter {
                controller: Arc::clone(self),
                rx: self.subscribe(),
                baseline: inner.unit_counter,
                generation: inner.generation,
                ticket: inner.command_ticket,
                restart: request.restart,
                handlers: std::mem::take(&mut request.handlers),
            };
            (terminal, waiter)
        };

        let sent = terminal.send_text(&request.command, false).await;
        self.release_close_suppression(waiter.generation);
        sent?;

        tracing::debug!(
            terminal_id = %terminal.id(),
            unit = waiter.baseline,
            command = %request.command,
            "Command issued"
        );
        self.emit(SessionEvent::CommandIssued {
            command: request.command,
        });
        waiter.handlers.command_issued();

        if request.wait {
            Ok(waiter.run().await)
        } else {
            tokio::spawn(waiter.run());
            Ok(CommandOutcome::Issued)
        }
    }

    /// Outcome derivable from state alone, after missing events
    fn command_status(&self, generation: u64, baseline: u64, restart: bool) -> Option<CommandOutcome> {
        let inner = self.lock();
        if inner.generation != generation {
            Some(CommandOutcome::SessionEnded)
        } else if (restart && !inner.pending_restart) || (!restart && inner.unit_counter > baseline) {
            Some(CommandOutcome::Finished)
        } else {
            None
        }
    }

    fn finish_command(&self, generation: u64, ticket: u64, restart: bool) {
        let mut inner = self.lock();
        // A newer command may hold the lock by now
        if inner.generation == generation && inner.command_ticket == ticket {
            inner.executing_lock = false;
            if restart {
                inner.pending_restart = false;
            }
        }
    }
}

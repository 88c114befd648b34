//! The session state machine
//!
//! One `SessionController` owns the (at most one) terminal hosting a ManimGL
//! REPL. Every terminal it knows about gets a pump task that classifies the
//! terminal's output and feeds the resulting signals back into the
//! controller. All state lives behind a single lock: deciding whether a
//! chunk belongs to the current terminal and swapping the current terminal
//! happen under that same lock, so output from a superseded terminal can
//! never touch the new session.
//!
//! State changes are published as `SessionEvent`s while the lock is held,
//! which keeps event order identical to state order for every subscriber.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use futures::stream::BoxStream;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::Instant;

use super::command::{BootstrapTarget, ManimCommand};
use super::config::SessionConfig;
use super::confirm::{ConfirmPrompt, auto_confirm};
use super::events::SessionEvent;
use super::state::{SessionHandle, SessionInner, SessionSnapshot};
use crate::classifier::{
    ClassifiedChunk, CounterUpdate, OutputClassifier, Signal, resolve_prompt_counter,
};
use crate::terminal::{
    HostTerminal, TerminalEvent, TerminalEvents, TerminalHost, TerminalId, TerminalOptions,
};
use crate::types::{ManimVersion, NotebookError, Result};

const EVENT_CAPACITY: usize = 256;

/// Ctrl+U: clears IPython's pending continuation line; the newline sent
/// with it runs the buffered block
const FLUSH_CONTINUATION: &str = "\x15";

/// Lower bound for startup progress slices
const MIN_PROGRESS_SLICE: Duration = Duration::from_millis(10);

/// Drives a ManimGL REPL hosted in a terminal
#[derive(Debug)]
pub struct SessionController {
    host: Arc<dyn TerminalHost>,
    prompt: Arc<dyn ConfirmPrompt>,
    config: RwLock<SessionConfig>,
    inner: Mutex<SessionInner>,
    events: broadcast::Sender<SessionEvent>,
}

/// Terminal work decided under the lock, performed after releasing it
#[derive(Debug, Default)]
struct FollowUp {
    generation: u64,
    quit: Option<Arc<dyn HostTerminal>>,
    flush_continuation: Option<Arc<dyn HostTerminal>>,
    reveal: Option<Arc<dyn HostTerminal>>,
}

/// Holds the startup lock for one bootstrap attempt
struct StartupGuard<'a> {
    controller: &'a SessionController,
    generation: u64,
}

impl Drop for StartupGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.controller.lock();
        // A reset already released it, possibly for a newer attempt
        if inner.generation == self.generation {
            inner.startup_lock = false;
        }
    }
}

impl SessionController {
    /// Controller that never asks before replacing a running scene
    pub fn new(host: Arc<dyn TerminalHost>, config: SessionConfig) -> Arc<Self> {
        Self::with_prompt(host, config, auto_confirm())
    }

    pub fn with_prompt(
        host: Arc<dyn TerminalHost>,
        config: SessionConfig,
        prompt: Arc<dyn ConfirmPrompt>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            host,
            prompt,
            config: RwLock::new(config),
            inner: Mutex::new(SessionInner::default()),
            events,
        })
    }

    pub(super) fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        drop(self.events.send(event));
    }

    /// Current configuration
    pub fn config(&self) -> SessionConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the configuration; applies to the next bootstrap and command
    pub fn update_config(&self, config: SessionConfig) {
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
        tracing::info!("Session configuration updated");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Session events as a stream; lagging subscribers skip what they missed
    pub fn event_stream(&self) -> BoxStream<'static, SessionEvent> {
        let mut rx = self.subscribe();
        Box::pin(async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(event) => yield event,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Session event stream lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// A terminal hosts the session and has not exited
    pub fn has_active_session(&self) -> bool {
        self.lock()
            .handle
            .active()
            .is_some_and(|terminal| terminal.exit_status().is_none())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.lock().snapshot()
    }

    /// Engine version from the most recent banner
    pub fn version(&self) -> Option<ManimVersion> {
        self.lock().version
    }

    /// Watch a terminal the controller did not create
    ///
    /// Its output is ignored until it prints the welcome banner; then it
    /// replaces whatever session was running.
    pub fn observe_terminal(self: &Arc<Self>, terminal: Arc<dyn HostTerminal>, events: TerminalEvents) {
        let id = terminal.id().clone();
        self.lock().known.insert(id.clone(), terminal);
        tracing::debug!(terminal_id = %id, "Observing terminal");
        self.spawn_pump(id, events);
    }

    /// Clear all session state and tell every listener
    pub fn reset(&self) {
        let mut inner = self.lock();
        self.reset_locked(&mut inner);
    }

    fn reset_locked(&self, inner: &mut SessionInner) {
        inner.clear();
        tracing::debug!(generation = inner.generation, "Session reset");
        self.emit(SessionEvent::Reset);
    }

    /// Interrupt and dispose the hosting terminal, then reset
    ///
    /// A graceful exit is not attempted: on some platforms interrupting and
    /// then exiting takes the whole REPL down unexpectedly.
    pub async fn force_quit(&self) {
        let terminal = {
            let mut inner = self.lock();
            let terminal = inner.handle.take();
            if let Some(terminal) = &terminal {
                inner.known.remove(terminal.id());
            }
            self.reset_locked(&mut inner);
            terminal
        };
        if let Some(terminal) = terminal {
            tracing::info!(terminal_id = %terminal.id(), "Force quitting session");
            quit_terminal(terminal.as_ref()).await;
        }
    }

    /// Force quit and dispose every terminal the controller knows
    pub async fn shutdown(&self) {
        self.force_quit().await;
        let known: Vec<_> = self.lock().known.drain().map(|(_, t)| t).collect();
        for terminal in known {
            terminal.dispose().await;
        }
    }

    /// Start a fresh session at `target`, replacing any running one
    ///
    /// With `is_for_own_sake` and a running session, the confirmation
    /// collaborator is asked first (unless disabled in the settings).
    /// Returns once the REPL reached the start line, or, when previewing the
    /// whole scene, once the engine logged that it finished.
    pub async fn bootstrap_explicit(
        self: &Arc<Self>,
        target: &BootstrapTarget,
        is_for_own_sake: bool,
    ) -> Result<()> {
        let config = self.config();
        if is_for_own_sake && config.confirm_killing_active_scene && self.has_active_session() {
            let confirmed = self
                .prompt
                .confirm("Kill the running scene and start a new one?")
                .await;
            if !confirmed {
                return Err(NotebookError::Cancelled);
            }
        }
        self.start_session(target).await
    }

    pub(super) async fn start_session(self: &Arc<Self>, target: &BootstrapTarget) -> Result<()> {
        // The old terminal is taken and the startup lock set in one step
        let (guard, previous, failed) = {
            let mut inner = self.lock();
            if inner.startup_lock {
                return Err(NotebookError::LockedStartup);
            }
            let previous = inner.handle.take();
            if let Some(terminal) = &previous {
                inner.known.remove(terminal.id());
            }
            let failed: Vec<_> = std::mem::take(&mut inner.failed_bootstraps)
                .into_iter()
                .filter_map(|id| inner.known.remove(&id))
                .collect();
            self.reset_locked(&mut inner);
            inner.startup_lock = true;
            let guard = StartupGuard {
                controller: self,
                generation: inner.generation,
            };
            (guard, previous, failed)
        };
        if let Some(terminal) = previous {
            tracing::info!(terminal_id = %terminal.id(), "Force quitting session");
            quit_terminal(terminal.as_ref()).await;
        }
        for terminal in failed {
            tracing::debug!(terminal_id = %terminal.id(), "Disposing terminal of a failed start");
            terminal.dispose().await;
        }

        let config = self.config();

        let (terminal, events) = self.host.create(terminal_options(&config, target)).await?;
        let id = terminal.id().clone();
        let mut rx = self.subscribe();

        let superseded = {
            let mut inner = self.lock();
            let superseded = inner.generation != guard.generation;
            if !superseded {
                inner.handle = SessionHandle::Bootstrapping(terminal.clone());
                inner.known.insert(id.clone(), terminal.clone());
            }
            superseded
        };
        if superseded {
            terminal.dispose().await;
            return Err(NotebookError::bootstrap_failed(
                "the session was reset while the terminal was being created",
            ));
        }
        self.spawn_pump(id.clone(), events);

        if !config.delay_new_terminal.is_zero() {
            tokio::time::sleep(config.delay_new_terminal).await;
        }

        let command = ManimCommand::for_target(&config, target, self.version()).to_string();
        tracing::info!(terminal_id = %id, command = %command, "Starting ManimGL");
        if let Err(e) = terminal.send_text(&command, true).await {
            self.abandon_bootstrap(&id);
            self.lock().known.remove(&id);
            terminal.dispose().await;
            return Err(e);
        }

        self.wait_for_banner(&mut rx, terminal.as_ref(), &config, guard.generation)
            .await?;
        self.wait_for_first_unit(&mut rx, &id, target.previews_whole_scene())
            .await?;
        drop(guard);
        Ok(())
    }

    /// Reset if `id` is still being bootstrapped
    fn abandon_bootstrap(&self, id: &TerminalId) {
        let mut inner = self.lock();
        if inner.handle.is_bootstrapping(id) {
            self.reset_locked(&mut inner);
        }
    }

    async fn wait_for_banner(
        &self,
        rx: &mut broadcast::Receiver<SessionEvent>,
        terminal: &dyn HostTerminal,
        config: &SessionConfig,
        generation: u64,
    ) -> Result<()> {
        let id = terminal.id();
        let started = Instant::now();
        let deadline = started + config.startup_timeout;
        let slice = config.startup_progress_slice.max(MIN_PROGRESS_SLICE);

        loop {
            let now = Instant::now();
            if now >= deadline {
                let waited_ms = config.startup_timeout.as_millis() as u64;
                tracing::warn!(terminal_id = %id, waited_ms, "No welcome banner before timeout");
                // A late banner must not take over a retry
                {
                    let mut inner = self.lock();
                    inner.known.remove(id);
                    if inner.handle.is_bootstrapping(id) {
                        self.reset_locked(&mut inner);
                    }
                }
                quit_terminal(terminal).await;
                return Err(NotebookError::StartupTimeout { waited_ms });
            }

            match tokio::time::timeout_at((now + slice).min(deadline), rx.recv()).await {
                Err(_) => self.emit(SessionEvent::StartupProgress {
                    elapsed: started.elapsed(),
                    timeout: config.startup_timeout,
                }),
                Ok(Ok(SessionEvent::BannerDetected { terminal: banner, .. })) if &banner == id => {
                    return Ok(());
                }
                Ok(Ok(SessionEvent::StartFailed { reason })) => {
                    return Err(NotebookError::bootstrap_failed(reason));
                }
                Ok(Ok(SessionEvent::Reset)) => {
                    return Err(NotebookError::bootstrap_failed(
                        "the session was reset before ManimGL started",
                    ));
                }
                Ok(Ok(_)) => {}
                Ok(Err(RecvError::Lagged(skipped))) => {
                    tracing::debug!(skipped, "Startup wait lagged, checking state");
                    let inner = self.lock();
                    if inner.generation != generation {
                        return Err(NotebookError::bootstrap_failed(
                            "the session was reset before ManimGL started",
                        ));
                    }
                    if inner.handle.is_active(id) {
                        return Ok(());
                    }
                }
                Ok(Err(RecvError::Closed)) => {
                    return Err(NotebookError::internal("session event channel closed"));
                }
            }
        }
    }

    /// Wait until the REPL reaches the start line (or finishes the scene)
    async fn wait_for_first_unit(
        &self,
        rx: &mut broadcast::Receiver<SessionEvent>,
        id: &TerminalId,
        whole_scene: bool,
    ) -> Result<()> {
        loop {
            match rx.recv().await {
                Ok(SessionEvent::UnitStarted { .. } | SessionEvent::Interrupted) => return Ok(()),
                Ok(SessionEvent::InfoLogged) if whole_scene => return Ok(()),
                Ok(SessionEvent::SessionEnded { .. }) if whole_scene => return Ok(()),
                Ok(SessionEvent::SessionEnded { exit_code }) => {
                    return Err(NotebookError::bootstrap_failed(format!(
                        "ManimGL exited before reaching the start line (exit code {})",
                        exit_code.map_or_else(|| "unknown".to_string(), |c| c.to_string())
                    )));
                }
                Ok(SessionEvent::Reset) => {
                    return Err(NotebookError::bootstrap_failed(
                        "the session was reset during startup",
                    ));
                }
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => {
                    let inner = self.lock();
                    if !inner.handle.is_active(id) {
                        return Err(NotebookError::bootstrap_failed(
                            "the session ended during startup",
                        ));
                    }
                    if inner.unit_counter > 0 {
                        return Ok(());
                    }
                }
                Err(RecvError::Closed) => {
                    return Err(NotebookError::internal("session event channel closed"));
                }
            }
        }
    }

    fn spawn_pump(self: &Arc<Self>, id: TerminalId, mut events: TerminalEvents) {
        let controller = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut classifier = OutputClassifier::new();
            while let Some(event) = events.recv().await {
                let Some(controller) = controller.upgrade() else {
                    break;
                };
                match event {
                    TerminalEvent::Output(raw) => {
                        let chunk = classifier.feed(&raw);
                        controller.on_output(&id, chunk).await;
                    }
                    TerminalEvent::ExecutionEnded { exit_code } => {
                        controller.on_execution_ended(&id, exit_code).await;
                    }
                    TerminalEvent::Closed => {
                        controller.on_closed(&id).await;
                        break;
                    }
                }
            }
            tracing::debug!(terminal_id = %id, "Terminal event pump stopped");
        });
    }

    async fn on_output(&self, id: &TerminalId, chunk: ClassifiedChunk) {
        let mut follow_up = FollowUp::default();
        {
            let mut inner = self.lock();

            if !inner.handle.is_current(id) {
                let has_banner = chunk
                    .signals
                    .iter()
                    .any(|s| matches!(s, Signal::WelcomeBanner { .. }));
                let adopted = if has_banner {
                    inner.known.get(id).cloned()
                } else {
                    None
                };
                let Some(terminal) = adopted else {
                    tracing::trace!(terminal_id = %id, "Ignoring output from non-current terminal");
                    return;
                };

                follow_up.quit = inner.handle.take();
                if let Some(old) = &follow_up.quit {
                    tracing::info!(
                        old_terminal = %old.id(),
                        new_terminal = %id,
                        "Another terminal started ManimGL, replacing session"
                    );
                    inner.known.remove(old.id());
                    self.reset_locked(&mut inner);
                }
                inner.handle = SessionHandle::Bootstrapping(terminal);
            }

            if !chunk.text.is_empty() {
                self.emit(SessionEvent::Data(chunk.text.clone()));
                if let Some(update) = inner.progress.observe(&chunk.text) {
                    self.emit(SessionEvent::Progress(update));
                }
            }

            for signal in &chunk.signals {
                self.apply_signal(&mut inner, id, signal, &mut follow_up);
            }
            follow_up.generation = inner.generation;
        }
        self.run_follow_up(follow_up).await;
    }

    fn apply_signal(
        &self,
        inner: &mut SessionInner,
        id: &TerminalId,
        signal: &Signal,
        follow_up: &mut FollowUp,
    ) {
        match signal {
            Signal::WelcomeBanner { version } => {
                if let SessionHandle::Bootstrapping(terminal) = &inner.handle {
                    inner.handle = SessionHandle::Active(terminal.clone());
                }
                if version.is_some() {
                    inner.version = *version;
                }
                tracing::info!(terminal_id = %id, version = ?version, "ManimGL session started");
                self.emit(SessionEvent::BannerDetected {
                    terminal: id.clone(),
                    version: *version,
                });
            }
            Signal::UnitPrompts(prompts) => {
                match resolve_prompt_counter(inner.unit_counter, prompts, inner.pending_restart) {
                    CounterUpdate::Advanced(unit) => {
                        inner.unit_counter = unit;
                        tracing::debug!(unit, "Unit of work started");
                        self.emit(SessionEvent::UnitStarted { unit });
                    }
                    CounterUpdate::Restarted => {
                        inner.unit_counter = 1;
                        inner.pending_restart = false;
                        tracing::info!("ManimGL restarted");
                        self.emit(SessionEvent::Restarted);
                        self.emit(SessionEvent::UnitStarted { unit: 1 });
                    }
                    CounterUpdate::Unchanged => {}
                }
            }
            Signal::InfoLog => self.emit(SessionEvent::InfoLogged),
            Signal::KeyboardInterrupt => {
                tracing::debug!("Command interrupted");
                self.emit(SessionEvent::Interrupted);
            }
            Signal::ContinuationPrompt => {
                if let Some(terminal) = inner.handle.active() {
                    inner.suppress_close_detection = true;
                    follow_up.flush_continuation = Some(terminal.clone());
                }
            }
            Signal::ErrorTraceback { cell, line } => {
                tracing::info!(cell, line, "Error inside ManimGL session");
                self.emit(SessionEvent::ErrorDetected {
                    cell: *cell,
                    line: *line,
                });
                follow_up.reveal = inner.handle.terminal().cloned();
            }
        }
    }

    async fn on_execution_ended(&self, id: &TerminalId, exit_code: Option<i32>) {
        let mut follow_up = FollowUp::default();
        {
            let mut inner = self.lock();
            if inner.handle.is_bootstrapping(id) {
                let reason = match exit_code {
                    Some(code) => format!("ManimGL exited with code {code} before starting"),
                    None => "ManimGL exited before starting".to_string(),
                };
                tracing::warn!(terminal_id = %id, %reason, "Bootstrap failed");
                // Left open for inspection until the next start
                inner.failed_bootstraps.push(id.clone());
                follow_up.reveal = inner.handle.take();
                self.emit(SessionEvent::StartFailed { reason });
                self.reset_locked(&mut inner);
            } else if inner.handle.is_active(id) {
                if inner.suppress_close_detection {
                    tracing::debug!(terminal_id = %id, "Ignoring execution end caused by our own input");
                    return;
                }
                tracing::info!(terminal_id = %id, exit_code = ?exit_code, "ManimGL session ended");
                self.emit(SessionEvent::SessionEnded { exit_code });
                self.reset_locked(&mut inner);
            }
            follow_up.generation = inner.generation;
        }
        self.run_follow_up(follow_up).await;
    }

    async fn on_closed(&self, id: &TerminalId) {
        let mut follow_up = FollowUp::default();
        {
            let mut inner = self.lock();
            inner.known.remove(id);
            if inner.handle.is_bootstrapping(id) {
                tracing::warn!(terminal_id = %id, "Terminal closed before ManimGL started");
                self.emit(SessionEvent::StartFailed {
                    reason: "the terminal was closed before ManimGL started".to_string(),
                });
                self.reset_locked(&mut inner);
            } else if inner.handle.is_active(id) {
                if inner.executing_lock {
                    tracing::warn!(terminal_id = %id, "Terminal closed while a command was running");
                    follow_up.quit = inner.handle.take();
                    self.emit(SessionEvent::StartFailed {
                        reason: "the terminal was closed while a command was running".to_string(),
                    });
                    self.emit(SessionEvent::Interrupted);
                } else {
                    tracing::info!(terminal_id = %id, "Terminal closed");
                }
                self.reset_locked(&mut inner);
            }
            follow_up.generation = inner.generation;
        }
        self.run_follow_up(follow_up).await;
    }

    async fn run_follow_up(&self, follow_up: FollowUp) {
        if let Some(terminal) = follow_up.quit {
            quit_terminal(terminal.as_ref()).await;
        }
        if let Some(terminal) = follow_up.flush_continuation {
            tracing::debug!(terminal_id = %terminal.id(), "Flushing continuation prompt");
            if let Err(e) = terminal.send_text(FLUSH_CONTINUATION, false).await {
                tracing::debug!(error = %e, "Failed to flush continuation prompt");
            }
            self.release_close_suppression(follow_up.generation);
        }
        if let Some(terminal) = follow_up.reveal {
            terminal.reveal();
        }
    }

    pub(super) fn release_close_suppression(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.generation == generation {
            inner.suppress_close_detection = false;
        }
    }
}

fn terminal_options(config: &SessionConfig, target: &BootstrapTarget) -> TerminalOptions {
    let mut options = TerminalOptions::new(config.terminal_name.clone()).env(config.env.clone());
    if let Some(shell) = &config.shell {
        options = options.shell(shell.clone());
    }
    let cwd = config.cwd.clone().or_else(|| {
        target
            .file
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf)
    });
    if let Some(cwd) = cwd {
        options = options.cwd(cwd);
    }
    options
}

/// Best-effort interrupt, then dispose
async fn quit_terminal(terminal: &dyn HostTerminal) {
    if let Err(e) = terminal.interrupt().await {
        tracing::debug!(terminal_id = %terminal.id(), error = %e, "Interrupt before dispose failed");
    }
    terminal.dispose().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_support::*;
    use crate::terminal::{MemoryTerminal, SentText};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_bootstrap_sends_start_command_and_adopts_terminal() {
        let (controller, host) = controller_with(test_config());
        let terminal = start_active(&controller, &host).await;

        assert_eq!(
            terminal.sent(),
            vec![SentText {
                text: r#"manimgl "/tmp/scenes/intro.py" Intro -se 5"#.to_string(),
                structured: true,
            }]
        );
        assert_eq!(host.last_options().unwrap().cwd, Some("/tmp/scenes".into()));
        assert!(controller.has_active_session());

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.state, crate::session::SessionState::Idle);
        assert_eq!(snapshot.terminal.as_ref(), Some(terminal.id()));
        assert_eq!(snapshot.unit_counter, 1);
        assert!(!snapshot.startup_lock);
        assert_eq!(controller.version(), Some(ManimVersion::new(1, 7, 2)));
    }

    #[tokio::test]
    async fn test_terminal_ending_before_banner_fails_bootstrap() {
        let (controller, host) = controller_with(test_config());
        let task = tokio::spawn({
            let controller = controller.clone();
            async move { controller.bootstrap_explicit(&target(), false).await }
        });
        let terminal = terminal_with_sent(&host, 0, 1).await;
        terminal.emit_output("bash: manimgl: command not found\n");
        terminal.end_execution(Some(127));

        let result = task.await.unwrap();
        assert!(matches!(result, Err(NotebookError::BootstrapFailed { .. })));
        assert!(result.unwrap_err().is_retryable());
        assert!(!controller.has_active_session());

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.terminal, None);
        assert!(!snapshot.startup_lock);
        eventually(|| terminal.reveal_count() == 1).await;
    }

    #[tokio::test]
    async fn test_terminal_closed_before_banner_fails_bootstrap() {
        let (controller, host) = controller_with(test_config());
        let task = tokio::spawn({
            let controller = controller.clone();
            async move { controller.bootstrap_explicit(&target(), false).await }
        });
        terminal_with_sent(&host, 0, 1).await.close(1);

        assert!(matches!(
            task.await.unwrap(),
            Err(NotebookError::BootstrapFailed { .. })
        ));
        assert!(!controller.has_active_session());
    }

    #[tokio::test]
    async fn test_startup_timeout_reports_progress() {
        let config = SessionConfig {
            startup_timeout: Duration::from_millis(150),
            ..test_config()
        };
        let (controller, host) = controller_with(config);
        let mut events = controller.subscribe();

        let result = controller.bootstrap_explicit(&target(), false).await;
        assert!(matches!(
            result,
            Err(NotebookError::StartupTimeout { waited_ms: 150 })
        ));
        assert!(!controller.has_active_session());
        assert!(!controller.snapshot().startup_lock);

        let mut progress = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, SessionEvent::StartupProgress { .. }) {
                progress += 1;
            }
        }
        assert!(progress >= 2);

        let terminal = host.last().unwrap();
        assert!(terminal.is_disposed());
        assert_eq!(terminal.interrupt_count(), 1);
        terminal.emit_output(BANNER);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!controller.has_active_session());
    }

    #[tokio::test]
    async fn test_retry_after_timeout_ignores_late_banner() {
        let config = SessionConfig {
            startup_timeout: Duration::from_millis(100),
            ..test_config()
        };
        let (controller, host) = controller_with(config);
        let result = controller.bootstrap_explicit(&target(), false).await;
        assert!(matches!(result, Err(NotebookError::StartupTimeout { .. })));
        let slow = host.last().unwrap();

        controller.update_config(test_config());
        let retry = tokio::spawn({
            let controller = controller.clone();
            async move { controller.bootstrap_explicit(&target(), false).await }
        });
        let fresh = terminal_with_sent(&host, 1, 1).await;

        slow.emit_output(BANNER);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(controller.snapshot().terminal.as_ref(), Some(fresh.id()));
        assert!(!fresh.is_disposed());

        fresh.emit_output(BANNER);
        fresh.emit_output("In [1]: ");
        retry.await.unwrap().unwrap();
        assert_eq!(controller.snapshot().terminal.as_ref(), Some(fresh.id()));
        assert!(slow.is_disposed());
    }

    #[tokio::test]
    async fn test_failed_start_terminal_disposed_by_next_start() {
        let (controller, host) = controller_with(test_config());
        let task = tokio::spawn({
            let controller = controller.clone();
            async move { controller.bootstrap_explicit(&target(), false).await }
        });
        let failed = terminal_with_sent(&host, 0, 1).await;
        failed.end_execution(Some(1));
        assert!(task.await.unwrap().is_err());

        // Kept around so the user can read what went wrong
        assert!(!failed.is_disposed());

        let terminal = start_active(&controller, &host).await;
        assert!(failed.is_disposed());
        assert!(!terminal.is_disposed());
    }

    #[tokio::test]
    async fn test_restart_holds_startup_lock_while_quitting_old_session() {
        let (controller, host) = controller_with(test_config());
        let old = start_active(&controller, &host).await;
        let mut events = controller.subscribe();

        let restart = tokio::spawn({
            let controller = controller.clone();
            async move { controller.bootstrap_explicit(&target(), false).await }
        });
        loop {
            if events.recv().await.unwrap() == SessionEvent::Reset {
                break;
            }
        }
        assert!(controller.snapshot().startup_lock);
        assert!(matches!(
            controller.bootstrap_explicit(&target(), false).await,
            Err(NotebookError::LockedStartup)
        ));

        let fresh = terminal_with_sent(&host, 1, 1).await;
        fresh.emit_output(BANNER);
        fresh.emit_output("In [1]: ");
        restart.await.unwrap().unwrap();
        assert!(old.is_disposed());
        assert_eq!(host.terminals().len(), 2);
        assert_eq!(controller.snapshot().terminal.as_ref(), Some(fresh.id()));
    }

    #[tokio::test]
    async fn test_concurrent_start_is_rejected() {
        let (controller, host) = controller_with(test_config());
        let first = tokio::spawn({
            let controller = controller.clone();
            async move { controller.bootstrap_explicit(&target(), false).await }
        });
        let terminal = terminal_with_sent(&host, 0, 1).await;

        let second = controller.bootstrap_explicit(&target(), false).await;
        assert!(matches!(second, Err(NotebookError::LockedStartup)));

        terminal.emit_output(BANNER);
        terminal.emit_output("In [1]: ");
        first.await.unwrap().unwrap();
        assert_eq!(host.terminals().len(), 1);
    }

    #[tokio::test]
    async fn test_whole_scene_preview_completes_on_info_log() {
        let (controller, host) = controller_with(test_config());
        let target = BootstrapTarget::new("scene.py", "Intro", None);
        let task = tokio::spawn({
            let controller = controller.clone();
            async move { controller.bootstrap_explicit(&target, false).await }
        });
        let terminal = terminal_with_sent(&host, 0, 1).await;
        assert_eq!(terminal.sent_texts(), vec![r#"manimgl "scene.py" Intro"#.to_string()]);

        terminal.emit_output(BANNER);
        terminal.emit_output("[10:31:02] INFO     Tips: ...\n");
        task.await.unwrap().unwrap();
        assert_eq!(host.last_options().unwrap().cwd, None);
    }

    #[tokio::test]
    async fn test_declined_confirmation_keeps_running_scene() {
        let host = Arc::new(crate::terminal::MemoryTerminalHost::new());
        let controller = SessionController::with_prompt(
            host.clone(),
            test_config(),
            Arc::new(crate::session::AutoConfirm(false)),
        );
        let terminal = start_active(&controller, &host).await;

        let result = controller.bootstrap_explicit(&target(), true).await;
        assert!(matches!(result, Err(NotebookError::Cancelled)));
        assert!(controller.has_active_session());
        assert!(!terminal.is_disposed());
    }

    #[tokio::test]
    async fn test_restart_replaces_running_session() {
        let (controller, host) = controller_with(test_config());
        let first = start_active(&controller, &host).await;
        let second = start_active(&controller, &host).await;

        assert!(first.is_disposed());
        assert_eq!(first.interrupt_count(), 1);
        assert_eq!(controller.snapshot().terminal.as_ref(), Some(second.id()));
    }

    #[tokio::test]
    async fn test_force_quit_disposes_and_resets() {
        let (controller, host) = controller_with(test_config());
        let terminal = start_active(&controller, &host).await;
        let mut events = controller.subscribe();

        controller.force_quit().await;

        assert!(terminal.is_disposed());
        assert_eq!(terminal.interrupt_count(), 1);
        assert!(!controller.has_active_session());
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Reset);

        // Output from the disposed terminal no longer matters
        terminal.emit_output("In [5]: ");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(controller.snapshot().unit_counter, 0);
    }

    #[tokio::test]
    async fn test_graceful_end_resets_session() {
        let (controller, host) = controller_with(test_config());
        let terminal = start_active(&controller, &host).await;
        let mut events = controller.subscribe();

        terminal.end_execution(Some(0));

        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::SessionEnded { exit_code: Some(0) }
        );
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Reset);
        assert!(!controller.has_active_session());
        assert!(!terminal.is_disposed());
    }

    #[tokio::test]
    async fn test_counter_only_moves_forward() {
        let (controller, host) = controller_with(test_config());
        let terminal = start_active(&controller, &host).await;

        terminal.emit_output("In [3]:  \nIn [4]:  \n");
        eventually(|| controller.snapshot().unit_counter == 4).await;

        terminal.emit_output("In [2]: ");
        terminal.emit_output("In [5]: ");
        eventually(|| controller.snapshot().unit_counter == 5).await;
    }

    #[tokio::test]
    async fn test_non_current_terminal_is_ignored_until_banner() {
        let (controller, host) = controller_with(test_config());
        let hosted = start_active(&controller, &host).await;

        let (external, events) = MemoryTerminal::new("external");
        controller.observe_terminal(external.clone(), events);

        external.emit_output("In [9]: ");
        external.emit_output("KeyboardInterrupt\n");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(controller.snapshot().unit_counter, 1);
        assert_eq!(controller.snapshot().terminal.as_ref(), Some(hosted.id()));

        external.emit_output(BANNER);
        eventually(|| controller.snapshot().terminal.as_ref() == Some(external.id())).await;
        eventually(|| hosted.is_disposed()).await;
        assert!(controller.has_active_session());

        // The superseded terminal can no longer move the counter
        hosted.emit_output("In [7]: ");
        external.emit_output("In [1]: ");
        eventually(|| controller.snapshot().unit_counter == 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(controller.snapshot().unit_counter, 1);
    }

    #[tokio::test]
    async fn test_banner_in_known_terminal_restarts_session() {
        let (controller, host) = controller_with(test_config());
        let terminal = start_active(&controller, &host).await;
        terminal.end_execution(Some(0));
        eventually(|| !controller.has_active_session()).await;

        // The user runs manimgl again in the same shell
        terminal.emit_output(BANNER);
        eventually(|| controller.has_active_session()).await;
        assert_eq!(controller.snapshot().terminal.as_ref(), Some(terminal.id()));
    }

    #[tokio::test]
    async fn test_continuation_prompt_is_flushed() {
        let (controller, host) = controller_with(test_config());
        let terminal = start_active(&controller, &host).await;

        terminal.emit_output("   ...: \n");
        eventually(|| terminal.sent().len() == 2).await;
        assert_eq!(
            terminal.sent()[1],
            SentText {
                text: "\x15".to_string(),
                structured: false
            }
        );
    }

    #[tokio::test]
    async fn test_error_traceback_reveals_terminal() {
        let (controller, host) = controller_with(test_config());
        let terminal = start_active(&controller, &host).await;
        let mut events = controller.subscribe();

        terminal.emit_output("Cell In[2], line 3\n");

        let mut detected = false;
        while let Ok(Ok(event)) =
            tokio::time::timeout(Duration::from_secs(1), events.recv()).await
        {
            if event == (SessionEvent::ErrorDetected { cell: 2, line: 3 }) {
                detected = true;
                break;
            }
        }
        assert!(detected);
        eventually(|| terminal.reveal_count() == 1).await;
    }

    #[tokio::test]
    async fn test_event_stream_yields_data() {
        use futures::StreamExt;

        let (controller, host) = controller_with(test_config());
        let terminal = start_active(&controller, &host).await;
        let mut stream = controller.event_stream();

        terminal.emit_output("\x1b[32mhello\x1b[0m\n");
        let event = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, SessionEvent::Data("hello\n".to_string()));
    }

    #[tokio::test]
    async fn test_progress_events() {
        let (controller, host) = controller_with(test_config());
        let terminal = start_active(&controller, &host).await;
        let mut events = controller.subscribe();

        terminal.emit_output("Animation 0: FadeIn:  40%|####");
        let _data = events.recv().await.unwrap();
        match events.recv().await.unwrap() {
            SessionEvent::Progress(update) => {
                assert_eq!(update.name, "FadeIn");
                assert_eq!(update.percent, 40);
            }
            other => panic!("expected progress, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_shutdown_disposes_known_terminals() {
        let (controller, host) = controller_with(test_config());
        let hosted = start_active(&controller, &host).await;
        let (external, events) = MemoryTerminal::new("external");
        controller.observe_terminal(external.clone(), events);

        controller.shutdown().await;
        assert!(hosted.is_disposed());
        assert!(external.is_disposed());
    }
}

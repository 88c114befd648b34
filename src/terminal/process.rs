//! Shell-backed host terminals
//!
//! Each terminal is a shell with piped stdio running in its own process
//! group. stdout and stderr are merged into one event stream.
//!
//! Structured execution follows the shell-integration convention: the
//! command is followed by `printf` of an OSC 633 "command finished" sequence
//! (`ESC ] 633 ; D ; <exit code> BEL`). The reader strips that sequence from
//! the output and emits `TerminalEvent::ExecutionEnded` in its place.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use once_cell::sync::Lazy;
#[cfg(windows)]
use process_wrap::tokio::JobObject;
#[cfg(unix)]
use process_wrap::tokio::ProcessGroup;
use process_wrap::tokio::{CommandWrap, KillOnDrop};
use regex::Regex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::child::WrappedChild;
use super::{HostTerminal, TerminalEvent, TerminalEvents, TerminalHost, TerminalId, TerminalOptions};
use crate::types::{NotebookError, Result};

/// `ESC ] 633 ; D [; code] BEL`
static EXECUTION_END_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\]633;D(?:;(-?\d+))?\x07").unwrap());

const MARKER_PREFIX: &str = "\x1b]633;";

/// Longest marker we are willing to hold back between reads
const MAX_MARKER_LEN: usize = 32;

const READ_BUFFER_SIZE: usize = 4096;

const REAP_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[cfg(unix)]
const DEFAULT_SHELL: &str = "/bin/sh";
#[cfg(windows)]
const DEFAULT_SHELL: &str = "cmd.exe";

/// Spawns shell processes as host terminals
#[derive(Debug, Default)]
pub struct ProcessTerminalHost {
    default_shell: Option<String>,
    /// Live terminals; each removes itself once its shell is reaped
    terminals: Arc<DashMap<TerminalId, Arc<ProcessTerminal>>>,
}

impl ProcessTerminalHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `shell` when the options do not name one
    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            default_shell: Some(shell.into()),
            ..Default::default()
        }
    }

    /// Number of terminals whose shell is still running
    pub fn live_count(&self) -> usize {
        self.terminals.len()
    }

    /// Dispose every live terminal (application shutdown)
    pub async fn dispose_all(&self) {
        let live: Vec<Arc<ProcessTerminal>> =
            self.terminals.iter().map(|entry| entry.value().clone()).collect();
        self.terminals.clear();
        for terminal in live {
            terminal.dispose().await;
        }
    }
}

#[async_trait]
impl TerminalHost for ProcessTerminalHost {
    async fn create(
        &self,
        options: TerminalOptions,
    ) -> Result<(Arc<dyn HostTerminal>, TerminalEvents)> {
        let shell = options
            .shell
            .clone()
            .or_else(|| self.default_shell.clone())
            .unwrap_or_else(|| DEFAULT_SHELL.to_string());

        let mut command = Command::new(&shell);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Prompts must not sit in Python's stdout buffer
            .env("PYTHONUNBUFFERED", "1")
            .envs(&options.env);
        if let Some(cwd) = &options.cwd {
            command.current_dir(cwd);
        }

        let mut wrapped = CommandWrap::from(command);
        #[cfg(unix)]
        wrapped.wrap(ProcessGroup::leader());
        #[cfg(windows)]
        wrapped.wrap(JobObject);
        wrapped.wrap(KillOnDrop);

        let spawned = wrapped
            .spawn()
            .map_err(|e| NotebookError::terminal(format!("failed to spawn {shell}: {e}")))?;
        let mut child = WrappedChild::new(spawned);
        let (stdin, stdout, stderr) = child.take_stdio();

        let id = TerminalId::generate();
        tracing::info!(
            terminal_id = %id,
            name = %options.name,
            shell = %shell,
            pid = child.id(),
            "Spawned terminal"
        );

        let terminal = Arc::new(ProcessTerminal {
            id: id.clone(),
            name: options.name,
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            exit_status: OnceLock::new(),
            disposed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        });

        let (tx, rx) = mpsc::unbounded_channel();
        let mut readers = Vec::new();
        if let Some(stdout) = stdout {
            readers.push(tokio::spawn(read_stream(
                stdout,
                tx.clone(),
                terminal.cancel.clone(),
            )));
        }
        if let Some(stderr) = stderr {
            readers.push(tokio::spawn(read_stream(
                stderr,
                tx.clone(),
                terminal.cancel.clone(),
            )));
        }

        self.terminals.insert(id, terminal.clone());
        tokio::spawn(supervise(
            terminal.clone(),
            readers,
            tx,
            self.terminals.clone(),
        ));

        Ok((terminal, rx))
    }
}

/// A shell process acting as a host terminal
#[derive(Debug)]
pub struct ProcessTerminal {
    id: TerminalId,
    name: String,
    child: Mutex<WrappedChild>,
    stdin: Mutex<Option<ChildStdin>>,
    exit_status: OnceLock<i32>,
    disposed: AtomicBool,
    cancel: CancellationToken,
}

impl ProcessTerminal {
    async fn write_line(&self, line: &str) -> Result<()> {
        let mut stdin = self.stdin.lock().await;
        let Some(stdin) = stdin.as_mut() else {
            return Err(NotebookError::terminal(format!(
                "terminal {} no longer accepts input",
                self.id
            )));
        };
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl HostTerminal for ProcessTerminal {
    fn id(&self) -> &TerminalId {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn send_text(&self, text: &str, structured: bool) -> Result<()> {
        let line = if structured && cfg!(unix) {
            format!("{text}; printf '\\033]633;D;%s\\007' \"$?\"\n")
        } else {
            format!("{text}\n")
        };
        tracing::trace!(terminal_id = %self.id, structured, "Writing to terminal");
        self.write_line(&line).await
    }

    #[cfg(unix)]
    async fn interrupt(&self) -> Result<()> {
        let child = self.child.lock().await;
        child.signal(super::child::SIGINT)?;
        Ok(())
    }

    #[cfg(not(unix))]
    async fn interrupt(&self) -> Result<()> {
        self.write_line("\x03").await
    }

    fn exit_status(&self) -> Option<i32> {
        self.exit_status.get().copied()
    }

    async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        drop(self.stdin.lock().await.take());
        let mut child = self.child.lock().await;
        if let Err(e) = child.kill().await {
            tracing::debug!(terminal_id = %self.id, error = %e, "Kill after dispose failed");
        }
        tracing::info!(terminal_id = %self.id, "Terminal disposed");
    }
}

/// Pump one output pipe into the event channel
async fn read_stream<R>(
    mut reader: R,
    tx: mpsc::UnboundedSender<TerminalEvent>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut decoder = Utf8Carry::default();
    let mut scanner = MarkerScanner::default();

    loop {
        let read = tokio::select! {
            () = cancel.cancelled() => break,
            read = reader.read(&mut buf) => read,
        };
        let n = match read {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::debug!(error = %e, "Terminal pipe read failed");
                break;
            }
        };
        let text = decoder.decode(&buf[..n]);
        for event in scanner.scan(&text) {
            if tx.send(event).is_err() {
                return;
            }
        }
    }

    let rest = scanner.finish();
    if !rest.is_empty() {
        drop(tx.send(TerminalEvent::Output(rest)));
    }
}

/// Wait for the pipes to close and the shell to exit, then report `Closed`
async fn supervise(
    terminal: Arc<ProcessTerminal>,
    readers: Vec<JoinHandle<()>>,
    tx: mpsc::UnboundedSender<TerminalEvent>,
    registry: Arc<DashMap<TerminalId, Arc<ProcessTerminal>>>,
) {
    for reader in readers {
        drop(reader.await);
    }

    let code = loop {
        let status = terminal.child.lock().await.try_wait();
        match status {
            Ok(Some(status)) => break status.code().unwrap_or(-1),
            Ok(None) => tokio::time::sleep(REAP_POLL_INTERVAL).await,
            Err(e) => {
                tracing::debug!(terminal_id = %terminal.id, error = %e, "try_wait failed");
                break -1;
            }
        }
    };

    drop(terminal.exit_status.set(code));
    tracing::info!(terminal_id = %terminal.id, exit_code = code, "Terminal shell exited");
    drop(tx.send(TerminalEvent::Closed));
    registry.remove(&terminal.id);
}

/// Decodes UTF-8 across read boundaries
#[derive(Debug, Default)]
struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let valid = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            // Incomplete character at the end: keep it for the next read
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => {
                let text = String::from_utf8_lossy(&self.pending).into_owned();
                self.pending.clear();
                return text;
            }
        };
        let rest = self.pending.split_off(valid);
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending = rest;
        text
    }
}

/// Splits output around execution-end markers
#[derive(Debug, Default)]
struct MarkerScanner {
    carry: String,
}

impl MarkerScanner {
    fn scan(&mut self, chunk: &str) -> Vec<TerminalEvent> {
        let mut text = std::mem::take(&mut self.carry);
        text.push_str(chunk);

        if let Some(start) = unterminated_marker_start(&text) {
            self.carry = text.split_off(start);
        }

        let mut events = Vec::new();
        let mut last = 0;
        for caps in EXECUTION_END_MARKER.captures_iter(&text) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            if whole.start() > last {
                events.push(TerminalEvent::Output(text[last..whole.start()].to_string()));
            }
            let exit_code = caps.get(1).and_then(|code| code.as_str().parse().ok());
            events.push(TerminalEvent::ExecutionEnded { exit_code });
            last = whole.end();
        }
        if last < text.len() {
            events.push(TerminalEvent::Output(text[last..].to_string()));
        }
        events
    }

    fn finish(&mut self) -> String {
        std::mem::take(&mut self.carry)
    }
}

fn unterminated_marker_start(text: &str) -> Option<usize> {
    if let Some(start) = text.rfind(MARKER_PREFIX) {
        let tail = &text[start..];
        if !tail.contains('\x07') && tail.len() <= MAX_MARKER_LEN {
            return Some(start);
        }
    }
    // The prefix itself may be cut: "...\x1b]63"
    (1..MARKER_PREFIX.len())
        .rev()
        .find(|&k| text.ends_with(&MARKER_PREFIX[..k]))
        .map(|k| text.len() - k)
}

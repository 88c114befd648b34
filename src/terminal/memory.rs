//! In-memory host terminals
//!
//! Nothing is executed. Sent text is recorded and output is pushed in by the
//! driver (a test, or an embedder bridging a terminal it owns).

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{HostTerminal, TerminalEvent, TerminalEvents, TerminalHost, TerminalId, TerminalOptions};
use crate::types::{NotebookError, Result};

/// Text sent to a memory terminal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentText {
    pub text: String,
    pub structured: bool,
}

/// Hands out `MemoryTerminal`s and remembers them
#[derive(Debug, Default)]
pub struct MemoryTerminalHost {
    created: Mutex<Vec<(TerminalOptions, Arc<MemoryTerminal>)>>,
    fail_next_create: AtomicBool,
}

impl MemoryTerminalHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every terminal created so far, oldest first
    pub fn terminals(&self) -> Vec<Arc<MemoryTerminal>> {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, terminal)| terminal.clone())
            .collect()
    }

    pub fn last(&self) -> Option<Arc<MemoryTerminal>> {
        self.terminals().pop()
    }

    /// Options the most recent terminal was created with
    pub fn last_options(&self) -> Option<TerminalOptions> {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .map(|(options, _)| options.clone())
    }

    /// Make the next `create` call fail
    pub fn fail_next_create(&self) {
        self.fail_next_create.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl TerminalHost for MemoryTerminalHost {
    async fn create(
        &self,
        options: TerminalOptions,
    ) -> Result<(Arc<dyn HostTerminal>, TerminalEvents)> {
        if self.fail_next_create.swap(false, Ordering::SeqCst) {
            return Err(NotebookError::terminal("terminal creation refused"));
        }
        let (terminal, events) = MemoryTerminal::new(options.name.clone());
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((options, terminal.clone()));
        Ok((terminal, events))
    }
}

/// Terminal whose output is driven by hand
#[derive(Debug)]
pub struct MemoryTerminal {
    id: TerminalId,
    name: String,
    events: mpsc::UnboundedSender<TerminalEvent>,
    sent: Mutex<Vec<SentText>>,
    interrupts: AtomicUsize,
    reveals: AtomicUsize,
    disposed: AtomicBool,
    exit_status: OnceLock<i32>,
}

impl MemoryTerminal {
    /// A detached terminal and its event stream
    pub fn new(name: impl Into<String>) -> (Arc<Self>, TerminalEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        let terminal = Arc::new(Self {
            id: TerminalId::generate(),
            name: name.into(),
            events: tx,
            sent: Mutex::new(Vec::new()),
            interrupts: AtomicUsize::new(0),
            reveals: AtomicUsize::new(0),
            disposed: AtomicBool::new(false),
            exit_status: OnceLock::new(),
        });
        (terminal, rx)
    }

    /// Push an output chunk
    pub fn emit_output(&self, chunk: impl Into<String>) {
        drop(self.events.send(TerminalEvent::Output(chunk.into())));
    }

    /// Report that a structured command finished
    pub fn end_execution(&self, exit_code: Option<i32>) {
        drop(self.events.send(TerminalEvent::ExecutionEnded { exit_code }));
    }

    /// Close the terminal as if its shell exited with `code`
    pub fn close(&self, code: i32) {
        drop(self.exit_status.set(code));
        drop(self.events.send(TerminalEvent::Closed));
    }

    pub fn sent(&self) -> Vec<SentText> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Just the texts, in send order
    pub fn sent_texts(&self) -> Vec<String> {
        self.sent().into_iter().map(|s| s.text).collect()
    }

    pub fn interrupt_count(&self) -> usize {
        self.interrupts.load(Ordering::SeqCst)
    }

    pub fn reveal_count(&self) -> usize {
        self.reveals.load(Ordering::SeqCst)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HostTerminal for MemoryTerminal {
    fn id(&self) -> &TerminalId {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn send_text(&self, text: &str, structured: bool) -> Result<()> {
        if self.is_disposed() {
            return Err(NotebookError::terminal(format!(
                "terminal {} is disposed",
                self.id
            )));
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SentText {
                text: text.to_string(),
                structured,
            });
        Ok(())
    }

    async fn interrupt(&self) -> Result<()> {
        self.interrupts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn exit_status(&self) -> Option<i32> {
        self.exit_status.get().copied()
    }

    fn reveal(&self) {
        self.reveals.fetch_add(1, Ordering::SeqCst);
    }

    async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.close(0);
    }
}

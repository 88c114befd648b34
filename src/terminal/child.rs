//! Wrapped shell process with process group support
//!
//! Wraps process-wrap's `ChildWrapper` so that interrupting or killing the
//! hosted shell reaches everything it started (the engine, its window).

use process_wrap::tokio::ChildWrapper;
use std::io;
use std::pin::Pin;
use tokio::process::{ChildStderr, ChildStdin, ChildStdout};

/// SIGINT, identical on every Unix
#[cfg(unix)]
pub(crate) const SIGINT: i32 = 2;

/// Shell process running in its own process group
#[derive(Debug)]
pub struct WrappedChild {
    inner: Box<dyn ChildWrapper>,
}

impl WrappedChild {
    pub fn new(inner: Box<dyn ChildWrapper>) -> Self {
        Self { inner }
    }

    /// Take the piped standard streams; each is available once
    pub fn take_stdio(
        &mut self,
    ) -> (
        Option<ChildStdin>,
        Option<ChildStdout>,
        Option<ChildStderr>,
    ) {
        (
            self.inner.stdin().take(),
            self.inner.stdout().take(),
            self.inner.stderr().take(),
        )
    }

    /// Kill the process group and wait for exit
    pub async fn kill(&mut self) -> io::Result<()> {
        Pin::from(self.inner.kill()).await
    }

    /// Start killing without waiting for exit
    pub fn start_kill(&mut self) -> io::Result<()> {
        self.inner.start_kill()
    }

    /// Returns `Some(status)` if the process has exited
    pub fn try_wait(&mut self) -> io::Result<Option<std::process::ExitStatus>> {
        self.inner.try_wait()
    }

    /// Send a signal to the whole process group
    #[cfg(unix)]
    pub fn signal(&self, sig: i32) -> io::Result<()> {
        self.inner.signal(sig)
    }

    /// Process id, 0 once reaped
    pub fn id(&self) -> u32 {
        self.inner.id().unwrap_or(0)
    }
}

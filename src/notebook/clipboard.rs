//! Clipboard collaborator
//!
//! `checkpoint_paste()` makes ManimGL read the code to run from the system
//! clipboard, so previews go through it.

use std::fmt;
use std::process::Stdio;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::types::{NotebookError, Result};

#[async_trait]
pub trait Clipboard: Send + Sync + fmt::Debug {
    async fn read(&self) -> Result<String>;
    async fn write(&self, text: &str) -> Result<()>;
}

/// Clipboard kept in memory; records every write
#[derive(Debug, Default)]
pub struct MemoryClipboard {
    content: Mutex<String>,
    writes: Mutex<Vec<String>>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content(content: impl Into<String>) -> Self {
        Self {
            content: Mutex::new(content.into()),
            writes: Mutex::default(),
        }
    }

    pub fn content(&self) -> String {
        self.content
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Every text written, oldest first
    pub fn writes(&self) -> Vec<String> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Clipboard for MemoryClipboard {
    async fn read(&self) -> Result<String> {
        Ok(self.content())
    }

    async fn write(&self, text: &str) -> Result<()> {
        *self.content.lock().unwrap_or_else(PoisonError::into_inner) = text.to_string();
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text.to_string());
        Ok(())
    }
}

/// Program and arguments for one clipboard direction
#[derive(Debug, Clone, PartialEq, Eq)]
struct ClipboardCommand {
    program: String,
    args: Vec<String>,
}

impl ClipboardCommand {
    fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

/// System clipboard through the platform's command-line tools
///
/// `pbcopy`/`pbpaste` on macOS, `clip`/PowerShell on Windows and `xclip`
/// elsewhere.
#[derive(Debug, Clone)]
pub struct CommandClipboard {
    copy: ClipboardCommand,
    paste: ClipboardCommand,
}

impl Default for CommandClipboard {
    fn default() -> Self {
        Self::platform()
    }
}

impl CommandClipboard {
    pub fn platform() -> Self {
        if cfg!(target_os = "macos") {
            Self {
                copy: ClipboardCommand::new("pbcopy", &[]),
                paste: ClipboardCommand::new("pbpaste", &[]),
            }
        } else if cfg!(windows) {
            Self {
                copy: ClipboardCommand::new("clip", &[]),
                paste: ClipboardCommand::new(
                    "powershell",
                    &["-NoProfile", "-Command", "Get-Clipboard -Raw"],
                ),
            }
        } else {
            Self {
                copy: ClipboardCommand::new("xclip", &["-selection", "clipboard"]),
                paste: ClipboardCommand::new("xclip", &["-selection", "clipboard", "-o"]),
            }
        }
    }

    /// Use custom programs, e.g. `wl-copy` and `wl-paste`
    pub fn custom(copy: (&str, &[&str]), paste: (&str, &[&str])) -> Self {
        Self {
            copy: ClipboardCommand::new(copy.0, copy.1),
            paste: ClipboardCommand::new(paste.0, paste.1),
        }
    }
}

fn spawn_error(program: &str, e: std::io::Error) -> NotebookError {
    if e.kind() == std::io::ErrorKind::NotFound {
        NotebookError::clipboard(format!("{program} not found; install it to preview cells"))
    } else {
        NotebookError::clipboard(format!("failed to run {program}: {e}"))
    }
}

#[async_trait]
impl Clipboard for CommandClipboard {
    async fn read(&self) -> Result<String> {
        let output = self
            .paste
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| spawn_error(&self.paste.program, e))?;

        if !output.status.success() {
            // xclip fails on an empty clipboard
            tracing::debug!(
                program = %self.paste.program,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "Clipboard read failed, treating as empty"
            );
            return Ok(String::new());
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn write(&self, text: &str) -> Result<()> {
        let mut child = self
            .copy
            .command()
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| spawn_error(&self.copy.program, e))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| NotebookError::clipboard("clipboard program has no stdin"))?;
        stdin
            .write_all(text.as_bytes())
            .await
            .map_err(|e| NotebookError::clipboard(e.to_string()))?;
        drop(stdin);

        let status = child
            .wait()
            .await
            .map_err(|e| NotebookError::clipboard(e.to_string()))?;
        if !status.success() {
            return Err(NotebookError::clipboard(format!(
                "{} exited with {status}",
                self.copy.program
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_memory_clipboard() {
        let clipboard = MemoryClipboard::with_content("before");
        assert_eq!(clipboard.read().await.unwrap(), "before");

        clipboard.write("square = Square()\n").await.unwrap();
        clipboard.write("before").await.unwrap();

        assert_eq!(clipboard.content(), "before");
        assert_eq!(clipboard.writes(), vec!["square = Square()\n", "before"]);
    }

    #[tokio::test]
    async fn test_missing_program_is_a_clipboard_error() {
        let clipboard = CommandClipboard::custom(
            ("manim-notebook-no-such-copy", &[]),
            ("manim-notebook-no-such-paste", &[]),
        );

        let err = clipboard.write("x").await.unwrap_err();
        assert!(matches!(err, NotebookError::Clipboard(_)));
        assert!(err.to_string().contains("not found"));
        assert!(clipboard.read().await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_clipboard_round_trip_through_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("clip");
        let copy_script = format!("cat > {}", file.display());
        let paste_script = format!("cat {}", file.display());
        let clipboard = CommandClipboard::custom(
            ("/bin/sh", &["-c", &copy_script]),
            ("/bin/sh", &["-c", &paste_script]),
        );

        clipboard.write("circle = Circle()\n").await.unwrap();
        assert_eq!(clipboard.read().await.unwrap(), "circle = Circle()\n");
    }
}

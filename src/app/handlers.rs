//! Notebook commands read from stdin
//!
//! Lines starting with `:` are commands; line numbers are one-based as in an
//! editor. Anything else is sent to the running REPL as is.

use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cells::{SourceDocument, TextDocument, find_scene_at};
use crate::notebook::Notebook;
use crate::session::{CheckpointMode, CommandOutcome, CommandRequest, SessionState};
use crate::types::{NotebookError, Result};

pub const HELP: &str = "\
:cell N          preview the cell at line N
:skip N          run the cell at line N without animating
:record N        render the cell at line N to a file
:selection A B   preview lines A to B
:start [N]       start the scene at line N (whole first scene without N)
:whole [N]       play the whole scene around line N
:reload N        reload the file and restart at line N
:clear           remove all objects from the scene
:exit            quit the running scene
:cells           list cells
:status          show the session state
:help            show this help
:quit            exit
<code>           run code in the running scene";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    /// Zero-based line inside the cell
    Preview { line: usize, mode: CheckpointMode },
    Selection { start: usize, end: usize },
    Start { line: Option<usize>, whole_scene: bool },
    Reload { line: usize },
    Clear,
    Exit,
    Cells,
    Status,
    Help,
    Quit,
    Raw(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Unknown command :{0} (try :help)")]
    UnknownCommand(String),

    #[error(":{0} needs a line number")]
    MissingLine(String),

    #[error("Invalid line number {0:?}; lines start at 1")]
    InvalidLine(String),
}

/// Parse one input line; blank input is `None`
pub fn parse_command(input: &str) -> std::result::Result<Option<ReplCommand>, ParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let Some(rest) = trimmed.strip_prefix(':') else {
        return Ok(Some(ReplCommand::Raw(input.trim_end().to_string())));
    };

    let mut words = rest.split_whitespace();
    let name = words.next().unwrap_or_default().to_string();
    let mut line_arg = || -> std::result::Result<Option<usize>, ParseError> {
        words.next().map(parse_line).transpose()
    };
    let required = |line: Option<usize>| line.ok_or_else(|| ParseError::MissingLine(name.clone()));

    let command = match name.as_str() {
        "cell" | "c" => ReplCommand::Preview {
            line: required(line_arg()?)?,
            mode: CheckpointMode::Play,
        },
        "skip" => ReplCommand::Preview {
            line: required(line_arg()?)?,
            mode: CheckpointMode::Skip,
        },
        "record" => ReplCommand::Preview {
            line: required(line_arg()?)?,
            mode: CheckpointMode::Record,
        },
        "selection" | "sel" => {
            let start = required(line_arg()?)?;
            let end = required(line_arg()?)?;
            ReplCommand::Selection { start, end }
        }
        "start" | "s" => ReplCommand::Start {
            line: line_arg()?,
            whole_scene: false,
        },
        "whole" => ReplCommand::Start {
            line: line_arg()?,
            whole_scene: true,
        },
        "reload" | "r" => ReplCommand::Reload {
            line: required(line_arg()?)?,
        },
        "clear" => ReplCommand::Clear,
        "exit" => ReplCommand::Exit,
        "cells" => ReplCommand::Cells,
        "status" => ReplCommand::Status,
        "help" | "h" => ReplCommand::Help,
        "quit" | "q" => ReplCommand::Quit,
        _ => return Err(ParseError::UnknownCommand(name.clone())),
    };
    Ok(Some(command))
}

fn parse_line(text: &str) -> std::result::Result<usize, ParseError> {
    match text.parse::<usize>() {
        Ok(line) if line >= 1 => Ok(line - 1),
        _ => Err(ParseError::InvalidLine(text.to_string())),
    }
}

/// What a command needs to run on its own task
#[derive(Debug, Clone)]
pub struct CommandContext {
    file: PathBuf,
    notebook: Arc<Notebook>,
}

impl CommandContext {
    pub fn new(file: PathBuf, notebook: Arc<Notebook>) -> Self {
        Self { file, notebook }
    }

    /// Run `command`; returns text to show the user, if any
    ///
    /// The scene file is re-read for every command, so edits saved in the
    /// meantime are picked up.
    pub async fn run(&self, command: ReplCommand) -> Result<Option<String>> {
        match command {
            ReplCommand::Preview { line, mode } => {
                let document = self.document().await?;
                let outcome = self.notebook.preview_cell(&document, line, mode).await?;
                Ok(describe_outcome(outcome))
            }
            ReplCommand::Selection { start, end } => {
                let document = self.document().await?;
                let outcome = self
                    .notebook
                    .preview_selection(&document, start, end, CheckpointMode::Play)
                    .await?;
                Ok(describe_outcome(outcome))
            }
            ReplCommand::Start { line, whole_scene } => {
                let document = self.document().await?;
                let cursor = start_cursor(&document, line, whole_scene)?;
                self.notebook.start_scene(&document, cursor).await?;
                Ok(Some("Scene started".to_string()))
            }
            ReplCommand::Reload { line } => {
                let outcome = self.notebook.reload_and_restart(line, true).await?;
                Ok(describe_outcome(outcome))
            }
            ReplCommand::Clear => {
                let outcome = self.notebook.clear_scene().await?;
                Ok(describe_outcome(outcome))
            }
            ReplCommand::Exit => {
                self.notebook.exit_scene().await;
                Ok(Some("Scene exited".to_string()))
            }
            ReplCommand::Cells => {
                let document = self.document().await?;
                Ok(Some(list_cells(&document)))
            }
            ReplCommand::Status => Ok(Some(self.status())),
            ReplCommand::Help => Ok(Some(HELP.to_string())),
            ReplCommand::Quit => Ok(None),
            ReplCommand::Raw(code) => {
                let outcome = self
                    .notebook
                    .controller()
                    .execute_require_active(CommandRequest::new(code), false)
                    .await?;
                Ok(describe_outcome(outcome))
            }
        }
    }

    async fn document(&self) -> Result<SourceDocument> {
        Ok(SourceDocument::open(&self.file).await?)
    }

    fn status(&self) -> String {
        let snapshot = self.notebook.controller().snapshot();
        let state = match snapshot.state {
            SessionState::NoSession => "no session",
            SessionState::Bootstrapping => "starting",
            SessionState::Idle => "idle",
            SessionState::Busy => "busy",
        };
        let mut status = format!("Session: {state}");
        if let Some(terminal) = &snapshot.terminal {
            write!(status, " (terminal {terminal}, unit {})", snapshot.unit_counter).ok();
        }
        if let Some(version) = snapshot.version {
            write!(status, ", ManimGL {version}").ok();
        }
        status
    }
}

/// Zero-based line to start from
///
/// Without a line the first scene of the file is played whole; with
/// `whole_scene` the class line of the scene around `line` is used.
fn start_cursor(document: &SourceDocument, line: Option<usize>, whole_scene: bool) -> Result<usize> {
    let Some(line) = line else {
        return (0..document.line_count())
            .find(|&l| find_scene_at(document, l).is_some_and(|scene| scene.class_line == l))
            .ok_or(NotebookError::NoSceneAtLine(0));
    };
    if whole_scene {
        find_scene_at(document, line)
            .map(|scene| scene.class_line)
            .ok_or(NotebookError::NoSceneAtLine(line))
    } else {
        Ok(line)
    }
}

fn list_cells(document: &SourceDocument) -> String {
    let cells = Notebook::cells(document);
    if cells.is_empty() {
        return "No cells".to_string();
    }
    let mut listing = String::new();
    for cell in cells {
        writeln!(
            listing,
            "{:>4}-{:<4} {:<16} {}",
            cell.range.start_line + 1,
            cell.range.end_line + 1,
            cell.scene.as_deref().unwrap_or("-"),
            cell.title.as_deref().unwrap_or("(untitled)")
        )
        .ok();
    }
    listing.truncate(listing.trim_end().len());
    listing
}

fn describe_outcome(outcome: CommandOutcome) -> Option<String> {
    match outcome {
        CommandOutcome::Finished | CommandOutcome::Issued => None,
        CommandOutcome::Interrupted => Some("Interrupted".to_string()),
        CommandOutcome::SessionEnded => Some("Session ended".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notebook::MemoryClipboard;
    use crate::session::test_support::*;
    use crate::terminal::MemoryTerminalHost;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const SCENE: &str = "\
from manimlib import *

class Intro(Scene):
    def construct(self):
        ## Create a circle
        circle = Circle()

class Outro(Scene):
    def construct(self):
        text = Text(\"Bye\")
";

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("   "), Ok(None));
        assert_eq!(
            parse_command(":cell 12"),
            Ok(Some(ReplCommand::Preview {
                line: 11,
                mode: CheckpointMode::Play
            }))
        );
        assert_eq!(
            parse_command(":record 3"),
            Ok(Some(ReplCommand::Preview {
                line: 2,
                mode: CheckpointMode::Record
            }))
        );
        assert_eq!(
            parse_command(":sel 4 9"),
            Ok(Some(ReplCommand::Selection { start: 3, end: 8 }))
        );
        assert_eq!(
            parse_command(":start"),
            Ok(Some(ReplCommand::Start {
                line: None,
                whole_scene: false
            }))
        );
        assert_eq!(parse_command(":reload 5"), Ok(Some(ReplCommand::Reload { line: 4 })));
        assert_eq!(parse_command(":q"), Ok(Some(ReplCommand::Quit)));
        assert_eq!(
            parse_command("    self.play(FadeOut(circle))\n"),
            Ok(Some(ReplCommand::Raw("    self.play(FadeOut(circle))".to_string())))
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            parse_command(":cell"),
            Err(ParseError::MissingLine("cell".to_string()))
        );
        assert_eq!(
            parse_command(":cell 0"),
            Err(ParseError::InvalidLine("0".to_string()))
        );
        assert_eq!(
            parse_command(":reload soon"),
            Err(ParseError::InvalidLine("soon".to_string()))
        );
        assert_eq!(
            parse_command(":render"),
            Err(ParseError::UnknownCommand("render".to_string()))
        );
    }

    fn context() -> (CommandContext, Arc<MemoryTerminalHost>, TempDir) {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("scene.py");
        std::fs::write(&file, SCENE).unwrap();
        let (controller, host) = controller_with(test_config());
        let notebook = Arc::new(Notebook::new(controller, Arc::new(MemoryClipboard::new())));
        (CommandContext::new(file, notebook), host, dir)
    }

    #[tokio::test]
    async fn test_cells_and_status() {
        let (context, _host, _dir) = context();

        let cells = context.run(ReplCommand::Cells).await.unwrap().unwrap();
        assert_eq!(cells, "   5-6    Intro            Create a circle");

        let status = context.run(ReplCommand::Status).await.unwrap().unwrap();
        assert_eq!(status, "Session: no session");
    }

    #[tokio::test]
    async fn test_raw_code_needs_a_session() {
        let (context, host, _dir) = context();
        let result = context.run(ReplCommand::Raw("x = 1".to_string())).await;
        assert!(matches!(result, Err(NotebookError::NoActiveSession)));
        assert!(host.terminals().is_empty());
    }

    #[tokio::test]
    async fn test_start_without_line_plays_first_scene() {
        let (context, host, dir) = context();
        let task = tokio::spawn({
            let context = context.clone();
            async move {
                context
                    .run(ReplCommand::Start {
                        line: None,
                        whole_scene: false,
                    })
                    .await
            }
        });

        let terminal = terminal_with_sent(&host, 0, 1).await;
        let expected = format!("manimgl \"{}\" Intro", dir.path().join("scene.py").display());
        assert_eq!(terminal.sent_texts()[0], expected);
        terminal.emit_output(BANNER);
        terminal.emit_output("In [1]: ");
        task.await.unwrap().unwrap();

        let status = context.run(ReplCommand::Status).await.unwrap().unwrap();
        assert!(status.starts_with("Session: idle (terminal "));
        assert!(status.ends_with(", unit 1), ManimGL 1.7.2"));
    }

    #[test]
    fn test_whole_scene_uses_class_line() {
        let document = SourceDocument::from_text(SCENE);
        assert_eq!(start_cursor(&document, Some(9), true).unwrap(), 7);
        assert_eq!(start_cursor(&document, Some(9), false).unwrap(), 9);
        assert_eq!(start_cursor(&document, None, false).unwrap(), 2);
        assert!(matches!(
            start_cursor(&document, Some(0), true),
            Err(NotebookError::NoSceneAtLine(0))
        ));
    }
}

//! Editor-level actions on a scene file
//!
//! These combine the cell and scene locators with the session controller:
//! previewing a cell pastes its code through the clipboard and runs
//! `checkpoint_paste()`, starting ManimGL at the cell first if needed.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::oneshot;

use super::clipboard::Clipboard;
use crate::cells::{
    CellRange, SceneLocation, TextDocument, cell_code, cell_title, compute_ranges, find_scene_at,
    range_containing,
};
use crate::session::{
    BootstrapTarget, CLEAR_COMMAND, CheckpointMode, CommandHandlers, CommandOutcome,
    CommandRequest, SessionController,
};
use crate::types::{NotebookError, Result};

/// A cell as shown in listings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellSummary {
    pub range: CellRange,
    /// Text after the `##` marker
    pub title: Option<String>,
    /// Scene class the cell belongs to
    pub scene: Option<String>,
}

/// Actions available to an editor on one controller
pub struct Notebook {
    controller: Arc<SessionController>,
    clipboard: Arc<dyn Clipboard>,
}

impl fmt::Debug for Notebook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notebook")
            .field("clipboard", &self.clipboard)
            .field("session", &self.controller.snapshot())
            .finish()
    }
}

impl Notebook {
    pub fn new(controller: Arc<SessionController>, clipboard: Arc<dyn Clipboard>) -> Self {
        Self {
            controller,
            clipboard,
        }
    }

    pub fn controller(&self) -> &Arc<SessionController> {
        &self.controller
    }

    /// All cells of `document` with their titles and scenes
    pub fn cells<D: TextDocument + ?Sized>(document: &D) -> Vec<CellSummary> {
        compute_ranges(document)
            .into_iter()
            .map(|range| CellSummary {
                range,
                title: cell_title(document, range),
                scene: find_scene_at(document, range.start_line).map(|scene| scene.name),
            })
            .collect()
    }

    /// Run the cell containing zero-based `line`
    ///
    /// Without a running session, ManimGL is started at the cell first.
    pub async fn preview_cell<D: TextDocument + ?Sized>(
        &self,
        document: &D,
        line: usize,
        mode: CheckpointMode,
    ) -> Result<CommandOutcome> {
        let path = saved_path(document)?;
        let range = range_containing(document, line).ok_or(NotebookError::NoCellAtLine(line))?;
        let scene = scene_at(document, range.start_line)?;
        let code = cell_code(document, range);
        let target = BootstrapTarget::at_cursor(path, &scene, range.start_line);

        tracing::info!(
            scene = %scene.name,
            start_line = range.start_line,
            end_line = range.end_line,
            "Previewing cell"
        );
        self.preview_code(code, &target, mode).await
    }

    /// Run the zero-based lines `start_line..=end_line`
    pub async fn preview_selection<D: TextDocument + ?Sized>(
        &self,
        document: &D,
        start_line: usize,
        end_line: usize,
        mode: CheckpointMode,
    ) -> Result<CommandOutcome> {
        let path = saved_path(document)?;
        if start_line > end_line || end_line >= document.line_count() {
            return Err(NotebookError::NoCellAtLine(start_line));
        }
        let first_code_line = (start_line..=end_line)
            .find(|&l| !document.is_blank(l))
            .ok_or(NotebookError::NoCellAtLine(start_line))?;
        let scene = scene_at(document, first_code_line)?;
        let code = cell_code(document, CellRange::new(first_code_line, end_line));
        let target = BootstrapTarget::at_cursor(path, &scene, first_code_line);

        tracing::info!(scene = %scene.name, start_line, end_line, "Previewing selection");
        self.preview_code(code, &target, mode).await
    }

    /// Start the scene around zero-based `line`, asking before replacing a
    /// running one
    ///
    /// On the class line itself the whole scene is played.
    pub async fn start_scene<D: TextDocument + ?Sized>(&self, document: &D, line: usize) -> Result<()> {
        let path = saved_path(document)?;
        let scene = scene_at(document, line)?;
        let target = BootstrapTarget::at_cursor(path, &scene, line);
        tracing::info!(scene = %scene.name, start_line = ?target.start_line, "Starting scene");
        self.controller.bootstrap_explicit(&target, true).await
    }

    /// Reload the file and restart the REPL at zero-based `line`
    pub async fn reload_and_restart(&self, line: usize, wait: bool) -> Result<CommandOutcome> {
        self.controller.reload_and_restart(line + 1, wait).await
    }

    /// Remove all mobjects from the running scene
    pub async fn clear_scene(&self) -> Result<CommandOutcome> {
        self.controller
            .execute_require_active(CommandRequest::new(CLEAR_COMMAND), false)
            .await
    }

    pub async fn exit_scene(&self) {
        self.controller.force_quit().await;
    }

    async fn preview_code(
        &self,
        code: String,
        target: &BootstrapTarget,
        mode: CheckpointMode,
    ) -> Result<CommandOutcome> {
        let previous = match self.clipboard.read().await {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!(error = %e, "Could not save clipboard content");
                None
            }
        };
        self.clipboard.write(&code).await?;

        let (issued_tx, issued_rx) = oneshot::channel();
        let mut issued_tx = Some(issued_tx);
        let handlers = CommandHandlers::new().on_command_issued(move || {
            if let Some(tx) = issued_tx.take() {
                drop(tx.send(()));
            }
        });
        self.spawn_clipboard_restore(previous, issued_rx);

        let request = CommandRequest::new(mode.command()).handlers(handlers);
        self.controller
            .execute_in_session_or_bootstrap(request, target)
            .await
    }

    /// Put `previous` back once ManimGL had time to read the clipboard, or
    /// right away if the command was never issued
    fn spawn_clipboard_restore(&self, previous: Option<String>, issued: oneshot::Receiver<()>) {
        let Some(previous) = previous else {
            return;
        };
        let clipboard = Arc::clone(&self.clipboard);
        let delay = self.controller.config().clipboard_restore;
        tokio::spawn(async move {
            if issued.await.is_ok() {
                tokio::time::sleep(delay).await;
            }
            if let Err(e) = clipboard.write(&previous).await {
                tracing::warn!(error = %e, "Could not restore clipboard content");
            }
        });
    }
}

fn saved_path<D: TextDocument + ?Sized>(document: &D) -> Result<&Path> {
    document.path().ok_or(NotebookError::UnsavedDocument)
}

fn scene_at<D: TextDocument + ?Sized>(document: &D, line: usize) -> Result<SceneLocation> {
    find_scene_at(document, line).ok_or(NotebookError::NoSceneAtLine(line))
}

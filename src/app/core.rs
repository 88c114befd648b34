//! Application state
//!
//! `NotebookApp` owns everything that lives for the whole run: the session
//! controller, the terminal host and the settings watcher.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use super::handlers::CommandContext;
use crate::cli::Cli;
use crate::notebook::{CommandClipboard, Notebook};
use crate::session::{SessionConfig, SessionController};
use crate::settings::{SettingsManager, SettingsWatcher, WatcherHandle};
use crate::terminal::ProcessTerminalHost;
use crate::types::NotebookConfig;

const SETTINGS_DEBOUNCE: Duration = Duration::from_millis(200);

/// The running application
pub struct NotebookApp {
    file: PathBuf,
    notebook: Arc<Notebook>,
    host: Option<Arc<ProcessTerminalHost>>,
    watcher: Option<WatcherHandle>,
}

impl std::fmt::Debug for NotebookApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotebookApp")
            .field("file", &self.file)
            .field("notebook", &self.notebook)
            .field("watching_settings", &self.watcher.is_some())
            .finish()
    }
}

impl NotebookApp {
    /// Build the application for the scene file named on the command line
    pub async fn new(cli: &Cli) -> anyhow::Result<Self> {
        let file = std::path::absolute(&cli.file)?;
        if !file.is_file() {
            anyhow::bail!("scene file {} does not exist", file.display());
        }
        let project_dir = file
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

        let settings = SettingsManager::new(&project_dir)?;
        let mut env = NotebookConfig::from_env();
        if let Some(manimgl) = &cli.manimgl {
            env.manimgl_path = Some(manimgl.clone());
        }
        let config = SessionConfig::resolve(settings.settings(), &env);
        tracing::info!(
            file = %file.display(),
            program = %config.program,
            interrupt_policy = ?config.interrupt_policy,
            "Configuration resolved"
        );

        let host = Arc::new(match &config.shell {
            Some(shell) => ProcessTerminalHost::with_shell(shell),
            None => ProcessTerminalHost::new(),
        });
        let controller = SessionController::new(host.clone(), config);
        let notebook = Arc::new(Notebook::new(
            controller.clone(),
            Arc::new(CommandClipboard::platform()),
        ));

        let settings = Arc::new(RwLock::new(settings));
        let watcher =
            match SettingsWatcher::start_auto_reload(settings, env, controller, SETTINGS_DEBOUNCE)
                .await
            {
                Ok(handle) => Some(handle),
                Err(e) => {
                    tracing::warn!(error = %e, "Settings will not be reloaded on change");
                    None
                }
            };

        Ok(Self {
            file,
            notebook,
            host: Some(host),
            watcher,
        })
    }

    /// Build from existing parts, e.g. a notebook on a memory terminal host
    pub fn from_parts(file: impl Into<PathBuf>, notebook: Arc<Notebook>) -> Self {
        Self {
            file: file.into(),
            notebook,
            host: None,
            watcher: None,
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn controller(&self) -> &Arc<SessionController> {
        self.notebook.controller()
    }

    /// A cheap handle for running commands on spawned tasks
    pub fn context(&self) -> CommandContext {
        CommandContext::new(self.file.clone(), self.notebook.clone())
    }

    /// Stop watching settings and take down every terminal
    pub async fn shutdown(self) {
        tracing::info!("Shutting down");
        if let Some(watcher) = self.watcher {
            watcher.stop();
        }
        self.notebook.controller().shutdown().await;
        if let Some(host) = self.host {
            host.dispose_all().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notebook::MemoryClipboard;
    use crate::session::test_support::*;

    #[tokio::test]
    async fn test_missing_scene_file() {
        let cli = Cli {
            file: PathBuf::from("/definitely/not/here/scene.py"),
            ..Default::default()
        };
        let err = NotebookApp::new(&cli).await.unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[tokio::test]
    async fn test_shutdown_disposes_session_terminal() {
        let (controller, host) = controller_with(test_config());
        let notebook = Arc::new(Notebook::new(
            controller.clone(),
            Arc::new(MemoryClipboard::new()),
        ));
        let app = NotebookApp::from_parts("/tmp/scenes/intro.py", notebook);
        assert_eq!(app.file(), Path::new("/tmp/scenes/intro.py"));

        let terminal = start_active(app.controller(), &host).await;
        app.shutdown().await;

        assert!(terminal.is_disposed());
        assert!(!controller.has_active_session());
    }
}

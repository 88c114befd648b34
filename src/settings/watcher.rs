//! Settings file watcher
//!
//! Monitors the settings directories and pushes reloaded settings into the
//! session controller.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{DebounceEventResult, DebouncedEventKind, Debouncer, new_debouncer};
use tokio::sync::{RwLock, mpsc};

use super::SettingsManager;
use super::manager::{LOCAL_SETTINGS_FILE, SETTINGS_FILE};
use crate::session::{SessionConfig, SessionController};
use crate::types::NotebookConfig;

/// Settings file watcher
///
/// Sends a `SettingsChangeEvent` through a channel whenever a settings file
/// in one of the watched directories changes.
#[allow(missing_debug_implementations)]
pub struct SettingsWatcher {
    /// Held to keep the watcher alive
    _watcher: Debouncer<RecommendedWatcher>,
    watched_paths: Vec<PathBuf>,
}

/// Event sent when settings files change
#[derive(Debug, Clone)]
pub struct SettingsChangeEvent {
    pub changed_paths: Vec<PathBuf>,
}

impl SettingsWatcher {
    /// Watch those of `dirs` that exist
    pub fn new(
        dirs: impl IntoIterator<Item = PathBuf>,
        debounce: Duration,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SettingsChangeEvent>), WatcherError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let watched_paths: Vec<PathBuf> = dirs.into_iter().filter(|dir| dir.is_dir()).collect();

        let mut watcher = new_debouncer(debounce, move |result: DebounceEventResult| match result {
            Ok(events) => {
                let changed_paths: Vec<PathBuf> = events
                    .into_iter()
                    .filter(|e| matches!(e.kind, DebouncedEventKind::Any))
                    .map(|e| e.path)
                    .filter(|p| is_settings_file(p))
                    .collect();

                if !changed_paths.is_empty() {
                    tracing::debug!(paths = ?changed_paths, "Settings files changed");
                    drop(tx.send(SettingsChangeEvent { changed_paths }));
                }
            }
            Err(e) => {
                tracing::warn!(error = ?e, "Settings watcher error");
            }
        })
        .map_err(|e| WatcherError::Init(e.to_string()))?;

        for path in &watched_paths {
            watcher
                .watcher()
                .watch(path, RecursiveMode::NonRecursive)
                .map_err(|e| WatcherError::Watch(path.clone(), e.to_string()))?;
            tracing::info!(path = %path.display(), "Watching settings directory");
        }

        Ok((
            Self {
                _watcher: watcher,
                watched_paths,
            },
            rx,
        ))
    }

    pub fn watched_paths(&self) -> &[PathBuf] {
        &self.watched_paths
    }

    /// Reload settings on change and hand the result to `controller`
    ///
    /// The new configuration applies from the next bootstrap or command on;
    /// a running session is left alone. A working directory set on the
    /// current configuration is kept.
    pub async fn start_auto_reload(
        manager: Arc<RwLock<SettingsManager>>,
        env: NotebookConfig,
        controller: Arc<SessionController>,
        debounce: Duration,
    ) -> Result<WatcherHandle, WatcherError> {
        let dirs = manager.read().await.settings_dirs();
        let (watcher, mut rx) = Self::new(dirs, debounce)?;

        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                tracing::info!(paths = ?event.changed_paths, "Settings changed, reloading");
                let settings = {
                    let mut manager = manager.write().await;
                    manager.reload();
                    manager.settings().clone()
                };
                let current = controller.config();
                let mut config = SessionConfig::resolve(&settings, &env);
                config.cwd = current.cwd;
                config.interrupt_policy = current.interrupt_policy;
                controller.update_config(config);
            }
        });

        Ok(WatcherHandle { watcher, task })
    }
}

/// Handle to a running auto-reload task
#[allow(missing_debug_implementations)]
pub struct WatcherHandle {
    watcher: SettingsWatcher,
    task: tokio::task::JoinHandle<()>,
}

impl WatcherHandle {
    pub fn stop(self) {
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn watched_paths(&self) -> &[PathBuf] {
        self.watcher.watched_paths()
    }
}

fn is_settings_file(path: &Path) -> bool {
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    file_name == SETTINGS_FILE || file_name == LOCAL_SETTINGS_FILE
}

/// Errors that can occur during settings watching
#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    #[error("Failed to initialize watcher: {0}")]
    Init(String),

    #[error("Failed to watch path {0:?}: {1}")]
    Watch(PathBuf, String),
}

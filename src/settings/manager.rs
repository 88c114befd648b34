//! Settings manager implementation
//!
//! Handles loading, merging, and accessing settings from multiple sources.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::{NotebookError, Result};

/// Settings directory, both under the home directory and the project
pub(crate) const SETTINGS_DIR: &str = ".manim-notebook";
pub(crate) const SETTINGS_FILE: &str = "settings.json";
pub(crate) const LOCAL_SETTINGS_FILE: &str = "settings.local.json";

/// Notebook settings
///
/// Every field is optional so that files can be layered; defaults are applied
/// when the session configuration is resolved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// ManimGL executable
    #[serde(default)]
    pub manimgl_path: Option<String>,

    /// Shell for new terminals
    #[serde(default)]
    pub shell: Option<String>,

    /// Ask before replacing a running scene
    #[serde(default)]
    pub confirm_killing_active_scene: Option<bool>,

    /// Wait between creating a terminal and starting ManimGL in it
    #[serde(default)]
    pub delay_new_terminal_ms: Option<u64>,

    /// How long to wait for the welcome banner
    #[serde(default)]
    pub startup_timeout_ms: Option<u64>,

    /// Startup progress is reported once per slice
    #[serde(default)]
    pub startup_progress_slice_ms: Option<u64>,

    /// Pause after interrupting a running command before sending the next
    #[serde(default)]
    pub interrupt_settle_ms: Option<u64>,

    /// How long previewed code stays on the clipboard
    #[serde(default)]
    pub clipboard_restore_ms: Option<u64>,

    /// Start ManimGL with `--autoreload` when supported
    #[serde(default)]
    pub autoreload: Option<bool>,

    /// Extra ManimGL command-line flags
    #[serde(default)]
    pub extra_flags: Option<Vec<String>>,

    /// Environment for new terminals
    #[serde(default)]
    pub env: Option<HashMap<String, String>>,

    /// Unknown keys, kept so files round-trip
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

macro_rules! take_some {
    ($self:ident, $other:ident, $($field:ident),+ $(,)?) => {
        $(
            if $other.$field.is_some() {
                $self.$field = $other.$field;
            }
        )+
    };
}

impl Settings {
    /// Create empty settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse settings from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Merge another settings into this one
    ///
    /// Values from `other` take precedence over `self`. `env` maps are
    /// combined key by key, `extraFlags` is replaced as a whole.
    pub fn merge(&mut self, other: Settings) {
        take_some!(
            self,
            other,
            manimgl_path,
            shell,
            confirm_killing_active_scene,
            delay_new_terminal_ms,
            startup_timeout_ms,
            startup_progress_slice_ms,
            interrupt_settle_ms,
            clipboard_restore_ms,
            autoreload,
            extra_flags,
        );
        if let Some(other_env) = other.env {
            self.env.get_or_insert_with(HashMap::new).extend(other_env);
        }
        self.extra.extend(other.extra);
    }
}

/// Settings manager for loading and accessing settings
#[derive(Debug)]
pub struct SettingsManager {
    /// The merged settings
    settings: Settings,
    /// Project working directory
    project_dir: PathBuf,
    /// Overrides the home directory lookup
    user_dir: Option<PathBuf>,
}

impl SettingsManager {
    /// Create a new settings manager and load settings
    pub fn new(project_dir: impl AsRef<Path>) -> Result<Self> {
        let project_dir = project_dir.as_ref().to_path_buf();
        if !project_dir.is_dir() {
            return Err(NotebookError::config_error(format!(
                "project directory {} does not exist",
                project_dir.display()
            )));
        }
        let settings = load_all_settings(None, &project_dir);
        Ok(Self {
            settings,
            project_dir,
            user_dir: None,
        })
    }

    /// Like `new`, reading user settings from `user_dir` instead of the home
    /// directory
    pub fn with_user_dir(project_dir: impl AsRef<Path>, user_dir: impl AsRef<Path>) -> Result<Self> {
        let mut manager = Self::new(project_dir)?;
        manager.user_dir = Some(user_dir.as_ref().to_path_buf());
        manager.reload();
        Ok(manager)
    }

    /// Get the merged settings
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Get the project directory
    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Reload settings from all sources
    pub fn reload(&mut self) {
        self.settings = load_all_settings(self.user_dir.as_deref(), &self.project_dir);
    }

    /// Directories a watcher should observe
    pub fn settings_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        if let Some(user) = self.user_settings_dir() {
            dirs.push(user);
        }
        dirs.push(self.project_dir.join(SETTINGS_DIR));
        dirs
    }

    fn user_settings_dir(&self) -> Option<PathBuf> {
        user_settings_dir(self.user_dir.as_deref())
    }

    /// Get the ManimGL executable if configured
    pub fn manimgl_path(&self) -> Option<&str> {
        self.settings.manimgl_path.as_deref()
    }

    /// Get environment variables
    pub fn env(&self) -> Option<&HashMap<String, String>> {
        self.settings.env.as_ref()
    }
}

impl Default for SettingsManager {
    fn default() -> Self {
        Self {
            settings: Settings::default(),
            project_dir: PathBuf::from("."),
            user_dir: None,
        }
    }
}

fn user_settings_dir(user_dir: Option<&Path>) -> Option<PathBuf> {
    match user_dir {
        Some(dir) => Some(dir.to_path_buf()),
        None => dirs::home_dir().map(|home| home.join(SETTINGS_DIR)),
    }
}

/// Load and merge all settings sources
///
/// Priority: Local > Project > User
fn load_all_settings(user_dir: Option<&Path>, project_dir: &Path) -> Settings {
    let mut settings = Settings::new();

    if let Some(user) = user_settings_dir(user_dir)
        .and_then(|dir| load_settings_file(&dir.join(SETTINGS_FILE)))
    {
        tracing::debug!("Loaded user settings");
        settings.merge(user);
    }

    let project_settings_dir = project_dir.join(SETTINGS_DIR);
    if let Some(project) = load_settings_file(&project_settings_dir.join(SETTINGS_FILE)) {
        tracing::debug!("Loaded project settings from {:?}", project_dir);
        settings.merge(project);
    }
    if let Some(local) = load_settings_file(&project_settings_dir.join(LOCAL_SETTINGS_FILE)) {
        tracing::debug!("Loaded local settings from {:?}", project_dir);
        settings.merge(local);
    }

    settings
}

/// Load settings from a file; unreadable or malformed files are skipped
fn load_settings_file(path: &Path) -> Option<Settings> {
    if !path.exists() {
        return None;
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match Settings::from_json(&content) {
            Ok(settings) => Some(settings),
            Err(e) => {
                tracing::warn!("Failed to parse settings file {:?}: {}", path, e);
                None
            }
        },
        Err(e) => {
            tracing::warn!("Failed to read settings file {:?}: {}", path, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_settings(dir: &Path, name: &str, json: &str) {
        std::fs::create_dir_all(dir).unwrap();
        let mut file = std::fs::File::create(dir.join(name)).unwrap();
        writeln!(file, "{json}").unwrap();
    }

    #[test]
    fn test_settings_default() {
        let settings = Settings::new();
        assert!(settings.manimgl_path.is_none());
        assert!(settings.autoreload.is_none());
        assert!(settings.env.is_none());
    }

    #[test]
    fn test_settings_parse_camel_case() {
        let settings = Settings::from_json(
            r#"{
                "manimglPath": "/opt/manim/bin/manimgl",
                "confirmKillingActiveScene": false,
                "delayNewTerminalMs": 250,
                "extraFlags": ["--fullscreen"],
                "somethingElse": 1
            }"#,
        )
        .unwrap();

        assert_eq!(settings.manimgl_path.as_deref(), Some("/opt/manim/bin/manimgl"));
        assert_eq!(settings.confirm_killing_active_scene, Some(false));
        assert_eq!(settings.delay_new_terminal_ms, Some(250));
        assert_eq!(settings.extra_flags, Some(vec!["--fullscreen".to_string()]));
        assert!(settings.extra.contains_key("somethingElse"));
    }

    #[test]
    fn test_settings_merge() {
        let mut base = Settings::new();
        base.manimgl_path = Some("manimgl".to_string());
        base.autoreload = Some(true);
        base.env = Some(HashMap::from([("A".to_string(), "1".to_string())]));

        let mut other = Settings::new();
        other.manimgl_path = Some("/usr/local/bin/manimgl".to_string());
        other.env = Some(HashMap::from([("B".to_string(), "2".to_string())]));

        base.merge(other);

        assert_eq!(base.manimgl_path.as_deref(), Some("/usr/local/bin/manimgl"));
        assert_eq!(base.autoreload, Some(true));
        assert_eq!(base.env.unwrap().len(), 2);
    }

    #[test]
    fn test_missing_project_dir_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope");
        assert!(matches!(
            SettingsManager::new(&missing),
            Err(NotebookError::ConfigError(_))
        ));
    }

    #[test]
    fn test_local_overrides_project_overrides_user() {
        let user = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        let settings_dir = project.path().join(SETTINGS_DIR);

        write_settings(
            user.path(),
            SETTINGS_FILE,
            r#"{"manimglPath": "user-manimgl", "shell": "/bin/zsh", "startupTimeoutMs": 1}"#,
        );
        write_settings(
            &settings_dir,
            SETTINGS_FILE,
            r#"{"manimglPath": "project-manimgl", "startupTimeoutMs": 2}"#,
        );
        write_settings(&settings_dir, LOCAL_SETTINGS_FILE, r#"{"startupTimeoutMs": 3}"#);

        let manager = SettingsManager::with_user_dir(project.path(), user.path()).unwrap();
        let settings = manager.settings();

        assert_eq!(settings.shell.as_deref(), Some("/bin/zsh"));
        assert_eq!(manager.manimgl_path(), Some("project-manimgl"));
        assert_eq!(settings.startup_timeout_ms, Some(3));
    }

    #[test]
    fn test_malformed_file_is_skipped() {
        let user = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        let settings_dir = project.path().join(SETTINGS_DIR);
        write_settings(&settings_dir, SETTINGS_FILE, r#"{"autoreload": true}"#);
        write_settings(&settings_dir, LOCAL_SETTINGS_FILE, "{ not json");

        let manager = SettingsManager::with_user_dir(project.path(), user.path()).unwrap();
        assert_eq!(manager.settings().autoreload, Some(true));
    }

    #[test]
    fn test_settings_manager_reload() {
        let user = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        let settings_dir = project.path().join(SETTINGS_DIR);
        write_settings(&settings_dir, SETTINGS_FILE, r#"{"manimglPath": "a"}"#);

        let mut manager = SettingsManager::with_user_dir(project.path(), user.path()).unwrap();
        assert_eq!(manager.manimgl_path(), Some("a"));

        write_settings(&settings_dir, SETTINGS_FILE, r#"{"manimglPath": "b"}"#);
        manager.reload();
        assert_eq!(manager.manimgl_path(), Some("b"));
        assert_eq!(
            manager.settings_dirs(),
            vec![user.path().to_path_buf(), settings_dir]
        );
    }
}

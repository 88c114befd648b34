//! Resolved session configuration
//!
//! Priority for every value: environment > settings files > defaults.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::settings::Settings;
use crate::types::NotebookConfig;

pub const DEFAULT_PROGRAM: &str = "manimgl";
pub const DEFAULT_TERMINAL_NAME: &str = "ManimGL";

const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_STARTUP_PROGRESS_SLICE: Duration = Duration::from_millis(500);
const DEFAULT_INTERRUPT_SETTLE: Duration = Duration::from_millis(500);
const DEFAULT_CLIPBOARD_RESTORE: Duration = Duration::from_millis(650);

/// What an interrupt does to a running session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptPolicy {
    /// Interrupting cancels the running command and keeps the REPL
    Cooperative,
    /// Interrupting may tear down the whole REPL, so commands are serialized
    Destructive,
}

impl InterruptPolicy {
    /// Destructive on Windows, cooperative elsewhere
    pub fn platform_default() -> Self {
        if cfg!(windows) {
            Self::Destructive
        } else {
            Self::Cooperative
        }
    }
}

/// Everything the session controller needs to know
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// ManimGL executable
    pub program: String,
    pub shell: Option<String>,
    pub terminal_name: String,
    /// Working directory for new terminals; the scene file's directory when
    /// unset
    pub cwd: Option<PathBuf>,
    pub env: HashMap<String, String>,
    pub extra_flags: Vec<String>,
    pub autoreload: bool,
    pub confirm_killing_active_scene: bool,
    pub delay_new_terminal: Duration,
    pub startup_timeout: Duration,
    pub startup_progress_slice: Duration,
    pub interrupt_settle: Duration,
    pub clipboard_restore: Duration,
    pub interrupt_policy: InterruptPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            shell: None,
            terminal_name: DEFAULT_TERMINAL_NAME.to_string(),
            cwd: None,
            env: HashMap::new(),
            extra_flags: Vec::new(),
            autoreload: false,
            confirm_killing_active_scene: true,
            delay_new_terminal: Duration::ZERO,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            startup_progress_slice: DEFAULT_STARTUP_PROGRESS_SLICE,
            interrupt_settle: DEFAULT_INTERRUPT_SETTLE,
            clipboard_restore: DEFAULT_CLIPBOARD_RESTORE,
            interrupt_policy: InterruptPolicy::platform_default(),
        }
    }
}

impl SessionConfig {
    /// Apply settings, then environment overrides, on top of the defaults
    pub fn resolve(settings: &Settings, env: &NotebookConfig) -> Self {
        let defaults = Self::default();
        let millis = |value: Option<u64>, default: Duration| {
            value.map_or(default, Duration::from_millis)
        };

        Self {
            program: env
                .manimgl_path
                .clone()
                .or_else(|| settings.manimgl_path.clone())
                .unwrap_or(defaults.program),
            shell: env.shell.clone().or_else(|| settings.shell.clone()),
            env: settings.env.clone().unwrap_or_default(),
            extra_flags: settings.extra_flags.clone().unwrap_or_default(),
            autoreload: settings.autoreload.unwrap_or(defaults.autoreload),
            confirm_killing_active_scene: settings
                .confirm_killing_active_scene
                .unwrap_or(defaults.confirm_killing_active_scene),
            delay_new_terminal: env.delay_new_terminal.unwrap_or_else(|| {
                millis(settings.delay_new_terminal_ms, defaults.delay_new_terminal)
            }),
            startup_timeout: env.startup_timeout.unwrap_or_else(|| {
                millis(settings.startup_timeout_ms, defaults.startup_timeout)
            }),
            startup_progress_slice: millis(
                settings.startup_progress_slice_ms,
                defaults.startup_progress_slice,
            ),
            interrupt_settle: millis(settings.interrupt_settle_ms, defaults.interrupt_settle),
            clipboard_restore: millis(settings.clipboard_restore_ms, defaults.clipboard_restore),
            ..defaults
        }
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_interrupt_policy(mut self, policy: InterruptPolicy) -> Self {
        self.interrupt_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::resolve(&Settings::default(), &NotebookConfig::default());
        assert_eq!(config.program, "manimgl");
        assert!(config.confirm_killing_active_scene);
        assert_eq!(config.startup_timeout, Duration::from_secs(10));
        assert_eq!(config.clipboard_restore, Duration::from_millis(650));
        assert_eq!(config.delay_new_terminal, Duration::ZERO);
    }

    #[test]
    fn test_settings_apply() {
        let settings = Settings::from_json(
            r#"{
                "manimglPath": "/opt/bin/manimgl",
                "autoreload": true,
                "startupTimeoutMs": 2500,
                "extraFlags": ["--fullscreen"],
                "env": {"DISPLAY": ":1"}
            }"#,
        )
        .unwrap();
        let config = SessionConfig::resolve(&settings, &NotebookConfig::default());

        assert_eq!(config.program, "/opt/bin/manimgl");
        assert!(config.autoreload);
        assert_eq!(config.startup_timeout, Duration::from_millis(2500));
        assert_eq!(config.extra_flags, vec!["--fullscreen".to_string()]);
        assert_eq!(config.env.get("DISPLAY").map(String::as_str), Some(":1"));
    }

    #[test]
    fn test_environment_wins_over_settings() {
        let mut settings = Settings::new();
        settings.manimgl_path = Some("from-settings".to_string());
        settings.startup_timeout_ms = Some(1000);

        let env = NotebookConfig {
            manimgl_path: Some("from-env".to_string()),
            startup_timeout: Some(Duration::from_secs(30)),
            ..Default::default()
        };
        let config = SessionConfig::resolve(&settings, &env);

        assert_eq!(config.program, "from-env");
        assert_eq!(config.startup_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_platform_policy() {
        let expected = if cfg!(windows) {
            InterruptPolicy::Destructive
        } else {
            InterruptPolicy::Cooperative
        };
        assert_eq!(InterruptPolicy::platform_default(), expected);
    }
}

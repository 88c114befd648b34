//! Configuration overrides from environment variables

use std::time::Duration;

/// Environment-provided overrides
///
/// These take priority over settings files and built-in defaults.
#[derive(Debug, Clone, Default)]
pub struct NotebookConfig {
    /// Path to the ManimGL executable
    /// Environment variable: `MANIMGL_PATH`
    pub manimgl_path: Option<String>,

    /// Shell used by the process terminal host
    /// Environment variable: `MANIM_NOTEBOOK_SHELL`
    pub shell: Option<String>,

    /// Hard timeout while waiting for the welcome banner
    /// Environment variable: `MANIM_NOTEBOOK_STARTUP_TIMEOUT_MS`
    pub startup_timeout: Option<Duration>,

    /// Delay between creating a terminal and sending the start command
    /// Environment variable: `MANIM_NOTEBOOK_DELAY_NEW_TERMINAL_MS`
    pub delay_new_terminal: Option<Duration>,
}

impl NotebookConfig {
    /// Create a new empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load overrides from environment variables
    ///
    /// Unparseable durations are ignored rather than rejected.
    pub fn from_env() -> Self {
        Self {
            manimgl_path: non_empty_var("MANIMGL_PATH"),
            shell: non_empty_var("MANIM_NOTEBOOK_SHELL"),
            startup_timeout: millis_var("MANIM_NOTEBOOK_STARTUP_TIMEOUT_MS"),
            delay_new_terminal: millis_var("MANIM_NOTEBOOK_DELAY_NEW_TERMINAL_MS"),
        }
    }

    /// Check if any override is set
    pub fn is_configured(&self) -> bool {
        self.manimgl_path.is_some()
            || self.shell.is_some()
            || self.startup_timeout.is_some()
            || self.delay_new_terminal.is_some()
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn millis_var(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
}

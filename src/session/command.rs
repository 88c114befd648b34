//! Commands sent to the terminal and the REPL

use std::fmt;
use std::path::{Path, PathBuf};

use super::config::SessionConfig;
use crate::cells::SceneLocation;
use crate::types::ManimVersion;

/// Where a new session should start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapTarget {
    pub file: PathBuf,
    pub scene: String,
    /// One-based line to embed at (`-se`); `None` plays the whole scene
    pub start_line: Option<usize>,
}

impl BootstrapTarget {
    pub fn new(file: impl Into<PathBuf>, scene: impl Into<String>, start_line: Option<usize>) -> Self {
        Self {
            file: file.into(),
            scene: scene.into(),
            start_line,
        }
    }

    /// Target for a cursor on zero-based `line` inside `scene`
    pub fn at_cursor(file: impl Into<PathBuf>, scene: &SceneLocation, line: usize) -> Self {
        Self::new(file, scene.name.clone(), scene.start_line_for(line))
    }

    /// The scene runs to completion instead of stopping at a prompt
    pub fn previews_whole_scene(&self) -> bool {
        self.start_line.is_none()
    }
}

/// The shell command that starts ManimGL
///
/// `<program> "<file>" <Scene> [-se <line>] [--autoreload] [flags...]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManimCommand {
    program: String,
    file: PathBuf,
    scene: String,
    start_line: Option<usize>,
    autoreload: bool,
    extra_flags: Vec<String>,
}

impl ManimCommand {
    pub fn new(program: impl Into<String>, file: impl AsRef<Path>, scene: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            file: file.as_ref().to_path_buf(),
            scene: scene.into(),
            start_line: None,
            autoreload: false,
            extra_flags: Vec::new(),
        }
    }

    /// Command for `target` under `config`
    ///
    /// `--autoreload` is only passed when enabled and the last seen engine
    /// version is known to support it.
    pub fn for_target(
        config: &SessionConfig,
        target: &BootstrapTarget,
        version: Option<ManimVersion>,
    ) -> Self {
        let autoreload =
            config.autoreload && version.is_some_and(|v| v.at_least(ManimVersion::RELOAD));
        Self::new(&config.program, &target.file, &target.scene)
            .start_line(target.start_line)
            .autoreload(autoreload)
            .extra_flags(config.extra_flags.iter().cloned())
    }

    pub fn start_line(mut self, line: Option<usize>) -> Self {
        self.start_line = line;
        self
    }

    pub fn autoreload(mut self, enabled: bool) -> Self {
        self.autoreload = enabled;
        self
    }

    pub fn extra_flags(mut self, flags: impl IntoIterator<Item = String>) -> Self {
        self.extra_flags.extend(flags);
        self
    }
}

impl fmt::Display for ManimCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} \"{}\" {}", self.program, self.file.display(), self.scene)?;
        if let Some(line) = self.start_line {
            write!(f, " -se {line}")?;
        }
        if self.autoreload {
            f.write_str(" --autoreload")?;
        }
        for flag in &self.extra_flags {
            write!(f, " {flag}")?;
        }
        Ok(())
    }
}

/// `checkpoint_paste()` variants understood by ManimGL's embed shell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckpointMode {
    #[default]
    Play,
    /// Run the code without animating
    Skip,
    /// Render the code to a file
    Record,
}

impl CheckpointMode {
    pub fn command(self) -> &'static str {
        match self {
            Self::Play => "checkpoint_paste()",
            Self::Skip => "checkpoint_paste(skip=True)",
            Self::Record => "checkpoint_paste(record=True)",
        }
    }
}

/// REPL command that reloads the file and re-embeds at one-based `line`
pub fn reload_command(line: usize) -> String {
    format!("reload({line})")
}

pub const CLEAR_COMMAND: &str = "clear()";

//! Settings management
//!
//! Loads and merges settings from multiple sources:
//! - User settings: `~/.manim-notebook/settings.json`
//! - Project settings: `.manim-notebook/settings.json`
//! - Local settings: `.manim-notebook/settings.local.json`
//!
//! Priority: Local > Project > User

mod manager;
mod watcher;

pub use manager::{Settings, SettingsManager};
pub use watcher::{SettingsChangeEvent, SettingsWatcher, WatcherError, WatcherHandle};

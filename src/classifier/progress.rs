//! Animation progress extracted from progress-bar lines
//!
//! The engine redraws lines such as
//! `Animation 0: ShowCreationCircle:  45%|####5     | 27/60`.
//! This is a convenience for progress UIs: anything unparseable is "no
//! progress", never an error.

use once_cell::sync::Lazy;
use regex::Regex;

/// `<name>:<whitespace><percent>%`
static PROGRESS_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\S+):\s+(\d{1,3})%").unwrap());

/// Latest progress found in a chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSample {
    pub name: String,
    pub percent: u8,
}

/// Progress change to report to a UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub name: String,
    pub percent: u8,
    /// Change since the previous update of the same animation
    pub increment: u8,
}

/// Last progress sample in a chunk, if any
pub fn parse_progress(chunk: &str) -> Option<ProgressSample> {
    PROGRESS_LINE
        .captures_iter(chunk)
        .filter_map(|caps| {
            let percent: u8 = caps[2].parse().ok()?;
            (percent <= 100).then(|| ProgressSample {
                name: caps[1].to_string(),
                percent,
            })
        })
        .last()
}

/// Turns samples into increments
///
/// A sample with a different animation name starts over from zero. This is
/// a best-effort heuristic for display only.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    current: Option<ProgressSample>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a stripped chunk; returns an update when progress moved
    pub fn observe(&mut self, chunk: &str) -> Option<ProgressUpdate> {
        let sample = parse_progress(chunk)?;
        let previous = match &self.current {
            Some(current) if current.name == sample.name => current.percent,
            _ => 0,
        };
        let increment = sample.percent.saturating_sub(previous);
        let changed = self
            .current
            .as_ref()
            .is_none_or(|c| c.name != sample.name || increment > 0);

        let update = ProgressUpdate {
            name: sample.name.clone(),
            percent: sample.percent.max(previous),
            increment,
        };
        if sample.percent >= previous {
            self.current = Some(sample);
        }
        changed.then_some(update)
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}

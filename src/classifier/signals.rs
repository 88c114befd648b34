//! Semantic signals recognised in REPL output
//!
//! Each detector is independent: one chunk may raise any number of signals.
//! The input is expected to be control-code free (see `ansi`).
//!
//! Example lines per pattern:
//!
//! | pattern                | matches                                  |
//! |------------------------|------------------------------------------|
//! | `WELCOME_BANNER`       | `ManimGL v1.7.2`                         |
//! | `UNIT_PROMPT`          | `In [3]: `                               |
//! | `INFO_LOG`             | `[12:04:51] INFO     Rendering ...`      |
//! | `KEYBOARD_INTERRUPT`   | `KeyboardInterrupt`                      |
//! | `CONTINUATION_PROMPT`  | `   ...: `                               |
//! | `ERROR_CELL_HEADER`    | `Cell In[4], line 2`                     |

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::ManimVersion;

/// Name printed first by the engine on startup
pub const ENGINE_NAME: &str = "ManimGL";

/// Banner at the start of a chunk: `ManimGL v1.7.2`
static WELCOME_BANNER: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"^\s*{ENGINE_NAME}")).unwrap());

/// Version token inside the banner line
static BANNER_VERSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"v(\d+\.\d+\.\d+)").unwrap());

/// Enumerated IPython prompt: `In [12]:`
static UNIT_PROMPT: Lazy<Regex> = Lazy::new(|| Regex::new(r"In \[(\d+)\]:").unwrap());

/// Timestamp-bracketed log line: `[12:04:51] INFO`
static INFO_LOG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*\[\d{1,2}:\d{2}:\d{2}(?:[.,]\d+)?\]\s+INFO").unwrap());

/// Interrupt echo
static KEYBOARD_INTERRUPT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*KeyboardInterrupt").unwrap());

/// IPython waiting for the blank line that ends a block: `   ...: `
static CONTINUATION_PROMPT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*\.\.\.:\s*$").unwrap());

/// Traceback header of an error raised inside the REPL
static ERROR_CELL_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Cell In\s?\[(\d+)\], line (\d+)").unwrap());

/// A semantic signal raised by a chunk of output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// The terminal now hosts a real session
    WelcomeBanner { version: Option<ManimVersion> },
    /// One or more enumerated prompts, in order of appearance
    UnitPrompts(Vec<u64>),
    /// Engine log line, used as "whole run finished" when no prompt follows
    InfoLog,
    /// An in-flight command was aborted
    KeyboardInterrupt,
    /// The REPL is waiting for a blank line to run buffered input
    ContinuationPrompt,
    /// A runtime error surfaced inside the session
    ErrorTraceback { cell: u64, line: u64 },
}

/// Classify a stripped chunk of output
///
/// Pure and stateless; malformed numbers simply produce no signal.
pub fn classify(chunk: &str) -> Vec<Signal> {
    let mut signals = Vec::new();

    if WELCOME_BANNER.is_match(chunk) {
        let first_line = chunk.trim_start().lines().next().unwrap_or_default();
        let version = BANNER_VERSION
            .captures(first_line)
            .and_then(|caps| ManimVersion::parse(&caps[1]));
        signals.push(Signal::WelcomeBanner { version });
    }

    let prompts: Vec<u64> = UNIT_PROMPT
        .captures_iter(chunk)
        .filter_map(|caps| caps[1].parse().ok())
        .collect();
    if !prompts.is_empty() {
        signals.push(Signal::UnitPrompts(prompts));
    }

    if INFO_LOG.is_match(chunk) {
        signals.push(Signal::InfoLog);
    }

    if KEYBOARD_INTERRUPT.is_match(chunk) {
        signals.push(Signal::KeyboardInterrupt);
    }

    if CONTINUATION_PROMPT.is_match(chunk) {
        signals.push(Signal::ContinuationPrompt);
    }

    if let Some(caps) = ERROR_CELL_HEADER.captures(chunk) {
        if let (Ok(cell), Ok(line)) = (caps[1].parse::<u64>(), caps[2].parse::<u64>()) {
            signals.push(Signal::ErrorTraceback { cell, line });
        }
    }

    signals
}

/// Outcome of applying prompt numbers to the unit-of-work counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterUpdate {
    /// Counter moves forward to this value
    Advanced(u64),
    /// The awaited restart happened; counter restarts at 1
    Restarted,
    /// Nothing changes
    Unchanged,
}

/// Apply prompt numbers from one chunk to the counter
///
/// While waiting for a restart only the smallest number matters and only
/// `1` qualifies. Otherwise the largest number wins, and the counter never
/// moves backwards: buffered chunks can show older prompts late.
pub fn resolve_prompt_counter(current: u64, prompts: &[u64], waiting_for_restart: bool) -> CounterUpdate {
    if waiting_for_restart {
        return match prompts.iter().min() {
            Some(1) => CounterUpdate::Restarted,
            _ => CounterUpdate::Unchanged,
        };
    }
    match prompts.iter().max() {
        Some(&max) if max > current => CounterUpdate::Advanced(max),
        _ => CounterUpdate::Unchanged,
    }
}

//! Classification of raw REPL output
//!
//! Terminal output is stripped of control sequences, then matched against a
//! fixed set of patterns to produce `Signal`s. Everything here is pure apart
//! from `AnsiStripper`'s carry-over buffer and `ProgressTracker`.

mod ansi;
mod progress;
mod signals;

pub use ansi::{AnsiStripper, strip_ansi};
pub use progress::{ProgressSample, ProgressTracker, ProgressUpdate, parse_progress};
pub use signals::{CounterUpdate, ENGINE_NAME, Signal, classify, resolve_prompt_counter};

/// A stripped chunk together with its signals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedChunk {
    pub text: String,
    pub signals: Vec<Signal>,
}

/// Per-terminal classifier pipeline
#[derive(Debug, Default)]
pub struct OutputClassifier {
    stripper: AnsiStripper,
}

impl OutputClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Strip and classify one raw chunk
    pub fn feed(&mut self, raw: &str) -> ClassifiedChunk {
        let text = self.stripper.feed(raw);
        let signals = classify(&text);
        ClassifiedChunk { text, signals }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ManimVersion;

    #[test]
    fn test_pipeline_strips_before_matching() {
        let mut classifier = OutputClassifier::new();
        let chunk = classifier.feed("\x1b[1mManimGL \x1b[32mv1.7.2\x1b[0m\r\n");
        assert_eq!(chunk.text, "ManimGL v1.7.2\n");
        assert_eq!(
            chunk.signals,
            vec![Signal::WelcomeBanner {
                version: Some(ManimVersion::new(1, 7, 2))
            }]
        );
    }

    #[test]
    fn test_prompt_split_by_escape_across_chunks() {
        let mut classifier = OutputClassifier::new();
        let first = classifier.feed("\nIn [\x1b[1;3");
        assert!(first.signals.is_empty());
        let second = classifier.feed("2m2\x1b[0m]: ");
        // The prompt text itself is split, so neither chunk alone matches
        assert!(second.signals.is_empty());
        assert_eq!(format!("{}{}", first.text, second.text), "\nIn [2]: ");
    }
}

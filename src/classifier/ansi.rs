//! Control sequence stripping for terminal output
//!
//! Output arrives in arbitrary chunks, so an escape sequence may be cut in
//! half. `AnsiStripper` holds back an unterminated trailing sequence and
//! prepends it to the next chunk. Sequences longer than `MAX_PENDING` are
//! given up on and dropped.

use once_cell::sync::Lazy;
use regex::Regex;

/// CSI, OSC (BEL or ST terminated), DCS-like strings and two-byte escapes
static ANSI_SEQUENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\x1b\[[0-?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[PX^_][^\x1b]*\x1b\\|\x1b[@-OQ-WYZ\\]|\x1b[()#][0-9A-Za-z]",
    )
    .unwrap()
});

/// Longest partial sequence carried to the next chunk
const MAX_PENDING: usize = 256;

/// Strip control sequences from a complete string
///
/// Carriage returns become line breaks so progress bars redrawn with `\r`
/// classify line by line. Other C0 controls except tab and newline go away.
pub fn strip_ansi(text: &str) -> String {
    let without_sequences = ANSI_SEQUENCE.replace_all(text, "");
    let mut out = String::with_capacity(without_sequences.len());
    let mut chars = without_sequences.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() != Some(&'\n') {
                    out.push('\n');
                }
            }
            '\n' | '\t' => out.push(c),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}

/// Stateful stripper for one output stream
#[derive(Debug, Default)]
pub struct AnsiStripper {
    pending: String,
}

impl AnsiStripper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Strip a chunk, holding back an unterminated trailing sequence
    pub fn feed(&mut self, chunk: &str) -> String {
        let mut text = std::mem::take(&mut self.pending);
        text.push_str(chunk);

        if let Some(start) = incomplete_sequence_start(&text) {
            if text.len() - start <= MAX_PENDING {
                self.pending = text.split_off(start);
            }
        }
        strip_ansi(&text)
    }

    /// Flush whatever is held back (at stream end)
    pub fn finish(&mut self) -> String {
        let rest = std::mem::take(&mut self.pending);
        strip_ansi(&rest)
    }
}

/// Byte offset of a trailing escape sequence that has not terminated yet
fn incomplete_sequence_start(text: &str) -> Option<usize> {
    let start = text.rfind('\x1b')?;
    let tail = &text[start..];
    let complete = ANSI_SEQUENCE
        .find(tail)
        .is_some_and(|m| m.start() == 0);
    if complete {
        return None;
    }
    // A lone ESC followed by an ordinary character will never complete
    let mut chars = tail.chars().skip(1);
    match chars.next() {
        None => Some(start),
        Some('[' | ']' | 'P' | 'X' | '^' | '_' | '(' | ')' | '#') => Some(start),
        Some(_) => None,
    }
}

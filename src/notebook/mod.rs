//! Editor actions on top of the session controller
//!
//! - `actions`: preview cell or selection, start, reload, clear and exit
//! - `clipboard`: where previewed code is handed to ManimGL

mod actions;
mod clipboard;

pub use actions::{CellSummary, Notebook};
pub use clipboard::{Clipboard, CommandClipboard, MemoryClipboard};

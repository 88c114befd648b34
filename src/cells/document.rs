//! Read-only view of an editor document

use std::path::{Path, PathBuf};

/// What the cell locator needs from the host editor's document
///
/// Lines are addressed by zero-based index and never include the line
/// terminator.
pub trait TextDocument {
    /// Number of lines in the document
    fn line_count(&self) -> usize;

    /// Text of one line; `None` past the end
    fn line_text(&self, line: usize) -> Option<&str>;

    /// File backing this document, if it has been saved
    fn path(&self) -> Option<&Path> {
        None
    }

    /// Whether the line is empty or whitespace only
    fn is_blank(&self, line: usize) -> bool {
        self.line_text(line).is_none_or(|text| text.trim().is_empty())
    }

    /// Column of the first non-whitespace character
    fn indentation(&self, line: usize) -> usize {
        self.line_text(line).map_or(0, indentation_of)
    }
}

/// Count of leading whitespace characters
pub fn indentation_of(text: &str) -> usize {
    text.chars().take_while(|c| c.is_whitespace()).count()
}

/// An in-memory document snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceDocument {
    path: Option<PathBuf>,
    lines: Vec<String>,
}

impl SourceDocument {
    /// Build from raw text; `\r\n` and `\n` both split lines
    pub fn from_text(text: &str) -> Self {
        Self {
            path: None,
            lines: text.lines().map(str::to_string).collect(),
        }
    }

    /// Build from individual lines
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: None,
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    /// Read a saved file from disk
    pub async fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await?;
        Ok(Self::from_text(&text).with_path(path))
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Replace one line, for callers mirroring live edits
    pub fn set_line(&mut self, line: usize, text: impl Into<String>) {
        if let Some(slot) = self.lines.get_mut(line) {
            *slot = text.into();
        }
    }

    pub fn insert_line(&mut self, line: usize, text: impl Into<String>) {
        let at = line.min(self.lines.len());
        self.lines.insert(at, text.into());
    }

    pub fn remove_line(&mut self, line: usize) -> Option<String> {
        (line < self.lines.len()).then(|| self.lines.remove(line))
    }
}

impl TextDocument for SourceDocument {
    fn line_count(&self) -> usize {
        self.lines.len()
    }

    fn line_text(&self, line: usize) -> Option<&str> {
        self.lines.get(line).map(String::as_str)
    }

    fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_metadata() {
        let doc = SourceDocument::from_text("class A(Scene):\n    x = 1\n   \n\tfoo()");
        assert_eq!(doc.line_count(), 4);
        assert_eq!(doc.indentation(0), 0);
        assert_eq!(doc.indentation(1), 4);
        assert_eq!(doc.indentation(3), 1);
        assert!(doc.is_blank(2));
        assert!(!doc.is_blank(1));
        assert!(doc.is_blank(99));
        assert!(doc.path().is_none());
    }

    #[test]
    fn test_edits() {
        let mut doc = SourceDocument::from_lines(["a", "b"]);
        doc.insert_line(1, "x");
        doc.set_line(0, "A");
        assert_eq!(doc.remove_line(2).as_deref(), Some("b"));
        assert_eq!(doc.remove_line(5), None);
        assert_eq!(doc, SourceDocument::from_lines(["A", "x"]));
    }

    #[tokio::test]
    async fn test_open_keeps_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("scene.py");
        tokio::fs::write(&file, "## cell\nx = 1\n").await.unwrap();

        let doc = SourceDocument::open(&file).await.unwrap();
        assert_eq!(doc.path(), Some(file.as_path()));
        assert_eq!(doc.line_text(1), Some("x = 1"));
    }
}

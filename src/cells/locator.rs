//! Cell range computation
//!
//! A cell starts at a marker line (`##`, possibly indented) and runs until the
//! next marker, a non-blank line indented less than the marker, or the end of
//! the document. Trailing blank lines are not part of the cell.
//!
//! ```text
//!     ## Transform circle to square      <- start, indentation 8
//!     square = Square()
//!
//!     self.play(...)                     <- end (blank line above kept)
//!
//! def other():                           <- indentation 0 < 8, closes the cell
//! ```
//!
//! Nothing is cached: every call rescans the document.

use once_cell::sync::Lazy;
use regex::Regex;

use super::document::{TextDocument, indentation_of};

/// A marker line: optional indentation followed by `##`
static CELL_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*##").unwrap());

/// Lines `start_line..=end_line` of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellRange {
    pub start_line: usize,
    pub end_line: usize,
}

impl CellRange {
    pub fn new(start_line: usize, end_line: usize) -> Self {
        Self {
            start_line,
            end_line,
        }
    }

    pub fn contains(&self, line: usize) -> bool {
        self.start_line <= line && line <= self.end_line
    }

    pub fn line_count(&self) -> usize {
        self.end_line - self.start_line + 1
    }
}

/// Whether a line opens a cell
pub fn is_cell_marker(text: &str) -> bool {
    CELL_MARKER.is_match(text)
}

/// Compute all cell ranges, ordered by start line and disjoint
pub fn compute_ranges<D: TextDocument + ?Sized>(document: &D) -> Vec<CellRange> {
    let mut ranges = Vec::new();
    // (start line, indentation of the marker)
    let mut open: Option<(usize, usize)> = None;

    for line in 0..document.line_count() {
        let Some(text) = document.line_text(line) else {
            break;
        };

        if is_cell_marker(text) {
            if let Some((start, _)) = open.take() {
                ranges.push(close_range(document, start, line - 1));
            }
            open = Some((line, indentation_of(text)));
            continue;
        }

        if let Some((start, indent)) = open {
            if !text.trim().is_empty() && indentation_of(text) < indent {
                ranges.push(close_range(document, start, line - 1));
                open = None;
            }
        }
    }

    if let Some((start, _)) = open {
        let last = document.line_count().saturating_sub(1);
        ranges.push(close_range(document, start, last));
    }

    ranges
}

/// The cell whose interval contains `line`, if any
pub fn range_containing<D: TextDocument + ?Sized>(document: &D, line: usize) -> Option<CellRange> {
    compute_ranges(document)
        .into_iter()
        .find(|range| range.contains(line))
}

/// Text after the `##` marker, e.g. `## Make it red` -> `Make it red`
pub fn cell_title<D: TextDocument + ?Sized>(document: &D, range: CellRange) -> Option<String> {
    let text = document.line_text(range.start_line)?;
    let title = text.trim_start().strip_prefix("##")?.trim();
    (!title.is_empty()).then(|| title.to_string())
}

/// Source of a cell with the marker's indentation removed
///
/// Lines indented less than the marker (only possible for blank lines) are
/// emitted empty. The result always ends with a newline.
pub fn cell_code<D: TextDocument + ?Sized>(document: &D, range: CellRange) -> String {
    let indent = document.indentation(range.start_line);
    let mut code = String::new();
    for line in range.start_line..=range.end_line {
        let text = document.line_text(line).unwrap_or_default();
        code.push_str(strip_indent(text, indent));
        code.push('\n');
    }
    code
}

fn strip_indent(text: &str, indent: usize) -> &str {
    let skip: usize = text
        .chars()
        .take(indent)
        .take_while(|c| c.is_whitespace())
        .map(char::len_utf8)
        .sum();
    if text.trim().is_empty() {
        ""
    } else {
        &text[skip..]
    }
}

fn close_range<D: TextDocument + ?Sized>(document: &D, start: usize, mut end: usize) -> CellRange {
    while end > start && document.is_blank(end) {
        end -= 1;
    }
    CellRange::new(start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cells::SourceDocument;
    use pretty_assertions::assert_eq;

    fn doc(lines: &[&str]) -> SourceDocument {
        SourceDocument::from_lines(lines.iter().copied())
    }

    #[test]
    fn test_two_top_level_cells() {
        let d = doc(&["## cell1", "x = 1", "", "## cell2", "y = 2"]);
        assert_eq!(
            compute_ranges(&d),
            vec![CellRange::new(0, 1), CellRange::new(3, 4)]
        );
    }

    #[test]
    fn test_indentation_decrease_closes_cell() {
        let d = doc(&[
            "class A(Scene):",
            "    def construct(self):",
            "        ## first",
            "        a = 1",
            "",
            "        b = 2",
            "",
            "    def helper(self):",
            "        pass",
        ]);
        assert_eq!(compute_ranges(&d), vec![CellRange::new(2, 5)]);
    }

    #[test]
    fn test_deeper_lines_stay_in_cell() {
        let d = doc(&[
            "    ## play",
            "    self.play(",
            "        FadeIn(c),",
            "    )",
        ]);
        assert_eq!(compute_ranges(&d), vec![CellRange::new(0, 3)]);
    }

    #[test]
    fn test_marker_always_starts_new_cell() {
        // An indented marker inside another cell is not nested
        let d = doc(&["## outer", "x = 1", "    ## inner", "    y = 2", "z = 3"]);
        assert_eq!(
            compute_ranges(&d),
            vec![CellRange::new(0, 1), CellRange::new(2, 3)]
        );
    }

    #[test]
    fn test_marker_on_last_line() {
        let d = doc(&["x = 1", "## last"]);
        assert_eq!(compute_ranges(&d), vec![CellRange::new(1, 1)]);
    }

    #[test]
    fn test_blank_cell_body() {
        let d = doc(&["## empty", "", "   ", "## next", "a"]);
        assert_eq!(
            compute_ranges(&d),
            vec![CellRange::new(0, 0), CellRange::new(3, 4)]
        );
    }

    #[test]
    fn test_no_markers() {
        let d = doc(&["x = 1", "# not a marker", "y = 2"]);
        assert!(compute_ranges(&d).is_empty());
        assert!(compute_ranges(&SourceDocument::default()).is_empty());
    }

    #[test]
    fn test_range_containing() {
        let d = doc(&["import x", "## cell1", "x = 1", "", "## cell2", "y = 2"]);
        assert_eq!(range_containing(&d, 0), None);
        assert_eq!(range_containing(&d, 2), Some(CellRange::new(1, 2)));
        // Trimmed trailing blank line belongs to no cell
        assert_eq!(range_containing(&d, 3), None);
        assert_eq!(range_containing(&d, 5), Some(CellRange::new(4, 5)));
        assert_eq!(range_containing(&d, 42), None);
    }

    #[test]
    fn test_recomputed_after_mutation() {
        let mut d = doc(&["## a", "x = 1", "y = 2"]);
        let first = compute_ranges(&d);
        assert_eq!(first, compute_ranges(&d));

        d.set_line(1, "## b");
        assert_eq!(
            compute_ranges(&d),
            vec![CellRange::new(0, 0), CellRange::new(1, 2)]
        );
    }

    #[test]
    fn test_ranges_are_ordered_disjoint_and_end_non_blank() {
        let d = doc(&[
            "from manimlib import *",
            "",
            "class S(Scene):",
            "    def construct(self):",
            "        ## one",
            "        a = 1",
            "",
            "        ## two",
            "",
            "        b = 2",
            "",
            "",
            "    ## three",
            "    c = 3",
            "",
        ]);
        let ranges = compute_ranges(&d);
        assert_eq!(ranges.len(), 3);
        for pair in ranges.windows(2) {
            assert!(pair[0].end_line < pair[1].start_line);
        }
        for range in &ranges {
            assert!(!d.is_blank(range.end_line));
        }
        for line in 0..d.line_count() {
            let expected = ranges.iter().copied().find(|r| r.contains(line));
            assert_eq!(range_containing(&d, line), expected);
        }
    }

    #[test]
    fn test_title_and_code() {
        let d = doc(&[
            "class S(Scene):",
            "    def construct(self):",
            "        ## Make it red",
            "        self.play(",
            "            square.animate.set_fill(RED),",
            "",
            "        )",
        ]);
        let range = range_containing(&d, 3).unwrap();
        assert_eq!(cell_title(&d, range).as_deref(), Some("Make it red"));
        assert_eq!(
            cell_code(&d, range),
            "## Make it red\nself.play(\n    square.animate.set_fill(RED),\n\n)\n"
        );

        let untitled = doc(&["##", "x"]);
        assert_eq!(cell_title(&untitled, CellRange::new(0, 1)), None);
    }
}

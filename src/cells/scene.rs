//! Locate the scene class around a line

use once_cell::sync::Lazy;
use regex::Regex;

use super::document::TextDocument;

/// `class Name(Bases):` at any indentation
static CLASS_DEFINITION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\s*)class\s+([A-Za-z_]\w*)\s*(?:\(.*\))?\s*:").unwrap());

/// A scene class and where it is defined
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneLocation {
    pub name: String,
    pub class_line: usize,
}

impl SceneLocation {
    /// Start line to pass to the engine for a cursor at `line`
    ///
    /// A cursor on the class line itself plays the whole scene, so no start
    /// line is given. Engine lines are one-based.
    pub fn start_line_for(&self, line: usize) -> Option<usize> {
        (line != self.class_line).then_some(line + 1)
    }
}

/// Find the class definition enclosing `line`
///
/// Scans upwards for the nearest `class` line whose body (lines indented
/// deeper than the class keyword) reaches `line`.
pub fn find_scene_at<D: TextDocument + ?Sized>(document: &D, line: usize) -> Option<SceneLocation> {
    if line >= document.line_count() {
        return None;
    }

    for candidate in (0..=line).rev() {
        let Some(text) = document.line_text(candidate) else {
            continue;
        };
        let Some(caps) = CLASS_DEFINITION.captures(text) else {
            continue;
        };
        let class_indent = caps[1].chars().count();
        let body_reaches_line = (candidate + 1..=line).all(|l| {
            document.is_blank(l) || document.indentation(l) > class_indent
        });
        if body_reaches_line {
            return Some(SceneLocation {
                name: caps[2].to_string(),
                class_line: candidate,
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cells::SourceDocument;

    fn sample() -> SourceDocument {
        SourceDocument::from_text(
            "from manimlib import *\n\
             \n\
             class MyFirstManimNotebook(Scene):\n\
             \x20   def construct(self):\n\
             \x20       ## Your first Manim Cell\n\
             \x20       circle = Circle()\n\
             \n\
             def helper():\n\
             \x20   pass\n\
             \n\
             class Second(ThreeDScene):\n\
             \x20   def construct(self):\n\
             \x20       pass\n",
        )
    }

    #[test]
    fn test_finds_enclosing_class() {
        let doc = sample();
        let scene = find_scene_at(&doc, 5).unwrap();
        assert_eq!(scene.name, "MyFirstManimNotebook");
        assert_eq!(scene.class_line, 2);
        assert_eq!(scene.start_line_for(5), Some(6));
        assert_eq!(scene.start_line_for(2), None);

        let second = find_scene_at(&doc, 12).unwrap();
        assert_eq!(second.name, "Second");
    }

    #[test]
    fn test_outside_any_class() {
        let doc = sample();
        assert_eq!(find_scene_at(&doc, 0), None);
        assert_eq!(find_scene_at(&doc, 8), None);
        assert_eq!(find_scene_at(&doc, 100), None);
    }
}

//! Manim cells and scenes in a source document
//!
//! - `document`: the read-only document view the locator works on
//! - `locator`: cell ranges delimited by `##` marker lines
//! - `scene`: the scene class enclosing a line

mod document;
mod locator;
mod scene;

pub use document::{SourceDocument, TextDocument, indentation_of};
pub use locator::{
    CellRange, cell_code, cell_title, compute_ranges, is_cell_marker, range_containing,
};
pub use scene::{SceneLocation, find_scene_at};

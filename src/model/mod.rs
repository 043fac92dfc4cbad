//! Intermediate representation of a PDF being translated.
//!
//! The tree is built by the parser, mutated in place by each midend stage
//! and serialized back to PDF by the renderer. Coordinates are in PDF points,
//! crop-box relative, y pointing up.

mod character;
mod composition;
mod document;
mod font;
mod geometry;
mod page;
mod paragraph;
mod style;

pub use character::PdfCharacter;
pub use composition::{
    chars_bbox, Composition, PdfFormula, PdfLine, PdfSameStyleCharacters,
    PdfSameStyleUnicodeCharacters,
};
pub use document::Document;
pub use font::PdfFont;
pub use geometry::{Matrix, Rect};
pub use page::{Page, PageLayout, PdfFigure, PdfRectangle, PdfXobject};
pub use paragraph::PdfParagraph;
pub use style::{GraphicState, PdfStyle, FONT_SIZE_TOLERANCE};

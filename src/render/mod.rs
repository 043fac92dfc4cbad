//! Output side: PDF re-emission, bilingual documents and IL serialization.

mod dual;
mod fonts;
mod json;
mod pdf;
mod save;
mod xml;

pub use dual::{alternating_pages, side_by_side};
pub use fonts::{to_unicode_cmap, EmbeddedFonts, FontEmbedder, UsedGlyphs};
pub use json::{from_json, to_json, JsonFormat};
pub use pdf::{deflate, draw_page, page_chars, render_page, PageDrawing, PdfCreator, RenderedFiles};
pub use save::{run_with_deadline, save_pdf, WorkerOutcome};
pub use xml::{from_xml, to_xml};

//! PDF parsing: lopdf backend, font loading, content-stream interpretation
//! and IL construction.

pub mod backend;
mod builder;
pub mod font;
pub mod interpreter;
mod options;
mod pdf_parser;

pub use backend::{LopdfBackend, PageInfo, PdfBackend};
pub use builder::ILBuilder;
pub use interpreter::{page_ctm, CharEvent, Interpreter, InterpreterSink};
pub use options::{
    ErrorMode, ParseOptions, DEFAULT_MAX_PAGE_HEIGHT, DEFAULT_MAX_PAGE_WIDTH,
    DEFAULT_MAX_XOBJECT_DEPTH,
};
pub use pdf_parser::{open_input, PdfParser};

//! Error types for the pdftranslate library.

use std::io;
use thiserror::Error;

/// Result type alias for pdftranslate operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while translating a PDF.
///
/// Page- and paragraph-level failures are normally downgraded to logged
/// skips by the stage that hits them; the variants that escape to the caller
/// are the document-level kinds (unreadable input, scanned document,
/// configuration) and [`Error::Cancelled`].
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error when reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file format is not recognized as PDF.
    #[error("Unknown file format: not a valid PDF")]
    UnknownFormat,

    /// The PDF version is not supported.
    #[error("Unsupported PDF version: {0}")]
    UnsupportedVersion(String),

    /// Error parsing PDF structure.
    #[error("PDF parsing error: {0}")]
    PdfParse(String),

    /// The PDF document is encrypted and requires a password.
    #[error("Document is encrypted")]
    Encrypted,

    /// Error decoding font data.
    #[error("Font decoding error: {0}")]
    FontDecode(String),

    /// Most selected pages are image scans without a text layer.
    #[error("Scanned PDF detected: {scanned} of {total} sampled pages have no usable text layer")]
    ScannedPdf {
        /// Pages classified as scans
        scanned: usize,
        /// Pages considered for detection
        total: usize,
    },

    /// Unrecoverable configuration problem (missing translator, credential, bad pattern).
    #[error("Configuration error: {0}")]
    Config(String),

    /// A translation engine failed.
    #[error("Translation error: {0}")]
    Translation(String),

    /// The layout model failed.
    #[error("Layout model error: {0}")]
    Layout(String),

    /// Error while emitting PDF output or serializing the IL.
    #[error("Rendering error: {0}")]
    Render(String),

    /// Invalid page range specification.
    #[error("Invalid page range: {0}")]
    InvalidPageRange(String),

    /// The run was cancelled through the cancellation token.
    #[error("Translation cancelled")]
    Cancelled,

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error is the cancellation outcome rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        match err {
            lopdf::Error::IO(e) => Error::Io(e),
            lopdf::Error::Decryption(_) => Error::Encrypted,
            _ => Error::PdfParse(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Render(err.to_string())
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::Render(err.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Other(format!("translation cache: {}", err))
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error::Config(err.to_string())
    }
}

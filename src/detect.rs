//! Input validation: is this file a PDF we can translate?

use crate::error::{Error, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Header facts read before any page work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfFormat {
    /// PDF version (e.g., "1.7", "2.0")
    pub version: String,
    /// Bytes of junk before `%PDF-`; readers tolerate a small prefix
    pub header_offset: usize,
}

impl std::fmt::Display for PdfFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PDF {}", self.version)
    }
}

const PDF_MAGIC: &[u8] = b"%PDF-";
const VERSION_LEN: usize = 3; // e.g., "1.7"

/// How far into the file the header may start.
const HEADER_SEARCH_LIMIT: usize = 1024;

/// Detect the PDF header of a file.
///
/// ```no_run
/// use pdftranslate::detect::detect_format_from_path;
///
/// let format = detect_format_from_path("paper.pdf").unwrap();
/// println!("PDF version: {}", format.version);
/// ```
pub fn detect_format_from_path<P: AsRef<Path>>(path: P) -> Result<PdfFormat> {
    let mut head = Vec::with_capacity(HEADER_SEARCH_LIMIT);
    File::open(path)?
        .take(HEADER_SEARCH_LIMIT as u64)
        .read_to_end(&mut head)?;
    detect_format_from_bytes(&head)
}

/// Detect the PDF header in the first bytes of a file.
pub fn detect_format_from_bytes(data: &[u8]) -> Result<PdfFormat> {
    let window = &data[..data.len().min(HEADER_SEARCH_LIMIT)];
    let header_offset = window
        .windows(PDF_MAGIC.len())
        .position(|w| w == PDF_MAGIC)
        .ok_or(Error::UnknownFormat)?;

    let start = header_offset + PDF_MAGIC.len();
    let version_bytes = data
        .get(start..start + VERSION_LEN)
        .ok_or(Error::UnknownFormat)?;
    let version = String::from_utf8_lossy(version_bytes).to_string();
    if !is_valid_version(&version) {
        return Err(Error::UnsupportedVersion(version));
    }

    if header_offset > 0 {
        log::debug!("PDF header found at byte {}", header_offset);
    }
    Ok(PdfFormat {
        version,
        header_offset,
    })
}

/// `1.0` through `2.x`.
fn is_valid_version(version: &str) -> bool {
    let mut chars = version.chars();
    matches!(
        (chars.next(), chars.next(), chars.next(), chars.next()),
        (Some('1' | '2'), Some('.'), Some(minor), None) if minor.is_ascii_digit()
    )
}

/// Whether the file starts like a PDF.
pub fn is_pdf<P: AsRef<Path>>(path: P) -> bool {
    detect_format_from_path(path).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_valid_pdf() {
        let data = b"%PDF-1.7\n%\xe2\xe3\xcf\xd3";
        let format = detect_format_from_bytes(data).unwrap();
        assert_eq!(format.version, "1.7");
        assert_eq!(format.header_offset, 0);
    }

    #[test]
    fn test_detect_header_after_junk() {
        let mut data = vec![b' '; 100];
        data.extend_from_slice(b"%PDF-2.0\n");
        let format = detect_format_from_bytes(&data).unwrap();
        assert_eq!(format.version, "2.0");
        assert_eq!(format.header_offset, 100);
    }

    #[test]
    fn test_detect_invalid_format() {
        assert!(matches!(
            detect_format_from_bytes(b"<!DOCTYPE html>"),
            Err(Error::UnknownFormat)
        ));
        assert!(matches!(detect_format_from_bytes(b"%PDF"), Err(Error::UnknownFormat)));
        assert!(matches!(
            detect_format_from_bytes(b"%PDF-9.1"),
            Err(Error::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn test_short_file_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.pdf");
        std::fs::write(&path, b"%PDF-1.4").unwrap();
        assert!(is_pdf(&path));
        std::fs::write(&path, b"hello").unwrap();
        assert!(!is_pdf(&path));
    }
}

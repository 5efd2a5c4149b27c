//! Text extraction for corpus files.
//!
//! Plain text and markdown are read as UTF-8 (lossy, so one stray byte does
//! not drop a whole résumé); PDFs go through `pdf-extract`. Errors never
//! panic: the loader logs them and skips the file.

use std::path::Path;
use thiserror::Error;

use crate::models::SourceFormat;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
}

/// Extract the text of one file according to its format.
pub fn extract_file(path: &Path, format: SourceFormat) -> Result<String, ExtractError> {
    let bytes = std::fs::read(path).map_err(|source| ExtractError::Io {
        path: path.display().to_string(),
        source,
    })?;
    extract_bytes(&bytes, format)
}

pub fn extract_bytes(bytes: &[u8], format: SourceFormat) -> Result<String, ExtractError> {
    match format {
        SourceFormat::Pdf => extract_pdf(bytes),
        SourceFormat::Text | SourceFormat::Markdown => {
            Ok(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_bytes(b"not a pdf", SourceFormat::Pdf).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn text_with_bad_bytes_is_lossy() {
        let text = extract_bytes(b"Rust \xff engineer", SourceFormat::Text).unwrap();
        assert!(text.starts_with("Rust "));
        assert!(text.ends_with(" engineer"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = extract_file(Path::new("/nonexistent/resume.md"), SourceFormat::Markdown)
            .unwrap_err();
        assert!(matches!(err, ExtractError::Io { .. }));
    }
}

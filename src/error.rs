//! Error types for pdftree.
//!
//! Only whole-document failures escape a conversion. Page- and fragment-level
//! failures are produced by backends and strategies as [`Error`] values, then
//! absorbed by the pipeline and recorded as [`crate::model::Notice`]s.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pdftree operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while converting a document.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error outside of output assembly.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The configuration is unusable.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The backend could not open the document at all.
    #[error("Cannot convert document '{document}': {reason}")]
    DocumentConversion { document: String, reason: String },

    /// A filesystem failure while writing the output tree.
    #[error("Failed to write '{}': {source}", path.display())]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A single page could not be decoded.
    #[error("Page {page} could not be extracted: {reason}")]
    PageExtraction { page: u32, reason: String },

    /// The OCR engine failed or is unavailable.
    #[error("OCR failed: {0}")]
    Ocr(String),

    /// The OCR engine did not answer in time.
    #[error("OCR timed out on page {page} after {timeout_ms}ms")]
    OcrTimeout { page: u32, timeout_ms: u64 },

    /// Image bytes could not be decoded or re-encoded.
    #[error("Image decoding error: {0}")]
    ImageDecode(String),

    /// A table-extraction strategy produced no grid.
    #[error("Table extraction error: {0}")]
    TableExtraction(String),

    /// Metadata serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Build an [`Error::OutputWrite`] for the given path.
    pub fn output_write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::OutputWrite {
            path: path.into(),
            source,
        }
    }

    /// Whether this error aborts the conversion of a whole document.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::InvalidConfig(_)
                | Error::DocumentConversion { .. }
                | Error::OutputWrite { .. }
                | Error::Serialization(_)
        )
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::ImageDecode(err.to_string())
    }
}

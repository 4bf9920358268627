//! Page-level input: the extraction backend contract, layout analysis and
//! the OCR fallback.

mod backend;
mod layout;
mod ocr;

pub use backend::{ExtractionBackend, MemoryBackend, RawImage, RawPage, RawTable, RawTextRun};
pub use layout::{LayoutAnalyzer, PageContent, TextLine, TextRun};
pub use ocr::{OcrFallback, OcrLine, OcrOutcome, OcrStrategy, MAX_STALLED_WORKERS};

//! # pdftree
//!
//! Converts PDF documents into a navigable tree of Markdown files.
//!
//! The crate never reads PDF bytes itself. An [`ExtractionBackend`] supplies
//! positioned text runs, images and table areas per page; the pipeline
//! normalizes them into spans, infers the section hierarchy from font sizes
//! and numbering, classifies content (images, tables, code, prose) and writes
//! one folder per section with an index document, deduplicated assets and a
//! metadata summary.
//!
//! ## Quick Start
//!
//! ```no_run
//! use pdftree::{ConversionConfig, Converter, MemoryBackend};
//!
//! fn main() -> pdftree::Result<()> {
//!     // Content previously extracted from a PDF
//!     let backend = MemoryBackend::load("manual.json")?;
//!
//!     let config = ConversionConfig::default()
//!         .with_max_depth(3)
//!         .with_min_image_size(100, 100);
//!     let report = Converter::new(config).convert(&backend, "out/manual")?;
//!
//!     for notice in report.notices() {
//!         println!("{}", notice);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Hierarchy inference**: heading levels from font size ranks and
//!   numbering patterns ("2.1", "Chapter 3")
//! - **Image deduplication**: content-hashed assets with reference counts
//! - **Table strategies**: ordered fallback with a quality bar, exported as
//!   Markdown, CSV, JSON or SpreadsheetML
//! - **Code detection**: language signatures with user-supplied patterns
//! - **OCR fallback**: pluggable engine for pages without a text layer
//! - **Parallel processing**: Rayon for pages and for batches of documents

pub mod classify;
pub mod config;
pub mod convert;
pub mod error;
pub mod model;
pub mod parser;
pub mod render;
pub mod structure;

// Re-export commonly used types
pub use classify::{TableInput, TableStrategy};
pub use config::{ConversionConfig, ImageFormat, TableFormat, TableMethod};
pub use convert::{
    convert, BatchConverter, BatchOutcome, Conversion, ConversionReport, Converter,
    DocumentOpener, JsonOpener, OpenerRegistry,
};
pub use error::{Error, Result};
pub use model::{
    AssetRegistry, BBox, ContentBlock, ConversionMetadata, DocumentInfo, Notice, Section,
    SectionId, SectionTree, Span, TableGrid,
};
pub use parser::{ExtractionBackend, MemoryBackend, OcrLine, OcrStrategy, RawPage};
pub use render::OutputTree;

use std::path::Path;

/// Open a document with the default openers and convert it.
///
/// # Example
///
/// ```no_run
/// use pdftree::{convert_file, ConversionConfig};
///
/// let report = convert_file("report.json", "out/report", ConversionConfig::default())?;
/// println!("{} sections", report.metadata.sections);
/// # Ok::<(), pdftree::Error>(())
/// ```
pub fn convert_file<P: AsRef<Path>, Q: AsRef<Path>>(
    path: P,
    out_dir: Q,
    config: ConversionConfig,
) -> Result<ConversionReport> {
    let backend = OpenerRegistry::with_defaults().open(path.as_ref())?;
    Converter::new(config).convert(&*backend, out_dir)
}

//! Conversion entry points.
//!
//! [`Converter`] runs the pipeline for one document; [`BatchConverter`] runs
//! many documents on a worker pool, opening each through an
//! [`OpenerRegistry`].
//!
//! # Example
//!
//! ```no_run
//! use pdftree::convert::{BatchConverter, Converter};
//! use pdftree::ConversionConfig;
//!
//! fn main() -> pdftree::Result<()> {
//!     let batch = BatchConverter::new(Converter::new(ConversionConfig::default()))
//!         .with_workers(4);
//!     for outcome in batch.convert_all(&["a.json", "b.json"], "out")? {
//!         if let Err(e) = &outcome.result {
//!             eprintln!("{}: {}", outcome.input.display(), e);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

mod batch;
mod pipeline;

pub use batch::{BatchConverter, BatchOutcome, DocumentOpener, JsonOpener, OpenerRegistry};
pub use pipeline::{convert, Conversion, ConversionReport, Converter};

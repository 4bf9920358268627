//! Content classification and its helpers.
//!
//! The classifier fans out to three helpers: the image resolver
//! (deduplication), the table coordinator (strategy fallback) and the code
//! detector (language signatures).

mod classifier;
mod code;
mod images;
mod tables;

pub use classifier::ContentClassifier;
pub use code::{CodeDetector, CodeMatch, LanguageSignature};
pub use images::{content_hash, ImageOutcome, ImageResolver};
pub use tables::{
    BackendTableStrategy, StreamConfig, StreamTableStrategy, TableCoordinator, TableInput,
    TableOutcome, TableStrategy,
};

//! Data model for the conversion pipeline.
//!
//! Spans and regions come out of page analysis; the section tree and asset
//! registry are filled by hierarchy building and classification; metadata
//! accumulates along the way.

mod asset;
mod geometry;
mod metadata;
mod section;
mod span;
mod table;

pub use asset::{
    AssetRegistry, CodeAsset, CodeId, ImageAsset, ImageId, TableAsset, TableId, CODE_DIR,
    IMAGE_DIR, TABLE_DIR,
};
pub use geometry::BBox;
pub use metadata::{ConversionMetadata, DocumentInfo, Notice, TableRecord};
pub use section::{ContentBlock, OutlineEntry, Section, SectionId, SectionTree};
pub use span::{Fragment, Region, RegionKind, Span};
pub use table::TableGrid;

//! Document structure reconstruction.
//!
//! Font statistics and numbering patterns feed the hierarchy builder, which
//! turns the flat fragment stream into a section tree.

mod fonts;
mod hierarchy;
mod numbering;

pub use fonts::FontStatistics;
pub use hierarchy::{Heading, HierarchyBuilder, Outline, FALLBACK_TITLE};
pub use numbering::{detect_numbering, Numbering, NumberingKind};

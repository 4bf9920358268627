//! Positioned text spans and non-text regions.
//!
//! Both are produced once by page analysis (or the OCR fallback) and are
//! never mutated afterwards; downstream stages only read them.

use serde::{Deserialize, Serialize};

use super::BBox;

/// A line-level run of text with font metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    /// The text content
    pub text: String,
    /// Font size in points (char-weighted across merged runs)
    pub font_size: f32,
    /// Predominantly bold font
    pub bold: bool,
    /// Predominantly italic font
    pub italic: bool,
    /// Predominantly monospace font
    pub monospace: bool,
    /// 1-based page number
    pub page: u32,
    /// Position on the page
    pub bbox: BBox,
    /// Position in the document-wide fragment stream
    pub order: usize,
    /// OCR confidence in [0, 1]; `None` for natively extracted text
    pub confidence: Option<f32>,
    /// Recognized below the configured OCR confidence threshold
    pub low_confidence: bool,
}

impl Span {
    /// Create a native (non-OCR) span.
    pub fn new(text: impl Into<String>, font_size: f32, page: u32, bbox: BBox) -> Self {
        Self {
            text: text.into(),
            font_size,
            bold: false,
            italic: false,
            monospace: false,
            page,
            bbox,
            order: 0,
            confidence: None,
            low_confidence: false,
        }
    }

    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    pub fn italic(mut self) -> Self {
        self.italic = true;
        self
    }

    pub fn monospace(mut self) -> Self {
        self.monospace = true;
        self
    }

    /// Characters that count towards text density.
    pub fn visible_chars(&self) -> usize {
        self.text.chars().filter(|c| !c.is_whitespace()).count()
    }
}

/// What a [`Region`] holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegionKind {
    /// Embedded image with its encoded bytes and declared pixel size
    Image {
        data: Vec<u8>,
        width: u32,
        height: u32,
    },
    /// Detected table, with the backend's cell grid when it has one
    Table { cells: Option<Vec<Vec<String>>> },
}

/// A detected image or table area on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// 1-based page number
    pub page: u32,
    /// Index among the page's regions as reported by the backend
    pub index: usize,
    /// Position on the page
    pub bbox: BBox,
    /// Position in the document-wide fragment stream
    pub order: usize,
    /// Payload
    pub kind: RegionKind,
    /// Text spans lying (mostly) inside the region, in reading order
    pub spans: Vec<Span>,
}

impl Region {
    pub fn is_image(&self) -> bool {
        matches!(self.kind, RegionKind::Image { .. })
    }

    pub fn is_table(&self) -> bool {
        matches!(self.kind, RegionKind::Table { .. })
    }

    /// Text of the enclosed spans, one line per span.
    pub fn text(&self) -> String {
        self.spans
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// One item of the ordered fragment stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Fragment {
    Span(Span),
    Region(Region),
}

impl Fragment {
    pub fn page(&self) -> u32 {
        match self {
            Fragment::Span(s) => s.page,
            Fragment::Region(r) => r.page,
        }
    }

    pub fn bbox(&self) -> &BBox {
        match self {
            Fragment::Span(s) => &s.bbox,
            Fragment::Region(r) => &r.bbox,
        }
    }

    pub fn order(&self) -> usize {
        match self {
            Fragment::Span(s) => s.order,
            Fragment::Region(r) => r.order,
        }
    }

    pub(crate) fn set_order(&mut self, order: usize) {
        match self {
            Fragment::Span(s) => s.order = order,
            Fragment::Region(r) => r.order = order,
        }
    }

    pub fn as_span(&self) -> Option<&Span> {
        match self {
            Fragment::Span(s) => Some(s),
            Fragment::Region(_) => None,
        }
    }
}

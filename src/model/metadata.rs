//! Document information, notices and conversion statistics.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AssetRegistry, OutlineEntry, SectionTree};

/// Descriptive information reported by the extraction backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentInfo {
    /// Document title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Document author
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    /// Document subject
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// Keywords
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,

    /// Creation date
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,

    /// Last modification date
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,

    /// Total number of pages
    pub page_count: u32,
}

impl DocumentInfo {
    /// Create info with a title.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    /// Convert to YAML front matter (including the trailing blank line).
    pub fn to_yaml_frontmatter(&self) -> String {
        let mut lines = vec!["---".to_string()];

        if let Some(ref title) = self.title {
            lines.push(format!("title: \"{}\"", escape_yaml(title)));
        }
        if let Some(ref author) = self.author {
            lines.push(format!("author: \"{}\"", escape_yaml(author)));
        }
        if let Some(ref subject) = self.subject {
            lines.push(format!("subject: \"{}\"", escape_yaml(subject)));
        }
        if let Some(ref keywords) = self.keywords {
            lines.push(format!("keywords: \"{}\"", escape_yaml(keywords)));
        }
        if let Some(ref created) = self.created {
            lines.push(format!("created: {}", created.to_rfc3339()));
        }
        if let Some(ref modified) = self.modified {
            lines.push(format!("modified: {}", modified.to_rfc3339()));
        }
        lines.push(format!("pages: {}", self.page_count));

        lines.push("---".to_string());
        lines.push(String::new());

        lines.join("\n")
    }
}

/// Escape special characters for YAML strings.
fn escape_yaml(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// A non-fatal event recorded during conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    /// A page could not be decoded and was left out
    PageSkipped { page: u32, reason: String },
    /// OCR was needed but failed or is unavailable
    OcrFailure { page: u32, reason: String },
    /// OCR did not finish within the timeout
    OcrTimeout { page: u32, timeout_ms: u64 },
    /// OCR produced spans below the confidence threshold
    LowConfidenceText {
        page: u32,
        spans: usize,
        min_confidence: f32,
    },
    /// No headings were found; content was placed in one flat section
    HierarchyAmbiguity { reason: String },
    /// No table strategy cleared the quality bar; raw text was kept
    TableExtractionFailure {
        page: u32,
        region: usize,
        attempted: Vec<String>,
    },
    /// Image bytes could not be decoded; the image was skipped
    ImageDecodeFailure {
        page: u32,
        region: usize,
        reason: String,
    },
}

impl Notice {
    /// Page the notice refers to, if any.
    pub fn page(&self) -> Option<u32> {
        match self {
            Notice::PageSkipped { page, .. }
            | Notice::OcrFailure { page, .. }
            | Notice::OcrTimeout { page, .. }
            | Notice::LowConfidenceText { page, .. }
            | Notice::TableExtractionFailure { page, .. }
            | Notice::ImageDecodeFailure { page, .. } => Some(*page),
            Notice::HierarchyAmbiguity { .. } => None,
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::PageSkipped { page, reason } => write!(f, "page {} skipped: {}", page, reason),
            Notice::OcrFailure { page, reason } => {
                write!(f, "OCR failed on page {}: {}", page, reason)
            }
            Notice::OcrTimeout { page, timeout_ms } => {
                write!(f, "OCR timed out on page {} after {}ms", page, timeout_ms)
            }
            Notice::LowConfidenceText {
                page,
                spans,
                min_confidence,
            } => write!(
                f,
                "{} low-confidence OCR spans on page {} (lowest {:.2})",
                spans, page, min_confidence
            ),
            Notice::HierarchyAmbiguity { reason } => write!(f, "hierarchy ambiguity: {}", reason),
            Notice::TableExtractionFailure {
                page,
                region,
                attempted,
            } => write!(
                f,
                "table {} on page {} rejected by [{}]",
                region,
                page,
                attempted.join(", ")
            ),
            Notice::ImageDecodeFailure {
                page,
                region,
                reason,
            } => write!(f, "image {} on page {} skipped: {}", region, page, reason),
        }
    }
}

/// Which strategy produced an accepted table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRecord {
    /// Relative path of the table's export stem
    pub table: String,
    pub page: u32,
    pub method: String,
}

/// Aggregate result of converting one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionMetadata {
    /// Information reported by the backend
    pub document: DocumentInfo,

    /// Pages reported by the backend
    pub pages: u32,

    /// Sections (excluding the synthetic root)
    pub sections: usize,

    /// Unique image assets written
    pub images: usize,

    /// Image references across all sections
    pub image_references: usize,

    /// Images dropped by the size filter
    pub images_discarded: usize,

    /// Accepted tables
    pub tables: usize,

    /// Table regions kept as raw text
    pub table_fallbacks: usize,

    /// Code blocks
    pub code_blocks: usize,

    /// Pages whose text came from OCR
    pub ocr_pages: usize,

    /// Pages that could not be decoded
    pub pages_skipped: usize,

    /// OCR spans flagged low-confidence
    pub low_confidence_spans: usize,

    /// Accepted tables per strategy name
    pub table_methods: BTreeMap<String, usize>,

    /// Strategy used for each accepted table, in document order
    pub table_records: Vec<TableRecord>,

    /// The section tree
    pub outline: Vec<OutlineEntry>,

    /// Non-fatal events in the order they occurred
    pub notices: Vec<Notice>,

    /// Wall-clock duration; kept out of the persisted metadata
    #[serde(skip)]
    pub elapsed: Duration,
}

impl ConversionMetadata {
    /// Create empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a notice, logging it at warn level.
    pub fn add_notice(&mut self, notice: Notice) {
        log::warn!("{}", notice);
        match &notice {
            Notice::PageSkipped { .. } => self.pages_skipped += 1,
            Notice::TableExtractionFailure { .. } => self.table_fallbacks += 1,
            Notice::LowConfidenceText { spans, .. } => self.low_confidence_spans += spans,
            _ => {}
        }
        self.notices.push(notice);
    }

    /// Record an accepted table.
    pub fn add_table(&mut self, table: impl Into<String>, page: u32, method: &str) {
        self.tables += 1;
        *self.table_methods.entry(method.to_string()).or_insert(0) += 1;
        self.table_records.push(TableRecord {
            table: table.into(),
            page,
            method: method.to_string(),
        });
    }

    /// Record an image that fell below the size filter.
    pub fn add_discarded_image(&mut self) {
        self.images_discarded += 1;
    }

    /// Record a page whose text came from OCR.
    pub fn add_ocr_page(&mut self) {
        self.ocr_pages += 1;
    }

    /// Fill the counts derived from the finished tree and its assets.
    pub fn record_output(&mut self, tree: &SectionTree, registry: &AssetRegistry) {
        self.sections = tree.len();
        self.images = registry.images().len();
        self.image_references = registry.image_references();
        self.code_blocks = registry.code_blocks().len();
        self.outline = tree.outline();
    }

    /// Count notices of a given kind.
    pub fn count_notices(&self, pred: impl Fn(&Notice) -> bool) -> usize {
        self.notices.iter().filter(|n| pred(n)).count()
    }

    /// Serialize to pretty JSON (maps are sorted, elapsed time is left out).
    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

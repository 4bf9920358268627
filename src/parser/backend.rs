//! Extraction backend abstraction layer.
//!
//! The conversion pipeline never touches PDF bytes. It consumes per-page
//! positioned content through [`ExtractionBackend`], which isolates whichever
//! PDF library supplies it from layout analysis.

use std::collections::BTreeMap;
use std::path::Path;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{BBox, DocumentInfo};

/// A text run as reported by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTextRun {
    /// Decoded text
    pub text: String,
    /// Position on the page (top-left origin)
    pub bbox: BBox,
    /// Effective font size in points
    pub font_size: f32,
    /// Base font name (e.g., "Helvetica-Bold")
    #[serde(default)]
    pub font_name: String,
}

/// An embedded image as reported by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawImage {
    /// Placement on the page
    pub bbox: BBox,
    /// Encoded image bytes (PNG, JPEG, ...)
    pub data: Vec<u8>,
    /// Declared pixel width
    pub width: u32,
    /// Declared pixel height
    pub height: u32,
}

/// A table area detected by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    /// Placement on the page
    pub bbox: BBox,
    /// Cell grid, when the backend could read one
    #[serde(default)]
    pub cells: Option<Vec<Vec<String>>>,
}

/// Everything the backend knows about one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPage {
    /// 1-based page number
    pub number: u32,
    /// Page width in points
    pub width: f32,
    /// Page height in points
    pub height: f32,
    #[serde(default)]
    pub text_runs: Vec<RawTextRun>,
    #[serde(default)]
    pub images: Vec<RawImage>,
    #[serde(default)]
    pub tables: Vec<RawTable>,
}

impl RawPage {
    /// Create an empty page.
    pub fn new(number: u32, width: f32, height: f32) -> Self {
        Self {
            number,
            width,
            height,
            text_runs: Vec::new(),
            images: Vec::new(),
            tables: Vec::new(),
        }
    }

    /// US Letter sized empty page.
    pub fn letter(number: u32) -> Self {
        Self::new(number, 612.0, 792.0)
    }

    /// Add a text run.
    pub fn with_text(
        mut self,
        text: impl Into<String>,
        bbox: BBox,
        font_size: f32,
        font_name: impl Into<String>,
    ) -> Self {
        self.text_runs.push(RawTextRun {
            text: text.into(),
            bbox,
            font_size,
            font_name: font_name.into(),
        });
        self
    }

    /// Add an image.
    pub fn with_image(mut self, bbox: BBox, data: Vec<u8>, width: u32, height: u32) -> Self {
        self.images.push(RawImage {
            bbox,
            data,
            width,
            height,
        });
        self
    }

    /// Add a table area.
    pub fn with_table(mut self, bbox: BBox, cells: Option<Vec<Vec<String>>>) -> Self {
        self.tables.push(RawTable { bbox, cells });
        self
    }
}

/// Abstract interface for extracted document access.
///
/// Implementations must be shareable across the page worker pool.
pub trait ExtractionBackend: Send + Sync {
    /// Descriptive document information.
    fn info(&self) -> DocumentInfo;

    /// Number of pages; pages are numbered `1..=page_count()`.
    fn page_count(&self) -> u32;

    /// Raw content of one page.
    fn page(&self, number: u32) -> Result<RawPage>;

    /// Render one page to a bitmap for OCR.
    fn rasterize(&self, number: u32, dpi: u32) -> Result<DynamicImage> {
        let _ = dpi;
        Err(Error::Ocr(format!(
            "backend cannot rasterize page {}",
            number
        )))
    }
}

/// In-memory backend, mostly for tests and pre-extracted documents.
///
/// Deserializable from JSON so extracted content can be stored and replayed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryBackend {
    /// Document information
    pub info: DocumentInfo,
    /// Decodable pages keyed by number
    pub pages: BTreeMap<u32, RawPage>,
    /// Undecodable pages keyed by number, with the failure reason
    pub broken_pages: BTreeMap<u32, String>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set document information.
    pub fn with_info(mut self, info: DocumentInfo) -> Self {
        self.info = info;
        self
    }

    /// Add a page.
    pub fn with_page(mut self, page: RawPage) -> Self {
        self.pages.insert(page.number, page);
        self
    }

    /// Add a page that fails to decode.
    pub fn with_broken_page(mut self, number: u32, reason: impl Into<String>) -> Self {
        self.broken_pages.insert(number, reason.into());
        self
    }

    /// Parse a backend from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a backend from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| Error::DocumentConversion {
            document: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&json).map_err(|e| Error::DocumentConversion {
            document: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

impl ExtractionBackend for MemoryBackend {
    fn info(&self) -> DocumentInfo {
        let mut info = self.info.clone();
        info.page_count = self.page_count();
        info
    }

    fn page_count(&self) -> u32 {
        let last_ok = self.pages.keys().next_back().copied().unwrap_or(0);
        let last_broken = self.broken_pages.keys().next_back().copied().unwrap_or(0);
        last_ok.max(last_broken)
    }

    fn page(&self, number: u32) -> Result<RawPage> {
        if let Some(reason) = self.broken_pages.get(&number) {
            return Err(Error::PageExtraction {
                page: number,
                reason: reason.clone(),
            });
        }
        match self.pages.get(&number) {
            Some(page) => Ok(page.clone()),
            None => Ok(RawPage::letter(number)),
        }
    }

    /// Blank white bitmap of the page's size at the given resolution.
    fn rasterize(&self, number: u32, dpi: u32) -> Result<DynamicImage> {
        let page = self.page(number)?;
        let scale = dpi as f32 / 72.0;
        let width = (page.width * scale).round().max(1.0) as u32;
        let height = (page.height * scale).round().max(1.0) as u32;
        let mut img = image::GrayImage::new(width, height);
        for pixel in img.pixels_mut() {
            *pixel = image::Luma([255]);
        }
        Ok(DynamicImage::ImageLuma8(img))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_backend_pages() {
        let backend = MemoryBackend::new()
            .with_page(RawPage::letter(1).with_text(
                "Hello",
                BBox::new(72.0, 72.0, 110.0, 84.0),
                12.0,
                "Helvetica",
            ))
            .with_broken_page(3, "bad xref");

        assert_eq!(backend.page_count(), 3);
        assert_eq!(backend.page(1).unwrap().text_runs.len(), 1);
        // Missing pages are blank, not errors
        assert!(backend.page(2).unwrap().text_runs.is_empty());
        assert!(matches!(
            backend.page(3),
            Err(Error::PageExtraction { page: 3, .. })
        ));
        assert_eq!(backend.info().page_count, 3);
    }

    #[test]
    fn test_memory_backend_from_json() {
        let json = r#"{
            "info": { "title": "Sample" },
            "pages": {
                "1": {
                    "number": 1, "width": 612, "height": 792,
                    "text_runs": [
                        { "text": "Intro", "bbox": { "x0": 72, "y0": 72, "x1": 120, "y1": 84 }, "font_size": 12 }
                    ]
                }
            }
        }"#;
        let backend = MemoryBackend::from_json(json).unwrap();
        assert_eq!(backend.info().title.as_deref(), Some("Sample"));
        assert_eq!(backend.page(1).unwrap().text_runs[0].font_name, "");
    }

    #[test]
    fn test_rasterize_scales_to_dpi() {
        let backend = MemoryBackend::new().with_page(RawPage::new(1, 72.0, 144.0));
        let img = backend.rasterize(1, 150).unwrap();
        assert_eq!(img.width(), 150);
        assert_eq!(img.height(), 300);
    }

    #[test]
    fn test_load_missing_file_is_conversion_error() {
        let err = MemoryBackend::load("/nonexistent/doc.json").unwrap_err();
        assert!(matches!(err, Error::DocumentConversion { .. }));
    }
}

//! Conversion options and configuration.
//!
//! [`ConversionConfig`] is plain data: it derives serde traits with
//! `#[serde(default)]` so any format can populate a partial configuration,
//! and exposes `with_*` builders for programmatic use.

use std::collections::BTreeSet;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Deepest heading level a section tree may use.
pub const MAX_SUPPORTED_DEPTH: u8 = 6;

/// Options controlling a document conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Extract embedded images as assets
    pub extract_images: bool,

    /// Extract table regions as assets
    pub extract_tables: bool,

    /// Detect code blocks in text runs
    pub extract_code: bool,

    /// Rasterize and OCR pages with too little extractable text
    pub use_ocr: bool,

    /// Language code handed to the OCR strategy
    pub ocr_language: String,

    /// OCR spans below this confidence are flagged low-confidence
    pub ocr_confidence_threshold: f32,

    /// Rasterization resolution for OCR
    pub ocr_dpi: u32,

    /// Per-page OCR timeout in milliseconds
    pub ocr_timeout_ms: u64,

    /// Pages with fewer non-space characters per square inch trigger OCR
    pub ocr_text_density_threshold: f32,

    /// Minimum image width in pixels; smaller images are discarded
    pub min_image_width: u32,

    /// Minimum image height in pixels; smaller images are discarded
    pub min_image_height: u32,

    /// Share one asset between byte-identical images
    pub detect_duplicate_images: bool,

    /// Encoding used for written image assets
    pub image_output_format: ImageFormat,

    /// Which table strategy (or strategies) to run
    pub table_extraction_method: TableMethod,

    /// Minimum rows for an accepted table grid
    pub min_table_rows: usize,

    /// Minimum columns for an accepted table grid
    pub min_table_cols: usize,

    /// Minimum ratio of non-empty cells for an accepted table grid
    pub min_table_fill_ratio: f32,

    /// Formats every accepted table is exported to
    pub export_table_formats: BTreeSet<TableFormat>,

    /// Minimum lines a text run needs before it can be classified as code
    pub min_code_lines: usize,

    /// Write one folder per section (otherwise one flat file per section)
    pub create_folder_structure: bool,

    /// Deepest section level produced by the hierarchy builder
    pub max_hierarchy_depth: u8,

    /// Lines longer than this (in chars) are never headings
    pub max_heading_length: usize,

    /// Write a nested table of contents into the root index
    pub generate_toc: bool,

    /// Wrap prose at this many characters (None = no wrapping)
    pub max_line_length: Option<usize>,

    /// Extra or overriding code signatures as (language, regex list), in
    /// the order they are tried
    pub custom_code_patterns: Vec<(String, Vec<String>)>,

    /// Analyze pages in parallel
    pub parallel: bool,

    /// Worker count for the page pool (None = rayon default)
    pub num_workers: Option<usize>,
}

impl ConversionConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable image extraction.
    pub fn with_images(mut self, extract: bool) -> Self {
        self.extract_images = extract;
        self
    }

    /// Enable or disable table extraction.
    pub fn with_tables(mut self, extract: bool) -> Self {
        self.extract_tables = extract;
        self
    }

    /// Enable or disable code detection.
    pub fn with_code(mut self, extract: bool) -> Self {
        self.extract_code = extract;
        self
    }

    /// Enable or disable the OCR fallback.
    pub fn with_ocr(mut self, use_ocr: bool) -> Self {
        self.use_ocr = use_ocr;
        self
    }

    /// Set the OCR language code.
    pub fn with_ocr_language(mut self, language: impl Into<String>) -> Self {
        self.ocr_language = language.into();
        self
    }

    /// Set the OCR confidence threshold.
    pub fn with_ocr_confidence_threshold(mut self, threshold: f32) -> Self {
        self.ocr_confidence_threshold = threshold;
        self
    }

    /// Set the OCR timeout in milliseconds.
    pub fn with_ocr_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.ocr_timeout_ms = timeout_ms;
        self
    }

    /// Set the text density below which OCR kicks in.
    pub fn with_ocr_text_density_threshold(mut self, threshold: f32) -> Self {
        self.ocr_text_density_threshold = threshold;
        self
    }

    /// Set minimum image dimensions.
    pub fn with_min_image_size(mut self, width: u32, height: u32) -> Self {
        self.min_image_width = width;
        self.min_image_height = height;
        self
    }

    /// Enable or disable image deduplication.
    pub fn with_duplicate_detection(mut self, detect: bool) -> Self {
        self.detect_duplicate_images = detect;
        self
    }

    /// Set the image asset encoding.
    pub fn with_image_format(mut self, format: ImageFormat) -> Self {
        self.image_output_format = format;
        self
    }

    /// Set the table extraction method.
    pub fn with_table_method(mut self, method: TableMethod) -> Self {
        self.table_extraction_method = method;
        self
    }

    /// Set the table quality bar.
    pub fn with_table_quality(mut self, min_rows: usize, min_cols: usize, fill_ratio: f32) -> Self {
        self.min_table_rows = min_rows;
        self.min_table_cols = min_cols;
        self.min_table_fill_ratio = fill_ratio;
        self
    }

    /// Set table export formats.
    pub fn with_table_formats(mut self, formats: impl IntoIterator<Item = TableFormat>) -> Self {
        self.export_table_formats = formats.into_iter().collect();
        self
    }

    /// Enable or disable one folder per section.
    pub fn with_folder_structure(mut self, create: bool) -> Self {
        self.create_folder_structure = create;
        self
    }

    /// Set the maximum hierarchy depth.
    pub fn with_max_depth(mut self, depth: u8) -> Self {
        self.max_hierarchy_depth = depth;
        self
    }

    /// Enable or disable the nested table of contents.
    pub fn with_toc(mut self, generate: bool) -> Self {
        self.generate_toc = generate;
        self
    }

    /// Wrap prose at the given width.
    pub fn with_max_line_length(mut self, width: usize) -> Self {
        self.max_line_length = Some(width);
        self
    }

    /// Add (or override) code signatures for a language.
    ///
    /// Languages keep the order they were first added in; adding the same
    /// language again replaces its patterns in place.
    pub fn with_code_patterns<I, S>(mut self, language: impl Into<String>, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let language = language.into();
        let patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();
        match self
            .custom_code_patterns
            .iter_mut()
            .find(|(name, _)| *name == language)
        {
            Some((_, existing)) => *existing = patterns,
            None => self.custom_code_patterns.push((language, patterns)),
        }
        self
    }

    /// Enable or disable parallel page analysis.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Disable parallel processing.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    /// Set the worker count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.num_workers = Some(workers);
        self
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_hierarchy_depth == 0 || self.max_hierarchy_depth > MAX_SUPPORTED_DEPTH {
            return Err(invalid(format!(
                "max_hierarchy_depth must be between 1 and {}, got {}",
                MAX_SUPPORTED_DEPTH, self.max_hierarchy_depth
            )));
        }
        if self.min_image_width == 0 || self.min_image_height == 0 {
            return Err(invalid("minimum image dimensions must be positive"));
        }
        if !(0.0..=1.0).contains(&self.ocr_confidence_threshold) {
            return Err(invalid(format!(
                "ocr_confidence_threshold must be within [0, 1], got {}",
                self.ocr_confidence_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.min_table_fill_ratio) {
            return Err(invalid(format!(
                "min_table_fill_ratio must be within [0, 1], got {}",
                self.min_table_fill_ratio
            )));
        }
        if self.export_table_formats.is_empty() {
            return Err(invalid("export_table_formats must not be empty"));
        }
        if self.ocr_dpi == 0 {
            return Err(invalid("ocr_dpi must be positive"));
        }
        if self.num_workers == Some(0) {
            return Err(invalid("num_workers must be positive"));
        }
        for (language, patterns) in &self.custom_code_patterns {
            for pattern in patterns {
                Regex::new(pattern).map_err(|e| {
                    invalid(format!("bad code pattern for '{}': {}", language, e))
                })?;
            }
        }
        Ok(())
    }
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            extract_images: true,
            extract_tables: true,
            extract_code: true,
            use_ocr: true,
            ocr_language: "eng".to_string(),
            ocr_confidence_threshold: 0.5,
            ocr_dpi: 300,
            ocr_timeout_ms: 30_000,
            ocr_text_density_threshold: 1.0,
            min_image_width: 50,
            min_image_height: 50,
            detect_duplicate_images: true,
            image_output_format: ImageFormat::Png,
            table_extraction_method: TableMethod::Auto,
            min_table_rows: 2,
            min_table_cols: 2,
            min_table_fill_ratio: 0.3,
            export_table_formats: [TableFormat::Markdown, TableFormat::Csv]
                .into_iter()
                .collect(),
            min_code_lines: 2,
            create_folder_structure: true,
            max_hierarchy_depth: 4,
            max_heading_length: 160,
            generate_toc: true,
            max_line_length: None,
            custom_code_patterns: Vec::new(),
            parallel: true,
            num_workers: None,
        }
    }
}

fn invalid(msg: impl Into<String>) -> Error {
    Error::InvalidConfig(msg.into())
}

/// Encoding for written image assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// Lossless PNG
    #[default]
    Png,
    /// JPEG
    Jpeg,
}

impl ImageFormat {
    /// File extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
        }
    }

    pub(crate) fn to_image_format(self) -> image::ImageFormat {
        match self {
            ImageFormat::Png => image::ImageFormat::Png,
            ImageFormat::Jpeg => image::ImageFormat::Jpeg,
        }
    }
}

/// Table export format.
///
/// Ordering is the order exports are written and linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableFormat {
    /// GitHub-flavored Markdown table
    Markdown,
    /// RFC 4180 CSV
    Csv,
    /// JSON array of rows
    Json,
    /// SpreadsheetML 2003 workbook
    Spreadsheet,
}

impl TableFormat {
    /// File extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            TableFormat::Markdown => "md",
            TableFormat::Csv => "csv",
            TableFormat::Json => "json",
            TableFormat::Spreadsheet => "xml",
        }
    }
}

impl fmt::Display for TableFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TableFormat::Markdown => "markdown",
            TableFormat::Csv => "csv",
            TableFormat::Json => "json",
            TableFormat::Spreadsheet => "spreadsheet",
        };
        f.write_str(name)
    }
}

/// Table extraction method selection.
///
/// Serialized as a plain string: `"auto"` or a strategy name.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TableMethod {
    /// Try every registered strategy in registration order
    #[default]
    Auto,
    /// Run only the named strategy
    Named(String),
}

impl From<String> for TableMethod {
    fn from(s: String) -> Self {
        if s.eq_ignore_ascii_case("auto") {
            TableMethod::Auto
        } else {
            TableMethod::Named(s)
        }
    }
}

impl From<TableMethod> for String {
    fn from(method: TableMethod) -> Self {
        match method {
            TableMethod::Auto => "auto".to_string(),
            TableMethod::Named(name) => name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ConversionConfig::new()
            .with_max_depth(3)
            .with_min_image_size(100, 80)
            .with_table_method(TableMethod::Named("stream".into()))
            .with_table_formats([TableFormat::Json, TableFormat::Markdown])
            .sequential();

        assert_eq!(config.max_hierarchy_depth, 3);
        assert_eq!(config.min_image_width, 100);
        assert_eq!(config.min_image_height, 80);
        assert_eq!(
            config.table_extraction_method,
            TableMethod::Named("stream".into())
        );
        let formats: Vec<_> = config.export_table_formats.iter().copied().collect();
        assert_eq!(formats, vec![TableFormat::Markdown, TableFormat::Json]);
        assert!(!config.parallel);
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = ConversionConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.use_ocr);
        assert_eq!(config.max_hierarchy_depth, 4);
        assert_eq!(config.image_output_format, ImageFormat::Png);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(ConversionConfig::new().with_max_depth(0).validate().is_err());
        assert!(ConversionConfig::new().with_max_depth(7).validate().is_err());
        assert!(ConversionConfig::new()
            .with_min_image_size(0, 10)
            .validate()
            .is_err());
        assert!(ConversionConfig::new()
            .with_ocr_confidence_threshold(1.5)
            .validate()
            .is_err());
        assert!(ConversionConfig::new()
            .with_table_formats([])
            .validate()
            .is_err());
        assert!(ConversionConfig::new().with_workers(0).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_pattern() {
        let config = ConversionConfig::new().with_code_patterns("broken", ["(unclosed"]);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_code_patterns_keep_insertion_order() {
        let config = ConversionConfig::new()
            .with_code_patterns("zig", [r"\bcomptime\b"])
            .with_code_patterns("apl", [r"⍳"])
            .with_code_patterns("zig", [r"\bpub fn\b"]);

        let names: Vec<&str> = config
            .custom_code_patterns
            .iter()
            .map(|(name, _)| name.as_str())
            .collect();
        assert_eq!(names, vec!["zig", "apl"]);
        assert_eq!(config.custom_code_patterns[0].1, vec![r"\bpub fn\b".to_string()]);
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let json = r#"{
            "max_hierarchy_depth": 2,
            "table_extraction_method": "stream",
            "export_table_formats": ["csv", "spreadsheet"]
        }"#;
        let config: ConversionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.max_hierarchy_depth, 2);
        assert_eq!(
            config.table_extraction_method,
            TableMethod::Named("stream".into())
        );
        assert!(config.export_table_formats.contains(&TableFormat::Spreadsheet));
        assert_eq!(config.ocr_language, "eng");
        assert!(config.generate_toc);
    }

    #[test]
    fn test_table_method_round_trip() {
        let json = serde_json::to_string(&TableMethod::Auto).unwrap();
        assert_eq!(json, "\"auto\"");
        let method: TableMethod = serde_json::from_str("\"AUTO\"").unwrap();
        assert_eq!(method, TableMethod::Auto);
    }
}

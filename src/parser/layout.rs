//! Layout analysis for extracted pages.
//!
//! Turns a page's raw text runs into line-level [`Span`]s with font size,
//! style flags and position, attaches text lying inside image and table
//! areas to the corresponding [`Region`], and orders everything top-to-bottom,
//! left-to-right.

use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::model::{BBox, Fragment, Region, RegionKind, Span};

use super::backend::{RawPage, RawTextRun};

/// Points per inch.
const POINTS_PER_INCH: f32 = 72.0;

/// A text run with style flags derived from its font name.
#[derive(Debug, Clone)]
pub struct TextRun {
    /// The text content
    pub text: String,
    /// Position on the page
    pub bbox: BBox,
    /// Font size in points
    pub font_size: f32,
    /// Whether the font appears to be bold
    pub is_bold: bool,
    /// Whether the font appears to be italic
    pub is_italic: bool,
    /// Whether the font appears to be monospace
    pub is_monospace: bool,
}

impl TextRun {
    /// Create a run, detecting style from the font name.
    pub fn new(text: String, bbox: BBox, font_size: f32, font_name: &str) -> Self {
        let font = font_name.to_lowercase();
        let is_bold = font.contains("bold") || font.contains("black") || font.contains("heavy");
        let is_italic = font.contains("italic") || font.contains("oblique");
        let is_monospace = font.contains("mono")
            || font.contains("courier")
            || font.contains("consolas")
            || font.contains("menlo")
            || font.contains("code");

        Self {
            text,
            bbox,
            font_size,
            is_bold,
            is_italic,
            is_monospace,
        }
    }

    fn from_raw(raw: &RawTextRun) -> Self {
        Self::new(raw.text.clone(), raw.bbox, raw.font_size, &raw.font_name)
    }

    /// Baseline proxy.
    fn baseline(&self) -> f32 {
        self.bbox.y1
    }
}

/// A text line composed of runs on the same baseline.
#[derive(Debug, Clone)]
pub struct TextLine {
    /// The runs in this line, sorted by X position
    pub runs: Vec<TextRun>,
}

impl TextLine {
    /// Create a line from runs.
    pub fn from_runs(mut runs: Vec<TextRun>) -> Self {
        runs.sort_by(|a, b| a.bbox.x0.partial_cmp(&b.bbox.x0).unwrap_or(Ordering::Equal));
        Self { runs }
    }

    /// Dominant font size, weighted by text length.
    pub fn font_size(&self) -> f32 {
        let total_chars: usize = self.runs.iter().map(|r| r.text.chars().count()).sum();
        if total_chars == 0 {
            return self.runs.first().map(|r| r.font_size).unwrap_or(0.0);
        }
        let weighted: f32 = self
            .runs
            .iter()
            .map(|r| r.font_size * r.text.chars().count() as f32)
            .sum();
        weighted / total_chars as f32
    }

    /// Get the combined text of all runs with appropriate spacing.
    ///
    /// Inserts spaces between runs based on their X gaps. No space is
    /// inserted between adjacent characters of spaceless scripts.
    pub fn text(&self) -> String {
        let mut result = String::new();

        for (i, run) in self.runs.iter().enumerate() {
            if i == 0 {
                result.push_str(&run.text);
                continue;
            }

            let prev = &self.runs[i - 1];
            let gap = run.bbox.x0 - prev.bbox.x1;

            let char_count = run.text.chars().count();
            let avg_char_width = if char_count > 0 && run.bbox.width() > 0.0 {
                run.bbox.width() / char_count as f32
            } else {
                run.font_size * 0.5
            };

            // Gap threshold: 20% of the average char width
            let should_insert_space = if gap > avg_char_width * 0.2 {
                let prev_is_cjk = prev
                    .text
                    .chars()
                    .last()
                    .map(is_spaceless_script_char)
                    .unwrap_or(false);
                let curr_is_cjk = run
                    .text
                    .chars()
                    .next()
                    .map(is_spaceless_script_char)
                    .unwrap_or(false);
                !(prev_is_cjk && curr_is_cjk)
            } else {
                false
            };

            let prev_ends_with_space = result.ends_with(' ') || result.ends_with('\u{00A0}');
            let curr_starts_with_space =
                run.text.starts_with(' ') || run.text.starts_with('\u{00A0}');

            if should_insert_space && !prev_ends_with_space && !curr_starts_with_space {
                result.push(' ');
            }

            result.push_str(&run.text);
        }

        result.trim().to_string()
    }

    fn majority(&self, flag: impl Fn(&TextRun) -> bool) -> bool {
        let flagged: usize = self
            .runs
            .iter()
            .filter(|r| flag(r))
            .map(|r| r.text.chars().count())
            .sum();
        let total: usize = self.runs.iter().map(|r| r.text.chars().count()).sum();
        total > 0 && flagged as f32 / total as f32 > 0.5
    }

    /// Check if the line is predominantly bold.
    pub fn is_bold(&self) -> bool {
        self.majority(|r| r.is_bold)
    }

    pub fn is_italic(&self) -> bool {
        self.majority(|r| r.is_italic)
    }

    pub fn is_monospace(&self) -> bool {
        self.majority(|r| r.is_monospace)
    }

    fn bbox(&self) -> BBox {
        self.runs
            .iter()
            .skip(1)
            .fold(self.runs[0].bbox, |acc, r| acc.union(&r.bbox))
    }

    /// Convert into a span on `page`.
    pub fn into_span(self, page: u32) -> Span {
        Span {
            text: self.text(),
            font_size: self.font_size(),
            bold: self.is_bold(),
            italic: self.is_italic(),
            monospace: self.is_monospace(),
            page,
            bbox: self.bbox(),
            order: 0,
            confidence: None,
            low_confidence: false,
        }
    }
}

/// Analyzed content of one page.
#[derive(Debug, Clone)]
pub struct PageContent {
    /// 1-based page number
    pub number: u32,
    /// Page width in points
    pub width: f32,
    /// Page height in points
    pub height: f32,
    /// Spans and regions in reading order
    pub fragments: Vec<Fragment>,
    /// Text came from OCR rather than the backend
    pub ocr_applied: bool,
}

impl PageContent {
    /// Top-level spans (not those attached to regions).
    pub fn spans(&self) -> impl Iterator<Item = &Span> {
        self.fragments.iter().filter_map(Fragment::as_span)
    }

    /// Non-whitespace characters per square inch, counting region text too.
    pub fn text_density(&self) -> f32 {
        let area = (self.width / POINTS_PER_INCH) * (self.height / POINTS_PER_INCH);
        if area <= 0.0 {
            return 0.0;
        }
        let chars: usize = self
            .fragments
            .iter()
            .map(|f| match f {
                Fragment::Span(s) => s.visible_chars(),
                Fragment::Region(r) => r.spans.iter().map(|s| s.visible_chars()).sum(),
            })
            .sum();
        chars as f32 / area
    }
}

/// Layout analyzer for normalizing raw page content.
#[derive(Debug, Clone)]
pub struct LayoutAnalyzer {
    /// Runs whose baselines differ by less than this fraction of the font
    /// size share a line
    pub line_tolerance: f32,
    /// Horizontal gaps wider than this many font sizes split a line
    pub max_gap_factor: f32,
    /// Runs covered by a region beyond this fraction belong to the region
    pub region_overlap: f32,
}

impl Default for LayoutAnalyzer {
    fn default() -> Self {
        Self {
            line_tolerance: 0.3,
            max_gap_factor: 1.5,
            region_overlap: 0.5,
        }
    }
}

impl LayoutAnalyzer {
    /// Create a new layout analyzer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize one page into ordered spans and regions.
    pub fn analyze(&self, page: RawPage) -> Result<PageContent> {
        if !(page.width.is_finite() && page.height.is_finite())
            || page.width <= 0.0
            || page.height <= 0.0
        {
            return Err(Error::PageExtraction {
                page: page.number,
                reason: format!("invalid page size {}x{}", page.width, page.height),
            });
        }

        let mut regions: Vec<Region> = Vec::with_capacity(page.images.len() + page.tables.len());
        for (index, image) in page.images.into_iter().enumerate() {
            regions.push(Region {
                page: page.number,
                index,
                bbox: image.bbox,
                order: 0,
                kind: RegionKind::Image {
                    data: image.data,
                    width: image.width,
                    height: image.height,
                },
                spans: Vec::new(),
            });
        }
        for (index, table) in page.tables.into_iter().enumerate() {
            regions.push(Region {
                page: page.number,
                index,
                bbox: table.bbox,
                order: 0,
                kind: RegionKind::Table { cells: table.cells },
                spans: Vec::new(),
            });
        }

        // Split runs between the page body and the regions that cover them
        let mut body_runs = Vec::new();
        let mut region_runs: Vec<Vec<TextRun>> = vec![Vec::new(); regions.len()];
        for raw in &page.text_runs {
            if raw.text.trim().is_empty() || !valid_run(raw) {
                continue;
            }
            let run = TextRun::from_raw(raw);
            match self.covering_region(&run.bbox, &regions) {
                Some(idx) => region_runs[idx].push(run),
                None => body_runs.push(run),
            }
        }

        for (region, runs) in regions.iter_mut().zip(region_runs) {
            region.spans = self
                .group_runs_into_lines(runs)
                .into_iter()
                .map(|l| l.into_span(page.number))
                .collect();
        }

        let mut fragments: Vec<Fragment> = self
            .group_runs_into_lines(body_runs)
            .into_iter()
            .map(|l| Fragment::Span(l.into_span(page.number)))
            .collect();
        fragments.extend(regions.into_iter().map(Fragment::Region));
        sort_reading_order(&mut fragments);

        log::debug!(
            "Page {}: {} fragments from {} runs",
            page.number,
            fragments.len(),
            page.text_runs.len()
        );

        Ok(PageContent {
            number: page.number,
            width: page.width,
            height: page.height,
            fragments,
            ocr_applied: false,
        })
    }

    /// Region covering most of `bbox`, if any covers more than the threshold.
    fn covering_region(&self, bbox: &BBox, regions: &[Region]) -> Option<usize> {
        regions
            .iter()
            .enumerate()
            .map(|(i, r)| (i, bbox.coverage_by(&r.bbox)))
            .filter(|(_, c)| *c > self.region_overlap)
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
            .map(|(i, _)| i)
    }

    /// Baseline grouping, then splitting at wide horizontal gaps.
    pub fn group_runs_into_lines(&self, mut runs: Vec<TextRun>) -> Vec<TextLine> {
        if runs.is_empty() {
            return vec![];
        }

        runs.sort_by(|a, b| {
            a.baseline()
                .partial_cmp(&b.baseline())
                .unwrap_or(Ordering::Equal)
                .then(a.bbox.x0.partial_cmp(&b.bbox.x0).unwrap_or(Ordering::Equal))
        });

        let mut rows: Vec<Vec<TextRun>> = Vec::new();
        let mut current: Vec<TextRun> = Vec::new();
        let mut current_y: Option<f32> = None;

        for run in runs {
            let tolerance = run.font_size * self.line_tolerance;
            match current_y {
                Some(y) if (run.baseline() - y).abs() <= tolerance => current.push(run),
                _ => {
                    if !current.is_empty() {
                        rows.push(std::mem::take(&mut current));
                    }
                    current_y = Some(run.baseline());
                    current.push(run);
                }
            }
        }
        if !current.is_empty() {
            rows.push(current);
        }

        let mut lines = Vec::new();
        for row in rows {
            let row = TextLine::from_runs(row).runs;
            let mut pending: Vec<TextRun> = Vec::new();
            for run in row {
                if let Some(prev) = pending.last() {
                    let gap = run.bbox.x0 - prev.bbox.x1;
                    let limit = prev.font_size.max(run.font_size) * self.max_gap_factor;
                    if gap > limit {
                        lines.push(TextLine::from_runs(std::mem::take(&mut pending)));
                    }
                }
                pending.push(run);
            }
            if !pending.is_empty() {
                lines.push(TextLine::from_runs(pending));
            }
        }

        lines
    }
}

fn valid_run(run: &RawTextRun) -> bool {
    let b = &run.bbox;
    run.font_size.is_finite()
        && run.font_size > 0.0
        && b.x0.is_finite()
        && b.y0.is_finite()
        && b.x1.is_finite()
        && b.y1.is_finite()
}

/// Sort by top edge, then left edge. Regions win ties so their captions and
/// contents never precede them.
pub(crate) fn sort_reading_order(fragments: &mut [Fragment]) {
    fragments.sort_by(|a, b| {
        let (ba, bb) = (a.bbox(), b.bbox());
        ba.y0
            .partial_cmp(&bb.y0)
            .unwrap_or(Ordering::Equal)
            .then(ba.x0.partial_cmp(&bb.x0).unwrap_or(Ordering::Equal))
            .then_with(|| rank(a).cmp(&rank(b)))
    });

    fn rank(f: &Fragment) -> u8 {
        match f {
            Fragment::Region(_) => 0,
            Fragment::Span(_) => 1,
        }
    }
}

/// Check if a character belongs to a script that doesn't use spaces between words.
fn is_spaceless_script_char(c: char) -> bool {
    let code = c as u32;

    // CJK Unified Ideographs
    (0x4E00..=0x9FFF).contains(&code)
    // Extension A
    || (0x3400..=0x4DBF).contains(&code)
    // Extensions B-F
    || (0x20000..=0x2EBEF).contains(&code)
    // Hiragana
    || (0x3040..=0x309F).contains(&code)
    // Katakana
    || (0x30A0..=0x30FF).contains(&code)
    // Thai
    || (0x0E00..=0x0E7F).contains(&code)
    // NOTE: Hangul is not included, Korean uses word spaces
    // CJK Symbols and Punctuation
    || (0x3000..=0x303F).contains(&code)
}

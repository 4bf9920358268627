//! Content classification.
//!
//! Turns each section's pending fragments into content blocks. Regions are
//! authoritative: an image or table region becomes an asset reference no
//! matter what text it covers. Remaining spans are grouped into text runs,
//! which become code blocks when the detector recognizes them and prose
//! otherwise.

use std::sync::Arc;

use crate::config::{ConversionConfig, TableFormat};
use crate::error::Result;
use crate::model::{
    AssetRegistry, ContentBlock, ConversionMetadata, Fragment, Notice, Region, RegionKind,
    SectionId, SectionTree, Span, TableGrid,
};
use crate::structure::Outline;

use super::code::CodeDetector;
use super::images::{ImageOutcome, ImageResolver};
use super::tables::{TableCoordinator, TableInput, TableOutcome, TableStrategy};

/// Font size difference (points) that starts a new text run.
const SIZE_BREAK: f32 = 1.0;

/// Vertical gap, in font sizes, that starts a new text run.
const GAP_BREAK_FACTOR: f32 = 1.5;

/// Assigns every non-heading fragment to a content kind.
pub struct ContentClassifier {
    images: ImageResolver,
    tables: TableCoordinator,
    code: CodeDetector,
    formats: Vec<TableFormat>,
    extract_images: bool,
    extract_tables: bool,
    extract_code: bool,
}

impl ContentClassifier {
    /// Build a classifier. `table_strategies` are the registered table
    /// methods in priority order.
    pub fn new(
        config: &ConversionConfig,
        table_strategies: Vec<Arc<dyn TableStrategy>>,
    ) -> Result<Self> {
        Ok(Self {
            images: ImageResolver::new(config),
            tables: TableCoordinator::new(config, table_strategies)?,
            code: CodeDetector::new(config)?,
            formats: config.export_table_formats.iter().copied().collect(),
            extract_images: config.extract_images,
            extract_tables: config.extract_tables,
            extract_code: config.extract_code,
        })
    }

    /// Classify every section's pending fragments, in arena order, and
    /// return the finished tree.
    pub fn classify(
        &self,
        outline: Outline,
        registry: &mut AssetRegistry,
        metadata: &mut ConversionMetadata,
    ) -> SectionTree {
        let Outline {
            mut tree, pending, ..
        } = outline;

        for (index, fragments) in pending.into_iter().enumerate() {
            let id = SectionId(index);
            for block in self.classify_fragments(fragments, registry, metadata) {
                tree.push_content(id, block);
            }
        }
        tree
    }

    /// Classify one section's fragments into ordered blocks.
    pub fn classify_fragments(
        &self,
        fragments: Vec<Fragment>,
        registry: &mut AssetRegistry,
        metadata: &mut ConversionMetadata,
    ) -> Vec<ContentBlock> {
        let mut out = BlockSink::default();
        let mut run: Vec<Span> = Vec::new();

        for fragment in fragments {
            match fragment {
                Fragment::Span(span) => {
                    if run.last().is_some_and(|prev| breaks_run(prev, &span)) {
                        self.flush_run(std::mem::take(&mut run), registry, &mut out);
                    }
                    run.push(span);
                }
                Fragment::Region(region) => {
                    self.flush_run(std::mem::take(&mut run), registry, &mut out);
                    self.classify_region(region, registry, metadata, &mut out);
                }
            }
        }
        self.flush_run(run, registry, &mut out);

        out.blocks
    }

    fn flush_run(&self, run: Vec<Span>, registry: &mut AssetRegistry, out: &mut BlockSink) {
        let Some(first) = run.first() else {
            return;
        };
        let page = first.page;

        if self.extract_code {
            let text = run
                .iter()
                .map(|s| s.text.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            let monospace = run.iter().all(|s| s.monospace);
            if let Some(found) = self.code.detect(&text, monospace) {
                log::debug!(
                    "Page {}: {}-line {} code block",
                    page,
                    run.len(),
                    found.language
                );
                let id = registry.insert_code(page, found.language, &found.extension, text);
                out.push(ContentBlock::CodeRef(id));
                return;
            }
        }

        let text = join_lines(&run);
        if !text.is_empty() {
            out.push_prose(page, text);
        }
    }

    fn classify_region(
        &self,
        region: Region,
        registry: &mut AssetRegistry,
        metadata: &mut ConversionMetadata,
        out: &mut BlockSink,
    ) {
        let text = region.text();
        match &region.kind {
            RegionKind::Image {
                data,
                width,
                height,
            } => {
                if !self.extract_images {
                    out.push_text(text);
                    return;
                }
                match self
                    .images
                    .resolve(registry, region.page, data, *width, *height)
                {
                    Ok(ImageOutcome::Stored(id)) | Ok(ImageOutcome::Reused(id)) => {
                        out.push(ContentBlock::ImageRef(id));
                    }
                    Ok(ImageOutcome::Discarded) => {
                        metadata.add_discarded_image();
                        out.push_text(text);
                    }
                    Err(e) => {
                        metadata.add_notice(Notice::ImageDecodeFailure {
                            page: region.page,
                            region: region.index,
                            reason: e.to_string(),
                        });
                        out.push_text(text);
                    }
                }
            }
            RegionKind::Table { cells } => {
                if !self.extract_tables {
                    let text = if text.is_empty() {
                        cells
                            .as_ref()
                            .map(|c| TableGrid::from_rows(c.clone()).clean().plain_text())
                            .unwrap_or_default()
                    } else {
                        text
                    };
                    out.push_text(text);
                    return;
                }

                let input = TableInput {
                    page: region.page,
                    index: region.index,
                    bbox: region.bbox,
                    cells: cells.as_deref(),
                    spans: &region.spans,
                };
                match self.tables.extract(&input) {
                    TableOutcome::Accepted { method, grid } => {
                        let id = registry.insert_table(
                            region.page,
                            method.as_str(),
                            grid,
                            self.formats.clone(),
                        );
                        if let Some(table) = registry.table(id) {
                            metadata.add_table(table.stem.clone(), region.page, &method);
                        }
                        out.push(ContentBlock::TableRef(id));
                    }
                    TableOutcome::Rejected {
                        attempted,
                        fallback_text,
                    } => {
                        metadata.add_notice(Notice::TableExtractionFailure {
                            page: region.page,
                            region: region.index,
                            attempted,
                        });
                        out.push_text(fallback_text);
                    }
                }
            }
        }
    }
}

/// Collects blocks, merging prose runs that follow each other on a page.
#[derive(Default)]
struct BlockSink {
    blocks: Vec<ContentBlock>,
    /// Page of the last block if it is mergeable prose
    open_prose: Option<u32>,
}

impl BlockSink {
    fn push(&mut self, block: ContentBlock) {
        self.open_prose = None;
        self.blocks.push(block);
    }

    /// Prose from a text run; merges into the previous run's paragraph when
    /// both sit on the same page.
    fn push_prose(&mut self, page: u32, text: String) {
        if self.open_prose == Some(page) {
            if let Some(ContentBlock::Paragraph(prev)) = self.blocks.last_mut() {
                prev.push_str("\n\n");
                prev.push_str(&text);
                return;
            }
        }
        self.blocks.push(ContentBlock::Paragraph(text));
        self.open_prose = Some(page);
    }

    /// Standalone text recovered from a region.
    fn push_text(&mut self, text: String) {
        let text = text.trim();
        if text.is_empty() {
            self.open_prose = None;
            return;
        }
        self.push(ContentBlock::Paragraph(text.to_string()));
    }
}

/// Whether `next` starts a new text run after `prev`.
fn breaks_run(prev: &Span, next: &Span) -> bool {
    if prev.page != next.page || prev.monospace != next.monospace {
        return true;
    }
    if (prev.font_size - next.font_size).abs() > SIZE_BREAK {
        return true;
    }
    let gap = next.bbox.y0 - prev.bbox.y1;
    gap > prev.font_size.max(next.font_size) * GAP_BREAK_FACTOR || next.bbox.y1 < prev.bbox.y0
}

/// Join a run's lines into one paragraph, rejoining hyphenated words.
fn join_lines(run: &[Span]) -> String {
    let mut text = String::new();
    for span in run {
        let line = span.text.trim();
        if line.is_empty() {
            continue;
        }
        if text.is_empty() {
            text.push_str(line);
        } else if text.ends_with('-')
            && !text.ends_with(" -")
            && line.starts_with(|c: char| c.is_lowercase())
        {
            text.pop();
            text.push_str(line);
        } else {
            text.push(' ');
            text.push_str(line);
        }
    }
    text
}

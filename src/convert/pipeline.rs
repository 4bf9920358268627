//! Single-document conversion pipeline.
//!
//! Pages are analyzed (and OCR'd where needed) independently, possibly in
//! parallel, and joined in page order. Everything after that needs the whole
//! document and runs sequentially: font statistics, hierarchy building,
//! classification and output assembly.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;

use crate::classify::{ContentClassifier, TableCoordinator, TableStrategy};
use crate::config::ConversionConfig;
use crate::error::{Error, Result};
use crate::model::{AssetRegistry, ConversionMetadata, Fragment, Notice, SectionTree};
use crate::parser::{ExtractionBackend, LayoutAnalyzer, OcrFallback, OcrStrategy, PageContent};
use crate::render::{OutputTree, TreeAssembler};
use crate::structure::{FontStatistics, HierarchyBuilder};

/// Everything produced by converting one document, before it is written.
#[derive(Debug)]
pub struct Conversion {
    /// The finished section tree
    pub tree: SectionTree,
    /// Rendered output files
    pub output: OutputTree,
    /// Counts, outline and notices
    pub metadata: ConversionMetadata,
}

/// Result of a conversion written to disk.
#[derive(Debug)]
pub struct ConversionReport {
    /// Root of the written tree
    pub output_dir: PathBuf,
    /// The finished section tree
    pub tree: SectionTree,
    /// Counts, outline and notices
    pub metadata: ConversionMetadata,
    /// Every file written, in path order
    pub files: Vec<PathBuf>,
}

impl ConversionReport {
    /// Wall-clock time spent converting.
    pub fn elapsed(&self) -> Duration {
        self.metadata.elapsed
    }

    /// Non-fatal events recorded during conversion.
    pub fn notices(&self) -> &[Notice] {
        &self.metadata.notices
    }
}

/// Result of analyzing one page.
type PageResult = std::result::Result<(PageContent, Vec<Notice>), Notice>;

/// Converts documents from an extraction backend into a Markdown tree.
///
/// # Example
///
/// ```no_run
/// use pdftree::{ConversionConfig, Converter, MemoryBackend};
///
/// let backend = MemoryBackend::load("extracted.json")?;
/// let report = Converter::new(ConversionConfig::default().with_max_depth(3))
///     .convert(&backend, "out/manual")?;
/// println!("{} sections", report.metadata.sections);
/// # Ok::<(), pdftree::Error>(())
/// ```
#[derive(Clone)]
pub struct Converter {
    config: ConversionConfig,
    analyzer: LayoutAnalyzer,
    ocr: Option<Arc<dyn OcrStrategy>>,
    table_strategies: Vec<Arc<dyn TableStrategy>>,
    /// Timed-out OCR threads still running, shared by clones
    stalled_ocr: Arc<AtomicUsize>,
}

impl Converter {
    /// Create a converter with the built-in table strategies and no OCR
    /// engine.
    pub fn new(config: ConversionConfig) -> Self {
        Self {
            config,
            analyzer: LayoutAnalyzer::new(),
            ocr: None,
            table_strategies: TableCoordinator::builtin(),
            stalled_ocr: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Set the OCR engine.
    pub fn with_ocr(mut self, strategy: Arc<dyn OcrStrategy>) -> Self {
        self.ocr = Some(strategy);
        self
    }

    /// Register a table strategy after the ones already registered.
    pub fn with_table_strategy(mut self, strategy: Arc<dyn TableStrategy>) -> Self {
        self.table_strategies.push(strategy);
        self
    }

    /// Replace the registered table strategies.
    pub fn with_table_strategies(mut self, strategies: Vec<Arc<dyn TableStrategy>>) -> Self {
        self.table_strategies = strategies;
        self
    }

    /// Set the layout analyzer.
    pub fn with_analyzer(mut self, analyzer: LayoutAnalyzer) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    /// Convert a document and write the output tree under `out_dir`.
    pub fn convert(
        &self,
        backend: &dyn ExtractionBackend,
        out_dir: impl AsRef<Path>,
    ) -> Result<ConversionReport> {
        let out_dir = out_dir.as_ref();
        let Conversion {
            tree,
            output,
            mut metadata,
        } = self.build(backend)?;

        let started = Instant::now();
        let files = output.write(out_dir)?;
        metadata.elapsed += started.elapsed();

        log::info!(
            "Converted {} pages into {} sections in {:?}",
            metadata.pages,
            metadata.sections,
            metadata.elapsed
        );

        Ok(ConversionReport {
            output_dir: out_dir.to_path_buf(),
            tree,
            metadata,
            files,
        })
    }

    /// Run the pipeline without touching the filesystem.
    pub fn build(&self, backend: &dyn ExtractionBackend) -> Result<Conversion> {
        let started = Instant::now();
        self.config.validate()?;
        // Fail before page analysis on an unusable strategy list
        let classifier = ContentClassifier::new(&self.config, self.table_strategies.clone())?;

        let info = backend.info();
        let mut metadata = ConversionMetadata::new();
        metadata.pages = backend.page_count();
        metadata.document = info.clone();

        log::info!("Analyzing {} pages", metadata.pages);
        let fragments = self.analyze_pages(backend, &mut metadata)?;

        let stats = FontStatistics::from_spans(fragments.iter().filter_map(Fragment::as_span));
        log::debug!(
            "Body size {:.1}pt, heading sizes {:?}",
            stats.body_size,
            stats.heading_sizes
        );

        let outline = HierarchyBuilder::new(&stats, &self.config).build(fragments, &info);
        for notice in outline.notices.iter().cloned() {
            metadata.add_notice(notice);
        }

        let mut registry = AssetRegistry::new();
        let tree = classifier.classify(outline, &mut registry, &mut metadata);
        metadata.record_output(&tree, &registry);

        let output = TreeAssembler::new(&self.config).assemble(&tree, &registry, &metadata)?;
        metadata.elapsed = started.elapsed();

        Ok(Conversion {
            tree,
            output,
            metadata,
        })
    }

    /// Analyze every page and return the document-wide fragment stream with
    /// document order assigned.
    fn analyze_pages(
        &self,
        backend: &dyn ExtractionBackend,
        metadata: &mut ConversionMetadata,
    ) -> Result<Vec<Fragment>> {
        let fallback = OcrFallback::new(&self.config, self.ocr.clone())
            .with_stalled_counter(Arc::clone(&self.stalled_ocr));
        let numbers: Vec<u32> = (1..=metadata.pages).collect();

        let results: Vec<PageResult> = if self.config.parallel && numbers.len() > 1 {
            let work = || -> Vec<PageResult> {
                numbers
                    .par_iter()
                    .map(|n| self.process_page(backend, &fallback, *n))
                    .collect()
            };
            match self.config.num_workers {
                Some(workers) => rayon::ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .build()
                    .map_err(|e| Error::InvalidConfig(format!("cannot start page workers: {}", e)))?
                    .install(work),
                None => work(),
            }
        } else {
            numbers
                .iter()
                .map(|n| self.process_page(backend, &fallback, *n))
                .collect()
        };

        let mut fragments = Vec::new();
        for result in results {
            match result {
                Ok((page, notices)) => {
                    if page.ocr_applied {
                        metadata.add_ocr_page();
                    }
                    for notice in notices {
                        metadata.add_notice(notice);
                    }
                    fragments.extend(page.fragments);
                }
                Err(notice) => metadata.add_notice(notice),
            }
        }

        for (order, fragment) in fragments.iter_mut().enumerate() {
            fragment.set_order(order);
        }
        Ok(fragments)
    }

    fn process_page(
        &self,
        backend: &dyn ExtractionBackend,
        fallback: &OcrFallback,
        number: u32,
    ) -> PageResult {
        let analyzed = backend
            .page(number)
            .and_then(|raw| self.analyzer.analyze(raw));
        match analyzed {
            Ok(page) => {
                let outcome = fallback.apply(backend, page);
                Ok((outcome.page, outcome.notices))
            }
            Err(e) => {
                let reason = match e {
                    Error::PageExtraction { reason, .. } => reason,
                    other => other.to_string(),
                };
                Err(Notice::PageSkipped {
                    page: number,
                    reason,
                })
            }
        }
    }
}

/// Convert a document with the given configuration.
pub fn convert(
    backend: &dyn ExtractionBackend,
    out_dir: impl AsRef<Path>,
    config: ConversionConfig,
) -> Result<ConversionReport> {
    Converter::new(config).convert(backend, out_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BBox, ContentBlock, SectionId};
    use crate::parser::{MemoryBackend, RawPage};

    fn chapter_backend() -> MemoryBackend {
        let page = RawPage::letter(1)
            .with_text("Chapter 1", BBox::new(72.0, 72.0, 200.0, 96.0), 24.0, "Helvetica-Bold")
            .with_text("Intro text", BBox::new(72.0, 110.0, 150.0, 122.0), 12.0, "Helvetica")
            .with_text(
                "1.1 Background",
                BBox::new(72.0, 150.0, 220.0, 168.0),
                18.0,
                "Helvetica-Bold",
            )
            .with_text("More text", BBox::new(72.0, 180.0, 150.0, 192.0), 12.0, "Helvetica");
        MemoryBackend::new().with_page(page)
    }

    fn config() -> ConversionConfig {
        ConversionConfig::default().with_max_depth(3).with_ocr(false)
    }

    #[test]
    fn test_chapter_scenario() {
        let conversion = Converter::new(config()).build(&chapter_backend()).unwrap();
        let tree = &conversion.tree;

        assert_eq!(tree.len(), 2);
        let chapter = tree.get(tree.root().children[0]).unwrap();
        assert_eq!(chapter.title, "Chapter 1");
        assert_eq!(chapter.level, 1);
        assert_eq!(chapter.content, vec![ContentBlock::Paragraph("Intro text".into())]);

        let background = tree.get(chapter.children[0]).unwrap();
        assert_eq!(background.title, "1.1 Background");
        assert_eq!(background.level, 2);
        assert_eq!(background.content, vec![ContentBlock::Paragraph("More text".into())]);
        assert!(tree.root().content.is_empty());
    }

    #[test]
    fn test_broken_page_is_skipped() {
        let backend = chapter_backend().with_broken_page(2, "bad xref");
        let conversion = Converter::new(config()).build(&backend).unwrap();
        assert_eq!(conversion.metadata.pages, 2);
        assert_eq!(conversion.metadata.pages_skipped, 1);
        assert_eq!(
            conversion.metadata.notices,
            vec![Notice::PageSkipped {
                page: 2,
                reason: "bad xref".into()
            }]
        );
        assert_eq!(conversion.tree.len(), 2);
    }

    #[test]
    fn test_parallel_and_sequential_agree() {
        let mut backend = chapter_backend();
        for n in 2..=6 {
            backend = backend.with_page(RawPage::letter(n).with_text(
                format!("Paragraph on page {}", n),
                BBox::new(72.0, 100.0, 300.0, 112.0),
                12.0,
                "Helvetica",
            ));
        }
        let parallel = Converter::new(config().with_workers(3)).build(&backend).unwrap();
        let sequential = Converter::new(config().sequential()).build(&backend).unwrap();
        assert_eq!(parallel.tree, sequential.tree);
        assert_eq!(parallel.output, sequential.output);
    }

    #[test]
    fn test_invalid_config_is_fatal() {
        let err = Converter::new(config().with_max_depth(9))
            .build(&chapter_backend())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_no_headings_collapse_into_one_section() {
        let page = RawPage::letter(1).with_text(
            "Just some text",
            BBox::new(72.0, 72.0, 200.0, 84.0),
            12.0,
            "Helvetica",
        );
        let backend = MemoryBackend::new().with_page(page);
        let conversion = Converter::new(config()).build(&backend).unwrap();

        assert_eq!(conversion.tree.len(), 1);
        let section = conversion.tree.get(SectionId(1)).unwrap();
        assert_eq!(section.title, "Document");
        assert_eq!(section.content.len(), 1);
        assert_eq!(
            conversion
                .metadata
                .count_notices(|n| matches!(n, Notice::HierarchyAmbiguity { .. })),
            1
        );
    }
}

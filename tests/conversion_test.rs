//! End-to-end conversion tests over in-memory documents.

use std::collections::BTreeMap;
use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use image::DynamicImage;
use pdftree::error::Result;
use pdftree::{
    BBox, ContentBlock, ConversionConfig, Converter, DocumentInfo, Error, MemoryBackend, Notice,
    OcrLine, OcrStrategy, RawPage, TableGrid, TableInput, TableStrategy,
};

fn config() -> ConversionConfig {
    ConversionConfig::default().with_ocr(false)
}

fn text(page: RawPage, s: &str, y: f32, size: f32, font: &str) -> RawPage {
    page.with_text(s, BBox::new(72.0, y, 72.0 + s.len() as f32 * 6.0, y + size), size, font)
}

fn chapter_document() -> MemoryBackend {
    let page1 = RawPage::letter(1);
    let page1 = text(page1, "Chapter 1", 72.0, 24.0, "Helvetica-Bold");
    let page1 = text(page1, "Intro text", 110.0, 12.0, "Helvetica");
    let page1 = text(page1, "1.1 Background", 150.0, 18.0, "Helvetica-Bold");
    let page1 = text(page1, "More text", 180.0, 12.0, "Helvetica");
    let page2 = text(RawPage::letter(2), "Chapter 2", 72.0, 24.0, "Helvetica-Bold");
    let page2 = text(page2, "Closing words", 110.0, 12.0, "Helvetica");
    MemoryBackend::new()
        .with_info(DocumentInfo::titled("Field Manual"))
        .with_page(page1)
        .with_page(page2)
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([40, 90, 200]));
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

/// Every file under `root`, keyed by its path relative to `root`.
fn snapshot(root: &Path) -> BTreeMap<String, Vec<u8>> {
    fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<String, Vec<u8>>) {
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(root, &path, out);
            } else {
                let rel = path.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/");
                out.insert(rel, fs::read(&path).unwrap());
            }
        }
    }
    let mut out = BTreeMap::new();
    walk(root, root, &mut out);
    out
}

#[test]
fn test_chapter_tree_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let report = Converter::new(config().with_max_depth(3))
        .convert(&chapter_document(), dir.path())
        .unwrap();

    assert_eq!(report.metadata.sections, 3);
    assert!(report.notices().is_empty());

    let ch1 = fs::read_to_string(dir.path().join("01_chapter-1/index.md")).unwrap();
    assert!(ch1.starts_with("# Chapter 1\n\nIntro text\n"));
    assert!(ch1.contains("- [1.1 Background](01_1-1-background/index.md)"));

    let bg =
        fs::read_to_string(dir.path().join("01_chapter-1/01_1-1-background/index.md")).unwrap();
    assert_eq!(bg, "# 1.1 Background\n\nMore text\n");

    let root = fs::read_to_string(dir.path().join("index.md")).unwrap();
    assert!(root.starts_with("---\ntitle: \"Field Manual\"\n"));
    assert!(root.contains(
        "- [Chapter 1](01_chapter-1/index.md)\n  - [1.1 Background](01_chapter-1/01_1-1-background/index.md)\n- [Chapter 2](02_chapter-2/index.md)\n"
    ));
    assert!(root.contains("- Pages: 2\n"));

    let metadata: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("metadata.json")).unwrap())
            .unwrap();
    assert_eq!(metadata["sections"], 3);
    assert_eq!(metadata["outline"][0]["title"], "Chapter 1");
    assert_eq!(metadata["outline"][0]["children"][0]["numbering"], "1.1");
    assert!(metadata.get("elapsed").is_none());
}

#[test]
fn test_output_is_deterministic() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    let backend = chapter_document().with_page(
        RawPage::letter(3).with_image(BBox::new(72.0, 300.0, 272.0, 500.0), png(120, 120), 120, 120),
    );

    Converter::new(config()).convert(&backend, first.path()).unwrap();
    Converter::new(config().with_workers(2))
        .convert(&backend, second.path())
        .unwrap();

    let a = snapshot(first.path());
    assert!(a.contains_key("assets/images/image_003_001.png"));
    assert_eq!(a, snapshot(second.path()));
}

#[test]
fn test_repeated_image_is_stored_once() {
    let data = png(120, 120);
    let mut backend = MemoryBackend::new();
    for n in 1..=4 {
        backend = backend.with_page(RawPage::letter(n).with_image(
            BBox::new(72.0, 72.0, 272.0, 272.0),
            data.clone(),
            120,
            120,
        ));
    }

    let dir = tempfile::tempdir().unwrap();
    let report = Converter::new(config()).convert(&backend, dir.path()).unwrap();

    assert_eq!(report.metadata.images, 1);
    assert_eq!(report.metadata.image_references, 4);
    let refs: usize = report
        .tree
        .iter()
        .flat_map(|s| s.content.iter())
        .filter(|b| matches!(b, ContentBlock::ImageRef(_)))
        .count();
    assert_eq!(refs, 4);

    let images: Vec<_> = fs::read_dir(dir.path().join("assets/images"))
        .unwrap()
        .collect();
    assert_eq!(images.len(), 1);
}

#[test]
fn test_small_images_are_dropped() {
    let mut backend = MemoryBackend::new();
    for n in 1..=3 {
        backend = backend.with_page(RawPage::letter(n).with_image(
            BBox::new(72.0, 72.0, 122.0, 122.0),
            png(50, 50),
            50,
            50,
        ));
    }

    let dir = tempfile::tempdir().unwrap();
    let report = Converter::new(config().with_min_image_size(100, 100))
        .convert(&backend, dir.path())
        .unwrap();

    assert_eq!(report.metadata.images, 0);
    assert_eq!(report.metadata.images_discarded, 3);
    assert!(!dir.path().join("assets/images").exists());
}

struct FixedTable {
    name: &'static str,
    grid: Option<Vec<Vec<String>>>,
    calls: AtomicUsize,
}

impl FixedTable {
    fn failing(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            grid: None,
            calls: AtomicUsize::new(0),
        })
    }

    fn passing(name: &'static str) -> Arc<Self> {
        let rows = vec![
            vec!["Part".to_string(), "Qty".to_string()],
            vec!["Bolt".to_string(), "12".to_string()],
        ];
        Arc::new(Self {
            name,
            grid: Some(rows),
            calls: AtomicUsize::new(0),
        })
    }
}

impl TableStrategy for FixedTable {
    fn name(&self) -> &str {
        self.name
    }

    fn extract(&self, _input: &TableInput<'_>) -> Result<TableGrid> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.grid {
            Some(rows) => Ok(TableGrid::from_rows(rows.clone())),
            None => Err(Error::TableExtraction(format!("{} found nothing", self.name))),
        }
    }
}

fn table_document() -> MemoryBackend {
    let page = RawPage::letter(1)
        .with_table(BBox::new(72.0, 100.0, 400.0, 200.0), None)
        .with_text("raw cell text", BBox::new(80.0, 120.0, 200.0, 132.0), 12.0, "Helvetica");
    MemoryBackend::new().with_page(page)
}

#[test]
fn test_first_passing_table_strategy_wins() {
    let first = FixedTable::failing("first");
    let second = FixedTable::passing("second");
    let third = FixedTable::passing("third");

    let dir = tempfile::tempdir().unwrap();
    let report = Converter::new(config())
        .with_table_strategies(vec![first.clone(), second.clone(), third.clone()])
        .convert(&table_document(), dir.path())
        .unwrap();

    assert_eq!(first.calls.load(Ordering::SeqCst), 1);
    assert_eq!(second.calls.load(Ordering::SeqCst), 1);
    assert_eq!(third.calls.load(Ordering::SeqCst), 0);
    assert_eq!(report.metadata.tables, 1);
    assert_eq!(report.metadata.table_records[0].method, "second");
    assert_eq!(report.metadata.table_methods.get("second"), Some(&1));

    let csv = fs::read_to_string(dir.path().join("assets/tables/table_001_01.csv")).unwrap();
    assert_eq!(csv, "Part,Qty\r\nBolt,12\r\n");
    assert!(dir.path().join("assets/tables/table_001_01.md").exists());
}

#[test]
fn test_rejected_table_keeps_raw_text() {
    let dir = tempfile::tempdir().unwrap();
    let report = Converter::new(config())
        .with_table_strategies(vec![FixedTable::failing("a"), FixedTable::failing("b")])
        .convert(&table_document(), dir.path())
        .unwrap();

    assert_eq!(report.metadata.tables, 0);
    assert_eq!(report.metadata.table_fallbacks, 1);
    assert!(report.notices().contains(&Notice::TableExtractionFailure {
        page: 1,
        region: 0,
        attempted: vec!["a".to_string(), "b".to_string()],
    }));

    let section = fs::read_to_string(dir.path().join("01_document/index.md")).unwrap();
    assert!(section.contains("raw cell text"));
    assert!(!dir.path().join("assets/tables").exists());
}

struct CountingOcr {
    calls: AtomicUsize,
    delay: Duration,
}

impl OcrStrategy for CountingOcr {
    fn name(&self) -> &str {
        "counting"
    }

    fn recognize(&self, _image: &DynamicImage, _language: &str) -> Result<Vec<OcrLine>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        Ok(vec![OcrLine {
            text: "Scanned words".to_string(),
            confidence: 93.0,
            bbox: BBox::new(300.0, 300.0, 1200.0, 350.0),
        }])
    }
}

/// A dense 2x2 inch page followed by a blank one.
fn scanned_document() -> MemoryBackend {
    let dense = RawPage::new(1, 144.0, 144.0).with_text(
        "Native text layer",
        BBox::new(10.0, 10.0, 130.0, 22.0),
        12.0,
        "Helvetica",
    );
    MemoryBackend::new()
        .with_page(dense)
        .with_page(RawPage::new(2, 144.0, 144.0))
}

#[test]
fn test_ocr_runs_only_on_sparse_pages() {
    let ocr = Arc::new(CountingOcr {
        calls: AtomicUsize::new(0),
        delay: Duration::ZERO,
    });

    let dir = tempfile::tempdir().unwrap();
    let report = Converter::new(ConversionConfig::default())
        .with_ocr(ocr.clone())
        .convert(&scanned_document(), dir.path())
        .unwrap();

    assert_eq!(ocr.calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.metadata.ocr_pages, 1);
    assert_eq!(report.metadata.low_confidence_spans, 0);

    let section = fs::read_to_string(dir.path().join("01_document/index.md")).unwrap();
    assert!(section.contains("Native text layer"));
    assert!(section.contains("Scanned words"));
}

#[test]
fn test_slow_ocr_times_out() {
    let ocr = Arc::new(CountingOcr {
        calls: AtomicUsize::new(0),
        delay: Duration::from_millis(500),
    });

    let report = Converter::new(ConversionConfig::default().with_ocr_timeout_ms(20))
        .with_ocr(ocr)
        .build(&scanned_document())
        .unwrap();

    assert_eq!(report.metadata.ocr_pages, 0);
    assert_eq!(
        report.metadata.notices,
        vec![
            Notice::OcrTimeout {
                page: 2,
                timeout_ms: 20
            },
            Notice::HierarchyAmbiguity {
                reason: "no headings detected; content placed in a single section".to_string()
            },
        ]
    );
}

#[test]
fn test_missing_ocr_engine_is_noticed() {
    let report = Converter::new(ConversionConfig::default())
        .build(&scanned_document())
        .unwrap();

    assert_eq!(
        report
            .metadata
            .count_notices(|n| matches!(n, Notice::OcrFailure { page: 2, .. })),
        1
    );
}

#[test]
fn test_broken_page_is_skipped() {
    let backend = chapter_document().with_broken_page(3, "invalid content stream");
    let dir = tempfile::tempdir().unwrap();
    let report = Converter::new(config()).convert(&backend, dir.path()).unwrap();

    assert_eq!(report.metadata.pages, 3);
    assert_eq!(report.metadata.pages_skipped, 1);
    assert_eq!(report.metadata.sections, 3);
    assert_eq!(report.notices()[0].page(), Some(3));
}

#[test]
fn test_flat_layout() {
    let dir = tempfile::tempdir().unwrap();
    Converter::new(config().with_folder_structure(false))
        .convert(&chapter_document(), dir.path())
        .unwrap();

    let files = snapshot(dir.path());
    let names: Vec<&str> = files.keys().map(String::as_str).collect();
    assert_eq!(
        names,
        vec![
            "01-01_1-1-background.md",
            "01_chapter-1.md",
            "02_chapter-2.md",
            "index.md",
            "metadata.json",
        ]
    );
    let root = String::from_utf8(files["index.md"].clone()).unwrap();
    assert!(root.contains("- [Chapter 2](02_chapter-2.md)"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let err = Converter::new(config().with_min_image_size(0, 10))
        .convert(&chapter_document(), dir.path())
        .unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));
    assert!(fs::read_dir(dir.path()).unwrap().next().is_none());
}

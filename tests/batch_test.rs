//! Integration tests for batch conversion and document openers.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use pdftree::error::Result;
use pdftree::{
    BBox, BatchConverter, ConversionConfig, Converter, DocumentOpener, Error, ExtractionBackend,
    MemoryBackend, OpenerRegistry, RawPage,
};

fn document(title: &str, body: &str) -> MemoryBackend {
    let page = RawPage::letter(1)
        .with_text(title, BBox::new(72.0, 72.0, 300.0, 96.0), 24.0, "Helvetica-Bold")
        .with_text(body, BBox::new(72.0, 110.0, 300.0, 122.0), 12.0, "Helvetica");
    MemoryBackend::new().with_page(page)
}

fn write_json(dir: &Path, name: &str, backend: &MemoryBackend) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, serde_json::to_string(backend).unwrap()).unwrap();
    path
}

fn converter() -> Converter {
    Converter::new(ConversionConfig::default().with_ocr(false))
}

#[test]
fn test_failure_is_isolated() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();

    let good = write_json(input.path(), "good.json", &document("Overview", "First document."));
    let corrupt = input.path().join("corrupt.json");
    fs::write(&corrupt, "{\"pages\": [").unwrap();
    let other = write_json(input.path(), "other.json", &document("Summary", "Third document."));

    let outcomes = BatchConverter::new(converter())
        .with_workers(2)
        .convert_all(&[good.clone(), corrupt.clone(), other], output.path())
        .unwrap();

    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[0].input, good);
    assert!(outcomes[0].is_ok());
    assert!(matches!(
        outcomes[1].result,
        Err(Error::DocumentConversion { .. })
    ));
    assert_eq!(outcomes[1].input, corrupt);
    assert!(outcomes[2].is_ok());

    let overview = fs::read_to_string(output.path().join("good/01_overview/index.md")).unwrap();
    assert!(overview.contains("First document."));
    let summary = fs::read_to_string(output.path().join("other/01_summary/index.md")).unwrap();
    assert!(summary.contains("Third document."));
    assert!(!output.path().join("corrupt").exists());
}

#[test]
fn test_unsupported_extension_is_reported() {
    let output = tempfile::tempdir().unwrap();
    let outcomes = BatchConverter::new(converter())
        .convert_all(&["scan.tiff"], output.path())
        .unwrap();

    assert_eq!(outcomes.len(), 1);
    let err = outcomes[0].result.as_ref().unwrap_err();
    assert!(err.to_string().contains("tiff"));
}

#[test]
fn test_zero_workers_is_rejected() {
    let output = tempfile::tempdir().unwrap();
    let err = BatchConverter::new(converter())
        .with_workers(0)
        .convert_all(&["a.json"], output.path())
        .unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));
}

/// Serves a fixed document for any `.fixture` path.
struct FixtureOpener;

impl DocumentOpener for FixtureOpener {
    fn supported_extensions(&self) -> &[&str] {
        &["fixture"]
    }

    fn name(&self) -> &str {
        "fixture"
    }

    fn open(&self, path: &Path) -> Result<Box<dyn ExtractionBackend>> {
        let stem = path.file_stem().unwrap().to_string_lossy().to_string();
        Ok(Box::new(document(&stem, "Served from a fixture.")))
    }
}

#[test]
fn test_custom_opener() {
    let mut openers = OpenerRegistry::new();
    openers.register(Arc::new(FixtureOpener));
    assert!(openers.supports("FIXTURE"));
    assert!(!openers.supports("json"));

    let output = tempfile::tempdir().unwrap();
    let outcomes = BatchConverter::new(converter())
        .with_openers(openers)
        .convert_all(&["Alpha.fixture", "alpha.fixture"], output.path())
        .unwrap();

    assert!(outcomes.iter().all(|o| o.is_ok()));
    assert_eq!(outcomes[0].output_dir, output.path().join("alpha"));
    assert_eq!(outcomes[1].output_dir, output.path().join("alpha-2"));
    assert!(output.path().join("alpha/01_alpha/index.md").exists());
    assert!(output.path().join("alpha-2/01_alpha/index.md").exists());
}

#[test]
fn test_convert_file_helper() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let path = write_json(input.path(), "notes.json", &document("Notes", "Body text."));

    let report =
        pdftree::convert_file(&path, output.path(), ConversionConfig::default().with_ocr(false))
            .unwrap();
    assert_eq!(report.metadata.sections, 1);
    assert_eq!(report.output_dir, output.path());
    assert!(report.files.iter().any(|f| f.ends_with("01_notes/index.md")));
}

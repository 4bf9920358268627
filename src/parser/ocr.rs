//! OCR fallback for pages without enough extractable text.
//!
//! Scanned pages carry little or no text layer. When a page's text density
//! drops below the configured threshold the page is rasterized, handed to
//! the configured [`OcrStrategy`] on a helper thread, and the recognized
//! lines replace the page's native spans.
//!
//! A helper thread that misses the timeout cannot be cancelled. It is left
//! to finish in the background and its result is dropped. Fallbacks built
//! for the same converter share a count of such stalled threads, and once
//! [`MAX_STALLED_WORKERS`] are still running no new ones are started.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError};
use image::DynamicImage;

use crate::config::ConversionConfig;
use crate::error::{Error, Result};
use crate::model::{BBox, Fragment, Notice, Span};

use super::backend::ExtractionBackend;
use super::layout::{sort_reading_order, PageContent};

/// Timed-out OCR threads allowed to keep running before OCR is skipped.
pub const MAX_STALLED_WORKERS: usize = 4;

const WORKER_RUNNING: u8 = 0;
const WORKER_DONE: u8 = 1;
const WORKER_ABANDONED: u8 = 2;

/// One recognized line, in pixel coordinates of the rasterized page.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrLine {
    pub text: String,
    /// Confidence in [0, 1]; values above 1 are read as percentages
    pub confidence: f32,
    pub bbox: BBox,
}

/// A pluggable OCR engine.
pub trait OcrStrategy: Send + Sync {
    /// Engine name for logging.
    fn name(&self) -> &str;

    /// Recognize text lines on a rasterized page.
    fn recognize(&self, image: &DynamicImage, language: &str) -> Result<Vec<OcrLine>>;
}

/// Result of running the fallback on one page.
#[derive(Debug)]
pub struct OcrOutcome {
    /// The page, with OCR spans when recognition succeeded
    pub page: PageContent,
    /// Notices raised while handling the page
    pub notices: Vec<Notice>,
}

/// Decides when to OCR a page and merges the recognized text back in.
#[derive(Clone)]
pub struct OcrFallback {
    strategy: Option<Arc<dyn OcrStrategy>>,
    enabled: bool,
    language: String,
    dpi: u32,
    timeout: Duration,
    density_threshold: f32,
    confidence_threshold: f32,
    stalled: Arc<AtomicUsize>,
}

impl OcrFallback {
    /// Build from configuration and an optional engine.
    pub fn new(config: &ConversionConfig, strategy: Option<Arc<dyn OcrStrategy>>) -> Self {
        Self {
            strategy,
            enabled: config.use_ocr,
            language: config.ocr_language.clone(),
            dpi: config.ocr_dpi,
            timeout: Duration::from_millis(config.ocr_timeout_ms),
            density_threshold: config.ocr_text_density_threshold,
            confidence_threshold: config.ocr_confidence_threshold,
            stalled: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Share the stalled-thread count with other fallbacks.
    pub fn with_stalled_counter(mut self, stalled: Arc<AtomicUsize>) -> Self {
        self.stalled = stalled;
        self
    }

    /// Timed-out OCR threads that are still running.
    pub fn stalled_workers(&self) -> usize {
        self.stalled.load(Ordering::SeqCst)
    }

    /// Whether this page's text density calls for OCR.
    pub fn needs_ocr(&self, page: &PageContent) -> bool {
        self.enabled && page.text_density() < self.density_threshold
    }

    /// Run OCR on a page if it needs it.
    ///
    /// Failures never propagate: the page keeps its native content and the
    /// failure is returned as a notice.
    ///
    /// Returns once the timeout expires even if the engine is still working.
    /// The engine's thread then keeps running detached and counts as stalled
    /// until it finishes; while [`MAX_STALLED_WORKERS`] are stalled, pages
    /// that need OCR get an `OcrFailure` notice without starting a thread.
    pub fn apply(&self, backend: &dyn ExtractionBackend, page: PageContent) -> OcrOutcome {
        if !self.needs_ocr(&page) {
            return OcrOutcome {
                page,
                notices: Vec::new(),
            };
        }

        log::info!(
            "Page {}: text density {:.2} below {:.2}, running OCR",
            page.number,
            page.text_density(),
            self.density_threshold
        );

        match self.recognize_page(backend, page.number) {
            Ok(lines) => {
                let (page, notices) = self.merge(page, lines);
                OcrOutcome { page, notices }
            }
            Err(Error::OcrTimeout { page: number, timeout_ms }) => OcrOutcome {
                page,
                notices: vec![Notice::OcrTimeout {
                    page: number,
                    timeout_ms,
                }],
            },
            Err(e) => {
                let number = page.number;
                OcrOutcome {
                    page,
                    notices: vec![Notice::OcrFailure {
                        page: number,
                        reason: e.to_string(),
                    }],
                }
            }
        }
    }

    fn recognize_page(&self, backend: &dyn ExtractionBackend, number: u32) -> Result<Vec<OcrLine>> {
        let strategy = self
            .strategy
            .clone()
            .ok_or_else(|| Error::Ocr("no OCR strategy configured".to_string()))?;
        let stalled = self.stalled.load(Ordering::SeqCst);
        if stalled >= MAX_STALLED_WORKERS {
            return Err(Error::Ocr(format!(
                "{} timed-out OCR workers still running",
                stalled
            )));
        }
        let image = backend.rasterize(number, self.dpi)?;
        let language = self.language.clone();

        let state = Arc::new(AtomicU8::new(WORKER_RUNNING));
        let worker_state = Arc::clone(&state);
        let worker_stalled = Arc::clone(&self.stalled);
        let (tx, rx) = bounded(1);
        thread::Builder::new()
            .name(format!("ocr-page-{}", number))
            .spawn(move || {
                let result = strategy.recognize(&image, &language);
                if worker_state.swap(WORKER_DONE, Ordering::SeqCst) == WORKER_ABANDONED {
                    worker_stalled.fetch_sub(1, Ordering::SeqCst);
                    log::debug!("Page {}: late OCR result dropped", number);
                }
                // The receiver is gone once the timeout fired
                let _ = tx.send(result);
            })?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                // Count first so the worker never decrements below zero
                self.stalled.fetch_add(1, Ordering::SeqCst);
                if state
                    .compare_exchange(
                        WORKER_RUNNING,
                        WORKER_ABANDONED,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    )
                    .is_err()
                {
                    self.stalled.fetch_sub(1, Ordering::SeqCst);
                }
                Err(Error::OcrTimeout {
                    page: number,
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(Error::Ocr("OCR worker exited without a result".to_string()))
            }
        }
    }

    /// Replace native spans with recognized lines.
    fn merge(&self, mut page: PageContent, lines: Vec<OcrLine>) -> (PageContent, Vec<Notice>) {
        let scale = 72.0 / self.dpi as f32;
        let mut notices = Vec::new();
        let mut low = 0usize;
        let mut min_confidence = 1.0f32;

        let spans: Vec<Span> = lines
            .into_iter()
            .filter(|l| !l.text.trim().is_empty())
            .map(|line| {
                let confidence = normalize_confidence(line.confidence);
                let bbox = line.bbox.scale(scale);
                let low_confidence = confidence < self.confidence_threshold;
                if low_confidence {
                    low += 1;
                    min_confidence = min_confidence.min(confidence);
                }
                Span {
                    text: line.text.trim().to_string(),
                    font_size: estimate_font_size(&bbox),
                    bold: false,
                    italic: false,
                    monospace: false,
                    page: page.number,
                    bbox,
                    order: 0,
                    confidence: Some(confidence),
                    low_confidence,
                }
            })
            .collect();

        page.fragments.retain(|f| matches!(f, Fragment::Region(_)));
        for span in spans {
            let covering = page.fragments.iter_mut().find_map(|f| match f {
                Fragment::Region(r) if span.bbox.coverage_by(&r.bbox) > 0.5 => Some(r),
                _ => None,
            });
            match covering {
                Some(region) => {
                    if region.spans.iter().all(|s| s.confidence.is_none()) {
                        region.spans.clear();
                    }
                    region.spans.push(span);
                }
                None => page.fragments.push(Fragment::Span(span)),
            }
        }
        sort_reading_order(&mut page.fragments);
        page.ocr_applied = true;

        if low > 0 {
            notices.push(Notice::LowConfidenceText {
                page: page.number,
                spans: low,
                min_confidence,
            });
        }
        (page, notices)
    }
}

fn normalize_confidence(confidence: f32) -> f32 {
    let c = if confidence > 1.0 {
        confidence / 100.0
    } else {
        confidence
    };
    c.clamp(0.0, 1.0)
}

/// Line boxes are roughly 1.2 times the font size; round to half points so
/// OCR sizes bucket together.
fn estimate_font_size(bbox: &BBox) -> f32 {
    let size = bbox.height() / 1.2;
    ((size * 2.0).round() / 2.0).max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::backend::{MemoryBackend, RawPage};
    use crate::parser::layout::LayoutAnalyzer;
    use std::time::Instant;

    struct FixedOcr {
        lines: Vec<OcrLine>,
        calls: AtomicUsize,
    }

    impl OcrStrategy for FixedOcr {
        fn name(&self) -> &str {
            "fixed"
        }

        fn recognize(&self, _image: &DynamicImage, _language: &str) -> Result<Vec<OcrLine>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.lines.clone())
        }
    }

    struct SlowOcr;

    impl OcrStrategy for SlowOcr {
        fn name(&self) -> &str {
            "slow"
        }

        fn recognize(&self, _image: &DynamicImage, _language: &str) -> Result<Vec<OcrLine>> {
            thread::sleep(Duration::from_millis(500));
            Ok(vec![])
        }
    }

    fn small_config() -> ConversionConfig {
        // 72 dpi keeps the rasterized test pages tiny
        ConversionConfig {
            ocr_dpi: 72,
            ..ConversionConfig::default()
        }
    }

    fn fixed(lines: Vec<OcrLine>) -> Arc<FixedOcr> {
        Arc::new(FixedOcr {
            lines,
            calls: AtomicUsize::new(0),
        })
    }

    fn analyze(page: RawPage) -> PageContent {
        LayoutAnalyzer::new().analyze(page).unwrap()
    }

    #[test]
    fn test_empty_page_is_recognized() {
        let engine = fixed(vec![
            OcrLine {
                text: "Scanned heading".into(),
                confidence: 0.95,
                bbox: BBox::new(72.0, 72.0, 300.0, 96.0),
            },
            OcrLine {
                text: "smudged".into(),
                confidence: 25.0,
                bbox: BBox::new(72.0, 120.0, 200.0, 134.0),
            },
        ]);
        let backend = MemoryBackend::new().with_page(RawPage::letter(1));
        let ocr = OcrFallback::new(&small_config(), Some(engine.clone()));

        let outcome = ocr.apply(&backend, analyze(RawPage::letter(1)));
        assert!(outcome.page.ocr_applied);
        let spans: Vec<_> = outcome.page.spans().collect();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].text, "Scanned heading");
        assert_eq!(spans[0].font_size, 20.0);
        assert!(!spans[0].low_confidence);
        assert!(spans[1].low_confidence);
        assert_eq!(spans[1].confidence, Some(0.25));
        assert_eq!(
            outcome.notices,
            vec![Notice::LowConfidenceText {
                page: 1,
                spans: 1,
                min_confidence: 0.25
            }]
        );
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dense_page_skips_ocr() {
        let mut page = RawPage::letter(1);
        for i in 0..60 {
            let y = 72.0 + i as f32 * 11.0;
            page = page.with_text(
                "Plenty of native text on this line of the page",
                BBox::new(72.0, y, 500.0, y + 10.0),
                10.0,
                "Times-Roman",
            );
        }
        let engine = fixed(vec![]);
        let backend = MemoryBackend::new().with_page(page.clone());
        let ocr = OcrFallback::new(&small_config(), Some(engine.clone()));

        let outcome = ocr.apply(&backend, analyze(page));
        assert!(!outcome.page.ocr_applied);
        assert!(outcome.notices.is_empty());
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_missing_engine_records_failure() {
        let backend = MemoryBackend::new().with_page(RawPage::letter(2));
        let ocr = OcrFallback::new(&small_config(), None);
        let outcome = ocr.apply(&backend, analyze(RawPage::letter(2)));
        assert!(!outcome.page.ocr_applied);
        assert!(matches!(
            outcome.notices.as_slice(),
            [Notice::OcrFailure { page: 2, .. }]
        ));
    }

    #[test]
    fn test_timeout_records_notice() {
        let backend = MemoryBackend::new().with_page(RawPage::letter(1));
        let config = ConversionConfig {
            ocr_timeout_ms: 20,
            ..small_config()
        };
        let ocr = OcrFallback::new(&config, Some(Arc::new(SlowOcr)));

        let started = Instant::now();
        let outcome = ocr.apply(&backend, analyze(RawPage::letter(1)));
        assert!(started.elapsed() < Duration::from_millis(400));
        assert_eq!(
            outcome.notices,
            vec![Notice::OcrTimeout {
                page: 1,
                timeout_ms: 20
            }]
        );
        assert_eq!(ocr.stalled_workers(), 1);

        // The detached worker finishes and stops counting as stalled
        thread::sleep(Duration::from_millis(700));
        assert_eq!(ocr.stalled_workers(), 0);
    }

    #[test]
    fn test_stalled_workers_are_bounded() {
        let backend = MemoryBackend::new().with_page(RawPage::letter(1));
        let config = ConversionConfig {
            ocr_timeout_ms: 10,
            ..small_config()
        };
        let stalled = Arc::new(AtomicUsize::new(0));
        let ocr = OcrFallback::new(&config, Some(Arc::new(SlowOcr)))
            .with_stalled_counter(Arc::clone(&stalled));

        for _ in 0..MAX_STALLED_WORKERS {
            let outcome = ocr.apply(&backend, analyze(RawPage::letter(1)));
            assert!(matches!(
                outcome.notices.as_slice(),
                [Notice::OcrTimeout { page: 1, .. }]
            ));
        }
        assert_eq!(stalled.load(Ordering::SeqCst), MAX_STALLED_WORKERS);

        // A fallback sharing the counter starts no further threads
        let other = OcrFallback::new(&config, Some(Arc::new(SlowOcr)))
            .with_stalled_counter(Arc::clone(&stalled));
        let outcome = other.apply(&backend, analyze(RawPage::letter(1)));
        match outcome.notices.as_slice() {
            [Notice::OcrFailure { page: 1, reason }] => assert!(reason.contains("still running")),
            other => panic!("unexpected notices: {:?}", other),
        }
    }

    #[test]
    fn test_disabled_ocr_never_runs() {
        let engine = fixed(vec![]);
        let backend = MemoryBackend::new().with_page(RawPage::letter(1));
        let ocr = OcrFallback::new(&small_config().with_ocr(false), Some(engine.clone()));
        let outcome = ocr.apply(&backend, analyze(RawPage::letter(1)));
        assert!(outcome.notices.is_empty());
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }
}

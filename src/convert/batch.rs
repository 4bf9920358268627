//! Batch conversion of many documents.
//!
//! Each input is opened by the [`DocumentOpener`] registered for its
//! extension and converted into its own subdirectory of the output root.
//! Documents share nothing mutable, so a failure in one only shows up in that
//! document's [`BatchOutcome`].

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::parser::{ExtractionBackend, MemoryBackend};
use crate::render::slugify;

use super::pipeline::{ConversionReport, Converter};

/// Opens a document file as an extraction backend.
///
/// Implementations bridge a PDF library (or a cache of extracted content)
/// to the pipeline.
pub trait DocumentOpener: Send + Sync {
    /// Lowercase extensions without the leading dot (e.g., `["json"]`).
    fn supported_extensions(&self) -> &[&str];

    /// Opener name.
    fn name(&self) -> &str;

    /// Open the document at `path`.
    fn open(&self, path: &Path) -> Result<Box<dyn ExtractionBackend>>;

    /// Check if this opener handles the given extension.
    fn supports_extension(&self, ext: &str) -> bool {
        let ext_lower = ext.to_lowercase();
        self.supported_extensions().iter().any(|e| *e == ext_lower)
    }
}

/// Opens pre-extracted documents stored as [`MemoryBackend`] JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonOpener;

impl DocumentOpener for JsonOpener {
    fn supported_extensions(&self) -> &[&str] {
        &["json"]
    }

    fn name(&self) -> &str {
        "json"
    }

    fn open(&self, path: &Path) -> Result<Box<dyn ExtractionBackend>> {
        Ok(Box::new(MemoryBackend::load(path)?))
    }
}

/// Maps file extensions to openers.
#[derive(Clone, Default)]
pub struct OpenerRegistry {
    openers: HashMap<String, Arc<dyn DocumentOpener>>,
}

impl OpenerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in [`JsonOpener`].
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(JsonOpener));
        registry
    }

    /// Register an opener for all of its extensions, replacing earlier ones.
    pub fn register(&mut self, opener: Arc<dyn DocumentOpener>) {
        for ext in opener.supported_extensions() {
            self.openers.insert(ext.to_lowercase(), opener.clone());
        }
    }

    pub fn get_by_extension(&self, ext: &str) -> Option<Arc<dyn DocumentOpener>> {
        self.openers.get(&ext.to_lowercase()).cloned()
    }

    pub fn supports(&self, ext: &str) -> bool {
        self.openers.contains_key(&ext.to_lowercase())
    }

    /// Open a document with the opener for its extension.
    pub fn open(&self, path: &Path) -> Result<Box<dyn ExtractionBackend>> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| Error::DocumentConversion {
                document: path.display().to_string(),
                reason: "file has no extension".into(),
            })?;

        let opener = self
            .get_by_extension(ext)
            .ok_or_else(|| Error::DocumentConversion {
                document: path.display().to_string(),
                reason: format!("no opener for extension: {}", ext),
            })?;

        opener.open(path)
    }
}

/// Result of converting one document of a batch.
#[derive(Debug)]
pub struct BatchOutcome {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub result: Result<ConversionReport>,
}

impl BatchOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Converts many documents on a bounded worker pool.
#[derive(Clone)]
pub struct BatchConverter {
    converter: Converter,
    openers: OpenerRegistry,
    workers: Option<usize>,
}

impl BatchConverter {
    /// Create a batch converter with the default openers.
    ///
    /// The pool size comes from the converter's `num_workers`.
    pub fn new(converter: Converter) -> Self {
        let workers = converter.config().num_workers;
        Self {
            converter,
            openers: OpenerRegistry::with_defaults(),
            workers,
        }
    }

    /// Replace the opener registry.
    pub fn with_openers(mut self, openers: OpenerRegistry) -> Self {
        self.openers = openers;
        self
    }

    /// Set the number of documents converted at once.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Convert every input into its own subdirectory of `out_root`.
    ///
    /// Outcomes come back in input order. Only a pool that cannot be started
    /// is an error; per-document failures are in the outcomes.
    pub fn convert_all<P: AsRef<Path>>(
        &self,
        inputs: &[P],
        out_root: impl AsRef<Path>,
    ) -> Result<Vec<BatchOutcome>> {
        let out_root = out_root.as_ref();
        if self.workers == Some(0) {
            return Err(Error::InvalidConfig("batch workers must be at least 1".into()));
        }
        let jobs: Vec<(PathBuf, PathBuf)> = inputs
            .iter()
            .map(|p| p.as_ref().to_path_buf())
            .zip(output_names(inputs).into_iter().map(|n| out_root.join(n)))
            .collect();

        log::info!("Converting {} documents", jobs.len());

        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(workers) = self.workers {
            builder = builder.num_threads(workers);
        }
        let pool = builder
            .build()
            .map_err(|e| Error::InvalidConfig(format!("cannot start batch workers: {}", e)))?;

        let outcomes: Vec<BatchOutcome> = pool.install(|| {
            jobs.into_par_iter()
                .map(|(input, output_dir)| {
                    let result = self.convert_one(&input, &output_dir);
                    if let Err(ref e) = result {
                        log::warn!("Failed to convert {}: {}", input.display(), e);
                    }
                    BatchOutcome {
                        input,
                        output_dir,
                        result,
                    }
                })
                .collect()
        });

        let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
        log::info!(
            "Batch finished: {} converted, {} failed",
            outcomes.len() - failed,
            failed
        );
        Ok(outcomes)
    }

    fn convert_one(&self, input: &Path, output_dir: &Path) -> Result<ConversionReport> {
        let backend = self.openers.open(input)?;
        self.converter.convert(&*backend, output_dir)
    }
}

/// Distinct output directory names derived from the input file stems.
fn output_names<P: AsRef<Path>>(inputs: &[P]) -> Vec<String> {
    let mut taken = BTreeSet::new();
    inputs
        .iter()
        .map(|p| {
            let stem = p
                .as_ref()
                .file_stem()
                .map(|s| slugify(&s.to_string_lossy()))
                .unwrap_or_else(|| slugify(""));
            let mut name = stem.clone();
            let mut n = 2;
            while !taken.insert(name.clone()) {
                name = format!("{}-{}", stem, n);
                n += 1;
            }
            name
        })
        .collect()
}

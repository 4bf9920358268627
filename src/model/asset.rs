//! Extracted assets and the per-document registry that owns them.
//!
//! Asset paths are relative to the output root and always use `/`, so they
//! can be dropped into Markdown links as they are.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::TableGrid;
use crate::config::TableFormat;

/// Directory (relative to the output root) holding image assets.
pub const IMAGE_DIR: &str = "assets/images";
/// Directory (relative to the output root) holding table exports.
pub const TABLE_DIR: &str = "assets/tables";
/// Directory (relative to the output root) holding code files.
pub const CODE_DIR: &str = "assets/code";

/// Index of an image asset in its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ImageId(pub usize);

/// Index of a table asset in its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableId(pub usize);

/// Index of a code asset in its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CodeId(pub usize);

/// A deduplicated image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAsset {
    pub id: ImageId,
    /// Lowercase hex MD5 of the source bytes
    pub hash: String,
    /// Page of the first occurrence
    pub page: u32,
    /// Relative output path
    pub path: String,
    /// Pixel width
    pub width: u32,
    /// Pixel height
    pub height: u32,
    /// Number of content blocks referring to this image
    pub ref_count: usize,
    /// Re-encoded bytes to write
    #[serde(skip)]
    pub data: Vec<u8>,
}

/// An accepted table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableAsset {
    pub id: TableId,
    pub page: u32,
    /// Name of the strategy that produced the grid
    pub method: String,
    /// Relative output path without extension
    pub stem: String,
    /// Export formats, in write order
    pub formats: Vec<TableFormat>,
    #[serde(skip)]
    pub grid: TableGrid,
}

impl TableAsset {
    /// Relative path of one export.
    pub fn path(&self, format: TableFormat) -> String {
        format!("{}.{}", self.stem, format.extension())
    }
}

/// A detected code block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeAsset {
    pub id: CodeId,
    pub page: u32,
    pub language: String,
    /// Relative output path
    pub path: String,
    #[serde(skip)]
    pub code: String,
}

/// Owns every asset created while converting one document.
///
/// Assets are created lazily by the classifier and dropped once the output
/// tree has been written.
#[derive(Debug, Default)]
pub struct AssetRegistry {
    images: Vec<ImageAsset>,
    tables: Vec<TableAsset>,
    code: Vec<CodeAsset>,
    image_hashes: HashMap<String, ImageId>,
    images_per_page: BTreeMap<u32, usize>,
    tables_per_page: BTreeMap<u32, usize>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an image by content hash.
    pub fn find_image(&self, hash: &str) -> Option<ImageId> {
        self.image_hashes.get(hash).copied()
    }

    /// Record one more reference to an existing image.
    pub fn reference_image(&mut self, id: ImageId) {
        self.images[id.0].ref_count += 1;
    }

    /// Store a new image with a reference count of 1.
    ///
    /// The file name is `image_<page:03>_<seq:03>.<ext>` where `seq` counts
    /// images created on that page.
    pub fn insert_image(
        &mut self,
        hash: String,
        page: u32,
        extension: &str,
        width: u32,
        height: u32,
        data: Vec<u8>,
    ) -> ImageId {
        let seq = next_seq(&mut self.images_per_page, page);
        let id = ImageId(self.images.len());
        self.image_hashes.entry(hash.clone()).or_insert(id);
        self.images.push(ImageAsset {
            id,
            hash,
            page,
            path: format!("{}/image_{:03}_{:03}.{}", IMAGE_DIR, page, seq, extension),
            width,
            height,
            ref_count: 1,
            data,
        });
        id
    }

    /// Store an accepted table as `table_<page:03>_<seq:02>`.
    pub fn insert_table(
        &mut self,
        page: u32,
        method: impl Into<String>,
        grid: TableGrid,
        formats: Vec<TableFormat>,
    ) -> TableId {
        let seq = next_seq(&mut self.tables_per_page, page);
        let id = TableId(self.tables.len());
        self.tables.push(TableAsset {
            id,
            page,
            method: method.into(),
            stem: format!("{}/table_{:03}_{:02}", TABLE_DIR, page, seq),
            formats,
            grid,
        });
        id
    }

    /// Store a code block as `code_<seq:03>_<language>.<ext>`.
    pub fn insert_code(
        &mut self,
        page: u32,
        language: impl Into<String>,
        extension: &str,
        code: String,
    ) -> CodeId {
        let language = language.into();
        let id = CodeId(self.code.len());
        self.code.push(CodeAsset {
            id,
            page,
            path: format!(
                "{}/code_{:03}_{}{}",
                CODE_DIR,
                id.0 + 1,
                file_safe(&language),
                extension
            ),
            language,
            code,
        });
        id
    }

    pub fn image(&self, id: ImageId) -> Option<&ImageAsset> {
        self.images.get(id.0)
    }

    pub fn table(&self, id: TableId) -> Option<&TableAsset> {
        self.tables.get(id.0)
    }

    pub fn code(&self, id: CodeId) -> Option<&CodeAsset> {
        self.code.get(id.0)
    }

    pub fn images(&self) -> &[ImageAsset] {
        &self.images
    }

    pub fn tables(&self) -> &[TableAsset] {
        &self.tables
    }

    pub fn code_blocks(&self) -> &[CodeAsset] {
        &self.code
    }

    /// Total image references across all image assets.
    pub fn image_references(&self) -> usize {
        self.images.iter().map(|i| i.ref_count).sum()
    }
}

fn next_seq(counter: &mut BTreeMap<u32, usize>, page: u32) -> usize {
    let seq = counter.entry(page).or_insert(0);
    *seq += 1;
    *seq
}

/// Language names are user-supplied; keep them usable in file names.
fn file_safe(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "code".to_string()
    } else {
        cleaned
    }
}

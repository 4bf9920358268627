//! Output tree assembly.
//!
//! The finished section tree and asset registry are rendered into an
//! in-memory map of relative path to file bytes, which is then written out.
//! Rendering is a pure function of its inputs; the map is ordered, so two
//! conversions of the same document produce the same files in the same
//! order.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ConversionConfig;
use crate::error::{Error, Result};
use crate::model::{AssetRegistry, ContentBlock, ConversionMetadata, SectionId, SectionTree};

use super::export::export_table;
use super::markdown::{clean_text, escape_markdown, fenced_code, render_paragraph, table_to_markdown};
use super::slug::slugify;

/// Name of the per-section and root index documents.
pub const INDEX_FILE: &str = "index.md";

/// Name of the metadata document.
pub const METADATA_FILE: &str = "metadata.json";

/// Title of the root index when the document has none.
const ROOT_TITLE: &str = "Document Index";

/// Rendered files keyed by path relative to the output root (`/`-separated).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputTree {
    files: BTreeMap<String, Vec<u8>>,
}

impl OutputTree {
    fn insert(&mut self, path: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), data.into());
    }

    /// Relative paths in sorted order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    /// File content as UTF-8 text, if it is text.
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Write every file below `root`, creating directories as needed.
    ///
    /// Existing files with the same names are overwritten; nothing else in
    /// `root` is touched.
    pub fn write(&self, root: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(root).map_err(|e| Error::output_write(root, e))?;

        let mut written = Vec::with_capacity(self.files.len());
        for (relative, data) in &self.files {
            let path = relative
                .split('/')
                .fold(root.to_path_buf(), |acc, part| acc.join(part));
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| Error::output_write(parent, e))?;
            }
            fs::write(&path, data).map_err(|e| Error::output_write(&path, e))?;
            written.push(path);
        }

        log::info!("Wrote {} files to {}", written.len(), root.display());
        Ok(written)
    }
}

/// Renders the section tree into the persisted directory layout.
#[derive(Debug, Clone)]
pub struct TreeAssembler<'a> {
    config: &'a ConversionConfig,
}

impl<'a> TreeAssembler<'a> {
    pub fn new(config: &'a ConversionConfig) -> Self {
        Self { config }
    }

    /// Relative index file of every section, indexed by `SectionId.0`.
    ///
    /// Folder mode nests `NN_slug/index.md` directories; flat mode puts
    /// `<index path joined by '-'>_<slug>.md` files in the root.
    pub fn section_paths(&self, tree: &SectionTree) -> Vec<String> {
        let mut paths = vec![INDEX_FILE.to_string(); tree.len() + 1];
        let mut dirs = vec![String::new(); tree.len() + 1];

        for id in tree.depth_first() {
            let Some(section) = tree.get(id) else {
                continue;
            };
            let slug = slugify(&section.title);

            if self.config.create_folder_structure {
                let name = format!("{:02}_{}", tree.sibling_index(id), slug);
                let parent_dir = section.parent.map(|p| dirs[p.0].as_str()).unwrap_or("");
                let dir = if parent_dir.is_empty() {
                    name
                } else {
                    format!("{}/{}", parent_dir, name)
                };
                paths[id.0] = format!("{}/{}", dir, INDEX_FILE);
                dirs[id.0] = dir;
            } else {
                let prefix = tree
                    .index_path(id)
                    .iter()
                    .map(|i| format!("{:02}", i))
                    .collect::<Vec<_>>()
                    .join("-");
                paths[id.0] = format!("{}_{}.md", prefix, slug);
            }
        }
        paths
    }

    /// Render the whole output tree.
    pub fn assemble(
        &self,
        tree: &SectionTree,
        registry: &AssetRegistry,
        metadata: &ConversionMetadata,
    ) -> Result<OutputTree> {
        let mut output = OutputTree::default();
        let paths = self.section_paths(tree);

        for id in tree.depth_first() {
            let doc = self.render_section(tree, registry, &paths, id);
            output.insert(paths[id.0].clone(), doc);
        }
        output.insert(INDEX_FILE, self.render_root(tree, registry, metadata, &paths));

        for image in registry.images() {
            output.insert(image.path.clone(), image.data.clone());
        }
        for table in registry.tables() {
            for format in &table.formats {
                output.insert(table.path(*format), export_table(&table.grid, *format)?);
            }
        }
        for code in registry.code_blocks() {
            let mut text = code.code.trim_end_matches('\n').to_string();
            text.push('\n');
            output.insert(code.path.clone(), text);
        }

        let mut json = metadata.to_json()?;
        json.push('\n');
        output.insert(METADATA_FILE, json);

        log::debug!("Assembled {} output files", output.len());
        Ok(output)
    }

    fn render_section(
        &self,
        tree: &SectionTree,
        registry: &AssetRegistry,
        paths: &[String],
        id: SectionId,
    ) -> String {
        let Some(section) = tree.get(id) else {
            return String::new();
        };
        let from = &paths[id.0];

        let mut doc = format!("# {}\n\n", escape_markdown(&clean_text(&section.title)));
        for block in &section.content {
            if let Some(rendered) = self.render_block(block, registry, from) {
                doc.push_str(&rendered);
                doc.push_str("\n\n");
            }
        }

        if !section.children.is_empty() {
            doc.push_str("## Subsections\n\n");
            for child in &section.children {
                if let Some(c) = tree.get(*child) {
                    doc.push_str(&format!(
                        "- [{}]({})\n",
                        escape_markdown(&clean_text(&c.title)),
                        relative_link(from, &paths[child.0])
                    ));
                }
            }
            doc.push('\n');
        }

        finish(doc)
    }

    fn render_block(&self, block: &ContentBlock, registry: &AssetRegistry, from: &str) -> Option<String> {
        match block {
            ContentBlock::Paragraph(text) => {
                let rendered = render_paragraph(text, self.config.max_line_length);
                (!rendered.is_empty()).then_some(rendered)
            }
            ContentBlock::ImageRef(id) => {
                let image = registry.image(*id)?;
                Some(format!(
                    "![{}]({})",
                    file_stem(&image.path),
                    relative_link(from, &image.path)
                ))
            }
            ContentBlock::TableRef(id) => {
                let table = registry.table(*id)?;
                let links: Vec<String> = table
                    .formats
                    .iter()
                    .map(|f| format!("[{}]({})", f, relative_link(from, &table.path(*f))))
                    .collect();
                Some(format!(
                    "{}\n*Table exports: {}*",
                    table_to_markdown(&table.grid),
                    links.join(", ")
                ))
            }
            ContentBlock::CodeRef(id) => {
                let code = registry.code(*id)?;
                Some(format!(
                    "{}\n\n[{}]({})",
                    fenced_code(&code.code, &code.language),
                    file_name(&code.path),
                    relative_link(from, &code.path)
                ))
            }
        }
    }

    fn render_root(
        &self,
        tree: &SectionTree,
        registry: &AssetRegistry,
        metadata: &ConversionMetadata,
        paths: &[String],
    ) -> String {
        let info = &metadata.document;
        let mut doc = info.to_yaml_frontmatter();
        doc.push('\n');

        let title = info
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(ROOT_TITLE);
        doc.push_str(&format!("# {}\n\n", escape_markdown(&clean_text(title))));

        for block in &tree.root().content {
            if let Some(rendered) = self.render_block(block, registry, INDEX_FILE) {
                doc.push_str(&rendered);
                doc.push_str("\n\n");
            }
        }

        if self.config.generate_toc {
            doc.push_str("## Table of Contents\n\n");
            for id in tree.depth_first() {
                let depth = tree.index_path(id).len();
                if let Some(section) = tree.get(id) {
                    doc.push_str(&format!(
                        "{}- [{}]({})\n",
                        "  ".repeat(depth.saturating_sub(1)),
                        escape_markdown(&clean_text(&section.title)),
                        paths[id.0]
                    ));
                }
            }
        } else {
            doc.push_str("## Sections\n\n");
            for id in &tree.root().children {
                if let Some(section) = tree.get(*id) {
                    doc.push_str(&format!(
                        "- [{}]({})\n",
                        escape_markdown(&clean_text(&section.title)),
                        paths[id.0]
                    ));
                }
            }
        }
        doc.push('\n');

        doc.push_str("## Document Statistics\n\n");
        doc.push_str(&format!("- Sections: {}\n", tree.len()));
        doc.push_str(&format!("- Pages: {}\n", metadata.pages));
        doc.push_str(&format!("- Images: {}\n", registry.images().len()));
        doc.push_str(&format!("- Tables: {}\n", registry.tables().len()));
        doc.push_str(&format!("- Code blocks: {}\n", registry.code_blocks().len()));

        finish(doc)
    }
}

/// Exactly one trailing newline.
fn finish(doc: String) -> String {
    let mut doc = doc.trim_end().to_string();
    doc.push('\n');
    doc
}

/// Link from the document at `from` to `target`, both root-relative.
fn relative_link(from: &str, target: &str) -> String {
    let from_dir: Vec<&str> = match from.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };
    let target_parts: Vec<&str> = target.split('/').collect();

    let common = from_dir
        .iter()
        .zip(&target_parts)
        .take_while(|(a, b)| a == b)
        .count()
        .min(target_parts.len().saturating_sub(1));

    let mut parts: Vec<&str> = vec![".."; from_dir.len() - common];
    parts.extend_from_slice(&target_parts[common..]);
    parts.join("/")
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn file_stem(path: &str) -> &str {
    let name = file_name(path);
    name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name)
}

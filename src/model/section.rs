//! The outline tree.
//!
//! Sections live in an arena owned by [`SectionTree`]. Ownership flows from
//! parent to child through `children` index lists; `parent` is a lookup-only
//! back-reference. Sections are only ever appended, so arena order is the
//! document order of their headings.

use serde::{Deserialize, Serialize};

use super::{CodeId, ImageId, TableId};

/// Index of a section inside its [`SectionTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SectionId(pub usize);

impl SectionId {
    /// The synthetic document root.
    pub const ROOT: SectionId = SectionId(0);
}

/// One classified unit of content owned by a section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Prose
    Paragraph(String),
    /// Reference to a (possibly shared) image asset
    ImageRef(ImageId),
    /// Reference to an extracted table asset
    TableRef(TableId),
    /// Reference to a detected code block asset
    CodeRef(CodeId),
}

/// A node of the outline tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: SectionId,
    /// Heading text (empty for the root)
    pub title: String,
    /// Depth: 0 for the root, 1..=max depth otherwise
    pub level: u8,
    /// Back-reference to the parent (None for the root)
    pub parent: Option<SectionId>,
    /// Child sections in document order
    pub children: Vec<SectionId>,
    /// Content blocks in document order
    pub content: Vec<ContentBlock>,
    /// Numbering label of the heading, e.g. "2.1" or "Chapter 3"
    pub numbering: Option<String>,
    /// Page the heading was found on
    pub page: Option<u32>,
}

impl Section {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Arena-backed outline tree with a single synthetic root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionTree {
    sections: Vec<Section>,
}

impl SectionTree {
    /// Create a tree holding only the root.
    pub fn new() -> Self {
        Self {
            sections: vec![Section {
                id: SectionId::ROOT,
                title: String::new(),
                level: 0,
                parent: None,
                children: Vec::new(),
                content: Vec::new(),
                numbering: None,
                page: None,
            }],
        }
    }

    pub fn root(&self) -> &Section {
        &self.sections[0]
    }

    pub fn get(&self, id: SectionId) -> Option<&Section> {
        self.sections.get(id.0)
    }

    /// Open a new section under `parent`.
    ///
    /// The level must be deeper than the parent's.
    pub fn add_section(
        &mut self,
        parent: SectionId,
        title: impl Into<String>,
        level: u8,
        numbering: Option<String>,
        page: Option<u32>,
    ) -> SectionId {
        debug_assert!(level > self.sections[parent.0].level);
        let id = SectionId(self.sections.len());
        self.sections.push(Section {
            id,
            title: title.into(),
            level,
            parent: Some(parent),
            children: Vec::new(),
            content: Vec::new(),
            numbering,
            page,
        });
        self.sections[parent.0].children.push(id);
        id
    }

    /// Append a content block to a section.
    pub fn push_content(&mut self, id: SectionId, block: ContentBlock) {
        self.sections[id.0].content.push(block);
    }

    /// Number of sections, excluding the root.
    pub fn len(&self) -> usize {
        self.sections.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All sections including the root, in document order.
    pub fn iter(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter()
    }

    /// Non-root sections in depth-first pre-order.
    ///
    /// Since sections are appended in heading order this equals arena order,
    /// but the walk follows the child lists so it never depends on that.
    pub fn depth_first(&self) -> Vec<SectionId> {
        let mut out = Vec::with_capacity(self.len());
        let mut stack: Vec<SectionId> = self.root().children.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.sections[id.0].children.iter().rev().copied());
        }
        out
    }

    /// 1-based position of a section among its siblings.
    pub fn sibling_index(&self, id: SectionId) -> usize {
        match self.sections[id.0].parent {
            Some(parent) => {
                self.sections[parent.0]
                    .children
                    .iter()
                    .position(|c| *c == id)
                    .unwrap_or(0)
                    + 1
            }
            None => 0,
        }
    }

    /// Sibling indices from the top level down to `id`.
    pub fn index_path(&self, id: SectionId) -> Vec<usize> {
        let mut path = Vec::new();
        let mut current = id;
        while let Some(parent) = self.sections[current.0].parent {
            path.push(self.sibling_index(current));
            current = parent;
        }
        path.reverse();
        path
    }

    /// Deepest level in use (0 for a root-only tree).
    pub fn max_level(&self) -> u8 {
        self.sections.iter().map(|s| s.level).max().unwrap_or(0)
    }

    /// Nested summary of the tree for reporting.
    pub fn outline(&self) -> Vec<OutlineEntry> {
        self.root()
            .children
            .iter()
            .map(|id| self.outline_entry(*id))
            .collect()
    }

    fn outline_entry(&self, id: SectionId) -> OutlineEntry {
        let section = &self.sections[id.0];
        OutlineEntry {
            title: section.title.clone(),
            level: section.level,
            numbering: section.numbering.clone(),
            page: section.page,
            blocks: section.content.len(),
            children: section
                .children
                .iter()
                .map(|c| self.outline_entry(*c))
                .collect(),
        }
    }
}

impl Default for SectionTree {
    fn default() -> Self {
        Self::new()
    }
}

/// A section as it appears in the conversion metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineEntry {
    pub title: String,
    pub level: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numbering: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Number of content blocks
    pub blocks: usize,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub children: Vec<OutlineEntry>,
}

impl OutlineEntry {
    /// Total number of entries, including nested ones.
    pub fn total(&self) -> usize {
        1 + self.children.iter().map(|c| c.total()).sum::<usize>()
    }
}

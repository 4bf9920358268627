//! Heading detection and outline tree construction.

use crate::config::ConversionConfig;
use crate::model::{DocumentInfo, Fragment, Notice, SectionId, SectionTree, Span};

use super::fonts::FontStatistics;
use super::numbering::{detect_numbering, Numbering};

/// Title of the flat section used when no headings are found.
pub const FALLBACK_TITLE: &str = "Document";

/// A span recognized as a heading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub level: u8,
    pub numbering: Option<Numbering>,
}

/// The section tree plus the fragments waiting to be classified.
#[derive(Debug)]
pub struct Outline {
    pub tree: SectionTree,
    /// Non-heading fragments per section, indexed by `SectionId.0`
    pub pending: Vec<Vec<Fragment>>,
    /// Notices raised while building
    pub notices: Vec<Notice>,
}

impl Outline {
    /// Fragments waiting for classification in one section.
    pub fn pending(&self, id: SectionId) -> &[Fragment] {
        self.pending.get(id.0).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

/// Infers the section tree from font and numbering signals.
#[derive(Debug, Clone)]
pub struct HierarchyBuilder<'a> {
    stats: &'a FontStatistics,
    max_depth: u8,
    max_heading_length: usize,
}

impl<'a> HierarchyBuilder<'a> {
    /// Create a builder over precomputed font statistics.
    pub fn new(stats: &'a FontStatistics, config: &ConversionConfig) -> Self {
        Self {
            stats,
            max_depth: config.max_hierarchy_depth.max(1),
            max_heading_length: config.max_heading_length,
        }
    }

    /// Decide whether a span is a heading, and at which level.
    ///
    /// Candidates sit in one of the top `max_depth` size buckets above body
    /// text and are bold or numbered. Body-sized bold text qualifies only
    /// with multi-level ("2.1") or named ("Chapter 2") numbering. Dotted and
    /// named numbering depth overrides the size rank; roman and letter
    /// labels keep the rank.
    pub fn heading(&self, span: &Span) -> Option<Heading> {
        let text = span.text.trim();
        if text.is_empty()
            || text.chars().count() > self.max_heading_length
            || !text.chars().any(|c| c.is_alphanumeric())
        {
            return None;
        }

        let numbering = detect_numbering(text);
        let rank = self.stats.size_rank(span.font_size);

        let candidate = match rank {
            Some(r) if r <= self.max_depth as usize => span.bold || numbering.is_some(),
            Some(_) => false,
            None => {
                span.bold
                    && self.stats.is_body_size(span.font_size)
                    && numbering.as_ref().is_some_and(Numbering::promotes_body_text)
            }
        };
        if !candidate {
            return None;
        }

        let level = match (&numbering, rank) {
            (Some(n), _) if n.fixes_depth() => n.depth as usize,
            (_, Some(r)) => r,
            (_, None) => return None,
        };
        let level = level.clamp(1, self.max_depth as usize) as u8;

        Some(Heading { level, numbering })
    }

    /// Build the outline from the ordered fragment stream.
    pub fn build(&self, fragments: Vec<Fragment>, info: &DocumentInfo) -> Outline {
        let mut tree = SectionTree::new();
        let mut pending: Vec<Vec<Fragment>> = vec![Vec::new()];
        let mut notices = Vec::new();
        // Open sections with their levels, shallowest first
        let mut stack: Vec<(SectionId, u8)> = Vec::new();

        for fragment in fragments {
            let heading = match &fragment {
                Fragment::Span(span) => self.heading(span).map(|h| (h, span)),
                Fragment::Region(_) => None,
            };

            if let Some((heading, span)) = heading {
                while stack.last().is_some_and(|(_, l)| *l >= heading.level) {
                    stack.pop();
                }
                let parent = stack.last().map(|(id, _)| *id).unwrap_or(SectionId::ROOT);
                let id = tree.add_section(
                    parent,
                    span.text.trim(),
                    heading.level,
                    heading.numbering.map(|n| n.label),
                    Some(span.page),
                );
                log::debug!(
                    "Heading L{} on page {}: {:?} (parent {:?})",
                    heading.level,
                    span.page,
                    span.text,
                    parent
                );
                stack.push((id, heading.level));
                pending.push(Vec::new());
                continue;
            }

            let target = stack.last().map(|(id, _)| *id).unwrap_or(SectionId::ROOT);
            pending[target.0].push(fragment);
        }

        if tree.is_empty() {
            let title = info
                .title
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or(FALLBACK_TITLE);
            let id = tree.add_section(SectionId::ROOT, title, 1, None, None);
            let content = std::mem::take(&mut pending[0]);
            pending.push(content);
            debug_assert_eq!(pending.len(), id.0 + 1);
            notices.push(Notice::HierarchyAmbiguity {
                reason: "no headings detected; content placed in a single section".to_string(),
            });
        }

        log::info!(
            "Built outline: {} sections, max depth {}",
            tree.len(),
            tree.max_level()
        );

        Outline {
            tree,
            pending,
            notices,
        }
    }
}

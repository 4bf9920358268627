//! Document-wide font statistics.
//!
//! Computed once over the whole span stream and handed to the hierarchy
//! builder as an immutable value.

use std::collections::BTreeMap;

use crate::model::Span;

/// Fallback body size for documents without text.
const DEFAULT_BODY_SIZE: f32 = 12.0;

/// Font size histogram with body and heading size ranks.
///
/// Sizes are bucketed to half points and weighted by visible characters, so
/// a long paragraph outweighs a short heading.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FontStatistics {
    /// Body text font size (most common)
    pub body_size: f32,
    /// Sizes larger than body, largest first (rank 1 = index 0)
    pub heading_sizes: Vec<f32>,
    /// Visible characters per half-point bucket
    pub size_histogram: BTreeMap<i32, usize>,
}

impl FontStatistics {
    /// Collect statistics over spans.
    pub fn from_spans<'a>(spans: impl IntoIterator<Item = &'a Span>) -> Self {
        let mut stats = Self::default();
        for span in spans {
            stats.add_size(span.font_size, span.visible_chars());
        }
        stats.analyze();
        stats
    }

    /// Add a font size observation.
    pub fn add_size(&mut self, size: f32, chars: usize) {
        if !size.is_finite() || size <= 0.0 || chars == 0 {
            return;
        }
        *self.size_histogram.entry(bucket(size)).or_insert(0) += chars;
    }

    /// Calculate body size and heading sizes.
    pub fn analyze(&mut self) {
        // Ascending iteration keeps the smaller size on count ties
        let mut body: Option<(i32, usize)> = None;
        for (&key, &count) in &self.size_histogram {
            if body.map_or(true, |(_, best)| count > best) {
                body = Some((key, count));
            }
        }

        let Some((body_key, _)) = body else {
            self.body_size = DEFAULT_BODY_SIZE;
            self.heading_sizes.clear();
            return;
        };
        self.body_size = unbucket(body_key);

        self.heading_sizes = self
            .size_histogram
            .keys()
            .rev()
            .filter(|k| **k > body_key)
            .map(|k| unbucket(*k))
            .collect();
    }

    /// 1-based rank of a size among heading sizes (None for body-sized or smaller).
    pub fn size_rank(&self, size: f32) -> Option<usize> {
        let key = bucket(size);
        self.heading_sizes
            .iter()
            .position(|s| bucket(*s) == key)
            .map(|i| i + 1)
    }

    /// Whether a size is at (or within half a point of) the body size.
    pub fn is_body_size(&self, size: f32) -> bool {
        bucket(size) == bucket(self.body_size)
    }
}

fn bucket(size: f32) -> i32 {
    (size * 2.0).round() as i32
}

fn unbucket(key: i32) -> f32 {
    key as f32 / 2.0
}

//! Page geometry.

use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in PDF points, origin at the top-left of the page.
///
/// `y` grows downwards so that sorting by `(y0, x0)` yields reading order.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BBox {
    /// Left edge
    pub x0: f32,
    /// Top edge
    pub y0: f32,
    /// Right edge
    pub x1: f32,
    /// Bottom edge
    pub y1: f32,
}

impl BBox {
    /// Create a bounding box, normalizing swapped corners.
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Vertical center, used as the baseline proxy when grouping lines.
    pub fn center_y(&self) -> f32 {
        (self.y0 + self.y1) / 2.0
    }

    /// Area shared with another box (0 when disjoint).
    pub fn intersection_area(&self, other: &BBox) -> f32 {
        let w = self.x1.min(other.x1) - self.x0.max(other.x0);
        let h = self.y1.min(other.y1) - self.y0.max(other.y0);
        if w <= 0.0 || h <= 0.0 {
            0.0
        } else {
            w * h
        }
    }

    /// Fraction of this box covered by `other`.
    ///
    /// Degenerate (zero-area) boxes count as covered when their top-left
    /// corner lies inside `other`.
    pub fn coverage_by(&self, other: &BBox) -> f32 {
        let area = self.area();
        if area <= f32::EPSILON {
            return if other.contains_point(self.x0, self.y0) {
                1.0
            } else {
                0.0
            };
        }
        self.intersection_area(other) / area
    }

    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.y0 && y <= self.y1
    }

    /// Smallest box enclosing both.
    pub fn union(&self, other: &BBox) -> BBox {
        BBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Multiply every coordinate by `factor`.
    pub fn scale(&self, factor: f32) -> BBox {
        BBox {
            x0: self.x0 * factor,
            y0: self.y0 * factor,
            x1: self.x1 * factor,
            y1: self.y1 * factor,
        }
    }
}

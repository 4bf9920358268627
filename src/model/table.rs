//! Table grids.

use serde::{Deserialize, Serialize};

/// A rectangular grid of cell texts. The first row is treated as the header.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableGrid {
    rows: Vec<Vec<String>>,
}

impl TableGrid {
    /// Build a grid, padding ragged rows with empty cells.
    pub fn from_rows(rows: Vec<Vec<String>>) -> Self {
        let width = rows.iter().map(|r| r.len()).max().unwrap_or(0);
        let rows = rows
            .into_iter()
            .map(|mut r| {
                r.resize(width, String::new());
                r
            })
            .collect();
        Self { rows }
    }

    /// Normalize cell text and drop rows and columns that are entirely empty.
    ///
    /// Cell whitespace (including line breaks) collapses to single spaces.
    pub fn clean(self) -> Self {
        let rows: Vec<Vec<String>> = self
            .rows
            .into_iter()
            .map(|r| r.iter().map(|c| clean_cell(c)).collect::<Vec<_>>())
            .filter(|r| r.iter().any(|c| !c.is_empty()))
            .collect();

        let width = rows.first().map(|r| r.len()).unwrap_or(0);
        let keep: Vec<bool> = (0..width)
            .map(|col| rows.iter().any(|r| !r[col].is_empty()))
            .collect();

        let rows = rows
            .into_iter()
            .map(|r| {
                r.into_iter()
                    .zip(keep.iter())
                    .filter_map(|(cell, keep)| keep.then_some(cell))
                    .collect()
            })
            .collect();
        Self { rows }
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.rows.first().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.column_count() == 0
    }

    /// Header row, if any.
    pub fn header(&self) -> Option<&[String]> {
        self.rows.first().map(|r| r.as_slice())
    }

    /// Rows after the header.
    pub fn body(&self) -> &[Vec<String>] {
        if self.rows.is_empty() {
            &[]
        } else {
            &self.rows[1..]
        }
    }

    /// Ratio of non-empty cells to all cells (0 for an empty grid).
    pub fn fill_ratio(&self) -> f32 {
        let total = self.row_count() * self.column_count();
        if total == 0 {
            return 0.0;
        }
        let filled = self.rows.iter().flatten().filter(|c| !c.is_empty()).count();
        filled as f32 / total as f32
    }

    /// Row-per-line text rendering used when a table cannot be accepted.
    pub fn plain_text(&self) -> String {
        self.rows
            .iter()
            .map(|r| {
                r.iter()
                    .filter(|c| !c.is_empty())
                    .map(|c| c.as_str())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn clean_cell(cell: &str) -> String {
    cell.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&[&str]]) -> TableGrid {
        TableGrid::from_rows(
            rows.iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    #[test]
    fn test_ragged_rows_are_padded() {
        let g = grid(&[&["a", "b", "c"], &["d"]]);
        assert_eq!(g.column_count(), 3);
        assert_eq!(g.rows()[1], vec!["d", "", ""]);
    }

    #[test]
    fn test_clean_drops_empty_rows_and_columns() {
        let g = grid(&[
            &["Name", "", "Age"],
            &["  ", "", " "],
            &["Alice\n Smith", "", "30"],
        ])
        .clean();
        assert_eq!(g.row_count(), 2);
        assert_eq!(g.column_count(), 2);
        assert_eq!(g.rows()[1], vec!["Alice Smith", "30"]);
    }

    #[test]
    fn test_fill_ratio() {
        let g = grid(&[&["a", "b"], &["c", ""]]);
        assert!((g.fill_ratio() - 0.75).abs() < 1e-6);
        assert_eq!(TableGrid::default().fill_ratio(), 0.0);
    }

    #[test]
    fn test_header_and_body() {
        let g = grid(&[&["h1", "h2"], &["a", "b"], &["c", "d"]]);
        assert_eq!(g.header().unwrap(), &["h1".to_string(), "h2".to_string()]);
        assert_eq!(g.body().len(), 2);
        assert_eq!(g.plain_text(), "h1 h2\na b\nc d");
    }
}

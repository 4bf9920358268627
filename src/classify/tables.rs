//! Table extraction strategies and the coordinator that picks between them.
//!
//! Each strategy turns a table region into a cell grid or fails. The
//! coordinator runs them in priority order and accepts the first grid that
//! clears the quality bar (row count, column count, fill ratio).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::config::{ConversionConfig, TableMethod};
use crate::error::{Error, Result};
use crate::model::{BBox, Span, TableGrid};

/// Everything a strategy may look at for one table region.
#[derive(Debug, Clone, Copy)]
pub struct TableInput<'a> {
    /// 1-based page number
    pub page: u32,
    /// Index of the table among the page's table regions
    pub index: usize,
    /// Region bounds
    pub bbox: BBox,
    /// Cell grid supplied by the extraction backend, if any
    pub cells: Option<&'a [Vec<String>]>,
    /// Positioned text lying inside the region
    pub spans: &'a [Span],
}

/// A pluggable table-extraction method.
pub trait TableStrategy: Send + Sync {
    /// Name used in configuration and metadata.
    fn name(&self) -> &str;

    /// Produce a cell grid for the region, or fail.
    fn extract(&self, input: &TableInput<'_>) -> Result<TableGrid>;
}

/// Uses the grid the extraction backend already recognized.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackendTableStrategy;

impl TableStrategy for BackendTableStrategy {
    fn name(&self) -> &str {
        "backend"
    }

    fn extract(&self, input: &TableInput<'_>) -> Result<TableGrid> {
        match input.cells {
            Some(cells) if !cells.is_empty() => Ok(TableGrid::from_rows(cells.to_vec())),
            _ => Err(Error::TableExtraction(
                "backend supplied no cell grid".to_string(),
            )),
        }
    }
}

/// Stream strategy configuration.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Y tolerance for grouping spans into rows (fraction of font size)
    pub y_tolerance_factor: f32,
    /// Left edges within this many points share a bucket
    pub bucket_size: f32,
    /// Minimum share of rows a column edge must appear in
    pub min_alignment_ratio: f32,
    /// Minimum gap between columns (points)
    pub min_column_gap: f32,
    /// Spans may start this far left of their column edge
    pub column_tolerance: f32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            y_tolerance_factor: 0.4,
            bucket_size: 5.0,
            min_alignment_ratio: 0.3,
            min_column_gap: 15.0,
            column_tolerance: 10.0,
        }
    }
}

/// Rebuilds a grid from text positions alone, without ruling lines.
///
/// Rows come from vertical grouping; columns from left edges that line up
/// across rows.
#[derive(Debug, Clone, Default)]
pub struct StreamTableStrategy {
    config: StreamConfig,
}

impl StreamTableStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: StreamConfig) -> Self {
        Self { config }
    }

    /// Group spans into rows by Y position.
    fn group_into_rows<'a>(&self, spans: &'a [Span]) -> Vec<Vec<&'a Span>> {
        let mut sorted: Vec<&Span> = spans.iter().collect();
        sorted.sort_by(|a, b| {
            a.bbox
                .center_y()
                .partial_cmp(&b.bbox.center_y())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    a.bbox
                        .x0
                        .partial_cmp(&b.bbox.x0)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
        });

        let mut rows: Vec<Vec<&Span>> = Vec::new();
        let mut current_y: Option<f32> = None;
        for span in sorted {
            let tolerance = span.font_size * self.config.y_tolerance_factor;
            match (current_y, rows.last_mut()) {
                (Some(y), Some(row)) if (span.bbox.center_y() - y).abs() <= tolerance => {
                    row.push(span)
                }
                _ => {
                    current_y = Some(span.bbox.center_y());
                    rows.push(vec![span]);
                }
            }
        }
        for row in &mut rows {
            row.sort_by(|a, b| {
                a.bbox
                    .x0
                    .partial_cmp(&b.bbox.x0)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }
        rows
    }

    /// Detect column left edges that align across rows.
    fn detect_columns(&self, rows: &[Vec<&Span>]) -> Vec<f32> {
        // Prefer rows with several cells; they carry the column structure
        let multi: Vec<&Vec<&Span>> = rows.iter().filter(|r| r.len() >= 2).collect();
        let basis: Vec<&Vec<&Span>> = if multi.len() >= 2 {
            multi
        } else {
            rows.iter().collect()
        };

        let mut edge_counts: HashMap<i32, usize> = HashMap::new();
        for row in &basis {
            // Count each bucket once per row
            let buckets: HashSet<i32> = row
                .iter()
                .map(|s| (s.bbox.x0 / self.config.bucket_size).round() as i32)
                .collect();
            for bucket in buckets {
                *edge_counts.entry(bucket).or_insert(0) += 1;
            }
        }

        let min_occurrences =
            ((basis.len() as f32 * self.config.min_alignment_ratio) as usize).max(2);

        let mut edges: Vec<f32> = edge_counts
            .iter()
            .filter(|(_, count)| **count >= min_occurrences)
            .map(|(bucket, _)| *bucket as f32 * self.config.bucket_size)
            .collect();
        edges.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let mut merged: Vec<f32> = Vec::new();
        for edge in edges {
            match merged.last() {
                Some(last) if edge - last < self.config.min_column_gap => {}
                _ => merged.push(edge),
            }
        }
        merged
    }

    /// Find which column a span belongs to based on its left edge.
    fn find_column(&self, x: f32, columns: &[f32]) -> usize {
        let tol = self.config.column_tolerance;
        for (i, &start) in columns.iter().enumerate() {
            let end = columns.get(i + 1).copied().unwrap_or(f32::INFINITY);
            if x >= start - tol && x < end - tol {
                return i;
            }
        }

        columns
            .iter()
            .enumerate()
            .min_by(|a, b| {
                (x - a.1)
                    .abs()
                    .partial_cmp(&(x - b.1).abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    /// Rows whose first cell is a bullet or number marker make a list, not a table.
    fn is_list_pattern(&self, rows: &[Vec<&Span>], columns: &[f32]) -> bool {
        if rows.is_empty() {
            return false;
        }
        let mut bullets = 0;
        let mut numbers = 0;
        for row in rows {
            if let Some(first) = row.first() {
                let text = first.text.trim();
                if is_bullet_marker(text) {
                    bullets += 1;
                } else if is_number_marker(text) {
                    numbers += 1;
                }
            }
        }
        let bullet_ratio = bullets as f32 / rows.len() as f32;
        let total_ratio = (bullets + numbers) as f32 / rows.len() as f32;
        bullet_ratio >= 0.5 || (columns.len() == 2 && total_ratio >= 0.5)
    }
}

impl TableStrategy for StreamTableStrategy {
    fn name(&self) -> &str {
        "stream"
    }

    fn extract(&self, input: &TableInput<'_>) -> Result<TableGrid> {
        let rows = self.group_into_rows(input.spans);
        if rows.is_empty() {
            return Err(Error::TableExtraction("no text inside region".to_string()));
        }

        let columns = self.detect_columns(&rows);
        log::debug!(
            "Stream table on page {}: {} rows, columns at {:?}",
            input.page,
            rows.len(),
            columns
        );
        if columns.is_empty() {
            return Err(Error::TableExtraction("no aligned columns".to_string()));
        }
        if self.is_list_pattern(&rows, &columns) {
            return Err(Error::TableExtraction("region looks like a list".to_string()));
        }

        let grid = rows
            .iter()
            .map(|row| {
                let mut cells: Vec<Vec<&str>> = vec![Vec::new(); columns.len()];
                for span in row {
                    let col = self.find_column(span.bbox.x0, &columns);
                    cells[col].push(span.text.trim());
                }
                cells.into_iter().map(|c| c.join(" ")).collect()
            })
            .collect();
        Ok(TableGrid::from_rows(grid))
    }
}

/// Check if text is a bullet marker.
fn is_bullet_marker(text: &str) -> bool {
    matches!(
        text.trim(),
        "-" | "–" | "—" | "•" | "·" | "*" | "○" | "▪" | "◦" | "▸" | "►" | "■" | "●" | "□" | "◆" | "◇" | "▶" | "➤"
    )
}

/// Check if text is a number-style list marker ("1.", "2)", "a.").
fn is_number_marker(text: &str) -> bool {
    let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let Some(last) = cleaned.chars().last() else {
        return false;
    };
    if last != '.' && last != ')' {
        return false;
    }
    let body = &cleaned[..cleaned.len() - 1];
    (!body.is_empty() && body.chars().all(|c| c.is_ascii_digit()))
        || (body.chars().count() == 1 && body.chars().all(|c| c.is_ascii_lowercase()))
}

/// Result of coordinating strategies over one region.
#[derive(Debug, Clone, PartialEq)]
pub enum TableOutcome {
    /// A strategy cleared the quality bar
    Accepted { method: String, grid: TableGrid },
    /// Every strategy failed; carry the region's text instead
    Rejected {
        attempted: Vec<String>,
        fallback_text: String,
    },
}

/// Runs table strategies in priority order.
#[derive(Clone)]
pub struct TableCoordinator {
    strategies: Vec<Arc<dyn TableStrategy>>,
    min_rows: usize,
    min_cols: usize,
    min_fill_ratio: f32,
}

impl TableCoordinator {
    /// Built-in strategies in default priority order.
    pub fn builtin() -> Vec<Arc<dyn TableStrategy>> {
        vec![
            Arc::new(BackendTableStrategy),
            Arc::new(StreamTableStrategy::new()),
        ]
    }

    /// Select strategies according to the configured method.
    ///
    /// `registered` is tried in order under `auto`; a named method must be
    /// one of them.
    pub fn new(config: &ConversionConfig, registered: Vec<Arc<dyn TableStrategy>>) -> Result<Self> {
        let strategies = match &config.table_extraction_method {
            TableMethod::Auto => registered,
            TableMethod::Named(name) => {
                let chosen: Vec<_> = registered
                    .into_iter()
                    .filter(|s| s.name() == name.as_str())
                    .take(1)
                    .collect();
                if chosen.is_empty() {
                    return Err(Error::InvalidConfig(format!(
                        "unknown table extraction method '{}'",
                        name
                    )));
                }
                chosen
            }
        };

        Ok(Self {
            strategies,
            min_rows: config.min_table_rows,
            min_cols: config.min_table_cols,
            min_fill_ratio: config.min_table_fill_ratio,
        })
    }

    /// Names of the strategies that will run, in order.
    pub fn method_names(&self) -> Vec<String> {
        self.strategies.iter().map(|s| s.name().to_string()).collect()
    }

    /// Whether a cleaned grid clears the quality bar.
    pub fn accepts(&self, grid: &TableGrid) -> bool {
        grid.row_count() >= self.min_rows
            && grid.column_count() >= self.min_cols
            && grid.fill_ratio() >= self.min_fill_ratio
    }

    /// Try each strategy until one produces an acceptable grid.
    pub fn extract(&self, input: &TableInput<'_>) -> TableOutcome {
        let mut attempted = Vec::with_capacity(self.strategies.len());

        for strategy in &self.strategies {
            attempted.push(strategy.name().to_string());
            match strategy.extract(input) {
                Ok(grid) => {
                    let grid = grid.clean();
                    if self.accepts(&grid) {
                        log::debug!(
                            "Table {} on page {}: accepted from '{}' ({}x{})",
                            input.index,
                            input.page,
                            strategy.name(),
                            grid.row_count(),
                            grid.column_count()
                        );
                        return TableOutcome::Accepted {
                            method: strategy.name().to_string(),
                            grid,
                        };
                    }
                    log::debug!(
                        "Table {} on page {}: '{}' below quality bar ({}x{}, fill {:.2})",
                        input.index,
                        input.page,
                        strategy.name(),
                        grid.row_count(),
                        grid.column_count(),
                        grid.fill_ratio()
                    );
                }
                Err(e) => {
                    log::debug!(
                        "Table {} on page {}: '{}' failed: {}",
                        input.index,
                        input.page,
                        strategy.name(),
                        e
                    );
                }
            }
        }

        TableOutcome::Rejected {
            attempted,
            fallback_text: fallback_text(input),
        }
    }
}

/// Best-effort raw text of a region.
fn fallback_text(input: &TableInput<'_>) -> String {
    if !input.spans.is_empty() {
        return input
            .spans
            .iter()
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
    }
    input
        .cells
        .map(|cells| TableGrid::from_rows(cells.to_vec()).clean().plain_text())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedStrategy {
        name: &'static str,
        rows: Vec<Vec<&'static str>>,
    }

    impl TableStrategy for FixedStrategy {
        fn name(&self) -> &str {
            self.name
        }

        fn extract(&self, _input: &TableInput<'_>) -> Result<TableGrid> {
            Ok(TableGrid::from_rows(
                self.rows
                    .iter()
                    .map(|r| r.iter().map(|c| c.to_string()).collect())
                    .collect(),
            ))
        }
    }

    fn cell_span(text: &str, x: f32, y: f32) -> Span {
        Span::new(text, 10.0, 1, BBox::new(x, y, x + 40.0, y + 10.0))
    }

    fn input<'a>(spans: &'a [Span], cells: Option<&'a [Vec<String>]>) -> TableInput<'a> {
        TableInput {
            page: 1,
            index: 0,
            bbox: BBox::new(0.0, 0.0, 500.0, 500.0),
            cells,
            spans,
        }
    }

    #[test]
    fn test_backend_strategy() {
        let cells = vec![
            vec!["Name".to_string(), "Age".to_string()],
            vec!["Alice".to_string(), "30".to_string()],
        ];
        let grid = BackendTableStrategy
            .extract(&input(&[], Some(&cells)))
            .unwrap();
        assert_eq!(grid.row_count(), 2);
        assert!(BackendTableStrategy.extract(&input(&[], None)).is_err());
    }

    #[test]
    fn test_stream_strategy_rebuilds_grid() {
        let spans = vec![
            cell_span("Name", 100.0, 100.0),
            cell_span("Age", 200.0, 100.0),
            cell_span("City", 300.0, 100.0),
            cell_span("Alice", 100.0, 120.0),
            cell_span("30", 200.0, 120.0),
            cell_span("Paris", 300.0, 120.0),
            cell_span("Bob", 100.0, 140.0),
            cell_span("Berlin", 300.0, 140.0),
        ];
        let grid = StreamTableStrategy::new().extract(&input(&spans, None)).unwrap();
        assert_eq!(grid.column_count(), 3);
        assert_eq!(grid.row_count(), 3);
        assert_eq!(grid.rows()[0], vec!["Name", "Age", "City"]);
        assert_eq!(grid.rows()[2], vec!["Bob", "", "Berlin"]);
    }

    #[test]
    fn test_stream_strategy_rejects_lists() {
        let spans = vec![
            cell_span("•", 100.0, 100.0),
            cell_span("first item", 120.0, 100.0),
            cell_span("•", 100.0, 120.0),
            cell_span("second item", 120.0, 120.0),
            cell_span("•", 100.0, 140.0),
            cell_span("third item", 120.0, 140.0),
        ];
        assert!(StreamTableStrategy::new().extract(&input(&spans, None)).is_err());
    }

    #[test]
    fn test_number_markers() {
        assert!(is_number_marker("1."));
        assert!(is_number_marker("12)"));
        assert!(is_number_marker("a."));
        assert!(!is_number_marker("1.5"));
        assert!(!is_number_marker("Total"));
        assert!(!is_number_marker(""));
    }

    #[test]
    fn test_first_passing_method_wins() {
        let a: Arc<dyn TableStrategy> = Arc::new(FixedStrategy {
            name: "a",
            rows: vec![vec!["only one row", "x"]],
        });
        let b: Arc<dyn TableStrategy> = Arc::new(FixedStrategy {
            name: "b",
            rows: vec![vec!["h1", "h2"], vec!["v1", "v2"]],
        });
        let coordinator =
            TableCoordinator::new(&ConversionConfig::default(), vec![a, b]).unwrap();

        match coordinator.extract(&input(&[], None)) {
            TableOutcome::Accepted { method, grid } => {
                assert_eq!(method, "b");
                assert_eq!(grid.row_count(), 2);
            }
            other => panic!("expected acceptance, got {:?}", other),
        }
    }

    #[test]
    fn test_all_methods_failing_falls_back_to_text() {
        let a: Arc<dyn TableStrategy> = Arc::new(FixedStrategy {
            name: "a",
            rows: vec![vec!["one"]],
        });
        let b: Arc<dyn TableStrategy> = Arc::new(FixedStrategy {
            name: "b",
            rows: vec![vec!["x"], vec!["y"]],
        });
        let coordinator =
            TableCoordinator::new(&ConversionConfig::default(), vec![a, b]).unwrap();
        let spans = vec![cell_span("raw", 10.0, 10.0), cell_span("text", 10.0, 30.0)];

        assert_eq!(
            coordinator.extract(&input(&spans, None)),
            TableOutcome::Rejected {
                attempted: vec!["a".into(), "b".into()],
                fallback_text: "raw\ntext".into(),
            }
        );
    }

    #[test]
    fn test_fill_ratio_bar() {
        let config = ConversionConfig::default().with_table_quality(2, 2, 0.8);
        let coordinator = TableCoordinator::new(&config, TableCoordinator::builtin()).unwrap();
        let sparse = TableGrid::from_rows(vec![
            vec!["a".into(), "b".into()],
            vec!["c".into(), "".into()],
        ]);
        assert!(!coordinator.accepts(&sparse));
    }

    #[test]
    fn test_named_method() {
        let config = ConversionConfig::default().with_table_method(TableMethod::Named("stream".into()));
        let coordinator = TableCoordinator::new(&config, TableCoordinator::builtin()).unwrap();
        assert_eq!(coordinator.method_names(), vec!["stream".to_string()]);

        let config = ConversionConfig::default().with_table_method(TableMethod::Named("lattice".into()));
        assert!(matches!(
            TableCoordinator::new(&config, TableCoordinator::builtin()),
            Err(Error::InvalidConfig(_))
        ));
    }
}

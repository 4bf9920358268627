//! Table export formats.
//!
//! Every writer is a pure function of the grid, so the same grid always
//! exports to the same bytes.

use crate::config::TableFormat;
use crate::error::Result;
use crate::model::TableGrid;

use super::markdown::table_to_markdown;

/// Serialize a grid in one export format.
pub fn export_table(grid: &TableGrid, format: TableFormat) -> Result<String> {
    Ok(match format {
        TableFormat::Markdown => table_to_markdown(grid),
        TableFormat::Csv => to_csv(grid),
        TableFormat::Json => {
            let mut json = serde_json::to_string_pretty(grid.rows())?;
            json.push('\n');
            json
        }
        TableFormat::Spreadsheet => to_spreadsheet_xml(grid),
    })
}

/// RFC 4180 CSV with CRLF line endings.
pub fn to_csv(grid: &TableGrid) -> String {
    let mut out = String::new();
    for row in grid.rows() {
        let fields: Vec<String> = row.iter().map(|c| csv_field(c)).collect();
        out.push_str(&fields.join(","));
        out.push_str("\r\n");
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// SpreadsheetML 2003 workbook with a single worksheet.
pub fn to_spreadsheet_xml(grid: &TableGrid) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str("<?mso-application progid=\"Excel.Sheet\"?>\n");
    out.push_str(
        "<Workbook xmlns=\"urn:schemas-microsoft-com:office:spreadsheet\" \
         xmlns:ss=\"urn:schemas-microsoft-com:office:spreadsheet\">\n",
    );
    out.push_str(" <Worksheet ss:Name=\"Table\">\n  <Table>\n");
    for row in grid.rows() {
        out.push_str("   <Row>\n");
        for cell in row {
            out.push_str(&format!(
                "    <Cell><Data ss:Type=\"{}\">{}</Data></Cell>\n",
                cell_type(cell),
                escape_xml(cell)
            ));
        }
        out.push_str("   </Row>\n");
    }
    out.push_str("  </Table>\n </Worksheet>\n</Workbook>\n");
    out
}

fn cell_type(value: &str) -> &'static str {
    let trimmed = value.trim();
    if !trimmed.is_empty() && trimmed.parse::<f64>().is_ok_and(f64::is_finite) {
        "Number"
    } else {
        "String"
    }
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

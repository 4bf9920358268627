//! Rendering of the finished section tree into the output directory.

mod assembler;
mod export;
mod markdown;
mod slug;

pub use assembler::{OutputTree, TreeAssembler, INDEX_FILE, METADATA_FILE};
pub use export::{export_table, to_csv, to_spreadsheet_xml};
pub use markdown::{
    clean_text, escape_line_starts, escape_markdown, fenced_code, render_paragraph,
    table_to_markdown, wrap_text,
};
pub use slug::{slugify, MAX_SLUG_LEN};

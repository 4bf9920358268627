//! Markdown fragments: prose, tables and code fences.

use unicode_normalization::UnicodeNormalization;

use crate::model::TableGrid;

/// Typographic ligatures that PDF fonts often emit as single glyphs.
const LIGATURES: &[(char, &str)] = &[
    ('\u{FB00}', "ff"),
    ('\u{FB01}', "fi"),
    ('\u{FB02}', "fl"),
    ('\u{FB03}', "ffi"),
    ('\u{FB04}', "ffl"),
    ('\u{FB05}', "st"),
    ('\u{FB06}', "st"),
];

/// Normalize extracted text: NFC, ligatures expanded, Private Use Area and
/// replacement characters removed.
pub fn clean_text(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    for c in text.nfc() {
        if let Some((_, expansion)) = LIGATURES.iter().find(|(l, _)| *l == c) {
            result.push_str(expansion);
            continue;
        }
        let code = c as u32;
        let pua = (0xE000..=0xF8FF).contains(&code)
            || (0xF0000..=0xFFFFD).contains(&code)
            || (0x100000..=0x10FFFD).contains(&code);
        if pua || c == '\u{FFFD}' {
            continue;
        }
        result.push(c);
    }
    result
}

/// Escape special Markdown characters.
/// Only escape characters that could be misinterpreted as Markdown syntax.
pub fn escape_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' | '`' | '*' | '_' | '[' | ']' | '|' => {
                result.push('\\');
                result.push(c);
            }
            _ => result.push(c),
        }
    }
    result
}

/// Escape a leading block marker on every line so prose cannot turn into a
/// heading, quote, list, fence or setext underline.
pub fn escape_line_starts(text: &str) -> String {
    text.split('\n')
        .map(escape_line_start)
        .collect::<Vec<_>>()
        .join("\n")
}

fn escape_line_start(line: &str) -> String {
    let rest = line.trim_start();
    let indent = &line[..line.len() - rest.len()];
    let Some(first) = rest.chars().next() else {
        return line.to_string();
    };

    let followed_by_space = |at: usize| rest[at..].chars().next().map_or(true, char::is_whitespace);
    let marker = match first {
        '#' | '>' => true,
        '-' | '+' => followed_by_space(1) || rest.chars().all(|c| c == first),
        '=' => rest.chars().all(|c| c == '='),
        '~' => rest.starts_with("~~~"),
        _ => false,
    };
    if marker {
        return format!("{}\\{}", indent, rest);
    }

    // Ordered list items: up to nine digits then '.' or ')'
    let digits = rest.chars().take_while(char::is_ascii_digit).count();
    if (1..=9).contains(&digits) {
        let delimiter = rest[digits..].chars().next();
        if matches!(delimiter, Some('.') | Some(')')) && followed_by_space(digits + 1) {
            return format!("{}{}\\{}", indent, &rest[..digits], &rest[digits..]);
        }
    }
    line.to_string()
}

/// Greedy word wrap. Words longer than `width` get a line of their own.
pub fn wrap_text(text: &str, width: usize) -> String {
    if width == 0 {
        return text.to_string();
    }

    let mut lines: Vec<String> = Vec::new();
    for source_line in text.lines() {
        let mut current = String::new();
        let mut current_len = 0;
        for word in source_line.split_whitespace() {
            let word_len = word.chars().count();
            if current_len > 0 && current_len + 1 + word_len > width {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current.push_str(word);
            current_len += word_len;
        }
        lines.push(current);
    }
    lines.join("\n")
}

/// Render a paragraph block (paragraphs inside separated by blank lines).
pub fn render_paragraph(text: &str, max_line_length: Option<usize>) -> String {
    let paragraphs: Vec<String> = text
        .split("\n\n")
        .map(|p| escape_markdown(clean_text(p).trim()))
        .filter(|p| !p.is_empty())
        .map(|p| match max_line_length {
            Some(width) => wrap_text(&p, width),
            None => p,
        })
        .map(|p| escape_line_starts(&p))
        .collect();
    paragraphs.join("\n\n")
}

/// Render a grid as a GitHub-flavored Markdown table; the first row is
/// the header.
pub fn table_to_markdown(grid: &TableGrid) -> String {
    let mut output = String::new();
    if grid.is_empty() || grid.column_count() == 0 {
        return output;
    }

    for (i, row) in grid.rows().iter().enumerate() {
        output.push('|');
        for cell in row {
            let content = escape_cell(cell);
            output.push_str(&format!(" {} |", content.trim()));
        }
        output.push('\n');

        // Separator after header row
        if i == 0 {
            output.push('|');
            for _ in row {
                output.push_str(" --- |");
            }
            output.push('\n');
        }
    }

    output
}

fn escape_cell(cell: &str) -> String {
    clean_text(cell)
        .replace('\n', " ")
        .replace('\\', "\\\\")
        .replace('|', "\\|")
}

/// Wrap code in a fence long enough not to clash with backticks inside it.
pub fn fenced_code(code: &str, language: &str) -> String {
    let longest = code
        .split(|c| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    let fence = "`".repeat(longest.max(2) + 1);
    format!("{fence}{language}\n{}\n{fence}", code.trim_end_matches('\n'))
}

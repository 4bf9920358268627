//! Heading numbering patterns.
//!
//! Explicit numbering is the strongest structural signal a PDF carries:
//! "2.1" sits at depth 2 no matter what font it was set in.

use std::sync::OnceLock;

use regex::Regex;

/// How a numbering label is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberingKind {
    /// "2", "2.1", "1.2.3"
    Dotted,
    /// "Chapter 3", "Section 2.1", "Appendix B"
    Named,
    /// "IV." or "IV)"
    Roman,
    /// "A." or "A)"
    Letter,
}

/// A numbering label found at the start of a heading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Numbering {
    /// The label as written, e.g. "2.1" or "Chapter 3"
    pub label: String,
    /// Depth implied by the label (1 for "2", "Chapter 3"; 2 for "2.1")
    pub depth: u8,
    pub kind: NumberingKind,
}

impl Numbering {
    /// Whether the label fixes the heading level on its own.
    ///
    /// Roman and letter prefixes also start ordinary sentences ("A. Smith
    /// wrote"), so they only support a heading font and never set depth.
    pub fn fixes_depth(&self) -> bool {
        matches!(self.kind, NumberingKind::Dotted | NumberingKind::Named)
    }

    /// Whether the label is strong enough to make body-sized bold text a
    /// heading: multi-level dotted or named numbering.
    pub fn promotes_body_text(&self) -> bool {
        match self.kind {
            NumberingKind::Dotted => self.depth >= 2,
            NumberingKind::Named => true,
            NumberingKind::Roman | NumberingKind::Letter => false,
        }
    }
}

fn dotted_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{1,3}(?:\.\d{1,3})*)\.?(?:\s+|$)").expect("dotted numbering pattern")
    })
}

fn named_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^((?:chapter|section|part|appendix)\s+(\d{1,3}(?:\.\d{1,3})*|[ivxlcdm]{1,6}|[a-z]))\b[.:]?",
        )
        .expect("named numbering pattern")
    })
}

fn roman_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(M{0,3}(?:CM|CD|D?C{0,3})(?:XC|XL|L?X{0,3})(?:IX|IV|V?I{0,3}))[.)]\s+\S")
            .expect("roman numbering pattern")
    })
}

fn letter_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Z])[.)]\s+\S").expect("letter numbering pattern"))
}

/// Detect a numbering label at the start of `text`.
pub fn detect_numbering(text: &str) -> Option<Numbering> {
    let text = text.trim_start();

    if let Some(caps) = named_pattern().captures(text) {
        let depth = if caps[2].starts_with(|c: char| c.is_ascii_digit()) {
            dotted_depth(&caps[2])
        } else {
            1
        };
        return Some(Numbering {
            label: caps[1].to_string(),
            depth,
            kind: NumberingKind::Named,
        });
    }

    if let Some(caps) = dotted_pattern().captures(text) {
        let label = caps[1].to_string();
        return Some(Numbering {
            depth: dotted_depth(&label),
            label,
            kind: NumberingKind::Dotted,
        });
    }

    if let Some(caps) = roman_pattern().captures(text) {
        // The pattern also matches the empty numeral
        if !caps[1].is_empty() {
            return Some(Numbering {
                label: caps[1].to_string(),
                depth: 1,
                kind: NumberingKind::Roman,
            });
        }
    }

    letter_pattern().captures(text).map(|caps| Numbering {
        label: caps[1].to_string(),
        depth: 1,
        kind: NumberingKind::Letter,
    })
}

fn dotted_depth(label: &str) -> u8 {
    label.split('.').count().min(u8::MAX as usize) as u8
}

//! Code block detection.
//!
//! Text runs are matched against an ordered registry of language
//! signatures. The first language whose number of matching patterns reaches
//! its minimum wins.

use std::sync::OnceLock;

use regex::Regex;

use crate::config::ConversionConfig;
use crate::error::{Error, Result};

/// Matches required by built-in signatures.
const BUILTIN_MIN_MATCHES: usize = 2;

/// Matches required by user-supplied signatures.
const CUSTOM_MIN_MATCHES: usize = 1;

/// Extension for languages without a known one.
const DEFAULT_EXTENSION: &str = ".txt";

/// Built-in languages in registry order: (name, extension, patterns).
const BUILTIN_LANGUAGES: &[(&str, &str, &[&str])] = &[
    (
        "python",
        ".py",
        &[
            r"(?m)^(def|class|import|from|if __name__)",
            r"(?m)^\s*(print|return|raise|yield|async def|await)",
        ],
    ),
    (
        "javascript",
        ".js",
        &[
            r"(?m)^(function|const|let|var|class|import|export)",
            r"(=>|\$\(|document\.|console\.)",
        ],
    ),
    (
        "java",
        ".java",
        &[
            r"(?m)^(public|private|protected|class|interface|import)",
            r"(System\.out\.|public static void main)",
        ],
    ),
    (
        "c",
        ".c",
        &[r"(?m)^#include\s*<.*>", r"(int main\(|printf\(|scanf\()"],
    ),
    (
        "cpp",
        ".cpp",
        &[r"(?m)^#include\s*<.*>", r"(std::|cout|cin|using namespace)"],
    ),
    (
        "csharp",
        ".cs",
        &[
            r"(?m)^(using|namespace|public|private|class)",
            r"(Console\.|static void Main)",
        ],
    ),
    (
        "sql",
        ".sql",
        &[
            r"(?i)\b(SELECT|FROM|WHERE|INSERT|UPDATE|DELETE|CREATE|DROP)\b",
            r"(?i)\b(JOIN|GROUP BY|ORDER BY|HAVING)\b",
        ],
    ),
    (
        "bash",
        ".sh",
        &[r"(?m)^#!/bin/(bash|sh)", r"(\$\{|\$\(|echo|export|if \[)"],
    ),
    (
        "yaml",
        ".yml",
        &[r"(?m)^[a-zA-Z_-]+:\s*", r"(?m)^\s*-\s+\w+"],
    ),
    (
        "json",
        ".json",
        &[r"^\s*\{[\s\S]*\}\s*$", r#""[^"]+"\s*:\s*["{\[]"#],
    ),
    (
        "xml",
        ".xml",
        &[r"(?m)^<\?xml", r"(?m)<[a-zA-Z]+[^>]*>.*</[a-zA-Z]+>"],
    ),
    (
        "html",
        ".html",
        &[
            r"(?i)<!DOCTYPE html|<html|<head|<body",
            r"(?i)<(div|span|p|h[1-6]|table|form)",
        ],
    ),
    (
        "css",
        ".css",
        &[
            r"[.#]?[a-zA-Z-]+\s*\{[^}]*\}",
            r"(color:|background:|margin:|padding:|display:)",
        ],
    ),
    (
        "rust",
        ".rs",
        &[
            r"\b(fn|let|mut|impl|trait|struct|enum|use)\b",
            r"(println!|Vec::|Option::|Result::)",
        ],
    ),
    (
        "go",
        ".go",
        &[
            r"(?m)^(package|import|func|type|var|const)",
            r"(fmt\.|func main\(\))",
        ],
    ),
    (
        "swift",
        ".swift",
        &[
            r"\b(func|class|struct|enum|var|let|import)\b",
            r"(print\(|@objc|override func)",
        ],
    ),
    (
        "kotlin",
        ".kt",
        &[
            r"\b(fun|class|val|var|import|package)\b",
            r"(println\(|companion object)",
        ],
    ),
    (
        "ruby",
        ".rb",
        &[
            r"(?m)^(class|def|module|require|include)",
            r"(?m)(puts|gets|end$)",
        ],
    ),
    (
        "php",
        ".php",
        &[r"<\?php|\$[a-zA-Z_]", r"(echo|print|function|class)\s"],
    ),
    (
        "r",
        ".r",
        &[r"<-|->|\|>", r"\b(library|function|if|else|for|while)\s*\("],
    ),
    (
        "matlab",
        ".m",
        &[
            r"\b(function|end|if|else|for|while)\b",
            r"(plot\(|disp\(|zeros\(|ones\()",
        ],
    ),
];

/// Structural hints needed before a run set in a proportional font counts
/// as code.
const MIN_STRUCTURAL_HINTS: usize = 2;

/// Lines starting with indentation needed for the indentation hint.
const MIN_INDENTED_LINES: usize = 2;

/// Language-independent structural hints that text is source code.
///
/// Plain English words never count on their own: a control word is only a
/// hint when it is followed by a parenthesis.
fn code_hints() -> &'static [Regex] {
    static HINTS: OnceLock<Vec<Regex>> = OnceLock::new();
    HINTS.get_or_init(|| {
        [
            // Statement terminator at line end
            r"(?m);\s*$",
            // Brace pair
            r"(?s)\{.*\}",
            // Assignment or comparison operator
            r"[=!<>]=|&&|\|\||=>|:=|[-+*/]=|\w\s*=\s*[\w\x22'(\[{-]",
            // Keyword or call followed by a parenthesis
            r"\b(if|for|while|switch|catch|return|print|printf|println!?)\s*\(",
            // Definition keyword
            r"\b(def|fn|func|function|class|struct|impl)\s+\w+",
            // Comment line
            r"(?m)^\s*(//|/\*|\*/|#!|#\s)",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("valid code hint pattern"))
        .collect()
    })
}

fn indentation_pattern() -> &'static Regex {
    static INDENT: OnceLock<Regex> = OnceLock::new();
    INDENT.get_or_init(|| Regex::new(r"(?m)^(?: {2,}|\t)\S").expect("valid indentation pattern"))
}

/// Number of distinct structural hints found in `text`.
pub fn structural_hints(text: &str) -> usize {
    let mut hints = code_hints().iter().filter(|h| h.is_match(text)).count();
    if indentation_pattern().find_iter(text).count() >= MIN_INDENTED_LINES {
        hints += 1;
    }
    hints
}

/// One registry entry.
#[derive(Debug, Clone)]
pub struct LanguageSignature {
    pub name: String,
    /// File extension including the dot
    pub extension: String,
    pub min_matches: usize,
    patterns: Vec<Regex>,
}

impl LanguageSignature {
    fn compile(name: &str, extension: &str, min_matches: usize, patterns: &[&str]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| {
                    Error::InvalidConfig(format!("bad code pattern for '{}': {}", name, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            name: name.to_string(),
            extension: extension.to_string(),
            min_matches,
            patterns,
        })
    }

    /// Number of patterns found in `text`.
    pub fn score(&self, text: &str) -> usize {
        self.patterns.iter().filter(|p| p.is_match(text)).count()
    }

    pub fn matches(&self, text: &str) -> bool {
        !self.patterns.is_empty() && self.score(text) >= self.min_matches
    }
}

/// A text run recognized as code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeMatch {
    pub language: String,
    pub extension: String,
}

/// Ordered language registry plus the run-level gate.
#[derive(Debug, Clone)]
pub struct CodeDetector {
    registry: Vec<LanguageSignature>,
    min_lines: usize,
}

impl CodeDetector {
    /// Build the registry: built-ins first, custom languages appended in
    /// the order they were configured. A custom entry named like a built-in replaces that
    /// language's patterns in place.
    pub fn new(config: &ConversionConfig) -> Result<Self> {
        let mut registry = BUILTIN_LANGUAGES
            .iter()
            .map(|(name, ext, patterns)| {
                LanguageSignature::compile(name, ext, BUILTIN_MIN_MATCHES, patterns)
            })
            .collect::<Result<Vec<_>>>()?;

        for (name, patterns) in &config.custom_code_patterns {
            let patterns: Vec<&str> = patterns.iter().map(String::as_str).collect();
            match registry
                .iter()
                .position(|s| s.name.eq_ignore_ascii_case(name))
            {
                Some(i) => {
                    let builtin = &registry[i];
                    let replacement = LanguageSignature::compile(
                        &builtin.name,
                        &builtin.extension,
                        CUSTOM_MIN_MATCHES,
                        &patterns,
                    )?;
                    registry[i] = replacement;
                    log::debug!("Custom code patterns override '{}'", name);
                }
                None => registry.push(LanguageSignature::compile(
                    name,
                    DEFAULT_EXTENSION,
                    CUSTOM_MIN_MATCHES,
                    &patterns,
                )?),
            }
        }

        Ok(Self {
            registry,
            min_lines: config.min_code_lines.max(1),
        })
    }

    /// Language names in registry order.
    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.registry.iter().map(|s| s.name.as_str())
    }

    /// First signature matching `text`, scanning registry order.
    pub fn detect_language(&self, text: &str) -> Option<&LanguageSignature> {
        self.registry.iter().find(|s| s.matches(text))
    }

    /// Classify a text run (lines joined by `\n`).
    ///
    /// Runs shorter than the minimum line count are never code. Runs not
    /// set in a monospace font also need two structural hints.
    pub fn detect(&self, text: &str, monospace: bool) -> Option<CodeMatch> {
        let lines = text.lines().filter(|l| !l.trim().is_empty()).count();
        if lines < self.min_lines {
            return None;
        }
        if !monospace && structural_hints(text) < MIN_STRUCTURAL_HINTS {
            return None;
        }
        self.detect_language(text).map(|s| CodeMatch {
            language: s.name.clone(),
            extension: s.extension.clone(),
        })
    }
}

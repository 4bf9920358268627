//! File-name slugs for section titles.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Longest slug produced, in bytes (slugs are ASCII).
pub const MAX_SLUG_LEN: usize = 60;

/// Slug used when a title has no ASCII alphanumerics left.
pub const EMPTY_SLUG: &str = "section";

/// Turn a title into an ASCII slug.
///
/// Accents are stripped via NFKD, letters are lowercased and every run of
/// other characters becomes a single `-`.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len().min(MAX_SLUG_LEN));
    let mut pending_dash = false;

    for c in title.nfkd().filter(|c| !is_combining_mark(*c)) {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
        if slug.len() >= MAX_SLUG_LEN {
            break;
        }
    }

    slug.truncate(MAX_SLUG_LEN);
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        EMPTY_SLUG.to_string()
    } else {
        slug
    }
}

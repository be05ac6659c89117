//! Canonical form for free-text instrument names.
//!
//! Vietnamese instrument names arrive with and without tone marks
//! ("đàn tranh", "Đàn Tranh", "dan tranh"). Everything that keys on an
//! instrument (descriptor lookup, cache keys, sample catalog) goes through
//! [`normalize`] first so those spellings share one identity.

use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

/// Strip diacritics, fold case and collapse whitespace.
///
/// `đ`/`Đ` is a distinct base letter rather than `d` plus a mark, so it does
/// not go away under decomposition and is mapped explicitly.
pub fn normalize(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let stripped: String = text
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| match c {
            'đ' | 'Đ' => 'd',
            other => other,
        })
        .collect::<String>()
        .to_lowercase();

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

//! Name normalization.

/// Canonical comparison form of an entity name.
///
/// Lowercases, collapses whitespace runs to a single space and strips
/// leading/trailing whitespace and punctuation. Inner punctuation is kept,
/// so "Producer-Consumer" and "Producer Consumer" stay distinct keys.
pub fn normalize(name: &str) -> String {
    let collapsed = collapse_whitespace(&name.to_lowercase());
    collapsed
        .trim_matches(|c: char| c.is_whitespace() || c.is_ascii_punctuation() || is_unicode_punct(c))
        .to_string()
}

/// `normalize` with every non-alphanumeric character replaced by a space.
///
/// Input form for entropy and shingling.
pub fn normalize_fuzzy(name: &str) -> String {
    let base = normalize(name);
    let stripped: String = base
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    collapse_whitespace(&stripped)
}

/// Whitespace-separated tokens of a normalized name.
pub fn token_count(normalized: &str) -> usize {
    normalized.split_whitespace().count()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_unicode_punct(c: char) -> bool {
    matches!(c, '“' | '”' | '‘' | '’' | '…' | '–' | '—' | '«' | '»')
}

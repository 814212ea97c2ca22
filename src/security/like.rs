//! LIKE pattern construction for substring search.

/// Escape `%`, `_` and `[` so a search term matches literally in a
/// SQL Server `LIKE` pattern.
pub fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 8);
    for c in term.chars() {
        match c {
            '[' => escaped.push_str("[[]"),
            '%' => escaped.push_str("[%]"),
            '_' => escaped.push_str("[_]"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Build a case-insensitive "contains" pattern, to be compared against
/// `LOWER(column)`.
pub fn contains_pattern(term: &str) -> String {
    format!("%{}%", escape_like(&term.to_lowercase()))
}

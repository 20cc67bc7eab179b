//! Helpers for comma-separated header token lists such as `Connection`.

/// Strips leading and trailing spaces and tabs.
pub fn trim(s: &str) -> &str {
    s.trim_matches(|c| c == ' ' || c == '\t')
}

/// Iterates the trimmed, non-empty items of a comma-separated list.
pub fn tokens(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(trim).filter(|t| !t.is_empty())
}

/// Exact, case-sensitive token membership.
pub fn has_token(list: &str, token: &str) -> bool {
    tokens(list).any(|t| t == token)
}

pub fn has_token_ignore_case(list: &str, token: &str) -> bool {
    tokens(list).any(|t| t.eq_ignore_ascii_case(token))
}

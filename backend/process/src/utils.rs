use std::sync::LazyLock;

use regex::Regex;

static SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Trims and collapses runs of whitespace, the way spreadsheet exports
/// tend to need.
pub fn clean(input: &str) -> String {
    SPACES.replace_all(input.trim(), " ").into_owned()
}

/// [`clean`], with blank cells read as missing.
pub fn clean_opt(input: Option<String>) -> Option<String> {
    input.map(|s| clean(&s)).filter(|s| !s.is_empty())
}

use std::collections::BTreeSet;

use crate::config::TagGroup;

/// Splits header text into lower-cased tokens.
///
/// Any character other than a letter, digit or hyphen separates tokens;
/// hyphens inside a word belong to it (`очно-заочная` is one token).
pub fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|ch: char| !(ch.is_alphanumeric() || ch == '-'))
        .map(|token| token.trim_matches('-'))
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Whether every keyword of `group` is a token of `header`.
pub fn header_matches(group: &TagGroup, header: &str) -> bool {
    let tokens = tokenize(header);
    !group.keywords().is_empty()
        && group
            .keywords()
            .iter()
            .all(|keyword| tokens.contains(&keyword.to_lowercase()))
}

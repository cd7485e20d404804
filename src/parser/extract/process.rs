use std::sync::LazyLock;

use regex::Regex;

use super::Field;

/// Process number grammar: `NN/NNNN-NNNNNNN-N`. Only a digit may not
/// precede it, so "nº23/1900-..." still matches.
static PROA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\D)(\d{2}/\d{4}-\d{7}-\d)\b").unwrap());

/// Every process number in document order, repeats included.
pub fn find_all(text: &str) -> Vec<&str> {
    PROA_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .collect()
}

/// The notification process: first process number in the document.
pub fn subject(text: &str) -> Option<String> {
    PROA_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// The contract process: among the other process numbers, the one with the
/// lowest leading year. Ties go to the first in document order.
pub fn parent(text: &str, subject: &str) -> Field<String> {
    let mut others: Vec<&str> = Vec::new();
    for id in find_all(text) {
        if id != subject && !others.contains(&id) {
            others.push(id);
        }
    }
    match others.into_iter().min_by_key(|id| leading_year(id)) {
        Some(id) => Field::Found(id.to_string()),
        None => Field::NotApplicable,
    }
}

fn leading_year(id: &str) -> u32 {
    id.get(..2).and_then(|y| y.parse().ok()).unwrap_or(u32::MAX)
}

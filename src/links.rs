use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::db::Table;
use crate::parser::normalize::digits_only;

/// File name → browsable URL.
pub type LinkMap = BTreeMap<String, String>;

/// Digit windows tried after an exact match fails, widest first.
const SUFFIX_WIDTHS: [usize; 3] = [14, 12, 10];

static HYPERLINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)^\s*=\s*HYPERLINK\(\s*"((?:[^"]|"")*)"\s*[;,]\s*"((?:[^"]|"")*)"\s*\)\s*$"#)
        .unwrap()
});

pub fn is_hyperlink(cell: &str) -> bool {
    HYPERLINK_RE.is_match(cell)
}

/// Spreadsheet hyperlink formula showing `label` and pointing at `url`.
pub fn hyperlink(url: &str, label: &str) -> String {
    format!(
        r#"=HYPERLINK("{}";"{}")"#,
        url.replace('"', "\"\""),
        label.replace('"', "\"\"")
    )
}

/// The text a reader sees: the label of a hyperlink formula, or the cell
/// itself.
pub fn display_value(cell: &str) -> String {
    match HYPERLINK_RE.captures(cell) {
        Some(caps) => caps[2].replace("\"\"", "\""),
        None => cell.to_string(),
    }
}

/// Find the document URL for a process number: exact digit match against
/// the file names first, then suffix windows of 14, 12 and 10 digits.
pub fn resolve_url<'a>(links: &'a LinkMap, process_id: &str) -> Option<&'a str> {
    let digits = digits_only(&display_value(process_id));
    if digits.is_empty() {
        return None;
    }
    let keyed: Vec<(String, &str)> = links
        .iter()
        .map(|(name, url)| (digits_only(name), url.as_str()))
        .filter(|(d, _)| !d.is_empty())
        .collect();

    if let Some((_, url)) = keyed.iter().find(|(d, _)| *d == digits) {
        return Some(*url);
    }
    SUFFIX_WIDTHS
        .iter()
        .filter(|w| digits.len() >= **w)
        .find_map(|w| {
            let suffix = &digits[digits.len() - w..];
            keyed
                .iter()
                .find(|(d, _)| d.ends_with(suffix))
                .map(|(_, url)| *url)
        })
}

/// Wrap each row's process number in a hyperlink to its document. Cells that
/// are already hyperlinks are left alone. Returns the table and the number of
/// cells wrapped.
pub fn attach_links(mut table: Table, links: &LinkMap) -> (Table, usize) {
    let mut attached = 0;
    for row in table.rows.iter_mut() {
        if row.process_id.trim().is_empty() || is_hyperlink(&row.process_id) {
            continue;
        }
        if let Some(url) = resolve_url(links, &row.process_id) {
            row.process_id = hyperlink(url, &row.process_id);
            attached += 1;
        }
    }
    (table, attached)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Record;

    const PROA: &str = "23/1900-0000001-1";

    fn map(entries: &[(&str, &str)]) -> LinkMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn table(proas: &[&str]) -> Table {
        Table {
            rows: proas
                .iter()
                .map(|p| Record {
                    process_id: p.to_string(),
                    ..Default::default()
                })
                .collect(),
        }
    }

    #[test]
    fn hyperlink_round_trip() {
        let cell = hyperlink("https://x/d/1", PROA);
        assert!(is_hyperlink(&cell));
        assert_eq!(display_value(&cell), PROA);
        assert_eq!(display_value(PROA), PROA);
        assert!(!is_hyperlink(PROA));
    }

    #[test]
    fn accepts_comma_separator_and_escaped_quotes() {
        let cell = r#"=hyperlink("https://x", "say ""hi""")"#;
        assert!(is_hyperlink(cell));
        assert_eq!(display_value(cell), r#"say "hi""#);
    }

    #[test]
    fn exact_match_wins() {
        let links = map(&[
            ("99 23190000000011.pdf", "https://suffix"),
            ("23-1900-0000001-1.pdf", "https://exact"),
        ]);
        assert_eq!(resolve_url(&links, PROA), Some("https://exact"));
    }

    #[test]
    fn suffix_windows_shrink() {
        let digits = digits_only(PROA);

        // Only the last 12 digits survive in this file name.
        let name = format!("proc {}.pdf", &digits[2..]);
        let links = map(&[(name.as_str(), "https://twelve")]);
        assert_eq!(resolve_url(&links, PROA), Some("https://twelve"));

        let name = format!("{}.pdf", &digits[4..]);
        let links = map(&[(name.as_str(), "https://ten")]);
        assert_eq!(resolve_url(&links, PROA), Some("https://ten"));

        let links = map(&[("000011.pdf", "https://nothing")]);
        assert_eq!(resolve_url(&links, PROA), None);
    }

    #[test]
    fn resolves_through_existing_wrapper() {
        let links = map(&[("23190000000011.pdf", "https://exact")]);
        let wrapped = hyperlink("https://old", PROA);
        assert_eq!(resolve_url(&links, &wrapped), Some("https://exact"));
        assert_eq!(resolve_url(&links, ""), None);
    }

    #[test]
    fn attach_is_idempotent() {
        let links = map(&[("23190000000011.pdf", "https://drive/file")]);
        let (once, n1) = attach_links(table(&[PROA, "24/1900-0000009-9", ""]), &links);
        assert_eq!(n1, 1);
        assert_eq!(once.rows[0].process_id, hyperlink("https://drive/file", PROA));
        assert_eq!(once.rows[1].process_id, "24/1900-0000009-9");

        let (twice, n2) = attach_links(once.clone(), &links);
        assert_eq!(n2, 0);
        assert_eq!(twice, once);
    }
}

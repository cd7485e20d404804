use std::sync::LazyLock;

use regex::Regex;

use super::Field;

static CONTRACT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:contrato|CTO)\s*(?:n\s*[º°o.]*\s*)?[:\-]?\s*(\d{1,6}/\d{4})\b").unwrap()
});

/// Contract number (`NNN/YYYY`) following "Contrato nº" or "CTO".
pub fn extract(text: &str) -> Field<String> {
    let found = CONTRACT_RE.captures_iter(text).find_map(|caps| {
        let m = caps.get(1)?;
        // A process number shares the NN/NNNN prefix; it continues with a dash.
        if text[m.end()..].starts_with('-') {
            return None;
        }
        Some(m.as_str().to_string())
    });
    Field::from_option(found, "número do contrato não encontrado")
}

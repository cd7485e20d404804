use std::sync::LazyLock;

use regex::Regex;

use super::{first_success, Field, Strategy};
use crate::parser::normalize::digits_only;

/// Fourteen digits grouped 2.3.3/4-2, each separator optional and loosely
/// spaced.
const CNPJ_PATTERN: &str =
    r"(?-u:\b)(\d{2})\s?\.?\s?(\d{3})\s?\.?\s?(\d{3})\s?/?\s?(\d{4})\s?-?\s?(\d{2})\b";

/// Default tax id of the notifying authority, never the company's.
pub const AUTHORITY_TAX_ID: &str = "87.934.675/0001-96";

static PREFIXED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)(?:inscrit[ao]\s+no\s+Minist[ée]rio\s+da\s+Fazenda|CNPJ(?:/MF)?)[^\d]{{0,30}}?{CNPJ_PATTERN}"
    ))
    .unwrap()
});

/// Format as `NN.NNN.NNN/NNNN-NN`; `None` unless exactly 14 digits.
pub fn format_tax_id(raw: &str) -> Option<String> {
    let d = digits_only(raw);
    if d.len() != 14 {
        return None;
    }
    Some(format!(
        "{}.{}.{}/{}-{}",
        &d[..2],
        &d[2..5],
        &d[5..8],
        &d[8..12],
        &d[12..]
    ))
}

fn anchored_pattern(company: &str) -> Option<Regex> {
    let words: Vec<String> = company.split_whitespace().map(regex::escape).collect();
    if words.is_empty() {
        return None;
    }
    Regex::new(&format!(
        r"(?i){}[^\d]{{0,80}}?{CNPJ_PATTERN}",
        words.join(r"\s+")
    ))
    .ok()
}

fn first_allowed(re: &Regex, text: &str, excluded: &[String]) -> Option<String> {
    re.captures_iter(text).find_map(|caps| {
        let raw: String = (1..=5).map(|i| &caps[i]).collect();
        let id = format_tax_id(&raw)?;
        (!excluded.contains(&id)).then_some(id)
    })
}

/// The company's tax id.
///
/// Tried in order: right after the company name, after a registry phrase
/// inside the ruling, after a registry phrase anywhere. Ids in `excluded`
/// are skipped wherever they appear.
pub fn extract(
    text: &str,
    ruling: &str,
    company: Option<&str>,
    excluded: &[String],
) -> Field<String> {
    let anchored_re = company.and_then(anchored_pattern);
    let anchored = |t: &str| {
        anchored_re
            .as_ref()
            .and_then(|re| first_allowed(re, t, excluded))
    };
    let in_ruling = |_: &str| first_allowed(&PREFIXED_RE, ruling, excluded);
    let anywhere = |t: &str| first_allowed(&PREFIXED_RE, t, excluded);

    let strategies: [Strategy<'_, String>; 3] = [
        ("ancorado no nome da empresa", &anchored),
        ("prefixo no expediente", &in_ruling),
        ("prefixo no documento", &anywhere),
    ];
    Field::from_option(first_success(text, &strategies), "CNPJ não encontrado")
}

use std::sync::LazyLock;

use regex::Regex;

use super::{first_success, Field, Strategy};

/// How much of the document the labelled-field fallbacks look at.
const HEADER_CHARS: usize = 3000;
const MIN_LEN: usize = 3;
const MAX_LEN: usize = 85;

/// Where a name candidate captured from running text stops.
const NAME_TAIL: &str = r"([^,;]{3,160}?)\s*(?:,|;|\binscrit|\bCNPJ|\bcom\s+sede|\bpessoa\s+jur)";

static NOTIFY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)notificar\s+a\s+empresa\s+{NAME_TAIL}")).unwrap()
});
static AGAINST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)contra\s+a\s+empresa\s+{NAME_TAIL}")).unwrap()
});
static LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*(?:Empresa|Contratada|Raz[ãa]o\s+Social)[ \t]*:[ \t]*(.+?)[ \t]*$").unwrap()
});
static TYPE_CTO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)Tipo[ \t]*:[ \t]*(.+?)[ \t]+-[ \t]+CTO\b").unwrap());

/// Everything up to and including the first legal-entity suffix, with an
/// optional trailing "- ME" / "- EPP". The size markers ME, MEI and EPP only
/// count as a suffix when they end the name.
static LEGAL_SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(\S.*?\s(?:(?:LTDA|EIRELI|S\.\s?A|S/A|S\.S|S/S)\b\.?(?:\s*-\s*(?:ME|EPP)\b\.?)?|(?:EPP|MEI|ME)\b\.?\s*$))",
    )
    .unwrap()
});
static DATE_LIKE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\d{1,2}/\d{1,2}/\d{2,4}|\b\d{1,2}\s+de\s+(?:janeiro|fevereiro|mar[çc]o|abril|maio|junho|julho|agosto|setembro|outubro|novembro|dezembro)\b").unwrap()
});

/// Words that mark a captured line as letterhead rather than a company.
const INSTITUTIONAL: &[&str] = &[
    "SECRETARIA",
    "SUBSECRETARIA",
    "GOVERNO DO ESTADO",
    "DEPARTAMENTO",
    "PROCURADORIA",
    "CELIC",
    "ASSINADO",
    "DOCUMENTO",
];

/// Abbreviations whose trailing dot is part of the name.
const ABBREVIATIONS: &[&str] = &["CIA", "COM", "IND", "SERV", "ADM", "DR", "SR", "SRA", "JR"];

/// Company name. `first_page` scopes the labelled-field fallbacks.
pub fn extract(text: &str, first_page: &str) -> Field<String> {
    let header: String = first_page.chars().take(HEADER_CHARS).collect();
    let labelled = |_: &str| from_pattern(&LABEL_RE, &header);
    let typed = |_: &str| from_pattern(&TYPE_CTO_RE, &header);
    let notify = |t: &str| from_pattern(&NOTIFY_RE, t);
    let against = |t: &str| from_pattern(&AGAINST_RE, t);

    let strategies: [Strategy<'_, String>; 4] = [
        ("notificar a empresa", &notify),
        ("contra a empresa", &against),
        ("rótulo Empresa/Contratada", &labelled),
        ("Tipo - CTO", &typed),
    ];
    Field::from_option(first_success(text, &strategies), "nome da empresa não encontrado")
}

fn from_pattern(re: &Regex, text: &str) -> Option<String> {
    re.captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .find_map(|m| clean_company_name(m.as_str()))
}

/// Trim a captured candidate down to the company name, or reject it.
pub fn clean_company_name(raw: &str) -> Option<String> {
    let joined = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let cut = match LEGAL_SUFFIX_RE.captures(&joined) {
        Some(caps) => caps[1].to_string(),
        None => cut_at_sentence_end(&joined),
    };
    let name = strip_trailing_punctuation(&cut);

    let len = name.chars().count();
    if !(MIN_LEN..=MAX_LEN).contains(&len) {
        return None;
    }
    let upper = name.to_uppercase();
    if INSTITUTIONAL.iter().any(|w| upper.contains(w)) || DATE_LIKE_RE.is_match(&name) {
        return None;
    }
    Some(name)
}

fn last_token(s: &str) -> &str {
    s.rsplit(' ').next().unwrap_or_default()
}

fn is_abbreviation(token: &str) -> bool {
    let bare = token.trim_start_matches(|c: char| !c.is_alphanumeric());
    bare.contains('.')
        || bare.chars().count() == 1
        || ABBREVIATIONS.contains(&bare.to_uppercase().as_str())
}

/// Cut at the first period that ends a sentence rather than an abbreviation.
fn cut_at_sentence_end(s: &str) -> String {
    for (i, _) in s.match_indices('.') {
        let after = &s[i + 1..];
        if !(after.is_empty() || after.starts_with(' ')) {
            continue;
        }
        if is_abbreviation(last_token(&s[..i])) {
            continue;
        }
        return s[..i].to_string();
    }
    s.to_string()
}

fn strip_trailing_punctuation(s: &str) -> String {
    let mut out = s;
    loop {
        out = out.trim_end_matches(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | ':' | '-' | '('));
        match out.strip_suffix('.') {
            Some(body) if !is_abbreviation(last_token(body)) => out = body,
            _ => break,
        }
    }
    out.to_string()
}

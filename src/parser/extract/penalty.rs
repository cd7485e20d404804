use std::fmt;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use super::words::parse_number_words;
use super::Field;
use crate::db::parse_date;

/// Authority code whose presence means the company is barred from bidding.
pub const IMPEDIMENT_CODE: &str = "CFIL/RS";

/// Largest fine percentage the rules allow.
const MAX_PERCENT: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PenaltyType {
    Multa,
    Advertencia,
    NaoAplicacao,
}

impl fmt::Display for PenaltyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PenaltyType::Multa => "Multa",
            PenaltyType::Advertencia => "Advertência",
            PenaltyType::NaoAplicacao => "Não aplicação de penalidade",
        })
    }
}

/// Bidding-ban duration in months.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Months(pub u32);

impl fmt::Display for Months {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            1 => write!(f, "1 mês"),
            n => write!(f, "{n} meses"),
        }
    }
}

static MULTA_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bmulta\b").unwrap());
static ADVERTENCIA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\badvert[êe]ncia\b").unwrap());
static NAO_APLICACAO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bn[ãa]o\s+aplica[çc][ãa]o\b|\bdeixo\s+de\s+aplicar\b").unwrap()
});

static PERCENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bmulta\s+(?:\p{L}+\s+){0,3}?de\s+(\d{1,3})\s*%\s*(?:\(\s*([^()]{1,40}?)\s*\))?")
        .unwrap()
});

static MONTHS_COMPOSITE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d{1,3})?\s*(?:\(\s*([^()]{2,40}?)\s*\))?\s*m[eê]s(?:es)?\b").unwrap()
});
static MONTHS_DIGIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,3})\s*m[eê]s(?:es)?\b").unwrap());
static MONTHS_PAREN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\(\s*([^()]{2,40}?)\s*\)\s*m[eê]s(?:es)?\b").unwrap());
static MONTHS_WORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\p{L}+(?:\s+e\s+\p{L}+)?)\s+m[eê]s(?:es)?\b").unwrap()
});

static ACTIVE_DEBT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)d[íi]vida\s+ativa").unwrap());
static LONG_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})º?\s+de\s+(janeiro|fevereiro|mar[çc]o|abril|maio|junho|julho|agosto|setembro|outubro|novembro|dezembro)\s+de\s+(\d{4})\b").unwrap()
});
static SHORT_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{1,2}/\d{1,2}/\d{4}\b").unwrap());

/// Penalty kind decided by the ruling. Fine beats warning beats
/// non-application.
pub fn penalty_type(ruling: &str) -> Field<PenaltyType> {
    if ruling.trim().is_empty() {
        return Field::NotApplicable;
    }
    let kind = if MULTA_RE.is_match(ruling) {
        PenaltyType::Multa
    } else if ADVERTENCIA_RE.is_match(ruling) {
        PenaltyType::Advertencia
    } else if NAO_APLICACAO_RE.is_match(ruling) {
        PenaltyType::NaoAplicacao
    } else {
        return Field::failed("penalidade não identificada");
    };
    Field::Found(kind)
}

/// When digits and the spelled-out number disagree, the words win.
fn prefer_words(digits: Option<u32>, words: Option<u32>) -> Option<u32> {
    if let (Some(d), Some(w)) = (digits, words) {
        if d != w {
            debug!("digits {} disagree with spelled-out {}; using {}", d, w, w);
        }
    }
    words.or(digits)
}

/// Fine percentage from "multa de N% (extenso)".
pub fn percent(ruling: &str) -> Field<u32> {
    if ruling.trim().is_empty() {
        return Field::NotApplicable;
    }
    let Some(caps) = PERCENT_RE.captures(ruling) else {
        return Field::failed("percentual da multa não encontrado");
    };
    let digits = caps.get(1).and_then(|m| m.as_str().parse().ok());
    let words = caps.get(2).and_then(|m| parse_number_words(m.as_str()));
    match prefer_words(digits, words) {
        Some(v) if v <= MAX_PERCENT => Field::Found(v),
        Some(v) => Field::Failed(format!("percentual fora do intervalo: {v}%")),
        None => Field::failed("percentual da multa não encontrado"),
    }
}

/// Bidding-ban duration. A composite "N (extenso) meses" pattern is tried
/// first, then digits alone, words in parentheses and bare words.
pub fn months(ruling: &str) -> Field<Months> {
    if ruling.trim().is_empty() {
        return Field::NotApplicable;
    }
    let composite = MONTHS_COMPOSITE_RE.captures_iter(ruling).find_map(|caps| {
        let digits = caps.get(1).and_then(|m| m.as_str().parse().ok());
        let words = caps.get(2).and_then(|m| parse_number_words(m.as_str()));
        prefer_words(digits, words)
    });
    let value = composite
        .or_else(|| capture_number(&MONTHS_DIGIT_RE, ruling, |s| s.parse().ok()))
        .or_else(|| capture_number(&MONTHS_PAREN_RE, ruling, parse_number_words))
        .or_else(|| capture_number(&MONTHS_WORD_RE, ruling, parse_number_words));

    match value {
        Some(0) => Field::failed("prazo de impedimento igual a zero"),
        Some(n) => Field::Found(Months(n)),
        None => Field::failed("prazo de impedimento não encontrado"),
    }
}

fn capture_number(re: &Regex, text: &str, parse: impl Fn(&str) -> Option<u32>) -> Option<u32> {
    re.captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .find_map(|m| parse(m.as_str()))
}

pub fn impediment(text: &str) -> bool {
    text.contains(IMPEDIMENT_CODE)
}

/// "Sim" when the ruling refers the debt to active collection.
pub fn active_debt(ruling: &str) -> Field<String> {
    if ACTIVE_DEBT_RE.is_match(ruling) {
        Field::Found("Sim".to_string())
    } else {
        Field::NotApplicable
    }
}

/// Date the penalty was decided: a long-form date in the ruling, else the
/// first numeric one.
pub fn penalty_date(ruling: &str) -> Field<NaiveDate> {
    if ruling.trim().is_empty() {
        return Field::NotApplicable;
    }
    let long = LONG_DATE_RE.captures(ruling).and_then(|caps| {
        let day: u32 = caps[1].parse().ok()?;
        let month = month_number(&caps[2])?;
        let year: i32 = caps[3].parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    });
    let date = long.or_else(|| {
        SHORT_DATE_RE
            .find_iter(ruling)
            .find_map(|m| parse_date(m.as_str()))
    });
    Field::from_option(date, "data da penalidade não encontrada")
}

fn month_number(name: &str) -> Option<u32> {
    let n = match name.to_lowercase().as_str() {
        "janeiro" => 1,
        "fevereiro" => 2,
        "março" | "marco" => 3,
        "abril" => 4,
        "maio" => 5,
        "junho" => 6,
        "julho" => 7,
        "agosto" => 8,
        "setembro" => 9,
        "outubro" => 10,
        "novembro" => 11,
        "dezembro" => 12,
        _ => return None,
    };
    Some(n)
}

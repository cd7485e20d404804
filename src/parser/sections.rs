use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::db::parse_date;
use crate::source::Page;

/// Heading that opens the ruling when it is followed by the process number.
pub const RULING_HEADING: &str = "DECISÃO";

/// How far after the heading the process number may appear.
const HEADING_TO_PROA: usize = 200;

/// Fraction of page height below which footer dates are searched.
const FOOTER_START: f64 = 0.85;

static RULING_PHRASE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)diante\s+do\s+exposto,?\s+decido").unwrap());
static DATE_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,2}/\d{1,2}/\d{4}$").unwrap());
static DATE_IN_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{1,2}/\d{1,2}/\d{4}\b").unwrap());

/// Build a case-insensitive pattern for `heading` where every internal run of
/// whitespace matches any whitespace, line breaks included.
pub fn heading_pattern(heading: &str) -> String {
    let parts: Vec<String> = heading.split_whitespace().map(regex::escape).collect();
    format!(r"(?i){}", parts.join(r"\s+"))
}

/// Up to `window` characters starting right after `heading`. Empty when the
/// heading is absent.
pub fn window_after_heading(text: &str, heading: &str, window: usize) -> String {
    if heading.trim().is_empty() {
        return String::new();
    }
    let Ok(re) = Regex::new(&heading_pattern(heading)) else {
        return String::new();
    };
    match re.find(text) {
        Some(m) => text[m.end()..].chars().take(window).collect(),
        None => String::new(),
    }
}

/// Word that closes the boilerplate ruling phrase; the ruling window opens
/// right after it.
const RULING_VERB: &str = "decido";

/// Where the ruling starts: page index, byte offset of the heading or ruling
/// phrase, and the heading the window is cut after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RulingMatch {
    pub page: usize,
    pub start: usize,
    pub heading: &'static str,
}

/// First page carrying the ruling for `proa`.
///
/// A page matches when the ruling heading is followed closely by the process
/// number, or when the boilerplate ruling phrase and the process number both
/// appear anywhere on it.
pub fn find_ruling_page(pages: &[Page], proa: &str) -> Option<RulingMatch> {
    if proa.is_empty() {
        return None;
    }
    let with_proa = Regex::new(&format!(
        r"{}[\s\S]{{0,{}}}?{}",
        heading_pattern(RULING_HEADING),
        HEADING_TO_PROA,
        regex::escape(proa)
    ))
    .ok()?;

    pages.iter().enumerate().find_map(|(page, p)| {
        if let Some(m) = with_proa.find(&p.text) {
            return Some(RulingMatch {
                page,
                start: m.start(),
                heading: RULING_HEADING,
            });
        }
        if p.text.contains(proa) {
            if let Some(m) = RULING_PHRASE_RE.find(&p.text) {
                return Some(RulingMatch {
                    page,
                    start: m.start(),
                    heading: RULING_VERB,
                });
            }
        }
        None
    })
}

/// Ruling text: the window after the matched heading, continuing onto the
/// following pages when the ruling crosses a page break.
pub fn ruling_text(pages: &[Page], at: RulingMatch, window: usize) -> String {
    let Some(first) = pages.get(at.page) else {
        return String::new();
    };
    let head = first.text.get(at.start..).unwrap_or_default();
    let section = std::iter::once(head)
        .chain(pages[at.page + 1..].iter().map(|p| p.text.as_str()))
        .collect::<Vec<_>>()
        .join("\n");
    window_after_heading(&section, at.heading, window)
}

/// The page's self-declared date: among date tokens in the bottom band of the
/// page, sorted by (left edge, bottom edge), the last one.
///
/// Pages without word boxes fall back to the last date on the bottom 15% of
/// lines.
pub fn footer_date(page: &Page) -> Option<NaiveDate> {
    if page.words.is_empty() || page.height <= 0.0 {
        return footer_date_from_lines(&page.text);
    }
    let threshold = page.height * FOOTER_START;
    let mut candidates: Vec<(f64, f64, NaiveDate)> = page
        .words
        .iter()
        .filter(|w| w.top >= threshold)
        .filter_map(|w| {
            let token = w.text.trim_matches(|c: char| !c.is_ascii_digit());
            if !DATE_TOKEN_RE.is_match(token) {
                return None;
            }
            parse_date(token).map(|d| (w.x0, w.bottom, d))
        })
        .collect();
    candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
    candidates.last().map(|(_, _, d)| *d)
}

fn footer_date_from_lines(text: &str) -> Option<NaiveDate> {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = ((lines.len() as f64) * FOOTER_START).floor() as usize;
    let start = start.min(lines.len().saturating_sub(1));
    lines
        .get(start..)?
        .iter()
        .flat_map(|l| DATE_IN_LINE_RE.find_iter(l))
        .filter_map(|m| parse_date(m.as_str()))
        .last()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Word;

    const PROA: &str = "23/1900-0000001-1";

    fn word(text: &str, x0: f64, top: f64) -> Word {
        Word {
            text: text.to_string(),
            x0,
            top,
            bottom: top + 10.0,
        }
    }

    #[test]
    fn window_tolerates_wrapped_heading() {
        let text = "intro\nDECISÃO\n  ADMINISTRATIVA: aplicar multa";
        let w = window_after_heading(text, "decisão administrativa", 1200);
        assert_eq!(w, ": aplicar multa");
    }

    #[test]
    fn window_is_bounded() {
        let text = format!("TITULO {}", "x".repeat(5000));
        assert_eq!(window_after_heading(&text, "titulo", 1200).chars().count(), 1200);
    }

    #[test]
    fn window_empty_when_absent() {
        assert!(window_after_heading("nada aqui", "DECISÃO", 1200).is_empty());
        assert!(window_after_heading("nada aqui", "  ", 1200).is_empty());
    }

    #[test]
    fn heading_escapes_metacharacters() {
        let w = window_after_heading("Art. 1º (caput) texto", "Art. 1º (caput)", 50);
        assert_eq!(w, " texto");
    }

    #[test]
    fn finds_page_by_heading_and_proa() {
        let pages = vec![
            Page::from_text(format!("Capa do processo {PROA}")),
            Page::from_text(format!("DECISÃO\nPROA nº {PROA}\nAplico MULTA de 5%")),
        ];
        let m = find_ruling_page(&pages, PROA).unwrap();
        assert_eq!(m.page, 1);
        assert_eq!(m.heading, RULING_HEADING);
        assert!(pages[1].text[m.start..].starts_with("DECISÃO\nPROA"));
        assert_eq!(
            ruling_text(&pages, m, 1200),
            format!("\nPROA nº {PROA}\nAplico MULTA de 5%")
        );
    }

    #[test]
    fn finds_page_by_phrase_and_proa() {
        let pages = vec![
            Page::from_text("Diante do exposto, DECIDO aplicar advertência"),
            Page::from_text(format!("Processo {PROA}. Diante do exposto, decido aplicar multa")),
        ];
        let m = find_ruling_page(&pages, PROA).unwrap();
        assert_eq!(m.page, 1);
        assert_eq!(ruling_text(&pages, m, 1200), " aplicar multa");
    }

    #[test]
    fn heading_without_proa_is_not_a_ruling() {
        let pages = vec![Page::from_text("DECISÃO sobre outro assunto")];
        assert_eq!(find_ruling_page(&pages, PROA), None);
        assert_eq!(find_ruling_page(&pages, ""), None);
    }

    #[test]
    fn ruling_text_spans_pages() {
        let pages = vec![
            Page::from_text(format!("DECISÃO {PROA} aplicar")),
            Page::from_text("multa de 5%"),
        ];
        let m = find_ruling_page(&pages, PROA).unwrap();
        let text = ruling_text(&pages, m, 1200);
        assert!(text.ends_with("aplicar\nmulta de 5%"));
        assert_eq!(ruling_text(&pages, m, 8), format!(" {}", &PROA[..7]));
    }

    #[test]
    fn footer_date_picks_last_by_left_then_bottom() {
        let page = Page {
            text: String::new(),
            height: 800.0,
            words: vec![
                word("10/01/2024", 400.0, 600.0), // above the footer band
                word("01/01/2024", 50.0, 760.0),
                word("15/01/2024", 300.0, 750.0),
                word("14/01/2024", 300.0, 770.0),
                word("Página", 500.0, 780.0),
            ],
        };
        assert_eq!(footer_date(&page), NaiveDate::from_ymd_opt(2024, 1, 14));
    }

    #[test]
    fn footer_date_strips_punctuation() {
        let page = Page {
            text: String::new(),
            height: 100.0,
            words: vec![word("(02/03/2024).", 10.0, 90.0)],
        };
        assert_eq!(footer_date(&page), NaiveDate::from_ymd_opt(2024, 3, 2));
    }

    #[test]
    fn footer_date_from_plain_text() {
        let mut text = String::new();
        for i in 0..19 {
            text.push_str(&format!("linha {i} em 0{}/01/2023\n", i % 9 + 1));
        }
        text.push_str("Gerado em 20/02/2024 às 10:00");
        assert_eq!(
            footer_date(&Page::from_text(text)),
            NaiveDate::from_ymd_opt(2024, 2, 20)
        );
        assert_eq!(footer_date(&Page::from_text("")), None);
    }
}

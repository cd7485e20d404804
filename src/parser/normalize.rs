use std::sync::LazyLock;

use regex::Regex;

static HSPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]{2,}|\t").unwrap());

/// Zero-width characters dropped outright.
const INVISIBLE: &[char] = &['\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}', '\u{00AD}'];

/// Space separators (Unicode Zs) that become a plain ASCII space.
const SPACES: &[char] = &[
    '\u{00A0}', '\u{1680}', '\u{2000}', '\u{2001}', '\u{2002}', '\u{2003}', '\u{2004}',
    '\u{2005}', '\u{2006}', '\u{2007}', '\u{2008}', '\u{2009}', '\u{200A}', '\u{202F}',
    '\u{205F}', '\u{3000}',
];

const DASHES: &[char] = &[
    '\u{2010}', '\u{2011}', '\u{2012}', '\u{2013}', '\u{2014}', '\u{2015}', '\u{2212}', '\u{FE58}',
    '\u{FE63}', '\u{FF0D}',
];

/// Canonicalize raw text-layer output before any pattern runs.
///
/// Line breaks are kept (several extractors are line-anchored); everything
/// else that is horizontal whitespace collapses to one space. Idempotent.
pub fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() != Some(&'\n') {
                    out.push('\n');
                }
            }
            c if INVISIBLE.contains(&c) => {}
            c if SPACES.contains(&c) => out.push(' '),
            c if DASHES.contains(&c) => out.push('-'),
            c => out.push(c),
        }
    }
    HSPACE_RE.replace_all(&out, " ").into_owned()
}

/// Keep only ASCII digits. Used for identifier keys and tax ids.
pub fn digits_only(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use quick_xml::events::{BytesStart, Event};
use tracing::{debug, warn};

/// A positioned word from the text layer. Coordinates are in PDF points,
/// origin at the top-left of the page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Word {
    pub text: String,
    pub x0: f64,
    pub top: f64,
    pub bottom: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Page {
    pub text: String,
    pub height: f64,
    pub words: Vec<Word>,
}

impl Page {
    pub fn from_text(text: impl Into<String>) -> Self {
        Page {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Reads a document's text layer, page by page.
///
/// Failures are not escalated: an unreadable document is a document with no
/// pages.
pub trait DocumentSource {
    fn read_pages(&self, path: &Path) -> Vec<Page>;
}

/// `pdftotext` (poppler) for PDFs; form-feed separated plain text for `.txt`.
pub struct PdftotextSource;

impl DocumentSource for PdftotextSource {
    fn read_pages(&self, path: &Path) -> Vec<Page> {
        let result = match extension(path).as_deref() {
            Some("txt") => read_txt(path),
            _ => read_pdf(path),
        };
        match result {
            Ok(pages) => pages,
            Err(e) => {
                warn!("No extractable text in {}: {:#}", path.display(), e);
                Vec::new()
            }
        }
    }
}

/// Documents in `dir`, sorted by file name.
pub fn list_documents(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to list {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && matches!(extension(p).as_deref(), Some("pdf" | "txt")))
        .collect();
    paths.sort();
    Ok(paths)
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn read_txt(path: &Path) -> Result<Vec<Page>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(split_pages(&raw).into_iter().map(Page::from_text).collect())
}

fn read_pdf(path: &Path) -> Result<Vec<Page>> {
    let text = run_pdftotext(path, &[])?;
    let layout = run_pdftotext(path, &["-bbox"])?;

    let texts = split_pages(&text);
    let layouts = parse_bbox(&layout)?;
    debug!(
        "{}: {} text pages, {} layout pages",
        path.display(),
        texts.len(),
        layouts.len()
    );

    let mut layouts = layouts.into_iter();
    Ok(texts
        .into_iter()
        .map(|text| {
            let layout = layouts.next().unwrap_or_default();
            Page {
                text,
                height: layout.height,
                words: layout.words,
            }
        })
        .collect())
}

fn run_pdftotext(path: &Path, extra: &[&str]) -> Result<String> {
    let output = Command::new("pdftotext")
        .args(extra)
        .args(["-enc", "UTF-8"])
        .arg(path)
        .arg("-")
        .output()
        .context("Failed to run pdftotext")?;
    if !output.status.success() {
        bail!(
            "pdftotext exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// pdftotext terminates every page with a form feed.
fn split_pages(raw: &str) -> Vec<String> {
    let mut pages: Vec<String> = raw.split('\u{0C}').map(str::to_string).collect();
    if pages.len() > 1 && pages.last().is_some_and(|p| p.trim().is_empty()) {
        pages.pop();
    }
    pages
}

#[derive(Debug, Default)]
struct PageLayout {
    height: f64,
    words: Vec<Word>,
}

/// Parse `pdftotext -bbox` XHTML into per-page word boxes.
fn parse_bbox(xhtml: &str) -> Result<Vec<PageLayout>> {
    let mut reader = quick_xml::Reader::from_str(xhtml);
    let mut pages: Vec<PageLayout> = Vec::new();
    let mut word: Option<Word> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"page" => pages.push(PageLayout {
                    height: attr_f64(&e, b"height"),
                    words: Vec::new(),
                }),
                b"word" => {
                    word = Some(Word {
                        text: String::new(),
                        x0: attr_f64(&e, b"xMin"),
                        top: attr_f64(&e, b"yMin"),
                        bottom: attr_f64(&e, b"yMax"),
                    })
                }
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if let Some(w) = word.as_mut() {
                    w.text.push_str(&e.unescape()?);
                }
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"word" => {
                if let (Some(w), Some(page)) = (word.take(), pages.last_mut()) {
                    page.words.push(w);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
        buf.clear();
    }
    Ok(pages)
}

fn attr_f64(e: &BytesStart, key: &[u8]) -> f64 {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| a.unescape_value().ok()?.trim().parse().ok())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BBOX: &str = r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.0 Transitional//EN" "http://www.w3.org/TR/xhtml1/DTD/xhtml1-transitional.dtd">
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
<title></title>
<meta name="Producer" content="x"/>
</head>
<body>
<doc>
  <page width="595.000000" height="842.000000">
    <word xMin="56.700000" yMin="60.100000" xMax="120.000000" yMax="72.000000">DECISÃO</word>
    <word xMin="420.000000" yMin="800.000000" xMax="470.000000" yMax="810.000000">15/01/2024</word>
  </page>
  <page width="595.000000" height="842.000000">
    <word xMin="56.700000" yMin="60.100000" xMax="90.000000" yMax="72.000000">S&amp;A</word>
  </page>
</doc>
</body>
</html>"#;

    #[test]
    fn parses_word_boxes() {
        let pages = parse_bbox(BBOX).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].height, 842.0);
        assert_eq!(pages[0].words.len(), 2);
        assert_eq!(pages[0].words[1].text, "15/01/2024");
        assert_eq!(pages[0].words[1].x0, 420.0);
        assert_eq!(pages[0].words[1].bottom, 810.0);
        assert_eq!(pages[1].words[0].text, "S&A");
    }

    #[test]
    fn splits_form_feeds() {
        assert_eq!(split_pages("one\u{0C}two\u{0C}"), vec!["one", "two"]);
        assert_eq!(split_pages(""), vec![""]);
    }

    #[test]
    fn txt_fixture_pages() {
        let pages = PdftotextSource.read_pages(Path::new("tests/fixtures/multa.txt"));
        assert_eq!(pages.len(), 2);
        assert!(pages[0].words.is_empty());
    }

    #[test]
    fn missing_file_is_empty() {
        let pages = PdftotextSource.read_pages(Path::new("tests/fixtures/does-not-exist.txt"));
        assert!(pages.is_empty());
    }

    #[test]
    fn lists_fixture_documents_sorted() {
        let docs = list_documents(Path::new("tests/fixtures")).unwrap();
        assert!(docs.len() >= 2);
        assert!(docs.windows(2).all(|w| w[0] <= w[1]));
    }
}

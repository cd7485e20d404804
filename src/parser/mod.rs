pub mod extract;
pub mod normalize;
pub mod sections;

use chrono::NaiveDate;

use crate::source::Page;
use extract::{company, contract, penalty, process, tax_id, Extraction, Field};
use sections::RulingMatch;

/// Knobs the extractors need from the configuration.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Characters of ruling text considered after the heading.
    pub section_window: usize,
    /// Tax ids that belong to the authority and never to a company.
    pub excluded_tax_ids: Vec<String>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        ExtractOptions {
            section_window: 1200,
            excluded_tax_ids: vec![tax_id::AUTHORITY_TAX_ID.to_string()],
        }
    }
}

/// A document with every page normalized, plus the pages joined.
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub pages: Vec<Page>,
    pub text: String,
}

impl Document {
    pub fn new(raw: Vec<Page>) -> Self {
        let pages: Vec<Page> = raw
            .into_iter()
            .map(|p| Page {
                text: normalize::normalize(&p.text),
                ..p
            })
            .collect();
        let text = pages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        Document { pages, text }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    fn first_page(&self) -> &str {
        self.pages.first().map(|p| p.text.as_str()).unwrap_or_default()
    }
}

/// What the reconciliation decision needs, found without running the field
/// extractors.
#[derive(Debug, Clone, PartialEq)]
pub struct Peek {
    pub process_id: Option<String>,
    pub ruling: Option<RulingMatch>,
    /// Footer date of the ruling page, or of the last page when there is no
    /// ruling.
    pub document_date: Option<NaiveDate>,
}

pub fn peek(doc: &Document) -> Peek {
    let process_id = process::subject(&doc.text);
    let ruling = process_id
        .as_deref()
        .and_then(|id| sections::find_ruling_page(&doc.pages, id));
    let date_page = match ruling {
        Some(at) => Some(at.page),
        None => doc.pages.len().checked_sub(1),
    };
    let document_date = date_page
        .and_then(|i| doc.pages.get(i))
        .and_then(sections::footer_date);
    Peek {
        process_id,
        ruling,
        document_date,
    }
}

/// Run every extractor over `doc` and apply the cross-field override.
pub fn process_document(doc: &Document, peek: &Peek, opts: &ExtractOptions) -> Extraction {
    let ruling = peek
        .ruling
        .map(|at| sections::ruling_text(&doc.pages, at, opts.section_window))
        .unwrap_or_default();

    let company_name = company::extract(&doc.text, doc.first_page());
    let company_tax_id = tax_id::extract(
        &doc.text,
        &ruling,
        company_name.found().map(String::as_str),
        &opts.excluded_tax_ids,
    );
    let parent_process_id = match &peek.process_id {
        Some(id) => process::parent(&doc.text, id),
        None => Field::NotApplicable,
    };

    let mut extraction = Extraction {
        process_id: peek.process_id.clone(),
        contract_number: contract::extract(&doc.text),
        company_name,
        company_tax_id,
        parent_process_id,
        penalty_type: penalty::penalty_type(&ruling),
        penalty_percent: penalty::percent(&ruling),
        penalty_months: penalty::months(&ruling),
        impediment: penalty::impediment(&doc.text),
        penalty_date: penalty::penalty_date(&ruling),
        active_debt: penalty::active_debt(&ruling),
        document_date: peek.document_date,
    };
    extraction.apply_override();
    extraction
}

// ── Tests ──

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use tracing::{error, info, warn};

use crate::db::{self, Record, Table};
use crate::drive::LinkIndex;
use crate::error::BatchError;
use crate::links::attach_links;
use crate::parser::normalize::digits_only;
use crate::parser::{self, extract::Extraction, Document, ExtractOptions, Peek};
use crate::reconcile::{self, record_key, Counts, Decision, Ledger};
use crate::settings::Settings;
use crate::source::{list_documents, DocumentSource};
use crate::status::StatusLookup;

/// Outcome of a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub documents: usize,
    pub counts: Counts,
    /// Documents whose extraction broke unexpectedly.
    pub failed: usize,
    pub links_attached: usize,
    pub rows: usize,
}

impl Summary {
    pub fn print(&self) {
        println!(
            "Processed {} documents: {} inserted, {} updated, {} skipped, {} dropped, {} failed.",
            self.documents,
            self.counts.inserted,
            self.counts.updated,
            self.counts.skipped,
            self.counts.dropped,
            self.failed,
        );
        println!(
            "Saved {} rows ({} new links).",
            self.rows, self.links_attached
        );
    }
}

/// Field extraction over one peeked document.
pub type Extractor = fn(&Document, &Peek, &ExtractOptions) -> Extraction;

/// Collaborators of a run.
pub struct Services<'a, S, L, I> {
    pub source: &'a S,
    pub status: &'a L,
    pub links: &'a I,
    pub extract: Extractor,
}

impl<'a, S, L, I> Services<'a, S, L, I> {
    pub fn new(source: &'a S, status: &'a L, links: &'a I) -> Self {
        Services {
            source,
            status,
            links,
            extract: parser::process_document,
        }
    }
}

/// Fetch the remote status (once, then wait `delay`) and build the row.
pub async fn assemble<L: StatusLookup>(
    extraction: Extraction,
    status: &L,
    delay: Duration,
    review_date: NaiveDate,
) -> Record {
    let remote_status = match extraction.process_id.as_deref() {
        Some(id) => {
            let status = status.lookup(&digits_only(id)).await;
            tokio::time::sleep(delay).await;
            status
        }
        None => String::new(),
    };
    extraction.into_record(remote_status, review_date)
}

/// Process every document in the configured directory into the stored table.
///
/// The table is loaded once and saved once (plus optional checkpoints).
/// Documents are handled one at a time in file-name order; a document that
/// breaks is logged and skipped.
pub async fn run<S, L, I>(
    conn: &Connection,
    settings: &Settings,
    services: Services<'_, S, L, I>,
    today: NaiveDate,
) -> Result<Summary>
where
    S: DocumentSource,
    L: StatusLookup,
    I: LinkIndex,
{
    let table = db::load_table(conn)?;
    let documents = list_documents(&settings.documents_dir)
        .map_err(|_| BatchError::DocumentsDir(settings.documents_dir.clone()))?;
    info!(
        "{} documents, {} rows in table{}",
        documents.len(),
        table.rows.len(),
        if settings.force_refresh { " (force refresh)" } else { "" }
    );

    let opts = settings.extract_options();
    let mut ledger = Ledger::new(table);
    let mut summary = Summary {
        documents: documents.len(),
        ..Default::default()
    };
    let mut accepted = 0usize;

    let pb = ProgressBar::new(documents.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    for path in &documents {
        pb.set_message(file_name(path));
        match process_one(path, &mut ledger, settings, &opts, &services, today).await {
            Ok(Decision::Insert | Decision::Update(_)) => {
                accepted += 1;
                if let Some(n) = settings.checkpoint_every.filter(|n| *n > 0) {
                    if accepted % n == 0 {
                        let rows = db::save_table(conn, &reconcile::finalize(ledger.table().clone()))?;
                        info!("Checkpoint: saved {} rows", rows);
                    }
                }
            }
            Ok(_) => {}
            Err(e) => {
                error!("{}: {:#}", path.display(), e);
                summary.failed += 1;
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    summary.counts = ledger.counts();
    let table = ledger.into_table();
    let links = services.links.list().await;
    let (table, attached) = attach_links(table, &links);
    summary.links_attached = attached;
    summary.rows = db::save_table(conn, &table)?;
    Ok(summary)
}

/// Decide, extract and upsert one document. Returns the decision taken.
async fn process_one<S, L, I>(
    path: &Path,
    ledger: &mut Ledger,
    settings: &Settings,
    opts: &ExtractOptions,
    services: &Services<'_, S, L, I>,
    today: NaiveDate,
) -> Result<Decision>
where
    S: DocumentSource,
    L: StatusLookup,
    I: LinkIndex,
{
    let name = file_name(path);
    let doc = Document::new(services.source.read_pages(path));
    if doc.is_empty() {
        warn!("{}: no extractable text", name);
        ledger.note(Decision::Drop);
        return Ok(Decision::Drop);
    }

    let peek = parser::peek(&doc);
    let key = peek.process_id.as_deref().map(record_key).unwrap_or_default();
    let decision = ledger.decide(&key, peek.document_date, settings.force_refresh);
    match decision {
        Decision::Drop => {
            warn!("{}: no process number, dropped", name);
            ledger.note(decision);
            return Ok(decision);
        }
        Decision::Skip(_) => {
            info!("{}: unchanged, skipped", name);
            ledger.note(decision);
            return Ok(decision);
        }
        Decision::Insert | Decision::Update(_) => {}
    }

    let extraction = extract_guarded(services.extract, &doc, &peek, opts)?;
    let record = assemble(extraction, services.status, settings.status_delay(), today).await;
    info!(
        "{}: {:?} {} ({})",
        name, decision, record.process_id, record.company_name
    );
    ledger.apply(record, decision);
    Ok(decision)
}

/// Extraction that turns a panic inside the extractors into an error for
/// this document only.
fn extract_guarded(
    extract: Extractor,
    doc: &Document,
    peek: &Peek,
    opts: &ExtractOptions,
) -> Result<Extraction> {
    catch_unwind(AssertUnwindSafe(|| extract(doc, peek, opts))).map_err(|panic| {
        let msg = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        anyhow!("extraction failed: {msg}")
    })
}

/// Wrap the stored table's process numbers in links, without extracting.
pub async fn relink<I: LinkIndex>(conn: &Connection, links: &I) -> Result<usize> {
    let table: Table = db::load_table(conn)?;
    let map = links.list().await;
    let (table, attached) = attach_links(table, &map);
    db::save_table(conn, &table)?;
    Ok(attached)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    use crate::db::parse_date;
    use crate::links::{hyperlink, LinkMap};
    use crate::settings::Overrides;
    use crate::source::{Page, PdftotextSource};

    const MULTA: &str = "23/1900-0000001-1";
    const ADVERTENCIA: &str = "24/1900-0000077-8";

    /// Records every lookup and answers with a fixed status.
    #[derive(Default)]
    struct FakeStatus {
        calls: Mutex<Vec<String>>,
    }

    impl StatusLookup for FakeStatus {
        async fn lookup(&self, process_digits: &str) -> String {
            self.calls.lock().unwrap().push(process_digits.to_string());
            "Em andamento".to_string()
        }
    }

    struct FakeLinks(LinkMap);

    impl LinkIndex for FakeLinks {
        async fn list(&self) -> LinkMap {
            self.0.clone()
        }
    }

    /// Serves pages from memory and counts reads.
    struct FakeSource {
        pages: HashMap<PathBuf, Vec<Page>>,
        reads: RefCell<usize>,
    }

    impl DocumentSource for FakeSource {
        fn read_pages(&self, path: &Path) -> Vec<Page> {
            *self.reads.borrow_mut() += 1;
            self.pages.get(path).cloned().unwrap_or_default()
        }
    }

    fn settings(force: bool) -> Settings {
        let mut s = Settings::load(&Overrides {
            documents_dir: Some(PathBuf::from("tests/fixtures")),
            force_refresh: Some(force),
            ..Default::default()
        })
        .unwrap();
        s.status_delay_ms = 0;
        s
    }

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        conn
    }

    fn today() -> NaiveDate {
        parse_date("20/03/2024").unwrap()
    }

    fn links() -> FakeLinks {
        let mut map = LinkMap::new();
        map.insert("23-1900-0000001-1.pdf".into(), "https://drive/multa".into());
        FakeLinks(map)
    }

    fn row<'a>(table: &'a Table, proa: &str) -> &'a Record {
        table
            .rows
            .iter()
            .find(|r| record_key(&r.process_id) == digits_only(proa))
            .unwrap()
    }

    #[tokio::test]
    async fn first_run_inserts_and_links() {
        let conn = memory_db();
        let status = FakeStatus::default();
        let links = links();
        let services = Services::new(&PdftotextSource, &status, &links);
        let summary = run(&conn, &settings(false), services, today()).await.unwrap();

        assert_eq!(summary.documents, 3);
        assert_eq!(summary.counts.inserted, 2);
        assert_eq!(summary.counts.dropped, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.links_attached, 1);
        assert_eq!(summary.rows, 2);
        assert_eq!(status.calls.lock().unwrap().len(), 2);

        let table = db::load_table(&conn).unwrap();
        let multa = row(&table, MULTA);
        assert_eq!(multa.process_id, hyperlink("https://drive/multa", MULTA));
        assert_eq!(multa.company_name, "ACME COMERCIO DE MATERIAIS LTDA");
        assert_eq!(multa.penalty_type, "Multa");
        assert_eq!(multa.penalty_percent, "5");
        assert_eq!(multa.penalty_months, "12 meses");
        assert_eq!(multa.impediment_flag, "Sim");
        assert_eq!(multa.remote_status, "Em andamento");
        assert_eq!(multa.last_review_date, "20/03/2024");
        assert_eq!(multa.last_document_update_date, "15/01/2024");

        let adv = row(&table, ADVERTENCIA);
        assert_eq!(adv.penalty_type, "Advertência");
        assert_eq!(adv.penalty_percent, "");
        assert_eq!(adv.impediment_flag, "Não");
    }

    #[tokio::test]
    async fn second_run_skips_without_extracting() {
        let conn = memory_db();
        let first = FakeStatus::default();
        let links = links();
        let services = Services::new(&PdftotextSource, &first, &links);
        run(&conn, &settings(false), services, today()).await.unwrap();
        let before = db::load_table(&conn).unwrap();

        let second = FakeStatus::default();
        let services = Services::new(&PdftotextSource, &second, &links);
        let summary = run(&conn, &settings(false), services, today()).await.unwrap();
        assert_eq!(summary.counts.skipped, 2);
        assert_eq!(summary.counts.inserted + summary.counts.updated, 0);
        assert!(second.calls.lock().unwrap().is_empty());
        assert_eq!(db::load_table(&conn).unwrap(), before);
    }

    #[tokio::test]
    async fn force_refresh_updates_and_keeps_links() {
        let conn = memory_db();
        let status = FakeStatus::default();
        let links = links();
        let services = Services::new(&PdftotextSource, &status, &links);
        run(&conn, &settings(false), services, today()).await.unwrap();

        let later = parse_date("21/03/2024").unwrap();
        let no_links = FakeLinks(LinkMap::new());
        let services = Services::new(&PdftotextSource, &status, &no_links);
        let summary = run(&conn, &settings(true), services, later).await.unwrap();
        assert_eq!(summary.counts.updated, 2);

        let table = db::load_table(&conn).unwrap();
        let multa = row(&table, MULTA);
        assert_eq!(multa.last_review_date, "21/03/2024");
        assert_eq!(multa.process_id, hyperlink("https://drive/multa", MULTA));
    }

    /// Extraction that breaks on the fine document only.
    fn breaks_on_multa(doc: &Document, peek: &Peek, opts: &ExtractOptions) -> Extraction {
        if peek.process_id.as_deref() == Some(MULTA) {
            panic!("unreadable ruling layout");
        }
        parser::process_document(doc, peek, opts)
    }

    #[tokio::test]
    async fn broken_document_does_not_stop_the_batch() {
        let conn = memory_db();
        let dir = PathBuf::from("tests/fixtures");
        let mut pages = HashMap::new();
        pages.insert(
            dir.join("advertencia.txt"),
            PdftotextSource.read_pages(&dir.join("advertencia.txt")),
        );
        pages.insert(
            dir.join("multa.txt"),
            PdftotextSource.read_pages(&dir.join("multa.txt")),
        );
        pages.insert(
            dir.join("sem_proa.txt"),
            vec![Page::from_text(
                "PROA 25/1900-0000003-3\ncontra a empresa GAMA SERVICOS LTDA, CNPJ 11.222.333/0001-81",
            )],
        );
        let source = FakeSource {
            pages,
            reads: RefCell::new(0),
        };
        let status = FakeStatus::default();
        let links = links();
        let mut services = Services::new(&source, &status, &links);
        services.extract = breaks_on_multa;

        let summary = run(&conn, &settings(false), services, today()).await.unwrap();
        assert_eq!(summary.documents, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.counts.inserted, 2);
        assert_eq!(*source.reads.borrow(), 3);
        assert_eq!(status.calls.lock().unwrap().len(), 2);

        let table = db::load_table(&conn).unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(row(&table, ADVERTENCIA).penalty_type, "Advertência");
        assert_eq!(row(&table, "25/1900-0000003-3").company_name, "GAMA SERVICOS LTDA");
        assert!(table
            .rows
            .iter()
            .all(|r| record_key(&r.process_id) != digits_only(MULTA)));
    }

    #[tokio::test]
    async fn missing_table_aborts_before_reading() {
        let conn = Connection::open_in_memory().unwrap();
        let source = FakeSource {
            pages: HashMap::new(),
            reads: RefCell::new(0),
        };
        let status = FakeStatus::default();
        let links = links();
        let services = Services::new(&source, &status, &links);
        let err = run(&conn, &settings(false), services, today()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BatchError>(),
            Some(BatchError::MissingTable(_))
        ));
        assert_eq!(*source.reads.borrow(), 0);
    }

    #[tokio::test]
    async fn missing_documents_dir_is_fatal() {
        let conn = memory_db();
        let mut s = settings(false);
        s.documents_dir = PathBuf::from("tests/nowhere");
        let status = FakeStatus::default();
        let links = links();
        let services = Services::new(&PdftotextSource, &status, &links);
        let err = run(&conn, &s, services, today()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BatchError>(),
            Some(BatchError::DocumentsDir(_))
        ));
    }

    #[tokio::test]
    async fn checkpoints_save_midway() {
        let conn = memory_db();
        let mut s = settings(false);
        s.checkpoint_every = Some(1);
        let status = FakeStatus::default();
        let links = links();
        let services = Services::new(&PdftotextSource, &status, &links);
        let summary = run(&conn, &s, services, today()).await.unwrap();
        assert_eq!(summary.rows, 2);
        assert_eq!(db::load_table(&conn).unwrap().rows.len(), 2);
    }

    #[tokio::test]
    async fn assemble_without_identifier_skips_lookup() {
        let status = FakeStatus::default();
        let doc = Document::new(vec![Page::from_text("contra a empresa ACME LTDA, CNPJ 12.345.678/0001-99")]);
        let peek = parser::peek(&doc);
        let extraction = parser::process_document(&doc, &peek, &ExtractOptions::default());
        let record = assemble(extraction, &status, Duration::ZERO, today()).await;
        assert_eq!(record.remote_status, "");
        assert_eq!(record.company_name, "ACME LTDA");
        assert!(status.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn relink_wraps_stored_rows() {
        let conn = memory_db();
        let table = Table {
            rows: vec![Record {
                process_id: MULTA.to_string(),
                ..Default::default()
            }],
        };
        db::save_table(&conn, &table).unwrap();
        assert_eq!(relink(&conn, &links()).await.unwrap(), 1);
        assert_eq!(relink(&conn, &links()).await.unwrap(), 0);
    }
}

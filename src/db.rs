use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;

use crate::error::BatchError;
use crate::links::display_value;

pub const TABLE: &str = "processos";

/// Column order of the persisted table.
pub const COLUMNS: [&str; 14] = [
    "numero_contrato",
    "nome_empresa",
    "cnpj_empresa",
    "proa_notificatorio",
    "proa_contrato",
    "status_processo",
    "tipo_penalidade",
    "percentual_multa",
    "penalidade_meses",
    "impedimento_licitar",
    "data_penalidade",
    "data_ultima_revisao",
    "ultima_atualizacao_processo",
    "divida_ativa",
];

pub const DATE_FORMAT: &str = "%d/%m/%Y";

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok()
}

pub fn format_date(d: NaiveDate) -> String {
    d.format(DATE_FORMAT).to_string()
}

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    let columns: Vec<String> = COLUMNS
        .iter()
        .map(|c| format!("{c} TEXT NOT NULL DEFAULT ''"))
        .collect();
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {TABLE} (
            id INTEGER PRIMARY KEY,
            {}
        );",
        columns.join(",\n            ")
    ))?;
    Ok(())
}

// ── Rows ──

/// One row per notification process. Every cell is display text: dates as
/// `dd/mm/yyyy`, failed extractions as `ERRO: ...`, not-applicable as empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Record {
    #[serde(rename = "numero_contrato")]
    pub contract_number: String,
    #[serde(rename = "nome_empresa")]
    pub company_name: String,
    #[serde(rename = "cnpj_empresa")]
    pub company_tax_id: String,
    #[serde(rename = "proa_notificatorio")]
    pub process_id: String,
    #[serde(rename = "proa_contrato")]
    pub parent_process_id: String,
    #[serde(rename = "status_processo")]
    pub remote_status: String,
    #[serde(rename = "tipo_penalidade")]
    pub penalty_type: String,
    #[serde(rename = "percentual_multa")]
    pub penalty_percent: String,
    #[serde(rename = "penalidade_meses")]
    pub penalty_months: String,
    #[serde(rename = "impedimento_licitar")]
    pub impediment_flag: String,
    #[serde(rename = "data_penalidade")]
    pub penalty_date: String,
    #[serde(rename = "data_ultima_revisao")]
    pub last_review_date: String,
    #[serde(rename = "ultima_atualizacao_processo")]
    pub last_document_update_date: String,
    #[serde(rename = "divida_ativa")]
    pub active_debt: String,
}

impl Record {
    /// Cells in [`COLUMNS`] order.
    pub fn values(&self) -> [&str; 14] {
        [
            &self.contract_number,
            &self.company_name,
            &self.company_tax_id,
            &self.process_id,
            &self.parent_process_id,
            &self.remote_status,
            &self.penalty_type,
            &self.penalty_percent,
            &self.penalty_months,
            &self.impediment_flag,
            &self.penalty_date,
            &self.last_review_date,
            &self.last_document_update_date,
            &self.active_debt,
        ]
    }

    /// Build from cells in [`COLUMNS`] order; missing trailing cells are empty.
    pub fn from_values(values: Vec<String>) -> Self {
        let mut it = values.into_iter();
        let mut next = || it.next().unwrap_or_default();
        Record {
            contract_number: next(),
            company_name: next(),
            company_tax_id: next(),
            process_id: next(),
            parent_process_id: next(),
            remote_status: next(),
            penalty_type: next(),
            penalty_percent: next(),
            penalty_months: next(),
            impediment_flag: next(),
            penalty_date: next(),
            last_review_date: next(),
            last_document_update_date: next(),
            active_debt: next(),
        }
    }

    pub fn document_date(&self) -> Option<NaiveDate> {
        parse_date(&self.last_document_update_date)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub rows: Vec<Record>,
}

// ── Load / save ──

pub fn table_exists(conn: &Connection) -> Result<bool> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [TABLE],
        |r| r.get(0),
    )?;
    Ok(n > 0)
}

fn present_columns(conn: &Connection) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
    let names = stmt
        .query_map([TABLE], |row| row.get(0))?
        .collect::<Result<HashSet<String>, _>>()?;
    Ok(names)
}

/// Load the whole table. Columns missing from the stored table read as empty.
pub fn load_table(conn: &Connection) -> Result<Table> {
    if !table_exists(conn)? {
        return Err(BatchError::MissingTable(TABLE.to_string()).into());
    }
    let present = present_columns(conn)?;
    let select: Vec<String> = COLUMNS
        .iter()
        .map(|c| {
            if present.contains(*c) {
                format!("CAST(COALESCE({c}, '') AS TEXT)")
            } else {
                "''".to_string()
            }
        })
        .collect();

    let sql = format!("SELECT {} FROM {TABLE} ORDER BY rowid", select.join(", "));
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            let values = (0..COLUMNS.len())
                .map(|i| row.get::<_, String>(i))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(Record::from_values(values))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Table { rows })
}

/// Replace the stored table's contents with `table`.
pub fn save_table(conn: &Connection, table: &Table) -> Result<usize> {
    if !table_exists(conn)? {
        return Err(BatchError::MissingTable(TABLE.to_string()).into());
    }
    let present = present_columns(conn)?;
    let tx = conn.unchecked_transaction()?;
    for c in COLUMNS.iter().filter(|c| !present.contains(**c)) {
        tx.execute_batch(&format!(
            "ALTER TABLE {TABLE} ADD COLUMN {c} TEXT NOT NULL DEFAULT ''"
        ))?;
    }
    tx.execute(&format!("DELETE FROM {TABLE}"), [])?;
    {
        let placeholders: Vec<String> = (1..=COLUMNS.len()).map(|i| format!("?{i}")).collect();
        let mut stmt = tx.prepare(&format!(
            "INSERT INTO {TABLE} ({}) VALUES ({})",
            COLUMNS.join(", "),
            placeholders.join(", ")
        ))?;
        for r in &table.rows {
            stmt.execute(rusqlite::params_from_iter(r.values()))?;
        }
    }
    tx.commit()?;
    Ok(table.rows.len())
}

// ── Stats ──

pub struct Stats {
    pub total: usize,
    pub active: usize,
    pub errors: usize,
    /// Rows per status text, most common first; empty status as "Sem status".
    pub by_status: Vec<(String, usize)>,
    /// (process number, company) of rows with no status.
    pub without_status: Vec<(String, String)>,
}

pub fn get_stats(table: &Table) -> Stats {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut without_status = Vec::new();
    let mut active = 0;
    let mut errors = 0;

    for r in &table.rows {
        let status = r.remote_status.trim();
        let lower = status.to_lowercase();
        if lower.contains("ativo") {
            active += 1;
        }
        if lower.contains("erro") {
            errors += 1;
        }
        let label = if status.is_empty() {
            without_status.push((display_value(&r.process_id), r.company_name.clone()));
            "Sem status".to_string()
        } else {
            status.to_string()
        };
        *counts.entry(label).or_default() += 1;
    }

    let mut by_status: Vec<(String, usize)> = counts.into_iter().collect();
    by_status.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    Stats {
        total: table.rows.len(),
        active,
        errors,
        by_status,
        without_status,
    }
}

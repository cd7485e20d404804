pub mod company;
pub mod contract;
pub mod penalty;
pub mod process;
pub mod tax_id;
pub mod words;

use std::fmt::Display;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::trace;

use crate::db::{format_date, Record};
use penalty::{Months, PenaltyType};

/// Prefix of a cell whose extraction failed.
pub const ERROR_PREFIX: &str = "ERRO:";

/// Outcome of one field extractor.
///
/// `NotApplicable` is a legitimate empty (a warning carries no fine);
/// `Failed` means the rule should have applied but nothing usable was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Field<T> {
    Found(T),
    NotApplicable,
    Failed(String),
}

impl<T> Field<T> {
    pub fn failed(reason: impl Into<String>) -> Self {
        Field::Failed(reason.into())
    }

    pub fn from_option(value: Option<T>, reason: &str) -> Self {
        match value {
            Some(v) => Field::Found(v),
            None => Field::failed(reason),
        }
    }

    pub fn found(&self) -> Option<&T> {
        match self {
            Field::Found(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Field::Failed(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Field<U> {
        match self {
            Field::Found(v) => Field::Found(f(v)),
            Field::NotApplicable => Field::NotApplicable,
            Field::Failed(r) => Field::Failed(r),
        }
    }
}

impl<T: Display> Field<T> {
    /// Cell text: the value, empty for not-applicable, `ERRO: <reason>` for
    /// failures.
    pub fn to_cell(&self) -> String {
        match self {
            Field::Found(v) => v.to_string(),
            Field::NotApplicable => String::new(),
            Field::Failed(reason) => format!("{ERROR_PREFIX} {reason}"),
        }
    }
}

/// A named candidate rule.
pub type Strategy<'a, T> = (&'static str, &'a dyn Fn(&str) -> Option<T>);

/// Run strategies in order over `text`; the first that yields a value wins.
pub fn first_success<T>(text: &str, strategies: &[Strategy<'_, T>]) -> Option<T> {
    strategies.iter().find_map(|(name, run)| {
        let found = run(text);
        if found.is_some() {
            trace!("strategy '{}' matched", name);
        }
        found
    })
}

/// Every field pulled out of one document, before the remote status is known.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Extraction {
    pub process_id: Option<String>,
    pub contract_number: Field<String>,
    pub company_name: Field<String>,
    pub company_tax_id: Field<String>,
    pub parent_process_id: Field<String>,
    pub penalty_type: Field<PenaltyType>,
    pub penalty_percent: Field<u32>,
    pub penalty_months: Field<Months>,
    pub impediment: bool,
    pub penalty_date: Field<NaiveDate>,
    pub active_debt: Field<String>,
    pub document_date: Option<NaiveDate>,
}

impl Extraction {
    /// Clear the fine-derived fields when the ruling carries no fine, or when
    /// the penalty type could not be determined.
    pub fn apply_override(&mut self) {
        let no_fine = self.penalty_type.is_failed()
            || matches!(
                self.penalty_type,
                Field::Found(PenaltyType::Advertencia | PenaltyType::NaoAplicacao)
            );
        if no_fine {
            self.penalty_percent = Field::NotApplicable;
            self.penalty_months = Field::NotApplicable;
            self.active_debt = Field::NotApplicable;
        }
    }

    /// Assemble the full row. Every column is present; absent values are
    /// empty strings.
    pub fn into_record(self, remote_status: String, review_date: NaiveDate) -> Record {
        Record {
            contract_number: self.contract_number.to_cell(),
            company_name: self.company_name.to_cell(),
            company_tax_id: self.company_tax_id.to_cell(),
            process_id: self.process_id.unwrap_or_default(),
            parent_process_id: self.parent_process_id.to_cell(),
            remote_status,
            penalty_type: self.penalty_type.to_cell(),
            penalty_percent: self.penalty_percent.to_cell(),
            penalty_months: self.penalty_months.to_cell(),
            impediment_flag: (if self.impediment { "Sim" } else { "Não" }).to_string(),
            penalty_date: self.penalty_date.map(format_date).to_cell(),
            last_review_date: format_date(review_date),
            last_document_update_date: self.document_date.map(format_date).unwrap_or_default(),
            active_debt: self.active_debt.to_cell(),
        }
    }
}

// ── Tests ──

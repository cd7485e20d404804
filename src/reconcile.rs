use std::collections::HashMap;

use chrono::NaiveDate;

use crate::db::{Record, Table};
use crate::links::{display_value, is_hyperlink};
use crate::parser::normalize::digits_only;

/// Dedup key of a process-number cell: the digits of what the reader sees,
/// so a hyperlinked cell and a raw one with the same number collide.
pub fn record_key(process_id: &str) -> String {
    digits_only(&display_value(process_id))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// No row with this key yet.
    Insert,
    /// Overwrite the row at this position.
    Update(usize),
    /// The row at this position is already current.
    Skip(usize),
    /// No usable key; the record cannot be deduplicated.
    Drop,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub dropped: usize,
}

impl Counts {
    fn count(&mut self, decision: Decision) {
        match decision {
            Decision::Insert => self.inserted += 1,
            Decision::Update(_) => self.updated += 1,
            Decision::Skip(_) => self.skipped += 1,
            Decision::Drop => self.dropped += 1,
        }
    }
}

/// A table being reconciled, indexed by dedup key.
///
/// Rows loaded with duplicate keys keep their first occurrence as the target
/// of updates.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    table: Table,
    index: HashMap<String, usize>,
    counts: Counts,
}

impl Ledger {
    pub fn new(table: Table) -> Self {
        let mut index = HashMap::new();
        for (i, row) in table.rows.iter().enumerate() {
            let key = record_key(&row.process_id);
            if !key.is_empty() {
                index.entry(key).or_insert(i);
            }
        }
        Ledger {
            table,
            index,
            counts: Counts::default(),
        }
    }

    /// Decide what to do with a document for `key` that declares
    /// `document_date`, before any extraction work is done.
    pub fn decide(&self, key: &str, document_date: Option<NaiveDate>, force: bool) -> Decision {
        if key.is_empty() {
            return Decision::Drop;
        }
        let Some(&i) = self.index.get(key) else {
            return Decision::Insert;
        };
        if force {
            return Decision::Update(i);
        }
        match (document_date, self.table.rows[i].document_date()) {
            (Some(new), Some(stored)) if new <= stored => Decision::Skip(i),
            _ => Decision::Update(i),
        }
    }

    /// Apply a decision. Updates replace every field of the row; a hyperlink
    /// already wrapping the process number is kept.
    pub fn apply(&mut self, mut record: Record, decision: Decision) {
        self.counts.count(decision);
        match decision {
            Decision::Insert => {
                let key = record_key(&record.process_id);
                if key.is_empty() {
                    return;
                }
                self.index.insert(key, self.table.rows.len());
                self.table.rows.push(record);
            }
            Decision::Update(i) => {
                let existing = &mut self.table.rows[i];
                if is_hyperlink(&existing.process_id) {
                    record.process_id = existing.process_id.clone();
                }
                *existing = record;
            }
            Decision::Skip(_) | Decision::Drop => {}
        }
    }

    /// Count a decision that was acted on without a record (skips and drops
    /// decided before extraction).
    pub fn note(&mut self, decision: Decision) {
        self.counts.count(decision);
    }

    pub fn counts(&self) -> Counts {
        self.counts
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Final table state, without rows whose process number is empty.
    pub fn into_table(self) -> Table {
        finalize(self.table)
    }
}

pub fn finalize(mut table: Table) -> Table {
    table.rows.retain(|r| !record_key(&r.process_id).is_empty());
    table
}

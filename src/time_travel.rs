//! Comparisons and merges across snapshots.
//!
//! Row identity is the transaction id. Compare and consolidate work on
//! materialised [`Transaction`]s; nothing here writes to an existing snapshot.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{NaiveDate, NaiveDateTime};
use polars::datatypes::TimeUnit;
use polars::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{LedgerError, Result};
use crate::model::{self, Entry, Transaction};
use crate::schema::audit;
use crate::snapshot::{SnapshotInfo, SnapshotStore};

pub const CONSOLIDATED_TAG: &str = "consolidated";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub min: Option<NaiveDate>,
    pub max: Option<NaiveDate>,
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.min, self.max) {
            (Some(min), Some(max)) => write!(f, "{min} .. {max}"),
            _ => write!(f, "empty"),
        }
    }
}

pub fn date_range(rows: &[Transaction]) -> DateRange {
    let dates = rows.iter().map(|t| t.entry.transaction_date);
    DateRange {
        min: dates.clone().min(),
        max: dates.max(),
    }
}

// ── Compare ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ChangedRow {
    pub transaction_id: String,
    pub before: Entry,
    pub after: Entry,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowDiff {
    pub added: Vec<Transaction>,
    pub removed: Vec<Transaction>,
    pub changed: Vec<ChangedRow>,
    /// Ids carried by more than one row of the same snapshot. Such rows are
    /// paired by their order within the snapshot.
    pub duplicate_ids: Vec<String>,
}

impl RowDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Ids that appear on more than one row, sorted.
pub fn duplicate_ids(rows: &[Transaction]) -> BTreeSet<String> {
    let mut seen = HashSet::new();
    rows.iter()
        .filter(|t| !seen.insert(t.transaction_id.as_str()))
        .map(|t| t.transaction_id.clone())
        .collect()
}

/// Key each row by `(id, n)` where `n` counts earlier rows with the same id.
fn keyed(rows: &[Transaction]) -> HashMap<(&str, usize), &Transaction> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    rows.iter()
        .map(|t| {
            let n = counts.entry(t.transaction_id.as_str()).or_insert(0);
            let key = (t.transaction_id.as_str(), *n);
            *n += 1;
            (key, t)
        })
        .collect()
}

/// Row-level difference from `before` to `after`, keyed by transaction id.
///
/// Provenance is ignored: re-ingesting identical content is not a change.
/// Output is ordered by transaction id.
pub fn diff_transactions(before: &[Transaction], after: &[Transaction]) -> RowDiff {
    let old = keyed(before);
    let new = keyed(after);

    let mut diff = RowDiff::default();
    for (key, t) in &new {
        match old.get(key) {
            None => diff.added.push((*t).clone()),
            Some(prev) if prev.entry != t.entry => diff.changed.push(ChangedRow {
                transaction_id: key.0.to_string(),
                before: prev.entry.clone(),
                after: t.entry.clone(),
            }),
            Some(_) => {}
        }
    }
    for (key, t) in &old {
        if !new.contains_key(key) {
            diff.removed.push((*t).clone());
        }
    }

    let mut duplicates = duplicate_ids(before);
    duplicates.extend(duplicate_ids(after));
    if !duplicates.is_empty() {
        warn!(ids = duplicates.len(), "compare: ids shared by several rows of one snapshot");
    }
    diff.duplicate_ids = duplicates.into_iter().collect();

    diff.added.sort_by(|a, b| a.transaction_id.cmp(&b.transaction_id));
    diff.removed.sort_by(|a, b| a.transaction_id.cmp(&b.transaction_id));
    diff.changed.sort_by(|a, b| a.transaction_id.cmp(&b.transaction_id));
    diff
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionStats {
    pub id: String,
    pub created_at: NaiveDateTime,
    pub rows: usize,
    pub columns: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnChanges {
    pub new_columns: Vec<String>,
    pub removed_columns: Vec<String>,
    pub common_columns: Vec<String>,
}

fn column_changes(before: &DataFrame, after: &DataFrame) -> ColumnChanges {
    let old: BTreeSet<String> = before.get_column_names().iter().map(|c| c.to_string()).collect();
    let new: BTreeSet<String> = after.get_column_names().iter().map(|c| c.to_string()).collect();
    ColumnChanges {
        new_columns: new.difference(&old).cloned().collect(),
        removed_columns: old.difference(&new).cloned().collect(),
        common_columns: old.intersection(&new).cloned().collect(),
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotDiff {
    pub from: VersionStats,
    pub to: VersionStats,
    pub rows: RowDiff,
    pub columns: ColumnChanges,
    pub from_dates: DateRange,
    pub to_dates: DateRange,
}

impl SnapshotDiff {
    pub fn row_change(&self) -> i64 {
        self.to.rows as i64 - self.from.rows as i64
    }
}

// ── Version history ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct VersionChange {
    pub info: SnapshotInfo,
    pub rows: usize,
    pub size_bytes: u64,
    pub dates: DateRange,
}

#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub account_code: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl AuditFilter {
    fn matches(&self, t: &Transaction) -> bool {
        let date = t.entry.transaction_date;
        self.account_code
            .as_deref()
            .is_none_or(|code| t.entry.account_code == code)
            && self.from.is_none_or(|from| date >= from)
            && self.to.is_none_or(|to| date <= to)
    }
}

pub struct AuditTrail {
    /// Matching rows with `_snapshot_id` and `_snapshot_created_at` attached,
    /// ordered by snapshot time, then transaction date.
    pub frame: DataFrame,
    pub skipped: Vec<LedgerError>,
}

#[derive(Debug, Clone, Default)]
pub struct Consolidation {
    pub transactions: Vec<Transaction>,
    /// Ids carried by several rows of one input snapshot. All of those rows
    /// are kept, and a newer snapshot replaces them as a group.
    pub duplicate_ids: Vec<String>,
}

/// Last writer wins by snapshot `(created_at, id)`; result sorted by
/// transaction date, booking number, id.
pub fn merge_last_writer_wins(mut inputs: Vec<(SnapshotInfo, Vec<Transaction>)>) -> Consolidation {
    inputs.sort_by(|(a, _), (b, _)| (a.created_at(), &a.id).cmp(&(b.created_at(), &b.id)));

    let mut duplicates = BTreeSet::new();
    let mut merged: HashMap<String, Vec<Transaction>> = HashMap::new();
    for (info, rows) in inputs {
        let shared = duplicate_ids(&rows);
        if !shared.is_empty() {
            warn!(snapshot = %info.id, ids = shared.len(), "consolidate: ids shared by several rows");
            duplicates.extend(shared);
        }
        let mut by_id: HashMap<String, Vec<Transaction>> = HashMap::new();
        for t in rows {
            by_id.entry(t.transaction_id.clone()).or_default().push(t);
        }
        merged.extend(by_id);
    }

    let mut out: Vec<Transaction> = merged.into_values().flatten().collect();
    out.sort_by(|a, b| {
        (a.entry.transaction_date, a.entry.booking_number, &a.transaction_id, &a.entry).cmp(&(
            b.entry.transaction_date,
            b.entry.booking_number,
            &b.transaction_id,
            &b.entry,
        ))
    });
    Consolidation {
        transactions: out,
        duplicate_ids: duplicates.into_iter().collect(),
    }
}

pub struct TimeTravel {
    store: SnapshotStore,
}

impl TimeTravel {
    pub fn new(store: SnapshotStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    fn load_both(&self, info: &SnapshotInfo) -> Result<(DataFrame, Vec<Transaction>)> {
        let df = self.store.load(info)?;
        let rows = model::from_frame(&df).map_err(|err| LedgerError::recoverable(&info.path, err))?;
        Ok((df, rows))
    }

    /// The data as of the end of `date`.
    pub fn query_at_date(&self, date: NaiveDate) -> Result<(SnapshotInfo, DataFrame)> {
        let info = self.store.as_of(date)?;
        info!(snapshot = %info.id, %date, "resolved as-of query");
        let df = self.store.load(&info)?;
        Ok((info, df))
    }

    pub fn compare(&self, a: &str, b: &str) -> Result<SnapshotDiff> {
        let from = self.store.get(a)?;
        let to = self.store.get(b)?;
        let (from_df, from_rows) = self.load_both(&from)?;
        let (to_df, to_rows) = self.load_both(&to)?;

        Ok(SnapshotDiff {
            rows: diff_transactions(&from_rows, &to_rows),
            columns: column_changes(&from_df, &to_df),
            from_dates: date_range(&from_rows),
            to_dates: date_range(&to_rows),
            from: VersionStats {
                created_at: from.created_at(),
                id: from.id,
                rows: from_df.height(),
                columns: from_df.width(),
            },
            to: VersionStats {
                created_at: to.created_at(),
                id: to.id,
                rows: to_df.height(),
                columns: to_df.width(),
            },
        })
    }

    pub fn consolidate(&self, ids: &[&str]) -> Result<Consolidation> {
        if ids.is_empty() {
            return Err(LedgerError::Input("nothing to consolidate".into()));
        }
        let mut seen = BTreeSet::new();
        let mut inputs = Vec::new();
        for id in ids {
            let info = self.store.get(id)?;
            if !seen.insert(info.id.clone()) {
                continue;
            }
            let rows = self.store.load_transactions(&info)?;
            inputs.push((info, rows));
        }
        let count = inputs.len();
        let merged = merge_last_writer_wins(inputs);
        info!(
            snapshots = count,
            rows = merged.transactions.len(),
            duplicate_ids = merged.duplicate_ids.len(),
            "consolidated"
        );
        Ok(merged)
    }

    /// Consolidate and publish the result as a new snapshot.
    pub fn consolidate_into_store(&self, ids: &[&str], created_at: NaiveDateTime) -> Result<SnapshotInfo> {
        let merged = self.consolidate(ids)?;
        self.store
            .write_transactions(Some(CONSOLIDATED_TAG), created_at, &merged.transactions)
    }

    /// Snapshots newer than `id`, newest first.
    pub fn changes_since(&self, id: &str) -> Result<Vec<VersionChange>> {
        let since = self.store.get(id)?;
        let key = (since.created_at(), since.id.clone());

        let mut changes = Vec::new();
        for info in self.store.catalog()? {
            if (info.created_at(), info.id.clone()) <= key {
                continue;
            }
            let rows = self.store.load_transactions(&info)?;
            let size_bytes = std::fs::metadata(&info.path).map(|m| m.len()).unwrap_or(0);
            changes.push(VersionChange {
                rows: rows.len(),
                dates: date_range(&rows),
                size_bytes,
                info,
            });
        }
        Ok(changes)
    }

    /// Every matching row in every snapshot. Unreadable snapshots are skipped
    /// and reported.
    pub fn audit_trail(&self, filter: &AuditFilter) -> Result<AuditTrail> {
        let mut catalog = self.store.catalog()?;
        catalog.reverse();

        let mut skipped = Vec::new();
        let mut rows: Vec<Transaction> = Vec::new();
        let mut snapshot_ids: Vec<String> = Vec::new();
        let mut snapshot_times: Vec<i64> = Vec::new();

        for info in catalog {
            let loaded = match self.store.load_transactions(&info) {
                Ok(loaded) => loaded,
                Err(err) => {
                    warn!(snapshot = %info.id, %err, "audit: snapshot skipped");
                    skipped.push(err);
                    continue;
                }
            };
            let mut matching: Vec<Transaction> = loaded.into_iter().filter(|t| filter.matches(t)).collect();
            matching.sort_by_key(|t| t.entry.transaction_date);
            for t in matching {
                snapshot_ids.push(info.id.clone());
                snapshot_times.push(info.created_at().and_utc().timestamp_micros());
                rows.push(t);
            }
        }

        let mut frame = model::to_frame(&rows)?;
        frame.with_column(Column::new(audit::SNAPSHOT_ID.into(), &snapshot_ids))?;
        frame.with_column(
            Column::new(audit::SNAPSHOT_CREATED_AT.into(), &snapshot_times)
                .cast(&DataType::Datetime(TimeUnit::Microseconds, None))?,
        )?;
        Ok(AuditTrail { frame, skipped })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{identify, Provenance};
    use crate::snapshot::SnapshotName;
    use rust_decimal::Decimal;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn rows(specs: &[(&str, u32, i64)]) -> Vec<Transaction> {
        let loaded = date(1).and_hms_opt(0, 0, 0).unwrap();
        identify(
            specs
                .iter()
                .map(|(acc, d, cents)| {
                    let e = Entry::new(*acc, date(*d), Decimal::new(*cents, 2), Decimal::ZERO);
                    (e, Provenance::new("t.csv", loaded))
                })
                .collect(),
        )
        .transactions
    }

    fn info(tag: &str, day: u32) -> SnapshotInfo {
        let name = SnapshotName::new("ds", Some(tag), date(day).and_hms_opt(12, 0, 0).unwrap());
        SnapshotInfo {
            id: name.stem(),
            path: name.file_name().into(),
            name,
        }
    }

    #[test]
    fn self_diff_is_empty() {
        let a = rows(&[("1000", 1, 100), ("2000", 2, 250)]);
        assert!(diff_transactions(&a, &a).is_empty());
    }

    #[test]
    fn diff_finds_added_and_removed() {
        let a = rows(&[("1000", 1, 100), ("2000", 2, 250)]);
        let b = rows(&[("1000", 1, 100), ("3000", 3, 999)]);
        let d = diff_transactions(&a, &b);
        assert_eq!(d.added.len(), 1);
        assert_eq!(d.added[0].entry.account_code, "3000");
        assert_eq!(d.removed.len(), 1);
        assert_eq!(d.removed[0].entry.account_code, "2000");
        assert!(d.changed.is_empty());
    }

    #[test]
    fn diff_reports_changed_content_under_same_id() {
        let a = rows(&[("1000", 1, 100)]);
        let mut b = a.clone();
        b[0].entry.vat_code = Some("H21".into());
        let d = diff_transactions(&a, &b);
        assert_eq!(d.changed.len(), 1);
        assert_eq!(d.changed[0].after.vat_code.as_deref(), Some("H21"));
    }

    #[test]
    fn newer_snapshot_wins_on_overlap() {
        let older = rows(&[("1000", 1, 100), ("2000", 2, 200)]);
        let mut newer = rows(&[("1000", 1, 100)]);
        newer[0].entry.account_name = Some("Kas".into());

        // input order must not matter
        let merged = merge_last_writer_wins(vec![(info("b", 20), newer), (info("a", 10), older)]).transactions;
        assert_eq!(merged.len(), 2);
        let kas = merged.iter().find(|t| t.entry.account_code == "1000").unwrap();
        assert_eq!(kas.entry.account_name.as_deref(), Some("Kas"));
        assert!(merged[0].entry.transaction_date <= merged[1].entry.transaction_date);
    }

    #[test]
    fn shared_ids_are_reported_and_replaced_as_a_group() {
        let older = rows(&[("1000", 1, 100), ("2000", 2, 200)]);
        let mut doubled = older.clone();
        doubled[1].transaction_id = doubled[0].transaction_id.clone();
        let newer = rows(&[("1000", 1, 100)]);

        let kept = merge_last_writer_wins(vec![(info("a", 10), doubled.clone())]);
        assert_eq!(kept.transactions.len(), 2);
        assert_eq!(kept.duplicate_ids, [doubled[0].transaction_id.clone()]);

        let replaced = merge_last_writer_wins(vec![(info("a", 10), doubled.clone()), (info("b", 20), newer)]);
        assert_eq!(replaced.transactions.len(), 1);

        let d = diff_transactions(&older, &doubled);
        assert_eq!(d.duplicate_ids, [doubled[0].transaction_id.clone()]);
        assert_eq!(d.changed.len(), 0);
        assert_eq!((d.added.len(), d.removed.len()), (1, 1));
    }

    #[test]
    fn date_range_of_empty_is_none() {
        assert_eq!(date_range(&[]), DateRange::default());
        let r = date_range(&rows(&[("1", 5, 1), ("1", 2, 2)]));
        assert_eq!((r.min, r.max), (Some(date(2)), Some(date(5))));
    }

    #[test]
    fn audit_filter_bounds_are_inclusive() {
        let t = &rows(&[("1000", 10, 1)])[0];
        let f = AuditFilter {
            account_code: Some("1000".into()),
            from: Some(date(10)),
            to: Some(date(10)),
        };
        assert!(f.matches(t));
        assert!(!AuditFilter { account_code: Some("2000".into()), ..Default::default() }.matches(t));
    }
}

//! Read side for the presentation layer: filter state → predicate → rows.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use polars::prelude::*;
use tracing::debug;

use crate::error::{LedgerError, Result};
use crate::models::ModelSet;
use crate::schema::{derived, provenance};
use crate::snapshot::{SnapshotSelector, SnapshotStore};
use crate::transform::Transformer;

const MONTH_NAMES: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

pub fn month_from_name(name: &str) -> Option<u32> {
    let name = name.trim().to_lowercase();
    if name.len() < 3 {
        return None;
    }
    MONTH_NAMES
        .iter()
        .position(|m| *m == name || (name.len() == 3 && m.starts_with(&name)))
        .map(|i| i as u32 + 1)
}

/// What the user has selected. Never mutated: every change returns a new
/// value.
///
/// Empty dimensions mean "no restriction" on that dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    years: BTreeSet<i32>,
    quarters: BTreeSet<u32>,
    months: BTreeSet<u32>,
    /// Source file names, matched against `_source_file`.
    source_files: BTreeSet<String>,
    snapshot: Option<SnapshotSelector>,
}

fn toggled<T: Ord + Clone>(set: &BTreeSet<T>, value: T) -> BTreeSet<T> {
    let mut next = set.clone();
    if !next.remove(&value) {
        next.insert(value);
    }
    next
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn years(&self) -> &BTreeSet<i32> {
        &self.years
    }

    pub fn quarters(&self) -> &BTreeSet<u32> {
        &self.quarters
    }

    pub fn months(&self) -> &BTreeSet<u32> {
        &self.months
    }

    pub fn source_files(&self) -> &BTreeSet<String> {
        &self.source_files
    }

    pub fn snapshot(&self) -> Option<&SnapshotSelector> {
        self.snapshot.as_ref()
    }

    pub fn toggle_year(&self, year: i32) -> Self {
        Self {
            years: toggled(&self.years, year),
            ..self.clone()
        }
    }

    pub fn toggle_quarter(&self, quarter: u32) -> Result<Self> {
        if !(1..=4).contains(&quarter) {
            return Err(LedgerError::Input(format!("quarter {quarter} out of range 1-4")));
        }
        Ok(Self {
            quarters: toggled(&self.quarters, quarter),
            ..self.clone()
        })
    }

    pub fn toggle_month(&self, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(LedgerError::Input(format!("month {month} out of range 1-12")));
        }
        Ok(Self {
            months: toggled(&self.months, month),
            ..self.clone()
        })
    }

    /// Accepts full English month names or three-letter abbreviations.
    pub fn toggle_month_name(&self, name: &str) -> Result<Self> {
        let month = month_from_name(name)
            .ok_or_else(|| LedgerError::Input(format!("unknown month '{name}'")))?;
        self.toggle_month(month)
    }

    /// Replace the whole calendar selection at once.
    pub fn with_calendar(&self, years: &[i32], quarters: &[u32], months: &[u32]) -> Result<Self> {
        if let Some(q) = quarters.iter().find(|q| !(1..=4).contains(*q)) {
            return Err(LedgerError::Input(format!("quarter {q} out of range 1-4")));
        }
        if let Some(m) = months.iter().find(|m| !(1..=12).contains(*m)) {
            return Err(LedgerError::Input(format!("month {m} out of range 1-12")));
        }
        Ok(Self {
            years: years.iter().copied().collect(),
            quarters: quarters.iter().copied().collect(),
            months: months.iter().copied().collect(),
            ..self.clone()
        })
    }

    pub fn toggle_source_file(&self, file: &str) -> Self {
        Self {
            source_files: toggled(&self.source_files, file.trim().to_string()),
            ..self.clone()
        }
    }

    /// Replace the source selection. An empty slice selects every file.
    pub fn with_source_files<S: AsRef<str>>(&self, files: &[S]) -> Self {
        Self {
            source_files: files
                .iter()
                .map(|f| f.as_ref().trim().to_string())
                .filter(|f| !f.is_empty())
                .collect(),
            ..self.clone()
        }
    }

    /// `None` goes back to the marts of the last refresh.
    pub fn with_snapshot(&self, snapshot: Option<SnapshotSelector>) -> Self {
        Self {
            snapshot,
            ..self.clone()
        }
    }

    /// Drop every calendar and source selection; the snapshot choice stays.
    pub fn cleared(&self) -> Self {
        Self {
            snapshot: self.snapshot.clone(),
            ..Self::default()
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.years.is_empty()
            && self.quarters.is_empty()
            && self.months.is_empty()
            && self.source_files.is_empty()
    }

    /// Row predicate for a table with `schema`, or `None` for no restriction.
    ///
    /// A dimension is skipped when the table lacks its column.
    pub fn predicate_for(&self, schema: &Schema) -> Option<Expr> {
        let years: Vec<i32> = self.years.iter().copied().collect();
        let quarters: Vec<i32> = self.quarters.iter().map(|q| *q as i32).collect();
        let months: Vec<i32> = self.months.iter().map(|m| *m as i32).collect();

        let calendar = [
            (derived::TRANSACTION_YEAR, years),
            (derived::TRANSACTION_QUARTER, quarters),
            (derived::TRANSACTION_MONTH, months),
        ]
        .into_iter()
        .filter(|(column, values)| !values.is_empty() && schema.contains(column))
        .map(|(column, values)| {
            let allowed = Series::new(column.into(), values);
            col(column)
                .cast(DataType::Int32)
                .is_in(lit(allowed), false)
        });

        let sources = (!self.source_files.is_empty() && schema.contains(provenance::SOURCE_FILE))
            .then(|| {
                let files: Vec<&str> = self.source_files.iter().map(String::as_str).collect();
                let allowed = Series::new(provenance::SOURCE_FILE.into(), files);
                col(provenance::SOURCE_FILE)
                    .cast(DataType::String)
                    .is_in(lit(allowed), false)
            });

        calendar.chain(sources).reduce(|acc, e| acc.and(e))
    }
}

pub fn apply_filter(df: DataFrame, filter: &FilterState) -> Result<DataFrame> {
    match filter.predicate_for(df.schema()) {
        None => Ok(df),
        Some(predicate) => Ok(df.lazy().filter(predicate).collect()?),
    }
}

#[derive(Debug, Clone)]
pub struct Page {
    pub rows: DataFrame,
    /// Rows matching the filter before slicing.
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    pub fn has_more(&self) -> bool {
        self.offset + self.rows.height() < self.total
    }
}

struct Materialized {
    snapshot_id: String,
    tables: Vec<(String, DataFrame)>,
}

/// Query access to marts.
///
/// Without a selected snapshot, reads what the last refresh persisted. With
/// one, builds the models for that snapshot in memory; the most recent such
/// build is cached.
pub struct DataAccess {
    persisted: Arc<dyn Transformer>,
    store: SnapshotStore,
    models: ModelSet,
    cache: Mutex<Option<Arc<Materialized>>>,
}

impl DataAccess {
    pub fn new(persisted: Arc<dyn Transformer>, store: SnapshotStore) -> Result<Self> {
        Ok(Self {
            persisted,
            store,
            models: ModelSet::standard()?,
            cache: Mutex::new(None),
        })
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn mart_names(&self) -> &[String] {
        self.models.names()
    }

    fn materialized(&self, selector: &SnapshotSelector) -> Result<Arc<Materialized>> {
        let info = self.store.resolve(selector)?;
        let mut cache = self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(hit) = cache.as_ref().filter(|m| m.snapshot_id == info.id) {
            return Ok(Arc::clone(hit));
        }

        debug!(snapshot = %info.id, "materialising marts in memory");
        let tables = self.models.run(self.store.load(&info)?)?;
        let built = Arc::new(Materialized {
            snapshot_id: info.id,
            tables,
        });
        *cache = Some(Arc::clone(&built));
        Ok(built)
    }

    /// The unfiltered table `mart` for the snapshot the filter selects.
    pub fn table(&self, mart: &str, filter: &FilterState) -> Result<DataFrame> {
        match filter.snapshot() {
            None => self.persisted.read_table(mart),
            Some(selector) => {
                let built = self.materialized(selector)?;
                built
                    .tables
                    .iter()
                    .find(|(name, _)| name == mart)
                    .map(|(_, df)| df.clone())
                    .ok_or_else(|| LedgerError::NotFound(format!("table '{mart}'")))
            }
        }
    }

    pub fn query(&self, mart: &str, filter: &FilterState) -> Result<DataFrame> {
        apply_filter(self.table(mart, filter)?, filter)
    }

    pub fn query_page(&self, mart: &str, filter: &FilterState, offset: usize, limit: usize) -> Result<Page> {
        let all = self.query(mart, filter)?;
        let total = all.height();
        let rows = all.slice(offset.min(total) as i64, limit);
        Ok(Page {
            rows,
            total,
            offset,
            limit,
        })
    }
}

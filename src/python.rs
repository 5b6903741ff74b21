use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use pyo3::prelude::*;
use pyo3_polars::PyDataFrame;

use crate::query::{DataAccess, FilterState};
use crate::snapshot::{SnapshotSelector, SnapshotStore};
use crate::time_travel::TimeTravel;
use crate::transform::ModelTransformer;

/// Snapshot store handle for the dashboard process.
#[pyclass(name = "SnapshotStore")]
pub struct PySnapshotStore {
    store: SnapshotStore,
    access: DataAccess,
}

#[pymethods]
impl PySnapshotStore {
    #[new]
    #[pyo3(signature = (warehouse_dir, marts_dir, dataset=None))]
    fn new(warehouse_dir: PathBuf, marts_dir: PathBuf, dataset: Option<&str>) -> PyResult<Self> {
        let store = SnapshotStore::new(
            warehouse_dir,
            dataset.unwrap_or(crate::config::DEFAULT_DATASET),
        );
        let persisted = Arc::new(ModelTransformer::standard(store.clone(), marts_dir)?);
        let access = DataAccess::new(persisted, store.clone())?;
        Ok(Self { store, access })
    }

    /// `(id, row_count, created_at)` tuples, newest first. Unreadable
    /// snapshots are left out.
    fn list_snapshots(&self) -> PyResult<Vec<(String, usize, NaiveDateTime)>> {
        let listing = self.store.list()?;
        Ok(listing
            .snapshots
            .into_iter()
            .map(|s| (s.info.id.clone(), s.row_count, s.info.created_at()))
            .collect())
    }

    fn latest(&self) -> PyResult<String> {
        Ok(self.store.latest()?.id)
    }

    fn as_of(&self, date: NaiveDate) -> PyResult<String> {
        Ok(self.store.as_of(date)?.id)
    }

    /// Load a snapshot by id, `"latest"` or `YYYY-MM-DD`.
    #[pyo3(signature = (selector="latest"))]
    fn load(&self, selector: &str) -> PyResult<PyDataFrame> {
        let selector: SnapshotSelector = selector.parse()?;
        let info = self.store.resolve(&selector)?;
        Ok(PyDataFrame(self.store.load(&info)?))
    }

    fn compare(&self, a: &str, b: &str) -> PyResult<HashMap<String, i64>> {
        let diff = TimeTravel::new(self.store.clone()).compare(a, b)?;
        Ok(HashMap::from([
            ("added".to_string(), diff.rows.added.len() as i64),
            ("removed".to_string(), diff.rows.removed.len() as i64),
            ("changed".to_string(), diff.rows.changed.len() as i64),
            ("duplicate_ids".to_string(), diff.rows.duplicate_ids.len() as i64),
            ("row_change".to_string(), diff.row_change()),
        ]))
    }

    #[pyo3(signature = (mart, years=None, quarters=None, months=None, snapshot=None))]
    fn query(
        &self,
        mart: &str,
        years: Option<Vec<i32>>,
        quarters: Option<Vec<u32>>,
        months: Option<Vec<u32>>,
        snapshot: Option<&str>,
    ) -> PyResult<PyDataFrame> {
        let mut filter = FilterState::new().with_calendar(
            &years.unwrap_or_default(),
            &quarters.unwrap_or_default(),
            &months.unwrap_or_default(),
        )?;
        if let Some(s) = snapshot {
            filter = filter.with_snapshot(Some(s.parse::<SnapshotSelector>()?));
        }
        Ok(PyDataFrame(self.access.query(mart, &filter)?))
    }
}

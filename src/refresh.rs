//! Full pipeline refresh: ingest pending sources, rebuild the marts, then
//! check the data-quality flags. A quick refresh skips ingestion.
//!
//! At most one refresh runs at a time per manager; a second request while one
//! is in flight is rejected, never queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDateTime};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::analytics::QualityReport;
use crate::error::{LedgerError, Result};
use crate::ingest::{FileOutcome, IngestStatus, Ingestor};
use crate::snapshot::SnapshotInfo;
use crate::schema::models;
use crate::transform::{TransformRun, Transformer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshStep {
    CheckingSources,
    Ingesting { file: String, index: usize, total: usize },
    Transforming { snapshot_id: String },
    CheckingQuality,
    Finished,
}

#[derive(Debug)]
pub struct RefreshReport {
    pub run_id: Uuid,
    pub started_at: NaiveDateTime,
    pub duration: Duration,
    pub files: Vec<FileOutcome>,
    pub snapshot: SnapshotInfo,
    pub transform: TransformRun,
    /// `None` when the transformer does not produce the detail mart.
    pub quality: Option<QualityReport>,
}

impl RefreshReport {
    pub fn ingested(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(&f.result, Ok(r) if r.status == IngestStatus::Ingested))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.files.iter().filter(|f| f.result.is_err()).count()
    }
}

/// Clears the in-flight flag when dropped, including on early return.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct RefreshManager {
    ingestor: Ingestor,
    transformer: Arc<dyn Transformer>,
    running: AtomicBool,
}

impl RefreshManager {
    pub fn new(ingestor: Ingestor, transformer: Arc<dyn Transformer>) -> Self {
        Self {
            ingestor,
            transformer,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn try_start(&self) -> Result<RunningGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| RunningGuard(&self.running))
            .map_err(|_| LedgerError::ConcurrentRefreshRejected)
    }

    /// Run the pipeline, reporting each step to `progress` as it starts.
    ///
    /// Per-file ingestion failures are recorded in the report. A failed
    /// transformation is returned as is.
    pub fn refresh(&self, mut progress: impl FnMut(RefreshStep)) -> Result<RefreshReport> {
        let _guard = self.try_start()?;
        let run_id = Uuid::new_v4();
        let started_at = Local::now().naive_local();
        let started = Instant::now();
        info!(%run_id, "refresh started");

        progress(RefreshStep::CheckingSources);
        let pending = self.ingestor.pending()?;
        let total = pending.len();

        let mut files = Vec::with_capacity(total);
        for (index, path) in pending.into_iter().enumerate() {
            let file = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            progress(RefreshStep::Ingesting { file, index, total });
            let result = self.ingestor.ingest_file(&path, false);
            if let Err(err) = &result {
                warn!(%run_id, file = %path.display(), %err, "ingestion failed, continuing");
            }
            files.push(FileOutcome { path, result });
        }

        self.transform_latest(run_id, started_at, started, files, &mut progress)
    }

    /// Rebuild the marts from the latest snapshot without looking for new
    /// source files.
    pub fn quick_refresh(&self, mut progress: impl FnMut(RefreshStep)) -> Result<RefreshReport> {
        let _guard = self.try_start()?;
        let run_id = Uuid::new_v4();
        info!(%run_id, "quick refresh started");
        self.transform_latest(
            run_id,
            Local::now().naive_local(),
            Instant::now(),
            Vec::new(),
            &mut progress,
        )
    }

    fn transform_latest(
        &self,
        run_id: Uuid,
        started_at: NaiveDateTime,
        started: Instant,
        files: Vec<FileOutcome>,
        progress: &mut impl FnMut(RefreshStep),
    ) -> Result<RefreshReport> {
        let snapshot = self.ingestor.store().latest()?;
        progress(RefreshStep::Transforming {
            snapshot_id: snapshot.id.clone(),
        });
        let transform = self.transformer.run(&snapshot)?;

        progress(RefreshStep::CheckingQuality);
        let quality = self.check_quality(run_id)?;

        progress(RefreshStep::Finished);
        let duration = started.elapsed();
        info!(%run_id, snapshot = %snapshot.id, ?duration, "refresh finished");
        Ok(RefreshReport {
            run_id,
            started_at,
            duration,
            files,
            snapshot,
            transform,
            quality,
        })
    }

    fn check_quality(&self, run_id: Uuid) -> Result<Option<QualityReport>> {
        let details = match self.transformer.read_table(models::MART_TRANSACTION_DETAILS) {
            Ok(details) => details,
            Err(LedgerError::NotFound(_)) => {
                debug!(%run_id, "no transaction detail mart, quality check skipped");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        let report = QualityReport::from_details(&details)?;
        if !report.is_clean() {
            warn!(%run_id, flagged = report.flagged_rows(), "data-quality flags raised");
        }
        Ok(Some(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::SnapshotStore;
    use crate::transform::TableStats;
    use polars::prelude::DataFrame;

    struct Noop;

    impl Transformer for Noop {
        fn run(&self, snapshot: &SnapshotInfo) -> Result<TransformRun> {
            Ok(TransformRun {
                snapshot_id: snapshot.id.clone(),
                tables: vec![TableStats { name: "t".into(), rows: 0 }],
                duration: Duration::ZERO,
            })
        }

        fn read_table(&self, name: &str) -> Result<DataFrame> {
            Err(LedgerError::NotFound(name.into()))
        }
    }

    fn manager(dir: &std::path::Path) -> RefreshManager {
        let store = SnapshotStore::new(dir.join("warehouse"), "ds");
        RefreshManager::new(Ingestor::new(store, dir.join("raw")), Arc::new(Noop))
    }

    #[test]
    fn guard_rejects_second_start_and_releases() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        {
            let _first = m.try_start().unwrap();
            assert!(m.is_running());
            assert!(matches!(m.try_start(), Err(LedgerError::ConcurrentRefreshRejected)));
        }
        assert!(!m.is_running());
        assert!(m.try_start().is_ok());
    }

    #[test]
    fn empty_store_fails_and_releases_guard() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        let mut steps = Vec::new();
        let err = m.refresh(|s| steps.push(s)).unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
        assert_eq!(steps, [RefreshStep::CheckingSources]);
        assert!(!m.is_running());
    }

    #[test]
    fn quick_refresh_skips_ingestion_and_is_single_flight() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        let raw = dir.path().join("raw");
        std::fs::create_dir_all(&raw).unwrap();
        std::fs::write(raw.join("a.csv"), "account_code,transaction_date,debit_amount,credit_amount\n1000,2024-01-31,1.00,0\n").unwrap();

        // nothing ingested yet, so there is no snapshot to transform
        assert!(matches!(m.quick_refresh(|_| {}), Err(LedgerError::NotFound(_))));
        assert_eq!(m.ingestor.pending().unwrap().len(), 1);

        m.refresh(|_| {}).unwrap();
        let mut steps = Vec::new();
        let report = m.quick_refresh(|s| steps.push(s)).unwrap();
        assert!(report.files.is_empty());
        assert!(report.quality.is_none());
        assert!(matches!(steps[0], RefreshStep::Transforming { .. }));
        assert_eq!(steps[1..], [RefreshStep::CheckingQuality, RefreshStep::Finished]);

        let _held = m.try_start().unwrap();
        assert!(matches!(m.quick_refresh(|_| {}), Err(LedgerError::ConcurrentRefreshRejected)));
    }
}

//! Snapshot store: a directory of immutable, timestamp-tagged parquet files,
//! one per ingested (or consolidated) version of a dataset.
//!
//! File names follow `<dataset>_<source_tag>_<YYYYMMDD>_<HHMMSS>.parquet`, so
//! dataset, source tag and creation time can be recovered from the name alone.
//! Resolution (`latest`, `as_of`, explicit id) is done on names only and is
//! independent of directory listing order.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use polars::prelude::DataFrame;
use tracing::{debug, info, warn};

use crate::error::{LedgerError, Result};
use crate::io;
use crate::model::{self, Transaction};

pub const SNAPSHOT_EXTENSION: &str = "parquet";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

// ── Names ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotName {
    pub dataset: String,
    pub source_tag: Option<String>,
    pub created_at: NaiveDateTime,
}

/// What a directory entry turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidate {
    /// Not a parquet file of this dataset.
    Ignored,
    /// Looks like one of ours but the name does not parse.
    Malformed(String),
    Snapshot(SnapshotName),
}

fn sanitize_tag(tag: &str) -> Option<String> {
    let cleaned: String = tag
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches(|c| c == '-' || c == '_').to_string();
    (!cleaned.is_empty()).then_some(cleaned)
}

impl SnapshotName {
    /// Creation time is truncated to whole seconds, the resolution of the name.
    pub fn new(dataset: &str, source_tag: Option<&str>, created_at: NaiveDateTime) -> Self {
        Self {
            dataset: dataset.to_string(),
            source_tag: source_tag.and_then(sanitize_tag),
            created_at: created_at.with_nanosecond(0).unwrap_or(created_at),
        }
    }

    pub fn stem(&self) -> String {
        let ts = self.created_at.format(TIMESTAMP_FORMAT);
        match &self.source_tag {
            Some(tag) => format!("{}_{}_{}", self.dataset, tag, ts),
            None => format!("{}_{}", self.dataset, ts),
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.{}", self.stem(), SNAPSHOT_EXTENSION)
    }

    /// Sort a directory entry into snapshot, malformed or ignored.
    ///
    /// A name is matched on `<dataset>_` alone. If one dataset name is another
    /// plus an underscore suffix (`ledger` and `ledger_archive`), the files of
    /// the longer one read as tagged snapshots of the shorter one, so such
    /// datasets need separate warehouse directories.
    pub fn classify(dataset: &str, file_name: &str) -> Candidate {
        let Some(stem) = file_name.strip_suffix(&format!(".{SNAPSHOT_EXTENSION}")) else {
            return Candidate::Ignored;
        };
        let Some(rest) = stem
            .strip_prefix(dataset)
            .and_then(|r| r.strip_prefix('_'))
        else {
            return Candidate::Ignored;
        };

        let parts: Vec<&str> = rest.rsplitn(3, '_').collect();
        let (time, date, tag) = match parts.as_slice() {
            [time, date] => (*time, *date, None),
            [time, date, tag] => (*time, *date, Some(*tag)),
            _ => return Candidate::Malformed(format!("no timestamp in '{file_name}'")),
        };
        if date.len() != 8 || time.len() != 6 {
            return Candidate::Malformed(format!("bad timestamp '{date}_{time}' in '{file_name}'"));
        }
        let created_at = match NaiveDateTime::parse_from_str(&format!("{date}_{time}"), TIMESTAMP_FORMAT) {
            Ok(ts) => ts,
            Err(err) => return Candidate::Malformed(format!("'{file_name}': {err}")),
        };
        if matches!(tag, Some(t) if t.is_empty()) {
            return Candidate::Malformed(format!("empty source tag in '{file_name}'"));
        }

        Candidate::Snapshot(SnapshotName {
            dataset: dataset.to_string(),
            source_tag: tag.map(str::to_string),
            created_at,
        })
    }

    pub fn parse(dataset: &str, file_name: &str) -> Result<Self> {
        match Self::classify(dataset, file_name) {
            Candidate::Snapshot(name) => Ok(name),
            Candidate::Malformed(reason) => Err(LedgerError::InvalidData(reason)),
            Candidate::Ignored => Err(LedgerError::InvalidData(format!(
                "'{file_name}' is not a {dataset} snapshot"
            ))),
        }
    }
}

// ── Snapshot handles ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotInfo {
    /// File stem; unique within a store.
    pub id: String,
    pub name: SnapshotName,
    pub path: PathBuf,
}

impl SnapshotInfo {
    pub fn created_at(&self) -> NaiveDateTime {
        self.name.created_at
    }

    pub fn source_tag(&self) -> Option<&str> {
        self.name.source_tag.as_deref()
    }

    pub fn file_name(&self) -> String {
        self.name.file_name()
    }

    fn order_key(&self) -> (NaiveDateTime, &str) {
        (self.name.created_at, self.id.as_str())
    }
}

impl fmt::Display for SnapshotInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.created_at().format("%Y-%m-%d %H:%M:%S"))
    }
}

/// A listed snapshot together with what its footer says.
#[derive(Debug, Clone)]
pub struct SnapshotSummary {
    pub info: SnapshotInfo,
    pub row_count: usize,
    pub size_bytes: u64,
}

#[derive(Debug, Default)]
pub struct Listing {
    /// Newest first.
    pub snapshots: Vec<SnapshotSummary>,
    /// Snapshots that could not be read, as `RecoverableIo` errors.
    pub skipped: Vec<LedgerError>,
}

// ── Selection ───────────────────────────────────────────────────────────────

/// Newest first; equal creation times fall back to descending id.
pub fn sort_newest_first(snapshots: &mut [SnapshotInfo]) {
    snapshots.sort_by(|a, b| b.order_key().cmp(&a.order_key()));
}

/// Maximum creation time; ties go to the lexicographically greatest id.
pub fn select_latest(snapshots: &[SnapshotInfo]) -> Option<&SnapshotInfo> {
    snapshots.iter().max_by(|a, b| a.order_key().cmp(&b.order_key()))
}

/// Greatest creation time `<= at`, same tie-break as [`select_latest`].
pub fn select_as_of(snapshots: &[SnapshotInfo], at: NaiveDateTime) -> Option<&SnapshotInfo> {
    snapshots
        .iter()
        .filter(|s| s.created_at() <= at)
        .max_by(|a, b| a.order_key().cmp(&b.order_key()))
}

/// Match by id (file stem) or full file name.
pub fn select_id<'a>(snapshots: &'a [SnapshotInfo], id: &str) -> Option<&'a SnapshotInfo> {
    let id = id.trim();
    snapshots
        .iter()
        .find(|s| s.id == id || s.file_name() == id)
}

pub fn end_of_day(date: NaiveDate) -> Result<NaiveDateTime> {
    date.and_hms_opt(23, 59, 59)
        .ok_or_else(|| LedgerError::InvalidData(format!("no end of day for {date}")))
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SnapshotSelector {
    #[default]
    Latest,
    Id(String),
    AsOf(NaiveDate),
}

impl FromStr for SnapshotSelector {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(LedgerError::Input("empty snapshot selector".into()));
        }
        if s.eq_ignore_ascii_case("latest") {
            return Ok(SnapshotSelector::Latest);
        }
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Ok(SnapshotSelector::AsOf(date));
        }
        Ok(SnapshotSelector::Id(s.to_string()))
    }
}

impl fmt::Display for SnapshotSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotSelector::Latest => write!(f, "latest"),
            SnapshotSelector::Id(id) => write!(f, "{id}"),
            SnapshotSelector::AsOf(date) => write!(f, "{}", date.format("%Y-%m-%d")),
        }
    }
}

// ── Store ───────────────────────────────────────────────────────────────────

fn retry_once<T>(what: &str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
    match op() {
        Ok(v) => Ok(v),
        Err(err) => {
            debug!(%err, "{what} failed, retrying once");
            op()
        }
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
    dataset: String,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>, dataset: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            dataset: dataset.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    fn read_file_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// All snapshots of this dataset, newest first, resolved from names only.
    ///
    /// A missing directory is an empty store. Malformed names are skipped with
    /// a warning.
    pub fn catalog(&self) -> Result<Vec<SnapshotInfo>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let names = retry_once("listing snapshot directory", || self.read_file_names())
            .map_err(|err| LedgerError::recoverable(&self.root, err))?;

        let mut snapshots = Vec::new();
        for file_name in names {
            match SnapshotName::classify(&self.dataset, &file_name) {
                Candidate::Ignored => {}
                Candidate::Malformed(reason) => {
                    warn!(file = %file_name, %reason, "skipping malformed snapshot name");
                }
                Candidate::Snapshot(name) => snapshots.push(SnapshotInfo {
                    id: name.stem(),
                    path: self.root.join(&file_name),
                    name,
                }),
            }
        }
        sort_newest_first(&mut snapshots);
        Ok(snapshots)
    }

    /// Listing with row counts read from each file's footer.
    ///
    /// Unreadable files are left out of `snapshots` and reported in `skipped`.
    pub fn list(&self) -> Result<Listing> {
        let mut listing = Listing::default();
        for info in self.catalog()? {
            let counted = retry_once("reading snapshot footer", || io::parquet_row_count(&info.path));
            match counted {
                Ok(row_count) => {
                    let size_bytes = fs::metadata(&info.path).map(|m| m.len()).unwrap_or(0);
                    listing.snapshots.push(SnapshotSummary {
                        info,
                        row_count,
                        size_bytes,
                    });
                }
                Err(err) => {
                    warn!(snapshot = %info.id, %err, "snapshot unreadable, skipped");
                    listing.skipped.push(LedgerError::recoverable(&info.path, err));
                }
            }
        }
        Ok(listing)
    }

    pub fn latest(&self) -> Result<SnapshotInfo> {
        let catalog = self.catalog()?;
        select_latest(&catalog)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("no {} snapshots in {}", self.dataset, self.root.display())))
    }

    pub fn as_of(&self, date: NaiveDate) -> Result<SnapshotInfo> {
        match self.as_of_time(end_of_day(date)?) {
            Err(LedgerError::NotFound(_)) => Err(LedgerError::NotFound(format!("no snapshot on or before {date}"))),
            other => other,
        }
    }

    pub fn as_of_time(&self, at: NaiveDateTime) -> Result<SnapshotInfo> {
        let catalog = self.catalog()?;
        select_as_of(&catalog, at)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("no snapshot on or before {at}")))
    }

    pub fn get(&self, id: &str) -> Result<SnapshotInfo> {
        let catalog = self.catalog()?;
        select_id(&catalog, id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("snapshot '{id}'")))
    }

    pub fn resolve(&self, selector: &SnapshotSelector) -> Result<SnapshotInfo> {
        match selector {
            SnapshotSelector::Latest => self.latest(),
            SnapshotSelector::Id(id) => self.get(id),
            SnapshotSelector::AsOf(date) => self.as_of(*date),
        }
    }

    /// Read a snapshot. Failures are `RecoverableIo` and are not retried.
    pub fn load(&self, info: &SnapshotInfo) -> Result<DataFrame> {
        io::read_parquet(&info.path).map_err(|err| LedgerError::recoverable(&info.path, err))
    }

    pub fn load_transactions(&self, info: &SnapshotInfo) -> Result<Vec<Transaction>> {
        let df = self.load(info)?;
        model::from_frame(&df).map_err(|err| LedgerError::recoverable(&info.path, err))
    }

    /// Publish a new snapshot. Never touches an existing file: a name clash is
    /// `AlreadyExists`.
    pub fn write_frame(
        &self,
        source_tag: Option<&str>,
        created_at: NaiveDateTime,
        df: &mut DataFrame,
    ) -> Result<SnapshotInfo> {
        let name = SnapshotName::new(&self.dataset, source_tag, created_at);
        let path = self.root.join(name.file_name());
        io::publish_parquet(df, &path)?;
        info!(snapshot = %name.stem(), rows = df.height(), "snapshot written");
        Ok(SnapshotInfo {
            id: name.stem(),
            name,
            path,
        })
    }

    pub fn write_transactions(
        &self,
        source_tag: Option<&str>,
        created_at: NaiveDateTime,
        transactions: &[Transaction],
    ) -> Result<SnapshotInfo> {
        let mut df = model::to_frame(transactions)?;
        self.write_frame(source_tag, created_at, &mut df)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DS: &str = "financial_transactions";

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn info(tag: &str, at: &str) -> SnapshotInfo {
        let name = SnapshotName::new(DS, Some(tag), ts(at));
        SnapshotInfo {
            id: name.stem(),
            path: PathBuf::from(name.file_name()),
            name,
        }
    }

    #[test]
    fn name_round_trips_through_file_name() {
        let name = SnapshotName::new(DS, Some("grootboek_2024"), ts("2024-02-24 09:13:25"));
        assert_eq!(
            name.file_name(),
            "financial_transactions_grootboek_2024_20240224_091325.parquet"
        );
        assert_eq!(SnapshotName::parse(DS, &name.file_name()).unwrap(), name);
    }

    #[test]
    fn dataset_sharing_a_prefix_reads_as_a_tag() {
        // `ledger_archive` snapshots are indistinguishable from tagged `ledger` ones
        let archive = SnapshotName::new("ledger_archive", None, ts("2024-01-01 00:00:00"));
        match SnapshotName::classify("ledger", &archive.file_name()) {
            Candidate::Snapshot(name) => {
                assert_eq!(name.dataset, "ledger");
                assert_eq!(name.source_tag.as_deref(), Some("archive"));
            }
            other => panic!("expected a snapshot, got {other:?}"),
        }
        assert!(matches!(
            SnapshotName::classify("ledger_archive", "ledger_20240101_000000.parquet"),
            Candidate::Ignored
        ));
    }

    #[test]
    fn tagless_names_parse() {
        let name = SnapshotName::parse(DS, "financial_transactions_20251101_091324.parquet").unwrap();
        assert_eq!(name.source_tag, None);
        assert_eq!(name.created_at, ts("2025-11-01 09:13:24"));
    }

    #[test]
    fn tags_are_sanitized() {
        let name = SnapshotName::new(DS, Some(" Export Q1 (final) "), ts("2024-01-01 00:00:00"));
        assert_eq!(name.source_tag.as_deref(), Some("Export-Q1--final"));
        assert_eq!(SnapshotName::new(DS, Some("  "), ts("2024-01-01 00:00:00")).source_tag, None);
    }

    #[test]
    fn classify_separates_foreign_from_malformed() {
        assert_eq!(SnapshotName::classify(DS, "ingestion_log.txt"), Candidate::Ignored);
        assert_eq!(SnapshotName::classify(DS, "other_20240101_000000.parquet"), Candidate::Ignored);
        assert!(matches!(
            SnapshotName::classify(DS, "financial_transactions_backup.parquet"),
            Candidate::Malformed(_)
        ));
        assert!(matches!(
            SnapshotName::classify(DS, "financial_transactions_x_20241301_000000.parquet"),
            Candidate::Malformed(_)
        ));
    }

    #[test]
    fn latest_breaks_ties_by_id() {
        let snaps = vec![
            info("a", "2024-05-01 10:00:00"),
            info("b", "2024-05-01 10:00:00"),
            info("c", "2024-04-01 10:00:00"),
        ];
        assert_eq!(select_latest(&snaps).unwrap().source_tag(), Some("b"));

        let mut sorted = snaps.clone();
        sort_newest_first(&mut sorted);
        let tags: Vec<_> = sorted.iter().map(|s| s.source_tag().unwrap()).collect();
        assert_eq!(tags, ["b", "a", "c"]);
    }

    #[test]
    fn as_of_is_inclusive() {
        let snaps = vec![info("a", "2024-02-24 09:00:00"), info("b", "2025-03-18 12:00:00")];
        assert_eq!(
            select_as_of(&snaps, ts("2024-02-24 09:00:00")).unwrap().source_tag(),
            Some("a")
        );
        assert!(select_as_of(&snaps, ts("2024-02-24 08:59:59")).is_none());
        assert_eq!(
            select_as_of(&snaps, ts("2030-01-01 00:00:00")).unwrap().source_tag(),
            Some("b")
        );
    }

    #[test]
    fn select_id_accepts_stem_or_file_name() {
        let snaps = vec![info("a", "2024-02-24 09:00:00")];
        let stem = snaps[0].id.clone();
        assert!(select_id(&snaps, &stem).is_some());
        assert!(select_id(&snaps, &format!("{stem}.parquet")).is_some());
        assert!(select_id(&snaps, "nope").is_none());
    }

    #[test]
    fn selector_parses() {
        assert_eq!("latest".parse::<SnapshotSelector>().unwrap(), SnapshotSelector::Latest);
        assert_eq!(
            "2024-06-01".parse::<SnapshotSelector>().unwrap(),
            SnapshotSelector::AsOf(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())
        );
        assert_eq!(
            "financial_transactions_x_20240101_000000".parse::<SnapshotSelector>().unwrap(),
            SnapshotSelector::Id("financial_transactions_x_20240101_000000".into())
        );
        assert!("".parse::<SnapshotSelector>().is_err());
    }

    #[test]
    fn missing_directory_is_an_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("absent"), DS);
        assert!(store.catalog().unwrap().is_empty());
        assert!(store.list().unwrap().snapshots.is_empty());
        assert!(matches!(store.latest(), Err(LedgerError::NotFound(_))));
    }
}

use std::fs;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use ledger_timetravel::model::{identify, Entry, Provenance, Transaction};
use ledger_timetravel::snapshot::SnapshotSelector;
use ledger_timetravel::{LedgerError, SnapshotStore};
use rust_decimal::Decimal;

type TestResult = Result<(), Box<dyn std::error::Error>>;

const DS: &str = "financial_transactions";

fn ts(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
}

fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn rows(n: usize, loaded_at: NaiveDateTime) -> Vec<Transaction> {
    let entries = (0..n)
        .map(|i| {
            let mut e = Entry::new("1000", day("2024-01-15"), Decimal::new(100 + i as i64, 2), Decimal::ZERO);
            e.booking_number = Some(i as i64);
            (e, Provenance::new("fixture.xlsx", loaded_at))
        })
        .collect();
    identify(entries).transactions
}

fn seed(dir: &Path, tag: Option<&str>, at: &str, n: usize) -> Result<String, LedgerError> {
    let store = SnapshotStore::new(dir, DS);
    let created = ts(at);
    Ok(store.write_transactions(tag, created, &rows(n, created))?.id)
}

#[test]
fn as_of_picks_last_snapshot_on_or_before_the_day() -> TestResult {
    let dir = tempfile::tempdir()?;
    let early = seed(dir.path(), Some("jan"), "2024-01-15 09:00:00", 3)?;
    let feb = seed(dir.path(), Some("feb"), "2024-02-24 18:30:00", 4)?;
    let march = seed(dir.path(), Some("mar"), "2025-03-18 08:00:00", 5)?;
    let store = SnapshotStore::new(dir.path(), DS);

    assert_eq!(store.latest()?.id, march);
    // same-day snapshots count, whatever the hour
    assert_eq!(store.as_of(day("2024-02-24"))?.id, feb);
    assert_eq!(store.as_of(day("2025-03-17"))?.id, feb);
    assert_eq!(store.as_of(day("2025-03-18"))?.id, march);
    assert_eq!(store.as_of(day("2024-02-23"))?.id, early);
    Ok(())
}

#[test]
fn selection_misses_are_not_found() -> TestResult {
    let dir = tempfile::tempdir()?;
    let store = SnapshotStore::new(dir.path(), DS);
    assert!(matches!(store.latest(), Err(LedgerError::NotFound(_))));

    seed(dir.path(), None, "2024-02-24 12:00:00", 1)?;
    assert!(matches!(store.as_of(day("2024-02-23")), Err(LedgerError::NotFound(_))));
    assert!(matches!(store.get("nope"), Err(LedgerError::NotFound(_))));
    Ok(())
}

#[test]
fn missing_directory_is_an_empty_store() -> TestResult {
    let dir = tempfile::tempdir()?;
    let store = SnapshotStore::new(dir.path().join("absent"), DS);
    assert!(store.catalog()?.is_empty());
    assert!(store.list()?.snapshots.is_empty());
    Ok(())
}

#[test]
fn unreadable_warehouse_is_an_io_error_not_a_miss() -> TestResult {
    let dir = tempfile::tempdir()?;
    let not_a_dir = dir.path().join("warehouse");
    fs::write(&not_a_dir, b"plain file")?;
    let store = SnapshotStore::new(&not_a_dir, DS);

    assert!(matches!(store.latest(), Err(LedgerError::RecoverableIo { .. })));
    let err = store.as_of(day("2024-06-01")).unwrap_err();
    assert!(matches!(err, LedgerError::RecoverableIo { .. }), "{err}");
    assert_eq!(err.exit_code(), 4);
    let err = store.resolve(&SnapshotSelector::AsOf(day("2024-06-01"))).unwrap_err();
    assert!(matches!(err, LedgerError::RecoverableIo { .. }));
    Ok(())
}

#[test]
fn listing_is_newest_first_with_row_counts() -> TestResult {
    let dir = tempfile::tempdir()?;
    seed(dir.path(), Some("a"), "2024-01-01 00:00:00", 2)?;
    seed(dir.path(), Some("b"), "2024-03-01 00:00:00", 7)?;
    seed(dir.path(), Some("c"), "2024-02-01 00:00:00", 1)?;

    let listing = SnapshotStore::new(dir.path(), DS).list()?;
    let counts: Vec<usize> = listing.snapshots.iter().map(|s| s.row_count).collect();
    assert_eq!(counts, [7, 1, 2]);
    assert!(listing.skipped.is_empty());
    assert!(listing.snapshots.iter().all(|s| s.size_bytes > 0));
    Ok(())
}

#[test]
fn equal_timestamps_break_ties_on_id() -> TestResult {
    let dir = tempfile::tempdir()?;
    seed(dir.path(), Some("alpha"), "2024-05-05 10:00:00", 1)?;
    let beta = seed(dir.path(), Some("beta"), "2024-05-05 10:00:00", 1)?;
    let store = SnapshotStore::new(dir.path(), DS);

    assert_eq!(store.latest()?.id, beta);
    assert_eq!(store.as_of(day("2024-05-05"))?.id, beta);
    Ok(())
}

#[test]
fn foreign_and_malformed_files_are_skipped() -> TestResult {
    let dir = tempfile::tempdir()?;
    let good = seed(dir.path(), Some("ok"), "2024-01-01 00:00:00", 1)?;
    fs::write(dir.path().join(format!("{DS}_broken_2024xx01_000000.parquet")), b"x")?;
    fs::write(dir.path().join("other_dataset_20240101_000000.parquet"), b"x")?;
    fs::write(dir.path().join("notes.txt"), b"hello")?;

    let ids: Vec<String> = SnapshotStore::new(dir.path(), DS)
        .catalog()?
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(ids, [good]);
    Ok(())
}

#[test]
fn corrupt_snapshot_is_reported_and_others_stay_usable() -> TestResult {
    let dir = tempfile::tempdir()?;
    let good = seed(dir.path(), Some("good"), "2024-01-01 00:00:00", 2)?;
    fs::write(dir.path().join(format!("{DS}_bad_20240201_000000.parquet")), b"not parquet")?;
    let store = SnapshotStore::new(dir.path(), DS);

    let listing = store.list()?;
    assert_eq!(listing.snapshots.len(), 1);
    assert_eq!(listing.snapshots[0].info.id, good);
    assert_eq!(listing.skipped.len(), 1);
    assert!(matches!(listing.skipped[0], LedgerError::RecoverableIo { .. }));

    // selection is by name, so the corrupt file is still the latest; loading it fails recoverably
    let latest = store.latest()?;
    let err = store.load(&latest).unwrap_err();
    assert!(err.is_recoverable());
    assert_eq!(store.load(&store.get(&good)?)?.height(), 2);
    Ok(())
}

#[test]
fn writing_never_overwrites() -> TestResult {
    let dir = tempfile::tempdir()?;
    let id = seed(dir.path(), Some("x"), "2024-01-01 00:00:00", 2)?;
    let path = dir.path().join(format!("{id}.parquet"));
    let before = fs::read(&path)?;

    let err = seed(dir.path(), Some("x"), "2024-01-01 00:00:00", 5).unwrap_err();
    assert!(matches!(err, LedgerError::AlreadyExists(_)));
    assert_eq!(fs::read(&path)?, before);
    Ok(())
}

#[test]
fn loaded_rows_keep_ids_and_cents() -> TestResult {
    let dir = tempfile::tempdir()?;
    let created = ts("2024-01-01 00:00:00");
    let written = rows(3, created);
    let store = SnapshotStore::new(dir.path(), DS);
    let info = store.write_transactions(Some("cents"), created, &written)?;

    let loaded = store.load_transactions(&info)?;
    assert_eq!(loaded, written);
    Ok(())
}

#[test]
fn selectors_resolve_against_the_store() -> TestResult {
    let dir = tempfile::tempdir()?;
    let first = seed(dir.path(), Some("first"), "2024-01-01 00:00:00", 1)?;
    let second = seed(dir.path(), Some("second"), "2024-06-01 00:00:00", 1)?;
    let store = SnapshotStore::new(dir.path(), DS);

    assert_eq!(store.resolve(&"latest".parse::<SnapshotSelector>()?)?.id, second);
    assert_eq!(store.resolve(&"2024-03-01".parse::<SnapshotSelector>()?)?.id, first);
    assert_eq!(store.resolve(&first.parse::<SnapshotSelector>()?)?.id, first);
    assert_eq!(store.resolve(&format!("{first}.parquet").parse::<SnapshotSelector>()?)?.id, first);
    Ok(())
}

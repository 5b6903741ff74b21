use chrono::{NaiveDate, NaiveDateTime};
use ledger_timetravel::model::{identify, Entry, Provenance, Transaction};
use ledger_timetravel::schema::audit;
use ledger_timetravel::time_travel::{AuditFilter, TimeTravel, CONSOLIDATED_TAG};
use ledger_timetravel::{LedgerError, SnapshotStore};
use rust_decimal::Decimal;

type TestResult = Result<(), Box<dyn std::error::Error>>;

const DS: &str = "financial_transactions";

fn ts(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn entry(account: &str, date: NaiveDate, booking: i64, debit_cents: i64) -> Entry {
    let mut e = Entry::new(account, date, Decimal::new(debit_cents, 2), Decimal::ZERO);
    e.booking_number = Some(booking);
    e.description = Some(format!("booking {booking}"));
    e
}

fn batch(entries: Vec<Entry>, source: &str, at: NaiveDateTime) -> Vec<Transaction> {
    identify(
        entries
            .into_iter()
            .map(|e| (e, Provenance::new(source, at)))
            .collect(),
    )
    .transactions
}

struct Fixture {
    _dir: tempfile::TempDir,
    tt: TimeTravel,
    first: String,
    second: String,
}

/// Two snapshots: the second drops booking 2, renames account 1000 on
/// booking 1 and adds booking 3.
fn fixture() -> Result<Fixture, Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let store = SnapshotStore::new(dir.path(), DS);

    let t1 = ts("2024-02-01 09:00:00");
    let b1 = entry("1000", day(2024, 1, 10), 1, 12_345);
    let b2 = entry("1600", day(2024, 1, 20), 2, 500);
    let first = store.write_transactions(Some("jan"), t1, &batch(vec![b1.clone(), b2], "jan.xlsx", t1))?;

    let t2 = ts("2024-03-01 09:00:00");
    let mut b1_renamed = b1;
    b1_renamed.account_name = Some("Kas".into());
    let b3 = entry("1000", day(2024, 2, 14), 3, 99);
    let second = store.write_transactions(Some("feb"), t2, &batch(vec![b1_renamed, b3], "feb.xlsx", t2))?;

    Ok(Fixture {
        _dir: dir,
        tt: TimeTravel::new(store),
        first: first.id,
        second: second.id,
    })
}

#[test]
fn comparing_a_snapshot_with_itself_is_empty() -> TestResult {
    let f = fixture()?;
    let diff = f.tt.compare(&f.first, &f.first)?;
    assert!(diff.rows.is_empty());
    assert_eq!(diff.row_change(), 0);
    assert!(diff.columns.new_columns.is_empty());
    assert!(diff.columns.removed_columns.is_empty());
    Ok(())
}

#[test]
fn compare_reports_added_removed_and_changed() -> TestResult {
    let f = fixture()?;
    let diff = f.tt.compare(&f.first, &f.second)?;

    assert_eq!(diff.rows.added.len(), 1);
    assert_eq!(diff.rows.added[0].entry.booking_number, Some(3));
    assert_eq!(diff.rows.removed.len(), 1);
    assert_eq!(diff.rows.removed[0].entry.booking_number, Some(2));
    assert_eq!(diff.rows.changed.len(), 1);
    assert_eq!(diff.rows.changed[0].before.account_name, None);
    assert_eq!(diff.rows.changed[0].after.account_name.as_deref(), Some("Kas"));

    assert_eq!(diff.from_dates.min, Some(day(2024, 1, 10)));
    assert_eq!(diff.to_dates.max, Some(day(2024, 2, 14)));
    Ok(())
}

#[test]
fn compare_unknown_id_is_not_found() -> TestResult {
    let f = fixture()?;
    let err = f.tt.compare(&f.first, "missing").unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
    Ok(())
}

#[test]
fn consolidation_keeps_the_newest_version_of_each_row() -> TestResult {
    let f = fixture()?;
    // order of the arguments does not matter, creation time does
    let merged = f.tt.consolidate(&[f.second.as_str(), f.first.as_str()])?.transactions;

    let bookings: Vec<Option<i64>> = merged.iter().map(|t| t.entry.booking_number).collect();
    assert_eq!(bookings, [Some(1), Some(2), Some(3)]);
    assert_eq!(merged[0].entry.account_name.as_deref(), Some("Kas"));
    assert_eq!(merged[0].provenance.source_file, "feb.xlsx");
    assert_eq!(merged[1].provenance.source_file, "jan.xlsx");
    Ok(())
}

fn invoiced_sale(invoice: &str) -> Entry {
    let mut e = entry("8000", day(2024, 1, 5), 7, 10_000);
    e.description = Some("Sale".into());
    e.invoice_number = Some(invoice.into());
    e
}

/// Two sales identical except for the invoice number, in both row orders,
/// plus a later snapshot holding only the second invoice.
fn invoiced_fixture() -> Result<(tempfile::TempDir, TimeTravel, [String; 3]), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let store = SnapshotStore::new(dir.path(), DS);
    let (one, two) = (invoiced_sale("INV-1"), invoiced_sale("INV-2"));

    let t1 = ts("2024-02-01 09:00:00");
    let a = store.write_transactions(Some("a"), t1, &batch(vec![one.clone(), two.clone()], "a.xlsx", t1))?;
    let t2 = ts("2024-02-02 09:00:00");
    let b = store.write_transactions(Some("b"), t2, &batch(vec![two.clone(), one], "b.xlsx", t2))?;
    let t3 = ts("2024-02-03 09:00:00");
    let c = store.write_transactions(Some("c"), t3, &batch(vec![two], "c.xlsx", t3))?;
    Ok((dir, TimeTravel::new(store), [a.id, b.id, c.id]))
}

#[test]
fn reordered_rows_compare_equal() -> TestResult {
    let (_dir, tt, [a, b, _]) = invoiced_fixture()?;
    let diff = tt.compare(&a, &b)?;
    assert!(diff.rows.is_empty(), "{:?}", diff.rows);
    assert!(diff.rows.duplicate_ids.is_empty());
    Ok(())
}

#[test]
fn consolidation_keeps_rows_that_differ_only_by_invoice() -> TestResult {
    let (_dir, tt, [a, _, c]) = invoiced_fixture()?;
    let merged = tt.consolidate(&[a.as_str(), c.as_str()])?;
    assert!(merged.duplicate_ids.is_empty());

    let mut invoices: Vec<String> = merged
        .transactions
        .iter()
        .filter_map(|t| t.entry.invoice_number.clone())
        .collect();
    invoices.sort();
    assert_eq!(invoices, ["INV-1", "INV-2"]);
    Ok(())
}

#[test]
fn consolidation_requires_input() -> TestResult {
    let f = fixture()?;
    assert!(matches!(f.tt.consolidate(&[]), Err(LedgerError::Input(_))));
    Ok(())
}

#[test]
fn consolidated_snapshot_becomes_latest() -> TestResult {
    let f = fixture()?;
    let info = f
        .tt
        .consolidate_into_store(&[f.first.as_str(), f.second.as_str()], ts("2024-04-01 00:00:00"))?;

    assert_eq!(info.source_tag(), Some(CONSOLIDATED_TAG));
    assert_eq!(f.tt.store().latest()?.id, info.id);
    assert_eq!(f.tt.store().load_transactions(&info)?.len(), 3);
    Ok(())
}

#[test]
fn query_at_date_returns_the_snapshot_in_force() -> TestResult {
    let f = fixture()?;
    let (info, df) = f.tt.query_at_date(day(2024, 2, 15))?;
    assert_eq!(info.id, f.first);
    assert_eq!(df.height(), 2);

    let err = f.tt.query_at_date(day(2024, 1, 31)).unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
    Ok(())
}

#[test]
fn changes_since_lists_newer_snapshots() -> TestResult {
    let f = fixture()?;
    let changes = f.tt.changes_since(&f.first)?;
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].info.id, f.second);
    assert_eq!(changes[0].rows, 2);

    assert!(f.tt.changes_since(&f.second)?.is_empty());
    Ok(())
}

#[test]
fn audit_trail_follows_one_account_through_versions() -> TestResult {
    let f = fixture()?;
    let trail = f.tt.audit_trail(&AuditFilter {
        account_code: Some("1000".into()),
        ..AuditFilter::default()
    })?;
    assert!(trail.skipped.is_empty());
    // booking 1 in both snapshots, booking 3 in the second
    assert_eq!(trail.frame.height(), 3);

    let column = trail.frame.column(audit::SNAPSHOT_ID)?;
    let ids: Vec<&str> = column.str()?.into_iter().flatten().collect();
    assert_eq!(ids, [f.first.as_str(), f.second.as_str(), f.second.as_str()]);

    let dated = f.tt.audit_trail(&AuditFilter {
        from: Some(day(2024, 2, 1)),
        ..AuditFilter::default()
    })?;
    assert_eq!(dated.frame.height(), 1);
    Ok(())
}

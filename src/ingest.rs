//! Ingestion adapter: ledger exports (spreadsheet or CSV) into new snapshots.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader};
use chrono::{Local, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use rust_decimal::prelude::*;
use tracing::{debug, info, warn};

use crate::error::{LedgerError, Result};
use crate::model::{identify, Entry, Provenance};
use crate::schema::{source, transaction};
use crate::snapshot::{SnapshotInfo, SnapshotStore};

pub const INGESTION_LOG: &str = "ingestion_log.txt";
pub const SOURCE_EXTENSIONS: [&str; 5] = ["xlsx", "xls", "xlsm", "ods", "csv"];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y"];
const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%d-%m-%Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
];

// ── Raw sheet ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    DateTime(NaiveDateTime),
}

impl Cell {
    fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

/// First worksheet (or the CSV body) as untyped cells.
#[derive(Debug, Clone, Default)]
pub struct RawSheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

fn from_calamine(value: &Data) -> Cell {
    match value {
        Data::Empty | Data::Error(_) => Cell::Empty,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::DateTime(dt) => dt.as_datetime().map_or(Cell::Number(dt.as_f64()), Cell::DateTime),
    }
}

fn read_workbook(path: &Path) -> Result<RawSheet> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| LedgerError::Input(format!("{}: {e}", path.display())))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| LedgerError::Input(format!("{}: workbook has no sheets", path.display())))?
        .map_err(|e| LedgerError::Input(format!("{}: {e}", path.display())))?;

    let mut rows = range.rows();
    let headers = rows
        .next()
        .map(|r| r.iter().map(|c| c.to_string().trim().to_string()).collect())
        .unwrap_or_default();
    let rows = rows.map(|r| r.iter().map(from_calamine).collect()).collect();
    Ok(RawSheet { headers, rows })
}

fn sniff_separator(path: &Path) -> Result<u8> {
    let text = fs::read_to_string(path)?;
    let first = text.lines().next().unwrap_or("");
    let semis = first.matches(';').count();
    Ok(if semis > first.matches(',').count() { b';' } else { b',' })
}

fn read_csv(path: &Path) -> Result<RawSheet> {
    let separator = sniff_separator(path)?;
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0)) // all columns as String
        .map_parse_options(|opts| opts.with_separator(separator))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()
        .map_err(|e| LedgerError::Input(format!("{}: {e}", path.display())))?;

    let headers: Vec<String> = df
        .get_column_names_str()
        .iter()
        .map(|c| c.trim().to_string())
        .collect();
    let columns = df
        .get_columns()
        .iter()
        .map(|c| c.str().cloned())
        .collect::<PolarsResult<Vec<StringChunked>>>()?;

    let rows = (0..df.height())
        .map(|i| {
            columns
                .iter()
                .map(|ca| ca.get(i).map_or(Cell::Empty, |s| Cell::Text(s.to_string())))
                .collect()
        })
        .collect();
    Ok(RawSheet { headers, rows })
}

/// Read a source file. Missing or unreadable files are `Input` errors.
pub fn read_source(path: &Path) -> Result<RawSheet> {
    if !path.is_file() {
        return Err(LedgerError::Input(format!("{} not found", path.display())));
    }
    match extension(path).as_deref() {
        Some("csv") => read_csv(path),
        Some(ext) if SOURCE_EXTENSIONS.contains(&ext) => read_workbook(path),
        _ => Err(LedgerError::Input(format!(
            "{}: unsupported file type",
            path.display()
        ))),
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

// ── Header mapping ──────────────────────────────────────────────────────────

fn header_key(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn alias_table() -> HashMap<String, &'static str> {
    let mut table = HashMap::new();
    for (alias, canonical) in source::ALIASES {
        table.insert(header_key(alias), canonical);
        table.insert(header_key(canonical), canonical);
    }
    table
}

/// Canonical column name → index into the raw row.
#[derive(Debug, Default)]
struct ColumnMap {
    index: HashMap<&'static str, usize>,
    unknown: Vec<String>,
}

impl ColumnMap {
    fn build(headers: &[String]) -> Self {
        let table = alias_table();
        let mut map = ColumnMap::default();
        for (i, header) in headers.iter().enumerate() {
            match table.get(&header_key(header)) {
                Some(canonical) => {
                    if map.index.contains_key(canonical) {
                        warn!(header = %header, column = canonical, "duplicate column, keeping the first");
                    } else {
                        map.index.insert(canonical, i);
                    }
                }
                None if header.is_empty() => {}
                None => map.unknown.push(header.clone()),
            }
        }
        map
    }

    fn missing(&self, columns: &[&str]) -> Vec<String> {
        columns
            .iter()
            .filter(|c| !self.index.contains_key(*c))
            .map(|c| c.to_string())
            .collect()
    }

    fn cell<'a>(&self, row: &'a [Cell], column: &str) -> &'a Cell {
        self.index
            .get(column)
            .and_then(|&i| row.get(i))
            .unwrap_or(&Cell::Empty)
    }
}

// ── Cell parsing ────────────────────────────────────────────────────────────

fn parse_text(cell: &Cell) -> Option<String> {
    match cell {
        Cell::Empty => None,
        Cell::Text(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        // account codes and the like come through as floats
        Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => Some(format!("{}", *n as i64)),
        Cell::Number(n) => Some(n.to_string()),
        Cell::DateTime(dt) => Some(dt.date().format("%Y-%m-%d").to_string()),
    }
}

fn parse_int(cell: &Cell) -> Option<i64> {
    match cell {
        Cell::Number(n) if n.fract() == 0.0 => Some(*n as i64),
        Cell::Text(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.fract() == 0.0).map(|f| f as i64))
        }
        _ => None,
    }
}

/// Decimal amount, 2 dp. Accepts `1234.56`, `1234,56` and `1.234,56`.
pub fn parse_amount(text: &str) -> Option<Decimal> {
    let s: String = text.trim().chars().filter(|c| !c.is_whitespace()).collect();
    if s.is_empty() {
        return None;
    }
    let normalized = match (s.rfind(','), s.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => s.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => s.replace(',', ""),
        (Some(_), None) => s.replace(',', "."),
        _ => s,
    };
    Decimal::from_str(&normalized).ok().map(|d| d.round_dp(2))
}

enum Amount {
    Missing,
    Value(Decimal),
    Invalid,
}

fn amount_cell(cell: &Cell) -> Amount {
    match cell {
        Cell::Empty => Amount::Missing,
        Cell::Number(n) => Decimal::from_f64(*n).map_or(Amount::Invalid, |d| Amount::Value(d.round_dp(2))),
        Cell::Text(s) if s.trim().is_empty() => Amount::Missing,
        Cell::Text(s) => parse_amount(s).map_or(Amount::Invalid, Amount::Value),
        Cell::DateTime(_) => Amount::Invalid,
    }
}

pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let s = text.trim();
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
                .map(|dt| dt.date())
        })
}

fn date_cell(cell: &Cell) -> Option<NaiveDate> {
    match cell {
        Cell::DateTime(dt) => Some(dt.date()),
        Cell::Text(s) => parse_date(s),
        _ => None,
    }
}

// ── Typed rows ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct ParsedSheet {
    pub entries: Vec<Entry>,
    pub rows_read: usize,
    /// Rows without a usable date or account code.
    pub dropped_rows: usize,
    pub invalid_amounts: usize,
    pub unknown_columns: Vec<String>,
    pub missing_optional: Vec<String>,
}

/// Map headers, validate the core columns and type every row.
pub fn parse_sheet(sheet: &RawSheet) -> Result<ParsedSheet> {
    use transaction::*;

    let columns = ColumnMap::build(&sheet.headers);
    let missing_core = columns.missing(&CORE);
    if !missing_core.is_empty() {
        return Err(LedgerError::Input(format!(
            "missing required columns: {}",
            missing_core.join(", ")
        )));
    }

    let mut parsed = ParsedSheet {
        missing_optional: columns.missing(&ALL),
        unknown_columns: columns.unknown.clone(),
        ..Default::default()
    };
    if !parsed.unknown_columns.is_empty() {
        info!(columns = ?parsed.unknown_columns, "dropping unknown columns");
    }

    for row in sheet.rows.iter().filter(|r| !r.iter().all(Cell::is_empty)) {
        parsed.rows_read += 1;

        let date = date_cell(columns.cell(row, TRANSACTION_DATE));
        let account = parse_text(columns.cell(row, ACCOUNT_CODE));
        let (Some(date), Some(account)) = (date, account) else {
            parsed.dropped_rows += 1;
            continue;
        };

        let mut amount = |column: &str| match amount_cell(columns.cell(row, column)) {
            Amount::Missing => None,
            Amount::Value(d) => Some(d),
            Amount::Invalid => {
                parsed.invalid_amounts += 1;
                None
            }
        };
        let debit = amount(DEBIT_AMOUNT).unwrap_or(Decimal::ZERO);
        let credit = amount(CREDIT_AMOUNT).unwrap_or(Decimal::ZERO);
        let balance = amount(BALANCE_AMOUNT);
        let vat_amount = amount(VAT_AMOUNT);

        let text = |column: &str| parse_text(columns.cell(row, column));
        parsed.entries.push(Entry {
            administration_code: text(ADMINISTRATION_CODE),
            administration_name: text(ADMINISTRATION_NAME),
            account_code: account,
            account_name: text(ACCOUNT_NAME),
            code: text(CODE),
            booking_number: parse_int(columns.cell(row, BOOKING_NUMBER)),
            transaction_date: date,
            period: text(PERIOD),
            code1: text(CODE1),
            code2: text(CODE2),
            description: text(DESCRIPTION),
            debit,
            credit,
            balance,
            vat_amount,
            vat_code: text(VAT_CODE),
            booking_status: text(BOOKING_STATUS),
            number: parse_int(columns.cell(row, NUMBER)),
            invoice_number: text(INVOICE_NUMBER),
        });
    }

    if parsed.dropped_rows > 0 {
        warn!(dropped = parsed.dropped_rows, "rows without date or account code dropped");
    }
    if parsed.invalid_amounts > 0 {
        warn!(count = parsed.invalid_amounts, "unparsable amounts read as empty");
    }
    if parsed.entries.is_empty() {
        return Err(LedgerError::Input("no valid rows".into()));
    }
    Ok(parsed)
}

// ── Ingestion log ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub at: String,
    pub source_file: String,
    pub snapshot_file: String,
    pub rows: usize,
}

/// Append-only record of processed source files:
/// `<iso time> | <source file> | <snapshot file> | <n> rows`.
#[derive(Debug, Clone)]
pub struct IngestionLog {
    path: PathBuf,
}

impl IngestionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> Result<Vec<LogEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&self.path)?;
        Ok(text
            .lines()
            .filter_map(|line| {
                let parts: Vec<&str> = line.split(" | ").collect();
                match parts.as_slice() {
                    [at, source_file, snapshot_file, rows] => Some(LogEntry {
                        at: at.to_string(),
                        source_file: source_file.to_string(),
                        snapshot_file: snapshot_file.to_string(),
                        rows: rows.trim_end_matches(" rows").parse().unwrap_or(0),
                    }),
                    _ => None,
                }
            })
            .collect())
    }

    pub fn contains(&self, source_file: &str) -> Result<bool> {
        Ok(self.entries()?.iter().any(|e| e.source_file == source_file))
    }

    pub fn append(&self, at: NaiveDateTime, source_file: &str, snapshot_file: &str, rows: usize) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(
            file,
            "{} | {} | {} | {} rows",
            at.format("%Y-%m-%dT%H:%M:%S"),
            source_file,
            snapshot_file,
            rows
        )?;
        Ok(())
    }
}

// ── Ingestor ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStatus {
    Ingested,
    /// Already in the ingestion log and not forced.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct IngestReport {
    pub source_file: String,
    pub status: IngestStatus,
    pub snapshot: Option<SnapshotInfo>,
    pub rows_read: usize,
    pub rows_written: usize,
    pub dropped_rows: usize,
    pub collisions: usize,
    pub unknown_columns: Vec<String>,
    pub missing_optional: Vec<String>,
}

impl IngestReport {
    fn skipped(source_file: String) -> Self {
        Self {
            source_file,
            status: IngestStatus::Skipped,
            snapshot: None,
            rows_read: 0,
            rows_written: 0,
            dropped_rows: 0,
            collisions: 0,
            unknown_columns: Vec::new(),
            missing_optional: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub result: Result<IngestReport>,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub files: Vec<FileOutcome>,
}

impl BatchReport {
    fn count(&self, status: IngestStatus) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(&f.result, Ok(r) if r.status == status))
            .count()
    }

    pub fn processed(&self) -> usize {
        self.count(IngestStatus::Ingested)
    }

    pub fn skipped(&self) -> usize {
        self.count(IngestStatus::Skipped)
    }

    pub fn failed(&self) -> usize {
        self.files.iter().filter(|f| f.result.is_err()).count()
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub struct Ingestor {
    store: SnapshotStore,
    raw_dir: PathBuf,
    log: IngestionLog,
}

impl Ingestor {
    pub fn new(store: SnapshotStore, raw_dir: impl Into<PathBuf>) -> Self {
        let log = IngestionLog::new(store.root().join(INGESTION_LOG));
        Self {
            store,
            raw_dir: raw_dir.into(),
            log,
        }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn log(&self) -> &IngestionLog {
        &self.log
    }

    /// Supported source files in the raw directory, sorted by name.
    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        if !self.raw_dir.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.raw_dir)? {
            let path = entry?.path();
            let hidden = file_name(&path).starts_with('.') || file_name(&path).starts_with("~$");
            let supported = extension(&path).is_some_and(|e| SOURCE_EXTENSIONS.contains(&e.as_str()));
            if path.is_file() && supported && !hidden {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Discovered files not yet in the ingestion log.
    pub fn pending(&self) -> Result<Vec<PathBuf>> {
        let done: Vec<String> = self.log.entries()?.into_iter().map(|e| e.source_file).collect();
        Ok(self
            .discover()?
            .into_iter()
            .filter(|p| !done.contains(&file_name(p)))
            .collect())
    }

    pub fn ingest_file(&self, path: &Path, force: bool) -> Result<IngestReport> {
        self.ingest_file_at(path, force, Local::now().naive_local())
    }

    /// Ingest one file as a snapshot created at `at`.
    pub fn ingest_file_at(&self, path: &Path, force: bool, at: NaiveDateTime) -> Result<IngestReport> {
        let source_file = file_name(path);
        if !force && self.log.contains(&source_file)? {
            info!(file = %source_file, "already processed, skipping");
            return Ok(IngestReport::skipped(source_file));
        }

        let sheet = read_source(path)?;
        debug!(file = %source_file, rows = sheet.rows.len(), columns = sheet.headers.len(), "read source");
        let parsed = parse_sheet(&sheet).map_err(|err| match err {
            LedgerError::Input(msg) => LedgerError::Input(format!("{source_file}: {msg}")),
            other => other,
        })?;

        let provenance = Provenance::new(source_file.clone(), at);
        let identified = identify(
            parsed
                .entries
                .into_iter()
                .map(|e| (e, provenance.clone()))
                .collect(),
        );

        let tag = path.file_stem().and_then(|s| s.to_str());
        let info = self.store.write_transactions(tag, at, &identified.transactions)?;
        let rows_written = identified.transactions.len();
        self.log.append(at, &source_file, &info.file_name(), rows_written)?;
        info!(file = %source_file, snapshot = %info.id, rows = rows_written, "ingested");

        Ok(IngestReport {
            source_file,
            status: IngestStatus::Ingested,
            snapshot: Some(info),
            rows_read: parsed.rows_read,
            rows_written,
            dropped_rows: parsed.dropped_rows,
            collisions: identified.collisions,
            unknown_columns: parsed.unknown_columns,
            missing_optional: parsed.missing_optional,
        })
    }

    /// Ingest every discovered file. Per-file failures are collected.
    pub fn ingest_all(&self, force: bool) -> Result<BatchReport> {
        let files = self.discover()?;
        info!(count = files.len(), dir = %self.raw_dir.display(), "discovered source files");
        let mut report = BatchReport::default();
        for path in files {
            let result = self.ingest_file(&path, force);
            if let Err(err) = &result {
                warn!(file = %path.display(), %err, "ingestion failed");
            }
            report.files.push(FileOutcome { path, result });
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_row(cells: &[&str]) -> Vec<Cell> {
        cells.iter().map(|s| Cell::Text(s.to_string())).collect()
    }

    fn sheet(headers: &[&str], rows: &[&[&str]]) -> RawSheet {
        RawSheet {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: rows.iter().map(|r| text_row(r)).collect(),
        }
    }

    #[test]
    fn amounts_accept_both_separators() {
        assert_eq!(parse_amount("1234.56"), Some(Decimal::new(123456, 2)));
        assert_eq!(parse_amount("1234,56"), Some(Decimal::new(123456, 2)));
        assert_eq!(parse_amount("1.234,56"), Some(Decimal::new(123456, 2)));
        assert_eq!(parse_amount("1,234.56"), Some(Decimal::new(123456, 2)));
        assert_eq!(parse_amount("-0,10"), Some(Decimal::new(-10, 2)));
        assert_eq!(parse_amount("abc"), None);
        assert_eq!(parse_amount("  "), None);
    }

    #[test]
    fn dates_accept_common_layouts() {
        let d = NaiveDate::from_ymd_opt(2024, 2, 24);
        assert_eq!(parse_date("2024-02-24"), d);
        assert_eq!(parse_date("24-02-2024"), d);
        assert_eq!(parse_date("24/02/2024"), d);
        assert_eq!(parse_date("2024-02-24 00:00:00"), d);
        assert_eq!(parse_date("2024-02-24T13:45:00"), d);
        assert_eq!(parse_date("yesterday"), None);
    }

    #[test]
    fn headers_map_from_either_vocabulary() {
        let map = ColumnMap::build(&[
            " CodeGrootboekrekening ".into(),
            "transaction_date".into(),
            "Debet".into(),
            "credit_amount".into(),
            "Opmerking".into(),
        ]);
        assert!(map.missing(&transaction::CORE).is_empty());
        assert_eq!(map.unknown, vec!["Opmerking".to_string()]);
    }

    #[test]
    fn missing_core_column_is_input_error() {
        let s = sheet(&["Boekdatum", "Debet", "Credit"], &[&["2024-01-01", "1", "0"]]);
        let err = parse_sheet(&s).unwrap_err();
        assert!(matches!(err, LedgerError::Input(ref m) if m.contains("account_code")));
    }

    #[test]
    fn rows_without_date_are_dropped_and_counted() {
        let s = sheet(
            &["CodeGrootboekrekening", "Boekdatum", "Debet", "Credit"],
            &[
                &["1000", "2024-01-01", "10,50", ""],
                &["1000", "", "5", "0"],
                &["", "", "", ""],
            ],
        );
        let parsed = parse_sheet(&s).unwrap();
        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.rows_read, 2);
        assert_eq!(parsed.dropped_rows, 1);
        assert_eq!(parsed.entries[0].debit, Decimal::new(1050, 2));
        assert_eq!(parsed.entries[0].credit, Decimal::ZERO);
    }

    #[test]
    fn no_valid_rows_is_input_error() {
        let s = sheet(
            &["CodeGrootboekrekening", "Boekdatum", "Debet", "Credit"],
            &[&["1000", "not a date", "1", "0"]],
        );
        assert!(matches!(parse_sheet(&s), Err(LedgerError::Input(_))));
    }

    #[test]
    fn numeric_codes_read_as_integers() {
        assert_eq!(parse_text(&Cell::Number(4000.0)).as_deref(), Some("4000"));
        assert_eq!(parse_int(&Cell::Text("17.0".into())), Some(17));
        assert_eq!(parse_int(&Cell::Number(1.5)), None);
    }

    #[test]
    fn log_matches_whole_file_names() {
        let dir = tempfile::tempdir().unwrap();
        let log = IngestionLog::new(dir.path().join(INGESTION_LOG));
        let at = NaiveDate::from_ymd_opt(2024, 2, 24).unwrap().and_hms_opt(9, 0, 0).unwrap();
        log.append(at, "ledger_2024.xlsx", "financial_transactions_ledger_2024_20240224_090000.parquet", 12)
            .unwrap();

        assert!(log.contains("ledger_2024.xlsx").unwrap());
        assert!(!log.contains("ledger.xlsx").unwrap());
        assert_eq!(log.entries().unwrap()[0].rows, 12);
    }
}

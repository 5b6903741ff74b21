use std::collections::HashMap;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use polars::datatypes::TimeUnit;
use polars::prelude::*;
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{LedgerError, Result};
use crate::schema::{provenance, transaction};

/// Days between 0001-01-01 (CE day 1) and the Unix epoch.
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Business content of one ledger line.
///
/// Equality is by value: two entries with the same fields compare equal
/// regardless of which snapshot or file they came from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entry {
    pub administration_code: Option<String>,
    pub administration_name: Option<String>,
    pub account_code: String,
    pub account_name: Option<String>,
    pub code: Option<String>,
    pub booking_number: Option<i64>,
    pub transaction_date: NaiveDate,
    pub period: Option<String>,
    pub code1: Option<String>,
    pub code2: Option<String>,
    pub description: Option<String>,
    pub debit: Decimal,
    pub credit: Decimal,
    pub balance: Option<Decimal>,
    pub vat_amount: Option<Decimal>,
    pub vat_code: Option<String>,
    pub booking_status: Option<String>,
    pub number: Option<i64>,
    pub invoice_number: Option<String>,
}

impl Entry {
    /// Minimal entry; every optional field left empty.
    pub fn new(
        account_code: impl Into<String>,
        transaction_date: NaiveDate,
        debit: Decimal,
        credit: Decimal,
    ) -> Self {
        Self {
            administration_code: None,
            administration_name: None,
            account_code: account_code.into(),
            account_name: None,
            code: None,
            booking_number: None,
            transaction_date,
            period: None,
            code1: None,
            code2: None,
            description: None,
            debit,
            credit,
            balance: None,
            vat_amount: None,
            vat_code: None,
            booking_status: None,
            number: None,
            invoice_number: None,
        }
    }

    pub fn net_amount(&self) -> Decimal {
        let net = (self.debit - self.credit).round_dp(2);
        if net.is_zero() {
            Decimal::ZERO
        } else {
            net
        }
    }

    /// account | date | booking | description | net | invoice | number |
    /// code1 | code2 | vat code
    fn identity_key(&self) -> String {
        let text = |v: &Option<String>| v.as_deref().unwrap_or("").trim().to_string();
        let int = |v: Option<i64>| v.map(|n| n.to_string()).unwrap_or_default();
        format!(
            "{}|{}|{}|{}|{:.2}|{}|{}|{}|{}|{}",
            self.account_code.trim(),
            self.transaction_date.format("%Y-%m-%d"),
            int(self.booking_number),
            text(&self.description),
            self.net_amount(),
            text(&self.invoice_number),
            int(self.number),
            text(&self.code1),
            text(&self.code2),
            text(&self.vat_code),
        )
    }
}

/// Where a row came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub source_file: String,
    pub loaded_at: NaiveDateTime,
    pub data_version: i64,
}

impl Provenance {
    pub fn new(source_file: impl Into<String>, loaded_at: NaiveDateTime) -> Self {
        Self {
            source_file: source_file.into(),
            loaded_at,
            data_version: loaded_at.and_utc().timestamp(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub entry: Entry,
    pub provenance: Provenance,
}

/// Hash an entry into its transaction id.
///
/// `occurrence` is 0 unless other rows in the same dataset share the identity
/// key; such rows are ranked by their full content and hash with `#rank`.
pub fn transaction_id(entry: &Entry, occurrence: usize) -> String {
    let mut h = blake3::Hasher::new();
    h.update(entry.identity_key().as_bytes());
    if occurrence > 0 {
        h.update(b"#");
        h.update(occurrence.to_string().as_bytes());
    }
    let hex = h.finalize().to_hex();
    hex[..32].to_string()
}

/// Rows with ids assigned, plus how many shared an identity key with another
/// row.
#[derive(Debug, Clone)]
pub struct Identified {
    pub transactions: Vec<Transaction>,
    pub collisions: usize,
}

/// Assign ids. The result depends on the set of rows, not on their order:
/// rows sharing a key are ranked by content before numbering.
pub fn identify(rows: Vec<(Entry, Provenance)>) -> Identified {
    let mut occurrence = vec![0usize; rows.len()];
    let mut collisions = 0;
    {
        let keys: Vec<String> = rows.iter().map(|(entry, _)| entry.identity_key()).collect();
        let mut groups: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, key) in keys.iter().enumerate() {
            groups.entry(key.as_str()).or_default().push(i);
        }
        for members in groups.values_mut().filter(|m| m.len() > 1) {
            collisions += members.len() - 1;
            members.sort_by(|&a, &b| rows[a].0.cmp(&rows[b].0));
            for (rank, &i) in members.iter().enumerate() {
                occurrence[i] = rank;
            }
        }
    }

    let transactions = rows
        .into_iter()
        .zip(occurrence)
        .map(|((entry, provenance), occurrence)| Transaction {
            transaction_id: transaction_id(&entry, occurrence),
            entry,
            provenance,
        })
        .collect();

    if collisions > 0 {
        warn!(collisions, "rows share an identity key; ids disambiguated by content rank");
    }

    Identified {
        transactions,
        collisions,
    }
}

// ── Frame conversion ────────────────────────────────────────────────────────

pub fn decimal_to_f64(value: Decimal) -> f64 {
    value.round_dp(2).to_f64().unwrap_or(0.0)
}

pub fn f64_to_decimal(value: f64) -> Option<Decimal> {
    Decimal::from_f64(value).map(|d| d.round_dp(2))
}

pub fn date_to_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - EPOCH_DAYS_FROM_CE
}

pub fn days_to_date(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days + EPOCH_DAYS_FROM_CE)
}

fn text_column<'a>(name: &str, rows: &'a [Transaction], get: impl Fn(&'a Transaction) -> Option<&'a str>) -> Column {
    let values: Vec<Option<&str>> = rows.iter().map(get).collect();
    Column::new(name.into(), &values)
}

fn amount_column(name: &str, rows: &[Transaction], get: impl Fn(&Transaction) -> Option<Decimal>) -> Column {
    let values: Vec<Option<f64>> = rows.iter().map(|t| get(t).map(decimal_to_f64)).collect();
    Column::new(name.into(), &values)
}

fn int_column(name: &str, rows: &[Transaction], get: impl Fn(&Transaction) -> Option<i64>) -> Column {
    let values: Vec<Option<i64>> = rows.iter().map(get).collect();
    Column::new(name.into(), &values)
}

/// Build the snapshot frame for a set of transactions.
///
/// Amounts are stored as Float64 rounded to 2 decimals, dates as Date and the
/// load timestamp as Datetime(us).
pub fn to_frame(rows: &[Transaction]) -> Result<DataFrame> {
    use transaction::*;

    let days: Vec<i32> = rows
        .iter()
        .map(|t| date_to_days(t.entry.transaction_date))
        .collect();
    let loaded: Vec<i64> = rows
        .iter()
        .map(|t| t.provenance.loaded_at.and_utc().timestamp_micros())
        .collect();

    let columns = vec![
        text_column(ADMINISTRATION_CODE, rows, |t| t.entry.administration_code.as_deref()),
        text_column(ADMINISTRATION_NAME, rows, |t| t.entry.administration_name.as_deref()),
        text_column(ACCOUNT_CODE, rows, |t| Some(t.entry.account_code.as_str())),
        text_column(ACCOUNT_NAME, rows, |t| t.entry.account_name.as_deref()),
        text_column(CODE, rows, |t| t.entry.code.as_deref()),
        int_column(BOOKING_NUMBER, rows, |t| t.entry.booking_number),
        Column::new(TRANSACTION_DATE.into(), &days).cast(&DataType::Date)?,
        text_column(PERIOD, rows, |t| t.entry.period.as_deref()),
        text_column(CODE1, rows, |t| t.entry.code1.as_deref()),
        text_column(CODE2, rows, |t| t.entry.code2.as_deref()),
        text_column(DESCRIPTION, rows, |t| t.entry.description.as_deref()),
        amount_column(DEBIT_AMOUNT, rows, |t| Some(t.entry.debit)),
        amount_column(CREDIT_AMOUNT, rows, |t| Some(t.entry.credit)),
        amount_column(BALANCE_AMOUNT, rows, |t| t.entry.balance),
        amount_column(VAT_AMOUNT, rows, |t| t.entry.vat_amount),
        text_column(VAT_CODE, rows, |t| t.entry.vat_code.as_deref()),
        text_column(BOOKING_STATUS, rows, |t| t.entry.booking_status.as_deref()),
        int_column(NUMBER, rows, |t| t.entry.number),
        text_column(INVOICE_NUMBER, rows, |t| t.entry.invoice_number.as_deref()),
        text_column(TRANSACTION_ID, rows, |t| Some(t.transaction_id.as_str())),
        text_column(provenance::SOURCE_FILE, rows, |t| Some(t.provenance.source_file.as_str())),
        Column::new(provenance::LOADED_AT.into(), &loaded)
            .cast(&DataType::Datetime(TimeUnit::Microseconds, None))?,
        int_column(provenance::DATA_VERSION, rows, |t| Some(t.provenance.data_version)),
    ];

    Ok(DataFrame::new(columns)?)
}

fn optional_cast(df: &DataFrame, name: &str, dtype: &DataType) -> Result<Option<Column>> {
    match df.column(name) {
        Ok(column) => Ok(Some(column.cast(dtype)?)),
        Err(_) => Ok(None),
    }
}

fn required_cast(df: &DataFrame, name: &str, dtype: &DataType) -> Result<Column> {
    optional_cast(df, name, dtype)?.ok_or_else(|| LedgerError::MissingColumn(name.to_string()))
}

/// Typed, optional column accessors over a snapshot frame.
struct FrameColumns {
    text: HashMap<&'static str, StringChunked>,
    float: HashMap<&'static str, Float64Chunked>,
    int: HashMap<&'static str, Int64Chunked>,
}

impl FrameColumns {
    fn text(&self, name: &str, i: usize) -> Option<String> {
        self.text
            .get(name)
            .and_then(|ca| ca.get(i))
            .map(|s| s.to_string())
    }

    fn amount(&self, name: &str, i: usize) -> Option<Decimal> {
        self.float
            .get(name)
            .and_then(|ca| ca.get(i))
            .and_then(f64_to_decimal)
    }

    fn int(&self, name: &str, i: usize) -> Option<i64> {
        self.int.get(name).and_then(|ca| ca.get(i))
    }
}

/// Read transactions back out of a snapshot frame.
///
/// Requires `account_code` and `transaction_date`; any other missing column is
/// read as empty. Frames without a `transaction_id` column get ids computed
/// here.
pub fn from_frame(df: &DataFrame) -> Result<Vec<Transaction>> {
    use transaction::*;

    let dates = required_cast(df, TRANSACTION_DATE, &DataType::Date)?.cast(&DataType::Int32)?;
    let dates = dates.i32()?;
    required_cast(df, ACCOUNT_CODE, &DataType::String)?;

    let mut cols = FrameColumns {
        text: HashMap::new(),
        float: HashMap::new(),
        int: HashMap::new(),
    };
    for name in [
        ADMINISTRATION_CODE,
        ADMINISTRATION_NAME,
        ACCOUNT_CODE,
        ACCOUNT_NAME,
        CODE,
        PERIOD,
        CODE1,
        CODE2,
        DESCRIPTION,
        VAT_CODE,
        BOOKING_STATUS,
        INVOICE_NUMBER,
        TRANSACTION_ID,
        provenance::SOURCE_FILE,
    ] {
        if let Some(c) = optional_cast(df, name, &DataType::String)? {
            cols.text.insert(name, c.str()?.clone());
        }
    }
    for name in [DEBIT_AMOUNT, CREDIT_AMOUNT, BALANCE_AMOUNT, VAT_AMOUNT] {
        if let Some(c) = optional_cast(df, name, &DataType::Float64)? {
            cols.float.insert(name, c.f64()?.clone());
        }
    }
    for name in [BOOKING_NUMBER, NUMBER, provenance::DATA_VERSION] {
        if let Some(c) = optional_cast(df, name, &DataType::Int64)? {
            cols.int.insert(name, c.i64()?.clone());
        }
    }
    let loaded_at = match optional_cast(df, provenance::LOADED_AT, &DataType::Datetime(TimeUnit::Microseconds, None))? {
        Some(c) => Some(c.cast(&DataType::Int64)?.i64()?.clone()),
        None => None,
    };

    let mut rows = Vec::with_capacity(df.height());
    let mut ids = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let transaction_date = dates
            .get(i)
            .and_then(days_to_date)
            .ok_or_else(|| LedgerError::InvalidData(format!("Null transaction_date at row {i}")))?;
        let account_code = cols
            .text(ACCOUNT_CODE, i)
            .ok_or_else(|| LedgerError::InvalidData(format!("Null account_code at row {i}")))?;

        let entry = Entry {
            administration_code: cols.text(ADMINISTRATION_CODE, i),
            administration_name: cols.text(ADMINISTRATION_NAME, i),
            account_code,
            account_name: cols.text(ACCOUNT_NAME, i),
            code: cols.text(CODE, i),
            booking_number: cols.int(BOOKING_NUMBER, i),
            transaction_date,
            period: cols.text(PERIOD, i),
            code1: cols.text(CODE1, i),
            code2: cols.text(CODE2, i),
            description: cols.text(DESCRIPTION, i),
            debit: cols.amount(DEBIT_AMOUNT, i).unwrap_or(Decimal::ZERO),
            credit: cols.amount(CREDIT_AMOUNT, i).unwrap_or(Decimal::ZERO),
            balance: cols.amount(BALANCE_AMOUNT, i),
            vat_amount: cols.amount(VAT_AMOUNT, i),
            vat_code: cols.text(VAT_CODE, i),
            booking_status: cols.text(BOOKING_STATUS, i),
            number: cols.int(NUMBER, i),
            invoice_number: cols.text(INVOICE_NUMBER, i),
        };

        let loaded = loaded_at
            .as_ref()
            .and_then(|ca| ca.get(i))
            .and_then(DateTime::from_timestamp_micros)
            .map(|dt| dt.naive_utc())
            .unwrap_or_default();
        let provenance = Provenance {
            source_file: cols.text(provenance::SOURCE_FILE, i).unwrap_or_default(),
            loaded_at: loaded,
            data_version: cols
                .int(provenance::DATA_VERSION, i)
                .unwrap_or_else(|| loaded.and_utc().timestamp()),
        };

        ids.push(cols.text(TRANSACTION_ID, i));
        rows.push((entry, provenance));
    }

    if ids.iter().all(Option::is_some) {
        Ok(rows
            .into_iter()
            .zip(ids)
            .map(|((entry, provenance), id)| Transaction {
                transaction_id: id.unwrap_or_default(),
                entry,
                provenance,
            })
            .collect())
    } else {
        Ok(identify(rows).transactions)
    }
}

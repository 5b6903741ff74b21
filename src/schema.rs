/// Column-name constants for the ledger snapshot schema.
/// Single source of truth - shared by ingestion, models, queries and the
/// Python bindings.

// ── Transaction columns ─────────────────────────────────────────────────────
pub mod transaction {
    pub const ADMINISTRATION_CODE: &str = "administration_code";
    pub const ADMINISTRATION_NAME: &str = "administration_name";
    pub const ACCOUNT_CODE: &str = "account_code";
    pub const ACCOUNT_NAME: &str = "account_name";
    pub const CODE: &str = "code";
    pub const BOOKING_NUMBER: &str = "booking_number";
    pub const TRANSACTION_DATE: &str = "transaction_date";
    pub const PERIOD: &str = "period";
    pub const CODE1: &str = "code1";
    pub const CODE2: &str = "code2";
    pub const DESCRIPTION: &str = "description";
    pub const DEBIT_AMOUNT: &str = "debit_amount";
    pub const CREDIT_AMOUNT: &str = "credit_amount";
    pub const BALANCE_AMOUNT: &str = "balance_amount";
    pub const VAT_AMOUNT: &str = "vat_amount";
    pub const VAT_CODE: &str = "vat_code";
    pub const BOOKING_STATUS: &str = "booking_status";
    pub const NUMBER: &str = "number";
    pub const INVOICE_NUMBER: &str = "invoice_number";
    pub const TRANSACTION_ID: &str = "transaction_id";

    /// Columns an ingested file must provide.
    pub const CORE: [&str; 4] = [ACCOUNT_CODE, TRANSACTION_DATE, DEBIT_AMOUNT, CREDIT_AMOUNT];

    /// Every business column, in snapshot order.
    pub const ALL: [&str; 19] = [
        ADMINISTRATION_CODE,
        ADMINISTRATION_NAME,
        ACCOUNT_CODE,
        ACCOUNT_NAME,
        CODE,
        BOOKING_NUMBER,
        TRANSACTION_DATE,
        PERIOD,
        CODE1,
        CODE2,
        DESCRIPTION,
        DEBIT_AMOUNT,
        CREDIT_AMOUNT,
        BALANCE_AMOUNT,
        VAT_AMOUNT,
        VAT_CODE,
        BOOKING_STATUS,
        NUMBER,
        INVOICE_NUMBER,
    ];
}

// ── Provenance columns ──────────────────────────────────────────────────────
pub mod provenance {
    pub const SOURCE_FILE: &str = "_source_file";
    pub const LOADED_AT: &str = "_loaded_at";
    pub const DATA_VERSION: &str = "_data_version";
}

// ── Source spreadsheet headers ──────────────────────────────────────────────
/// Ledger export headers as they appear in the accounting package's
/// spreadsheets, paired with the canonical column they load into.
pub mod source {
    use super::transaction::*;

    pub const ALIASES: [(&str, &str); 19] = [
        ("CodeAdministratie", ADMINISTRATION_CODE),
        ("NaamAdministratie", ADMINISTRATION_NAME),
        ("CodeGrootboekrekening", ACCOUNT_CODE),
        ("NaamGrootboekrekening", ACCOUNT_NAME),
        ("Code", CODE),
        ("Boekingsnummer", BOOKING_NUMBER),
        ("Boekdatum", TRANSACTION_DATE),
        ("Periode", PERIOD),
        ("Code1", CODE1),
        ("Code2", CODE2),
        ("Omschrijving", DESCRIPTION),
        ("Debet", DEBIT_AMOUNT),
        ("Credit", CREDIT_AMOUNT),
        ("Saldo", BALANCE_AMOUNT),
        ("Btwbedrag", VAT_AMOUNT),
        ("Btwcode", VAT_CODE),
        ("Boekingsstatus", BOOKING_STATUS),
        ("Nummer", NUMBER),
        ("Factuurnummer", INVOICE_NUMBER),
    ];
}

// ── Model names ─────────────────────────────────────────────────────────────
pub mod models {
    pub const SNAPSHOT: &str = "snapshot";
    pub const STG_TRANSACTIONS: &str = "stg_financial_transactions";
    pub const INT_TRANSACTIONS: &str = "int_transactions_enriched";
    pub const MART_TRANSACTION_DETAILS: &str = "mart_transaction_details";
    pub const MART_ACCOUNT_SUMMARY: &str = "mart_account_summary";
    pub const MART_MONTHLY_TRENDS: &str = "mart_monthly_trends";
}

// ── Derived columns ─────────────────────────────────────────────────────────
pub mod derived {
    pub const NET_AMOUNT: &str = "net_amount";
    pub const TRANSACTION_YEAR: &str = "transaction_year";
    pub const TRANSACTION_QUARTER: &str = "transaction_quarter";
    pub const TRANSACTION_MONTH: &str = "transaction_month";
    pub const TRANSACTION_TYPE: &str = "transaction_type";
    pub const AMOUNT_CATEGORY: &str = "amount_category";
    pub const RUNNING_BALANCE: &str = "running_balance";
    pub const DATA_QUALITY_FLAG: &str = "data_quality_flag";
}

// ── Account summary columns ─────────────────────────────────────────────────
pub mod account_summary {
    pub const TOTAL_TRANSACTIONS: &str = "total_transactions";
    pub const TOTAL_DEBIT: &str = "total_debit";
    pub const TOTAL_CREDIT: &str = "total_credit";
    pub const NET_BALANCE: &str = "net_balance";
    pub const TOTAL_VAT: &str = "total_vat";
    pub const FIRST_TRANSACTION_DATE: &str = "first_transaction_date";
    pub const LAST_TRANSACTION_DATE: &str = "last_transaction_date";
    pub const ACTIVITY_STATUS: &str = "activity_status";
    pub const ACCOUNT_BALANCE_TYPE: &str = "account_balance_type";
    pub const BALANCE_VALUE_CATEGORY: &str = "balance_value_category";
}

// ── Monthly trend columns ───────────────────────────────────────────────────
pub mod monthly_trends {
    pub const TRANSACTION_COUNT: &str = "transaction_count";
    pub const TOTAL_DEBIT: &str = "total_debit";
    pub const TOTAL_CREDIT: &str = "total_credit";
    pub const NET_AMOUNT: &str = "net_amount";
}

// ── Audit trail columns ─────────────────────────────────────────────────────
pub mod audit {
    pub const SNAPSHOT_ID: &str = "_snapshot_id";
    pub const SNAPSHOT_CREATED_AT: &str = "_snapshot_created_at";
}

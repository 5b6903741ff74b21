pub mod analytics;
pub mod config;
pub mod error;
pub mod ingest;
pub mod io;
pub mod model;
pub mod model_graph;
pub mod models;
pub mod query;
pub mod refresh;
pub mod schema;
pub mod snapshot;
pub mod time_travel;
pub mod transform;

#[cfg(feature = "python")]
mod python;

pub use error::{LedgerError, Result};
pub use snapshot::{SnapshotInfo, SnapshotSelector, SnapshotStore};

#[cfg(feature = "python")]
use pyo3::prelude::*;
#[cfg(feature = "python")]
use pyo3::types::PyModule;

/// Export schema constants as Python submodules
#[cfg(feature = "python")]
fn add_schema_exports(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Transaction
    let transaction = PyModule::new(m.py(), "transaction")?;
    transaction.add("TRANSACTION_ID", schema::transaction::TRANSACTION_ID)?;
    transaction.add("ACCOUNT_CODE", schema::transaction::ACCOUNT_CODE)?;
    transaction.add("ACCOUNT_NAME", schema::transaction::ACCOUNT_NAME)?;
    transaction.add("TRANSACTION_DATE", schema::transaction::TRANSACTION_DATE)?;
    transaction.add("DESCRIPTION", schema::transaction::DESCRIPTION)?;
    transaction.add("DEBIT_AMOUNT", schema::transaction::DEBIT_AMOUNT)?;
    transaction.add("CREDIT_AMOUNT", schema::transaction::CREDIT_AMOUNT)?;
    transaction.add("BALANCE_AMOUNT", schema::transaction::BALANCE_AMOUNT)?;
    transaction.add("VAT_AMOUNT", schema::transaction::VAT_AMOUNT)?;
    transaction.add("ALL", schema::transaction::ALL.to_vec())?;
    m.add_submodule(&transaction)?;

    // Provenance
    let provenance = PyModule::new(m.py(), "provenance")?;
    provenance.add("SOURCE_FILE", schema::provenance::SOURCE_FILE)?;
    provenance.add("LOADED_AT", schema::provenance::LOADED_AT)?;
    provenance.add("DATA_VERSION", schema::provenance::DATA_VERSION)?;
    m.add_submodule(&provenance)?;

    // Models
    let models = PyModule::new(m.py(), "models")?;
    models.add("STG_TRANSACTIONS", schema::models::STG_TRANSACTIONS)?;
    models.add("INT_TRANSACTIONS", schema::models::INT_TRANSACTIONS)?;
    models.add("MART_TRANSACTION_DETAILS", schema::models::MART_TRANSACTION_DETAILS)?;
    models.add("MART_ACCOUNT_SUMMARY", schema::models::MART_ACCOUNT_SUMMARY)?;
    models.add("MART_MONTHLY_TRENDS", schema::models::MART_MONTHLY_TRENDS)?;
    m.add_submodule(&models)?;

    // Derived
    let derived = PyModule::new(m.py(), "derived")?;
    derived.add("NET_AMOUNT", schema::derived::NET_AMOUNT)?;
    derived.add("TRANSACTION_YEAR", schema::derived::TRANSACTION_YEAR)?;
    derived.add("TRANSACTION_QUARTER", schema::derived::TRANSACTION_QUARTER)?;
    derived.add("TRANSACTION_MONTH", schema::derived::TRANSACTION_MONTH)?;
    derived.add("TRANSACTION_TYPE", schema::derived::TRANSACTION_TYPE)?;
    derived.add("AMOUNT_CATEGORY", schema::derived::AMOUNT_CATEGORY)?;
    derived.add("RUNNING_BALANCE", schema::derived::RUNNING_BALANCE)?;
    derived.add("DATA_QUALITY_FLAG", schema::derived::DATA_QUALITY_FLAG)?;
    m.add_submodule(&derived)?;

    // Account summary
    let account_summary = PyModule::new(m.py(), "account_summary")?;
    account_summary.add("NET_BALANCE", schema::account_summary::NET_BALANCE)?;
    account_summary.add("ACTIVITY_STATUS", schema::account_summary::ACTIVITY_STATUS)?;
    account_summary.add(
        "ACCOUNT_BALANCE_TYPE",
        schema::account_summary::ACCOUNT_BALANCE_TYPE,
    )?;
    account_summary.add(
        "BALANCE_VALUE_CATEGORY",
        schema::account_summary::BALANCE_VALUE_CATEGORY,
    )?;
    m.add_submodule(&account_summary)?;

    // Monthly trends
    let monthly_trends = PyModule::new(m.py(), "monthly_trends")?;
    monthly_trends.add("TRANSACTION_COUNT", schema::monthly_trends::TRANSACTION_COUNT)?;
    monthly_trends.add("NET_AMOUNT", schema::monthly_trends::NET_AMOUNT)?;
    m.add_submodule(&monthly_trends)?;

    // audit
    let audit = PyModule::new(m.py(), "audit")?;
    audit.add("SNAPSHOT_ID", schema::audit::SNAPSHOT_ID)?;
    audit.add("SNAPSHOT_CREATED_AT", schema::audit::SNAPSHOT_CREATED_AT)?;
    m.add_submodule(&audit)?;

    Ok(())
}

#[cfg(feature = "python")]
#[pymodule]
fn ledger_timetravel(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<python::PySnapshotStore>()?;
    add_schema_exports(m)?;
    Ok(())
}

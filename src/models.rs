//! Staging → intermediate → mart models as polars lazy plans.
//!
//! Every model is a pure function of its upstream tables, so running the set
//! twice against the same snapshot yields identical marts.

use std::collections::HashMap;

use polars::prelude::*;
use tracing::debug;

use crate::error::{LedgerError, Result};
use crate::model_graph::ModelGraph;
use crate::schema::{account_summary, derived, models, monthly_trends, provenance, transaction};

pub type Tables = HashMap<String, DataFrame>;
type BuildFn = fn(&Tables) -> Result<LazyFrame>;

// ── Classification thresholds ───────────────────────────────────────────────
const LARGE_AMOUNT: f64 = 10_000.0;
const MEDIUM_AMOUNT: f64 = 1_000.0;
const ACTIVE_DAYS: i32 = 90;
const INACTIVE_DAYS: i32 = 365;
const HIGH_VALUE: f64 = 100_000.0;
const MEDIUM_VALUE: f64 = 10_000.0;
const LOW_VALUE: f64 = 1_000.0;

pub struct ModelDef {
    pub name: &'static str,
    pub depends_on: &'static [&'static str],
    pub description: &'static str,
    build: BuildFn,
}

impl ModelDef {
    pub const fn new(
        name: &'static str,
        depends_on: &'static [&'static str],
        description: &'static str,
        build: BuildFn,
    ) -> Self {
        Self {
            name,
            depends_on,
            description,
            build,
        }
    }
}

fn input(tables: &Tables, name: &str) -> Result<LazyFrame> {
    tables
        .get(name)
        .map(|df| df.clone().lazy())
        .ok_or_else(|| LedgerError::NotFound(format!("table '{name}'")))
}

fn sort_options(descending: &[bool]) -> SortMultipleOptions {
    SortMultipleOptions::default()
        .with_order_descending_multi(descending.to_vec())
        .with_nulls_last(true)
        .with_maintain_order(true)
}

// ── Staging ─────────────────────────────────────────────────────────────────

/// Typed, null-safe view of the snapshot: every canonical column present,
/// amounts defaulting to zero, rows without date or account dropped.
pub fn stg_financial_transactions(tables: &Tables) -> Result<LazyFrame> {
    use transaction::*;

    let raw = tables
        .get(models::SNAPSHOT)
        .ok_or_else(|| LedgerError::NotFound("snapshot table".into()))?;
    let schema = raw.schema();

    // Cast columns if present, otherwise create null columns
    let typed = |name: &str, dtype: DataType| {
        if schema.contains(name) {
            col(name).cast(dtype)
        } else {
            lit(NULL).cast(dtype).alias(name)
        }
    };

    let mut exprs = Vec::new();
    for name in [
        TRANSACTION_ID,
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
        provenance::SOURCE_FILE,
    ] {
        exprs.push(typed(name, DataType::String));
    }
    for name in [BOOKING_NUMBER, NUMBER] {
        exprs.push(typed(name, DataType::Int64));
    }
    exprs.push(typed(TRANSACTION_DATE, DataType::Date));
    for name in [DEBIT_AMOUNT, CREDIT_AMOUNT, BALANCE_AMOUNT, VAT_AMOUNT] {
        exprs.push(typed(name, DataType::Float64));
    }

    Ok(raw
        .clone()
        .lazy()
        .select(exprs)
        .with_columns([
            col(DEBIT_AMOUNT).fill_null(lit(0.0)),
            col(CREDIT_AMOUNT).fill_null(lit(0.0)),
            col(ACCOUNT_CODE).str().strip_chars(lit(NULL)),
        ])
        .filter(
            col(TRANSACTION_DATE)
                .is_not_null()
                .and(col(ACCOUNT_CODE).is_not_null()),
        ))
}

// ── Intermediate ────────────────────────────────────────────────────────────

/// Staging plus net amount, calendar parts, transaction type and amount band.
pub fn int_transactions_enriched(tables: &Tables) -> Result<LazyFrame> {
    use derived::*;
    use transaction::*;

    let net = col(NET_AMOUNT);
    Ok(input(tables, models::STG_TRANSACTIONS)?
        .with_columns([
            (col(DEBIT_AMOUNT) - col(CREDIT_AMOUNT)).alias(NET_AMOUNT),
            col(TRANSACTION_DATE).dt().year().cast(DataType::Int32).alias(TRANSACTION_YEAR),
            col(TRANSACTION_DATE).dt().quarter().cast(DataType::Int32).alias(TRANSACTION_QUARTER),
            col(TRANSACTION_DATE).dt().month().cast(DataType::Int32).alias(TRANSACTION_MONTH),
        ])
        .with_columns([
            when(net.clone().gt(lit(0.0)))
                .then(lit("Debit"))
                .when(net.clone().lt(lit(0.0)))
                .then(lit("Credit"))
                .otherwise(lit("Zero"))
                .alias(TRANSACTION_TYPE),
            when(net.clone().abs().gt_eq(lit(LARGE_AMOUNT)))
                .then(lit("Large"))
                .when(net.clone().abs().gt_eq(lit(MEDIUM_AMOUNT)))
                .then(lit("Medium"))
                .when(net.abs().gt(lit(0.0)))
                .then(lit("Small"))
                .otherwise(lit("Zero"))
                .alias(AMOUNT_CATEGORY),
        ]))
}

// ── Marts ───────────────────────────────────────────────────────────────────

/// One row per transaction, newest first, with a per-account running balance.
pub fn mart_transaction_details(tables: &Tables) -> Result<LazyFrame> {
    use derived::*;
    use transaction::*;

    let both_sides = col(DEBIT_AMOUNT)
        .gt(lit(0.0))
        .and(col(CREDIT_AMOUNT).gt(lit(0.0)));

    Ok(input(tables, models::INT_TRANSACTIONS)?
        .sort(
            [ACCOUNT_CODE, TRANSACTION_DATE, BOOKING_NUMBER, TRANSACTION_ID],
            sort_options(&[false, false, false, false]),
        )
        .with_columns([
            col(NET_AMOUNT)
                .cum_sum(false)
                .over([col(ACCOUNT_CODE)])
                .alias(RUNNING_BALANCE),
            when(both_sides)
                .then(lit("Debit and credit"))
                .when(col(NET_AMOUNT).eq(lit(0.0)))
                .then(lit("Zero amount"))
                .otherwise(lit("OK"))
                .alias(DATA_QUALITY_FLAG),
        ])
        .sort(
            [TRANSACTION_DATE, BOOKING_NUMBER, TRANSACTION_ID],
            sort_options(&[true, true, false]),
        ))
}

/// One row per account, largest absolute balance first. Activity is measured
/// against the newest transaction in the data, not the wall clock.
pub fn mart_account_summary(tables: &Tables) -> Result<LazyFrame> {
    use account_summary::*;
    use transaction::*;

    let idle_days = col(LAST_TRANSACTION_DATE).max().cast(DataType::Int32)
        - col(LAST_TRANSACTION_DATE).cast(DataType::Int32);
    let net = col(NET_BALANCE);

    Ok(input(tables, models::INT_TRANSACTIONS)?
        .sort(
            [ACCOUNT_CODE, TRANSACTION_DATE, TRANSACTION_ID],
            sort_options(&[false, false, false]),
        )
        .group_by_stable([col(ACCOUNT_CODE)])
        .agg([
            col(ACCOUNT_NAME).drop_nulls().last().alias(ACCOUNT_NAME),
            len().cast(DataType::Int64).alias(TOTAL_TRANSACTIONS),
            col(DEBIT_AMOUNT).sum().alias(TOTAL_DEBIT),
            col(CREDIT_AMOUNT).sum().alias(TOTAL_CREDIT),
            col(derived::NET_AMOUNT).sum().alias(NET_BALANCE),
            col(VAT_AMOUNT).sum().alias(TOTAL_VAT),
            col(TRANSACTION_DATE).min().alias(FIRST_TRANSACTION_DATE),
            col(TRANSACTION_DATE).max().alias(LAST_TRANSACTION_DATE),
        ])
        .with_columns([
            when(idle_days.clone().lt_eq(lit(ACTIVE_DAYS)))
                .then(lit("Active"))
                .when(idle_days.lt_eq(lit(INACTIVE_DAYS)))
                .then(lit("Inactive"))
                .otherwise(lit("Dormant"))
                .alias(ACTIVITY_STATUS),
            when(net.clone().gt(lit(0.0)))
                .then(lit("Net Debit"))
                .when(net.clone().lt(lit(0.0)))
                .then(lit("Net Credit"))
                .otherwise(lit("Balanced"))
                .alias(ACCOUNT_BALANCE_TYPE),
            when(net.clone().abs().gt_eq(lit(HIGH_VALUE)))
                .then(lit("High Value"))
                .when(net.clone().abs().gt_eq(lit(MEDIUM_VALUE)))
                .then(lit("Medium Value"))
                .when(net.abs().gt_eq(lit(LOW_VALUE)))
                .then(lit("Low Value"))
                .otherwise(lit("Minimal"))
                .alias(BALANCE_VALUE_CATEGORY),
        ])
        .sort_by_exprs(
            [col(NET_BALANCE).abs(), col(ACCOUNT_CODE)],
            sort_options(&[true, false]),
        ))
}

/// Totals per calendar month, newest month first.
pub fn mart_monthly_trends(tables: &Tables) -> Result<LazyFrame> {
    use derived::{TRANSACTION_MONTH, TRANSACTION_YEAR};
    use monthly_trends::*;
    use transaction::{CREDIT_AMOUNT, DEBIT_AMOUNT};

    Ok(input(tables, models::INT_TRANSACTIONS)?
        .group_by([col(TRANSACTION_YEAR), col(TRANSACTION_MONTH)])
        .agg([
            len().cast(DataType::Int64).alias(TRANSACTION_COUNT),
            col(DEBIT_AMOUNT).sum().alias(TOTAL_DEBIT),
            col(CREDIT_AMOUNT).sum().alias(TOTAL_CREDIT),
            col(derived::NET_AMOUNT).sum().alias(NET_AMOUNT),
        ])
        .sort(
            [TRANSACTION_YEAR, TRANSACTION_MONTH],
            sort_options(&[true, true]),
        ))
}

pub fn standard_models() -> Vec<ModelDef> {
    use models::*;
    vec![
        ModelDef::new(
            STG_TRANSACTIONS,
            &[SNAPSHOT],
            "Typed staging view of the selected snapshot",
            stg_financial_transactions,
        ),
        ModelDef::new(
            INT_TRANSACTIONS,
            &[STG_TRANSACTIONS],
            "Transactions with net amount, calendar parts and categories",
            int_transactions_enriched,
        ),
        ModelDef::new(
            MART_TRANSACTION_DETAILS,
            &[INT_TRANSACTIONS],
            "Transaction grid with running balance per account",
            mart_transaction_details,
        ),
        ModelDef::new(
            MART_ACCOUNT_SUMMARY,
            &[INT_TRANSACTIONS],
            "Per-account totals and classifications",
            mart_account_summary,
        ),
        ModelDef::new(
            MART_MONTHLY_TRENDS,
            &[INT_TRANSACTIONS],
            "Monthly debit, credit and net totals",
            mart_monthly_trends,
        ),
    ]
}

/// A validated set of models with its dependency graph.
pub struct ModelSet {
    defs: HashMap<&'static str, ModelDef>,
    graph: ModelGraph,
    order: Vec<String>,
}

impl ModelSet {
    /// The snapshot is the only source; every other dependency must be a
    /// model of the set.
    pub fn new(defs: Vec<ModelDef>) -> Result<Self> {
        let mut graph = ModelGraph::new();
        graph.add_source(models::SNAPSHOT)?;
        for def in &defs {
            graph.add_model(def.name, def.depends_on)?;
        }
        let order = graph.execution_order()?;
        Ok(Self {
            defs: defs.into_iter().map(|d| (d.name, d)).collect(),
            graph,
            order,
        })
    }

    pub fn standard() -> Result<Self> {
        Self::new(standard_models())
    }

    pub fn graph(&self) -> &ModelGraph {
        &self.graph
    }

    /// Model names in execution order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn get(&self, name: &str) -> Option<&ModelDef> {
        self.defs.get(name)
    }

    /// Run every model against `snapshot`, in dependency order.
    pub fn run(&self, snapshot: DataFrame) -> Result<Vec<(String, DataFrame)>> {
        let mut tables = Tables::new();
        tables.insert(models::SNAPSHOT.to_string(), snapshot);

        let mut outputs = Vec::with_capacity(self.order.len());
        for name in &self.order {
            let def = self
                .defs
                .get(name.as_str())
                .ok_or_else(|| LedgerError::NotFound(format!("model '{name}'")))?;
            let df = (def.build)(&tables)
                .and_then(|lf| lf.collect().map_err(LedgerError::from))
                .map_err(|err| LedgerError::TransformationFailure(format!("{name}: {err}")))?;
            debug!(model = %name, rows = df.height(), "model built");
            tables.insert(name.clone(), df.clone());
            outputs.push((name.clone(), df));
        }
        Ok(outputs)
    }
}

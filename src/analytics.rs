use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use polars::prelude::*;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::Result;
use crate::model::{days_to_date, f64_to_decimal};
use crate::query::{DataAccess, FilterState};
use crate::schema::{account_summary, derived, models, provenance, transaction};

/// Figures for the dashboard summary cards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub total_accounts: usize,
    pub active_accounts: usize,
    /// Sum of positive account balances.
    pub total_assets: Decimal,
    /// Sum of the absolute value of negative account balances.
    pub total_liabilities: Decimal,
    pub total_transactions: usize,
    pub unique_accounts: usize,
    pub total_debit: Decimal,
    pub total_credit: Decimal,
    pub net_total: Decimal,
    pub earliest_date: Option<NaiveDate>,
    pub latest_date: Option<NaiveDate>,
    pub source_files: usize,
}

fn amounts(df: &DataFrame, name: &str) -> Result<Vec<Decimal>> {
    let Ok(column) = df.column(name) else {
        return Ok(Vec::new());
    };
    let values = column.cast(&DataType::Float64)?;
    Ok(values
        .f64()?
        .into_iter()
        .map(|v| v.and_then(f64_to_decimal).unwrap_or(Decimal::ZERO))
        .collect())
}

fn distinct_text(df: &DataFrame, name: &str) -> Result<usize> {
    let Ok(column) = df.column(name) else {
        return Ok(0);
    };
    let values = column.cast(&DataType::String)?;
    let distinct: HashSet<&str> = values.str()?.into_iter().flatten().collect();
    Ok(distinct.len())
}

impl DashboardStats {
    /// Compute from an account summary and a transaction detail table.
    ///
    /// Amounts are summed as decimals so cents never drift.
    pub fn compute(summary: &DataFrame, details: &DataFrame) -> Result<Self> {
        let balances = amounts(summary, account_summary::NET_BALANCE)?;
        let active_accounts = match summary.column(account_summary::ACTIVITY_STATUS) {
            Ok(c) => c.str()?.into_iter().filter(|s| *s == Some("Active")).count(),
            Err(_) => 0,
        };

        let total_debit: Decimal = amounts(details, transaction::DEBIT_AMOUNT)?.into_iter().sum();
        let total_credit: Decimal = amounts(details, transaction::CREDIT_AMOUNT)?.into_iter().sum();

        let (earliest_date, latest_date) = match details.column(transaction::TRANSACTION_DATE) {
            Ok(c) => {
                let days = c.cast(&DataType::Date)?.cast(&DataType::Int32)?;
                let days = days.i32()?;
                (
                    days.min().and_then(days_to_date),
                    days.max().and_then(days_to_date),
                )
            }
            Err(_) => (None, None),
        };

        Ok(Self {
            total_accounts: summary.height(),
            active_accounts,
            total_assets: balances.iter().filter(|b| b.is_sign_positive() && !b.is_zero()).sum(),
            total_liabilities: balances
                .iter()
                .filter(|b| b.is_sign_negative() && !b.is_zero())
                .map(|b| b.abs())
                .sum(),
            total_transactions: details.height(),
            unique_accounts: distinct_text(details, transaction::ACCOUNT_CODE)?,
            total_debit,
            total_credit,
            net_total: total_debit - total_credit,
            earliest_date,
            latest_date,
            source_files: distinct_text(details, provenance::SOURCE_FILE)?,
        })
    }

    /// Stats over the marts the filter selects. Calendar filters narrow the
    /// transaction figures; account figures always cover every account.
    pub fn for_filter(access: &DataAccess, filter: &FilterState) -> Result<Self> {
        let summary = access.query(models::MART_ACCOUNT_SUMMARY, filter)?;
        let details = access.query(models::MART_TRANSACTION_DETAILS, filter)?;
        Self::compute(&summary, &details)
    }
}

// ── Account rankings ────────────────────────────────────────────────────────

/// Accounts with the largest absolute net balance, ties broken by account
/// code.
pub fn top_accounts_by_balance(summary: &DataFrame, limit: usize) -> Result<DataFrame> {
    use account_summary::*;

    let wanted = [
        transaction::ACCOUNT_CODE,
        transaction::ACCOUNT_NAME,
        NET_BALANCE,
        ACCOUNT_BALANCE_TYPE,
        ACTIVITY_STATUS,
    ];
    let schema = summary.schema();
    let columns: Vec<Expr> = wanted
        .iter()
        .filter(|c| schema.contains(c))
        .map(|c| col(*c))
        .collect();

    Ok(summary
        .clone()
        .lazy()
        .sort_by_exprs(
            [col(NET_BALANCE).abs(), col(transaction::ACCOUNT_CODE)],
            SortMultipleOptions::default()
                .with_order_descending_multi([true, false])
                .with_nulls_last(true)
                .with_maintain_order(true),
        )
        .select(columns)
        .limit(limit as IdxSize)
        .collect()?)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityBreakdown {
    pub activity_status: String,
    pub account_count: usize,
    pub total_balance: Decimal,
    /// Rounded to cents.
    pub avg_balance: Decimal,
}

/// Account count and balances per activity status, most accounts first.
pub fn activity_breakdown(summary: &DataFrame) -> Result<Vec<ActivityBreakdown>> {
    let Ok(status) = summary.column(account_summary::ACTIVITY_STATUS) else {
        return Ok(Vec::new());
    };
    let status = status.cast(&DataType::String)?;
    let balances = amounts(summary, account_summary::NET_BALANCE)?;

    let mut groups: BTreeMap<String, (usize, Decimal)> = BTreeMap::new();
    for (i, s) in status.str()?.into_iter().enumerate() {
        let group = groups.entry(s.unwrap_or("Unknown").to_string()).or_default();
        group.0 += 1;
        group.1 += balances.get(i).copied().unwrap_or(Decimal::ZERO);
    }

    let mut out: Vec<ActivityBreakdown> = groups
        .into_iter()
        .map(|(activity_status, (count, total))| ActivityBreakdown {
            activity_status,
            account_count: count,
            total_balance: total,
            avg_balance: (total / Decimal::from(count)).round_dp(2),
        })
        .collect();
    out.sort_by(|a, b| {
        b.account_count
            .cmp(&a.account_count)
            .then_with(|| a.activity_status.cmp(&b.activity_status))
    });
    Ok(out)
}

pub fn top_accounts_for(access: &DataAccess, filter: &FilterState, limit: usize) -> Result<DataFrame> {
    top_accounts_by_balance(&access.query(models::MART_ACCOUNT_SUMMARY, filter)?, limit)
}

pub fn activity_breakdown_for(access: &DataAccess, filter: &FilterState) -> Result<Vec<ActivityBreakdown>> {
    activity_breakdown(&access.query(models::MART_ACCOUNT_SUMMARY, filter)?)
}

// ── Data quality ────────────────────────────────────────────────────────────

pub const QUALITY_OK: &str = "OK";

/// Data-quality flags found in a transaction detail table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QualityReport {
    pub rows_checked: usize,
    /// Rows per flag other than `OK`, by flag name.
    pub flagged: BTreeMap<String, usize>,
}

impl QualityReport {
    pub fn from_details(details: &DataFrame) -> Result<Self> {
        let mut report = Self {
            rows_checked: details.height(),
            ..Self::default()
        };
        let Ok(flags) = details.column(derived::DATA_QUALITY_FLAG) else {
            return Ok(report);
        };
        let flags = flags.cast(&DataType::String)?;
        for flag in flags.str()?.into_iter().flatten().filter(|f| *f != QUALITY_OK) {
            *report.flagged.entry(flag.to_string()).or_insert(0) += 1;
        }
        Ok(report)
    }

    pub fn flagged_rows(&self) -> usize {
        self.flagged.values().sum()
    }

    pub fn is_clean(&self) -> bool {
        self.flagged.is_empty()
    }
}

//! Predicted-vs-actual reconciliation.
//!
//! Pure joins: no smoothing, no plausibility checks. Whatever the parser
//! produced is laid next to what the ledger recorded.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use salescast_core::{Month, Sku, YearMonth};
use salescast_sales::MonthlyBucket;

use crate::result::ForecastOutcome;

/// One calendar month of a comparison table.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub month: Month,
    pub predicted: i64,
    pub actual: i64,
}

/// Column sums of a comparison table.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnTotals {
    pub predicted: i64,
    pub actual: i64,
}

/// Twelve rows, January..December, for one SKU and year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub sku: Sku,
    pub year: i32,
    pub rows: Vec<ComparisonRow>,
    pub totals: ColumnTotals,
    /// Total the forecast declared. For a parsed forecast this may differ from
    /// `totals.predicted` when the model's arithmetic is off.
    pub declared_total: i64,
    pub status: String,
    pub rationale: String,
}

impl ComparisonReport {
    /// Cumulative totals after each month.
    pub fn running_totals(&self) -> Vec<ColumnTotals> {
        let mut acc = ColumnTotals::default();
        self.rows
            .iter()
            .map(|row| {
                acc.predicted += row.predicted;
                acc.actual += row.actual;
                acc
            })
            .collect()
    }

    pub fn row(&self, month: Month) -> Option<&ComparisonRow> {
        self.rows.iter().find(|r| r.month == month)
    }
}

/// Join a forecast for `year` with the actual buckets of `sku`.
///
/// Buckets for other SKUs or other years are ignored; duplicate buckets for
/// the same month add up. Degraded and failed forecasts have no per-month
/// table, so their predicted column is all zeros and only `declared_total`
/// carries the single best-effort number.
pub fn reconcile(sku: &Sku, outcome: &ForecastOutcome, actuals: &[MonthlyBucket], year: i32) -> ComparisonReport {
    let mut actual_by_month: BTreeMap<Month, i64> = BTreeMap::new();
    for bucket in actuals
        .iter()
        .filter(|b| &b.sku == sku && b.year_month.year() == year)
    {
        *actual_by_month.entry(bucket.year_month.month()).or_insert(0) += bucket.quantity;
    }

    let predicted = outcome.monthly();

    let rows: Vec<ComparisonRow> = Month::ALL
        .iter()
        .map(|month| ComparisonRow {
            month: *month,
            predicted: predicted
                .and_then(|table| table.get(month))
                .map(|q| i64::from(*q))
                .unwrap_or(0),
            actual: actual_by_month.get(month).copied().unwrap_or(0),
        })
        .collect();

    let totals = rows.iter().fold(ColumnTotals::default(), |mut acc, row| {
        acc.predicted += row.predicted;
        acc.actual += row.actual;
        acc
    });

    ComparisonReport {
        sku: sku.clone(),
        year,
        rows,
        totals,
        declared_total: outcome.total_quantity(),
        status: outcome.status().to_string(),
        rationale: outcome.rationale(),
    }
}

/// Single-month forecast next to what actually sold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthComparison {
    pub sku: Sku,
    pub month: YearMonth,
    pub past_sales: BTreeMap<YearMonth, i64>,
    pub predicted: i64,
    pub actual: i64,
    pub rationale: String,
}

/// Build a [`MonthComparison`], summing the actual buckets that fall in `month`.
pub fn reconcile_month(
    sku: &Sku,
    month: YearMonth,
    history: &[MonthlyBucket],
    predicted: u32,
    actuals: &[MonthlyBucket],
    rationale: impl Into<String>,
) -> MonthComparison {
    let past_sales = history
        .iter()
        .filter(|b| &b.sku == sku)
        .map(|b| (b.year_month, b.quantity))
        .collect();
    let actual = actuals
        .iter()
        .filter(|b| &b.sku == sku && b.year_month == month)
        .map(|b| b.quantity)
        .sum();

    MonthComparison {
        sku: sku.clone(),
        month,
        past_sales,
        predicted: i64::from(predicted),
        actual,
        rationale: rationale.into(),
    }
}

//! Monthly aggregation over sale records (pure, no IO).
//!
//! Every function here recomputes its answer from the records it is handed;
//! nothing is cached and nothing is written back.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use salescast_core::{DateWindow, Sku, ValueObject, YearMonth};

use crate::record::SaleRecord;

/// `YYYY-MM` → total quantity. Only months with at least one record appear.
pub type MonthlyTotals = BTreeMap<YearMonth, i64>;

/// Which SKUs an aggregation query covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkuSelection {
    One(Sku),
    Many(BTreeSet<Sku>),
}

impl SkuSelection {
    pub fn contains(&self, sku: &Sku) -> bool {
        match self {
            SkuSelection::One(s) => s == sku,
            SkuSelection::Many(set) => set.contains(sku),
        }
    }
}

impl From<Sku> for SkuSelection {
    fn from(value: Sku) -> Self {
        SkuSelection::One(value)
    }
}

impl From<Vec<Sku>> for SkuSelection {
    fn from(value: Vec<Sku>) -> Self {
        SkuSelection::Many(value.into_iter().collect())
    }
}

/// Aggregated quantity sold for one SKU in one calendar month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyBucket {
    pub sku: Sku,
    pub year_month: YearMonth,
    pub quantity: i64,
}

impl ValueObject for MonthlyBucket {}

/// Total quantity of one SKU over a window (top-N row).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkuTotal {
    pub sku: Sku,
    pub total_quantity: i64,
}

/// Quantity and revenue of one SKU on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySales {
    pub date: NaiveDate,
    pub quantity: i64,
    pub total_amount: Decimal,
}

/// Totals that are dropped from top-N rankings.
///
/// Empty by default. Populating it is a data-cleansing decision: every match is
/// logged so a suspect outlier never disappears silently.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TotalExclusions(BTreeSet<i64>);

impl TotalExclusions {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn of(totals: impl IntoIterator<Item = i64>) -> Self {
        Self(totals.into_iter().collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn excludes(&self, total: i64) -> bool {
        self.0.contains(&total)
    }
}

/// Sum quantities per calendar month for the selected SKUs inside `window`.
///
/// Records in the same month add up arithmetically (no deduplication). A
/// selection without sales yields an empty map, not a zero-filled one.
pub fn monthly_totals<'a, I>(records: I, skus: &SkuSelection, window: &DateWindow) -> MonthlyTotals
where
    I: IntoIterator<Item = &'a SaleRecord>,
{
    let mut totals = MonthlyTotals::new();
    for rec in records {
        if !skus.contains(rec.sku()) || !window.contains(rec.order_timestamp()) {
            continue;
        }
        *totals.entry(rec.year_month()).or_insert(0) += rec.quantity();
    }
    totals
}

/// Monthly totals for every SKU that sold inside `window`.
pub fn monthly_totals_by_sku<'a, I>(records: I, window: &DateWindow) -> BTreeMap<Sku, MonthlyTotals>
where
    I: IntoIterator<Item = &'a SaleRecord>,
{
    let mut out: BTreeMap<Sku, MonthlyTotals> = BTreeMap::new();
    for rec in records {
        if !window.contains(rec.order_timestamp()) {
            continue;
        }
        *out.entry(rec.sku().clone())
            .or_default()
            .entry(rec.year_month())
            .or_insert(0) += rec.quantity();
    }
    out
}

/// Chronological buckets for the months present in `totals`.
pub fn history(sku: &Sku, totals: &MonthlyTotals) -> Vec<MonthlyBucket> {
    totals
        .iter()
        .map(|(ym, qty)| MonthlyBucket {
            sku: sku.clone(),
            year_month: *ym,
            quantity: *qty,
        })
        .collect()
}

/// One bucket per month in `months`, with 0 where `totals` has no entry.
pub fn zero_filled(sku: &Sku, totals: &MonthlyTotals, months: &[YearMonth]) -> Vec<MonthlyBucket> {
    months
        .iter()
        .map(|ym| MonthlyBucket {
            sku: sku.clone(),
            year_month: *ym,
            quantity: totals.get(ym).copied().unwrap_or(0),
        })
        .collect()
}

/// The `n` best-selling SKUs inside `window`, by total quantity descending.
///
/// Ties keep the order in which the SKUs were first seen in `records`. That
/// order follows the ledger and is not part of the contract.
pub fn top_n<'a, I>(
    records: I,
    window: &DateWindow,
    n: usize,
    exclusions: &TotalExclusions,
) -> Vec<SkuTotal>
where
    I: IntoIterator<Item = &'a SaleRecord>,
{
    let mut order: Vec<SkuTotal> = Vec::new();
    let mut index: HashMap<&Sku, usize> = HashMap::new();

    for rec in records {
        if !window.contains(rec.order_timestamp()) {
            continue;
        }
        match index.get(rec.sku()) {
            Some(&i) => order[i].total_quantity += rec.quantity(),
            None => {
                index.insert(rec.sku(), order.len());
                order.push(SkuTotal {
                    sku: rec.sku().clone(),
                    total_quantity: rec.quantity(),
                });
            }
        }
    }

    if !exclusions.is_empty() {
        order.retain(|row| {
            if exclusions.excludes(row.total_quantity) {
                tracing::warn!(
                    sku = %row.sku,
                    total_quantity = row.total_quantity,
                    "excluding SKU from ranking: total matches a configured suspect value"
                );
                false
            } else {
                true
            }
        });
    }

    // Stable: equal totals keep first-seen order.
    order.sort_by(|a, b| b.total_quantity.cmp(&a.total_quantity));
    order.truncate(n);
    order
}

/// Per-day quantity and revenue for one SKU inside `window`, oldest first.
///
/// Revenue is rounded to 2 decimal places.
pub fn daily_history<'a, I>(records: I, sku: &Sku, window: &DateWindow) -> Vec<DailySales>
where
    I: IntoIterator<Item = &'a SaleRecord>,
{
    let mut days: BTreeMap<NaiveDate, (i64, Decimal)> = BTreeMap::new();
    for rec in records {
        if rec.sku() != sku || !window.contains(rec.order_timestamp()) {
            continue;
        }
        let entry = days.entry(rec.order_date()).or_insert((0, Decimal::ZERO));
        entry.0 += rec.quantity();
        entry.1 += rec.line_total();
    }

    days.into_iter()
        .map(|(date, (quantity, amount))| DailySales {
            date,
            quantity,
            total_amount: amount.round_dp(2),
        })
        .collect()
}

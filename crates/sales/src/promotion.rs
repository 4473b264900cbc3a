//! Promotion performance per SKU and month.
//!
//! Ad-platform exports arrive one table per month; each row reports how a
//! variant performed while promoted. Only the four counters the forecast
//! prompt shows are kept.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use salescast_core::{DateWindow, DomainError, Sku, ValueObject, YearMonth};

/// Counters reported for one promoted SKU in one month.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionMetrics {
    pub impressions: i64,
    pub clicks: i64,
    pub revenue: Decimal,
    pub units_sold: i64,
}

impl ValueObject for PromotionMetrics {}

impl PromotionMetrics {
    pub fn new(impressions: i64, clicks: i64, revenue: Decimal, units_sold: i64) -> Result<Self, DomainError> {
        if impressions < 0 || clicks < 0 || units_sold < 0 {
            return Err(DomainError::validation("promotion counters must not be negative"));
        }
        Ok(Self {
            impressions,
            clicks,
            revenue,
            units_sold,
        })
    }

    /// Field-wise sum; used when several rows report the same SKU and month.
    pub fn combine(self, other: Self) -> Self {
        Self {
            impressions: self.impressions.saturating_add(other.impressions),
            clicks: self.clicks.saturating_add(other.clicks),
            revenue: self.revenue.saturating_add(other.revenue),
            units_sold: self.units_sold.saturating_add(other.units_sold),
        }
    }
}

/// One row of a monthly promotion export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionRecord {
    pub sku: Sku,
    pub year_month: YearMonth,
    pub metrics: PromotionMetrics,
}

impl ValueObject for PromotionRecord {}

impl PromotionRecord {
    pub fn new(sku: Sku, year_month: YearMonth, metrics: PromotionMetrics) -> Self {
        Self {
            sku,
            year_month,
            metrics,
        }
    }
}

/// Promotion metrics of a single SKU keyed by month, chronological.
///
/// Months without a promotion are absent rather than zero-filled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromotionSummary(BTreeMap<YearMonth, PromotionMetrics>);

impl ValueObject for PromotionSummary {}

impl PromotionSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Summarize `sku` over the months whose first instant lies in `window`.
    pub fn from_records<'a>(
        records: impl IntoIterator<Item = &'a PromotionRecord>,
        sku: &Sku,
        window: &DateWindow,
    ) -> Self {
        let mut summary = Self::new();
        for record in records {
            if &record.sku != sku {
                continue;
            }
            let Some(start) = record.year_month.start() else {
                continue;
            };
            if window.contains(start) {
                summary.add(record.year_month, record.metrics);
            }
        }
        summary
    }

    pub fn add(&mut self, month: YearMonth, metrics: PromotionMetrics) {
        self.0
            .entry(month)
            .and_modify(|m| *m = m.combine(metrics))
            .or_insert(metrics);
    }

    pub fn get(&self, month: &YearMonth) -> Option<&PromotionMetrics> {
        self.0.get(month)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&YearMonth, &PromotionMetrics)> {
        self.0.iter()
    }

    pub fn first_month(&self) -> Option<YearMonth> {
        self.0.keys().next().copied()
    }

    pub fn last_month(&self) -> Option<YearMonth> {
        self.0.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

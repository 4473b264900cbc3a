use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use salescast_core::{Sku, YearMonth};
use salescast_sales::MonthlyBucket;

pub const DEFAULT_TOP_N: usize = 5;
pub const MAX_TOP_N: usize = 100;

// -------------------------
// Query DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct TopSkusQuery {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub n: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct BeforeQuery {
    pub before: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct YearQuery {
    pub year: i32,
}

#[derive(Debug, Deserialize)]
pub struct NextMonthQuery {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub n: Option<usize>,
    pub month: YearMonth,
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<usize>,
}

pub fn clamp_n(n: Option<usize>) -> usize {
    n.unwrap_or(DEFAULT_TOP_N).clamp(1, MAX_TOP_N)
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct TopSkuResponse {
    pub sku: Sku,
    pub product_title: Option<String>,
    pub total_quantity: i64,
}

#[derive(Debug, Serialize)]
pub struct MonthlyHistoryEntry {
    pub month: YearMonth,
    pub quantity: i64,
}

impl From<MonthlyBucket> for MonthlyHistoryEntry {
    fn from(bucket: MonthlyBucket) -> Self {
        Self {
            month: bucket.year_month,
            quantity: bucket.quantity,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MonthlyHistoryResponse {
    pub sku: Sku,
    pub before: NaiveDate,
    pub history: Vec<MonthlyHistoryEntry>,
}

//! Sales ledger domain module.
//!
//! Sale records, catalog listings, promotion metrics and the monthly
//! aggregation rules built on top of them, implemented as deterministic domain
//! logic (no HTTP, no storage drivers).

pub mod aggregate;
pub mod ledger;
pub mod promotion;
pub mod record;

pub use aggregate::{
    DailySales, MonthlyBucket, MonthlyTotals, SkuSelection, SkuTotal, TotalExclusions,
};
pub use ledger::{InMemorySalesLedger, SalesLedger};
pub use promotion::{PromotionMetrics, PromotionRecord, PromotionSummary};
pub use record::{ProductListing, SaleRecord};

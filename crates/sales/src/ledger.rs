//! Read-only ledger abstraction over recorded sales.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use salescast_core::{DateWindow, Sku};

use crate::aggregate::{self, DailySales, MonthlyTotals, SkuSelection, SkuTotal, TotalExclusions};
use crate::promotion::{PromotionRecord, PromotionSummary};
use crate::record::{ProductListing, SaleRecord};

/// Source of recorded sales and catalog listings.
///
/// Implementors only provide raw access; aggregation is shared through the
/// provided methods so every ledger answers queries identically.
pub trait SalesLedger: Send + Sync {
    /// Records whose order timestamp falls inside `window`, in ledger order.
    fn records(&self, window: &DateWindow) -> Vec<SaleRecord>;

    fn listing(&self, sku: &Sku) -> Option<ProductListing>;

    /// Records of the selected SKUs only. Override when the backing store can
    /// filter cheaper than a full scan.
    fn records_for(&self, skus: &SkuSelection, window: &DateWindow) -> Vec<SaleRecord> {
        self.records(window)
            .into_iter()
            .filter(|r| skus.contains(r.sku()))
            .collect()
    }

    fn monthly_totals(&self, skus: &SkuSelection, window: &DateWindow) -> MonthlyTotals {
        aggregate::monthly_totals(&self.records_for(skus, window), skus, window)
    }

    fn top_n(&self, window: &DateWindow, n: usize, exclusions: &TotalExclusions) -> Vec<SkuTotal> {
        aggregate::top_n(&self.records(window), window, n, exclusions)
    }

    fn daily_history(&self, sku: &Sku, window: &DateWindow) -> Vec<DailySales> {
        let selection = SkuSelection::One(sku.clone());
        aggregate::daily_history(&self.records_for(&selection, window), sku, window)
    }

    /// Promotion metrics for `sku` in the months starting inside `window`.
    /// Ledgers without promotion data report none.
    fn promotions(&self, _sku: &Sku, _window: &DateWindow) -> PromotionSummary {
        PromotionSummary::new()
    }
}

impl<S> SalesLedger for Arc<S>
where
    S: SalesLedger + ?Sized,
{
    fn records(&self, window: &DateWindow) -> Vec<SaleRecord> {
        (**self).records(window)
    }

    fn listing(&self, sku: &Sku) -> Option<ProductListing> {
        (**self).listing(sku)
    }

    fn records_for(&self, skus: &SkuSelection, window: &DateWindow) -> Vec<SaleRecord> {
        (**self).records_for(skus, window)
    }

    fn promotions(&self, sku: &Sku, window: &DateWindow) -> PromotionSummary {
        (**self).promotions(sku, window)
    }
}

/// In-memory ledger: an append-only record list plus a SKU-keyed catalog.
///
/// Used directly in tests/dev and as the snapshot hydrated from Postgres.
#[derive(Debug, Default)]
pub struct InMemorySalesLedger {
    records: RwLock<Vec<SaleRecord>>,
    listings: RwLock<HashMap<Sku, ProductListing>>,
    promotions: RwLock<Vec<PromotionRecord>>,
}

impl InMemorySalesLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, record: SaleRecord) {
        if let Ok(mut records) = self.records.write() {
            records.push(record);
        }
    }

    pub fn record_many(&self, batch: impl IntoIterator<Item = SaleRecord>) {
        if let Ok(mut records) = self.records.write() {
            records.extend(batch);
        }
    }

    pub fn upsert_listing(&self, listing: ProductListing) {
        if let Ok(mut map) = self.listings.write() {
            map.insert(listing.sku.clone(), listing);
        }
    }

    pub fn record_promotions(&self, batch: impl IntoIterator<Item = PromotionRecord>) {
        if let Ok(mut promotions) = self.promotions.write() {
            promotions.extend(batch);
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the whole snapshot (rebuild support).
    pub fn replace(&self, records: Vec<SaleRecord>, listings: Vec<ProductListing>) {
        if let Ok(mut r) = self.records.write() {
            *r = records;
        }
        if let Ok(mut map) = self.listings.write() {
            *map = listings.into_iter().map(|l| (l.sku.clone(), l)).collect();
        }
    }

    pub fn replace_promotions(&self, promotions: Vec<PromotionRecord>) {
        if let Ok(mut p) = self.promotions.write() {
            *p = promotions;
        }
    }
}

impl SalesLedger for InMemorySalesLedger {
    fn records(&self, window: &DateWindow) -> Vec<SaleRecord> {
        let records = match self.records.read() {
            Ok(r) => r,
            Err(_) => return vec![],
        };
        records
            .iter()
            .filter(|r| window.contains(r.order_timestamp()))
            .cloned()
            .collect()
    }

    fn listing(&self, sku: &Sku) -> Option<ProductListing> {
        let map = self.listings.read().ok()?;
        map.get(sku).cloned()
    }

    fn promotions(&self, sku: &Sku, window: &DateWindow) -> PromotionSummary {
        match self.promotions.read() {
            Ok(p) => PromotionSummary::from_records(p.iter(), sku, window),
            Err(_) => PromotionSummary::new(),
        }
    }

    fn records_for(&self, skus: &SkuSelection, window: &DateWindow) -> Vec<SaleRecord> {
        let records = match self.records.read() {
            Ok(r) => r,
            Err(_) => return vec![],
        };
        records
            .iter()
            .filter(|r| skus.contains(r.sku()) && window.contains(r.order_timestamp()))
            .cloned()
            .collect()
    }
}

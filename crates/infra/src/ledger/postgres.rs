//! Postgres-backed ledger hydration.
//!
//! The storefront schema is owned elsewhere; this loader only reads it. Line
//! items are joined to their order (timestamp) and variant (SKU). Variants
//! without a SKU are skipped, as are rows that fail record validation.
//!
//! Promotion exports live in one table per month, keyed by the variant's
//! storefront id. Which tables exist is configuration, see [`PromotionTable`].
//!
//! ## Error Mapping
//!
//! | SQLx Error | LedgerLoadError |
//! |------------|-----------------|
//! | PoolClosed | `Unavailable` |
//! | Io / Tls / PoolTimedOut | `Unavailable` |
//! | Database | `Query` |
//! | ColumnDecode / Decode / other | `Decode` |

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use sqlx::{PgPool, Row};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use salescast_core::{DomainError, Sku, YearMonth};
use salescast_sales::{InMemorySalesLedger, ProductListing, PromotionMetrics, PromotionRecord, SaleRecord};

#[derive(Debug, Error)]
pub enum LedgerLoadError {
    #[error("database unavailable in {operation}: {reason}")]
    Unavailable { operation: &'static str, reason: String },

    #[error("query failed in {operation}: {reason}")]
    Query { operation: &'static str, reason: String },

    #[error("could not decode row in {operation}: {reason}")]
    Decode { operation: &'static str, reason: String },
}

/// Counts reported by [`PostgresLedgerLoader::hydrate`].
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct HydrationSummary {
    pub listings: usize,
    pub records: usize,
    pub promotions: usize,
    pub skipped: usize,
}

/// A monthly promotion export table and the month it reports on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotionTable {
    pub month: YearMonth,
    table: String,
}

impl PromotionTable {
    /// `table` must be a plain SQL identifier; it is spliced into the query.
    pub fn new(month: YearMonth, table: impl Into<String>) -> Result<Self, String> {
        let table = table.into();
        let mut chars = table.chars();
        let valid = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(format!("{table:?} is not a plain table name"));
        }
        Ok(Self { month, table })
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

impl std::str::FromStr for PromotionTable {
    type Err = String;

    /// `YYYY-MM=table_name`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (month, table) = s
            .split_once('=')
            .ok_or_else(|| format!("expected YYYY-MM=table, got {s:?}"))?;
        let month: YearMonth = month.trim().parse().map_err(|e: DomainError| e.to_string())?;
        Self::new(month, table.trim())
    }
}

#[derive(Debug, Clone)]
pub struct PostgresLedgerLoader {
    pool: PgPool,
    promotion_tables: Vec<PromotionTable>,
}

impl PostgresLedgerLoader {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            promotion_tables: Vec::new(),
        }
    }

    pub fn with_promotion_tables(mut self, tables: Vec<PromotionTable>) -> Self {
        self.promotion_tables = tables;
        self
    }

    /// One listing per SKU-bearing variant.
    #[instrument(skip(self), err)]
    pub async fn load_listings(&self) -> Result<Vec<ProductListing>, LedgerLoadError> {
        let rows = sqlx::query(
            r#"
            SELECT
                v.sku,
                v.title AS variant_title,
                v.price,
                p.title AS product_title,
                p.product_type,
                p.vendor
            FROM customer_productvariant v
            JOIN customer_product p ON p.id = v.product_id
            WHERE v.sku IS NOT NULL AND v.sku <> ''
            ORDER BY v.id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_listings", e))?;

        let mut listings = Vec::with_capacity(rows.len());
        for row in rows {
            let raw_sku: String = row.try_get("sku").map_err(|e| map_sqlx_error("load_listings", e))?;
            let Ok(sku) = Sku::parse(&raw_sku) else {
                warn!(sku = %raw_sku, "skipping variant with unusable SKU");
                continue;
            };
            let product_title: String = row
                .try_get("product_title")
                .map_err(|e| map_sqlx_error("load_listings", e))?;
            let variant_title: String = row
                .try_get("variant_title")
                .map_err(|e| map_sqlx_error("load_listings", e))?;
            let product_type: Option<String> = row
                .try_get("product_type")
                .map_err(|e| map_sqlx_error("load_listings", e))?;
            let vendor: Option<String> = row.try_get("vendor").map_err(|e| map_sqlx_error("load_listings", e))?;
            let price: f64 = row.try_get("price").map_err(|e| map_sqlx_error("load_listings", e))?;

            let mut listing = ProductListing::new(sku, product_title)
                .with_variant_title(variant_title)
                .with_price(to_decimal(price));
            if let Some(t) = product_type.filter(|t| !t.trim().is_empty()) {
                listing = listing.with_product_type(t);
            }
            if let Some(v) = vendor.filter(|v| !v.trim().is_empty()) {
                listing = listing.with_vendor(v);
            }
            listings.push(listing);
        }
        Ok(listings)
    }

    /// All line items with a SKU, oldest order first. Invalid rows are counted
    /// and skipped.
    #[instrument(skip(self), err)]
    pub async fn load_sales(&self) -> Result<(Vec<SaleRecord>, usize), LedgerLoadError> {
        let rows = sqlx::query(
            r#"
            SELECT
                v.sku,
                o.order_date,
                li.quantity,
                li.price
            FROM customer_orderlineitem li
            JOIN customer_order o ON o.id = li.order_id
            JOIN customer_productvariant v ON v.id = li.variant_id
            WHERE v.sku IS NOT NULL AND v.sku <> ''
            ORDER BY o.order_date ASC, li.id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_sales", e))?;

        let mut records = Vec::with_capacity(rows.len());
        let mut skipped = 0usize;
        for row in rows {
            let raw_sku: String = row.try_get("sku").map_err(|e| map_sqlx_error("load_sales", e))?;
            let order_date: DateTime<Utc> = row
                .try_get("order_date")
                .map_err(|e| map_sqlx_error("load_sales", e))?;
            let quantity: i32 = row.try_get("quantity").map_err(|e| map_sqlx_error("load_sales", e))?;
            let price: f64 = row.try_get("price").map_err(|e| map_sqlx_error("load_sales", e))?;

            let record = Sku::parse(&raw_sku)
                .and_then(|sku| SaleRecord::new(sku, order_date, i64::from(quantity), to_decimal(price)));
            match record {
                Ok(r) => records.push(r),
                Err(e) => {
                    skipped += 1;
                    debug!(sku = %raw_sku, error = %e, "skipping line item");
                }
            }
        }
        Ok((records, skipped))
    }

    /// Promotion rows from every configured monthly table. Rows with
    /// negative counters are counted and skipped.
    #[instrument(skip(self), err)]
    pub async fn load_promotions(&self) -> Result<(Vec<PromotionRecord>, usize), LedgerLoadError> {
        let mut promotions = Vec::new();
        let mut skipped = 0usize;
        for source in &self.promotion_tables {
            let sql = promotion_query(source.table());
            let rows = sqlx::query(&sql)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("load_promotions", e))?;
            debug!(table = source.table(), month = %source.month, rows = rows.len(), "promotion table read");

            for row in rows {
                let raw_sku: String = row.try_get("sku").map_err(|e| map_sqlx_error("load_promotions", e))?;
                let impressions: i64 = row
                    .try_get("impressions")
                    .map_err(|e| map_sqlx_error("load_promotions", e))?;
                let clicks: i64 = row.try_get("clicks").map_err(|e| map_sqlx_error("load_promotions", e))?;
                let revenue: f64 = row.try_get("revenue").map_err(|e| map_sqlx_error("load_promotions", e))?;
                let units_sold: i64 = row
                    .try_get("units_sold")
                    .map_err(|e| map_sqlx_error("load_promotions", e))?;

                let record = Sku::parse(&raw_sku).and_then(|sku| {
                    PromotionMetrics::new(impressions, clicks, to_decimal(revenue), units_sold)
                        .map(|metrics| PromotionRecord::new(sku, source.month, metrics))
                });
                match record {
                    Ok(r) => promotions.push(r),
                    Err(e) => {
                        skipped += 1;
                        debug!(sku = %raw_sku, table = source.table(), error = %e, "skipping promotion row");
                    }
                }
            }
        }
        Ok((promotions, skipped))
    }

    /// Replace the contents of `ledger` with a fresh snapshot.
    #[instrument(skip(self, ledger), err)]
    pub async fn hydrate(&self, ledger: &InMemorySalesLedger) -> Result<HydrationSummary, LedgerLoadError> {
        let listings = self.load_listings().await?;
        let (records, skipped_sales) = self.load_sales().await?;
        let (promotions, skipped_promotions) = self.load_promotions().await?;
        let skipped = skipped_sales + skipped_promotions;
        let summary = HydrationSummary {
            listings: listings.len(),
            records: records.len(),
            promotions: promotions.len(),
            skipped,
        };
        if skipped > 0 {
            warn!(skipped_sales, skipped_promotions, "rows skipped during hydration");
        }
        ledger.replace(records, listings);
        ledger.replace_promotions(promotions);
        Ok(summary)
    }
}

fn promotion_query(table: &str) -> String {
    format!(
        r#"
        SELECT
            v.sku,
            COALESCE(p.impressions, 0)::BIGINT AS impressions,
            COALESCE(p.clicks, 0)::BIGINT AS clicks,
            COALESCE(p.revenue, 0)::FLOAT8 AS revenue,
            COALESCE(p.units_sold, 0)::BIGINT AS units_sold
        FROM {table} p
        JOIN customer_productvariant v ON v.shopify_id::TEXT = p.variant_id::TEXT
        WHERE v.sku IS NOT NULL AND v.sku <> ''
        ORDER BY p.id ASC
        "#
    )
}

/// Storefront prices are floats; cents are what matters.
fn to_decimal(price: f64) -> Decimal {
    Decimal::from_f64(price)
        .map(|d| d.round_dp(2))
        .unwrap_or(Decimal::ZERO)
}

fn map_sqlx_error(operation: &'static str, err: sqlx::Error) -> LedgerLoadError {
    match err {
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
            LedgerLoadError::Unavailable {
                operation,
                reason: err.to_string(),
            }
        }
        sqlx::Error::Database(db_err) => LedgerLoadError::Query {
            operation,
            reason: db_err.message().to_string(),
        },
        other => LedgerLoadError::Decode {
            operation,
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_prices_round_to_cents() {
        assert_eq!(to_decimal(499.0), Decimal::new(49900, 2));
        assert_eq!(to_decimal(19.999), Decimal::new(2000, 2));
        assert_eq!(to_decimal(f64::NAN), Decimal::ZERO);
    }

    #[test]
    fn promotion_table_parses_month_and_name() {
        let t: PromotionTable = "2025-04=customer_customerpromotion_april".parse().unwrap();
        assert_eq!(t.month, "2025-04".parse::<YearMonth>().unwrap());
        assert_eq!(t.table(), "customer_customerpromotion_april");
        assert!(promotion_query(t.table()).contains("FROM customer_customerpromotion_april p"));
    }

    #[test]
    fn promotion_table_rejects_non_identifiers() {
        assert!("2025-04=promo; DROP TABLE x".parse::<PromotionTable>().is_err());
        assert!("2025-04=1promo".parse::<PromotionTable>().is_err());
        assert!("2025-13=promo".parse::<PromotionTable>().is_err());
        assert!("customer_customerpromotion_april".parse::<PromotionTable>().is_err());
    }

    #[test]
    fn pool_errors_map_to_unavailable() {
        let err = map_sqlx_error("load_sales", sqlx::Error::PoolClosed);
        assert!(matches!(err, LedgerLoadError::Unavailable { operation: "load_sales", .. }));
    }

    #[test]
    fn row_not_found_maps_to_decode() {
        let err = map_sqlx_error("load_listings", sqlx::Error::RowNotFound);
        assert!(matches!(err, LedgerLoadError::Decode { .. }));
    }
}

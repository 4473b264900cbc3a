use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use salescast_core::{DomainError, Sku, ValueObject, YearMonth};

/// One ingested order line item, reduced to what aggregation needs.
///
/// Immutable once recorded: the ledger only ever appends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleRecord {
    sku: Sku,
    order_timestamp: DateTime<Utc>,
    quantity: i64,
    unit_price: Decimal,
}

impl ValueObject for SaleRecord {}

impl SaleRecord {
    pub fn new(
        sku: Sku,
        order_timestamp: DateTime<Utc>,
        quantity: i64,
        unit_price: Decimal,
    ) -> Result<Self, DomainError> {
        if quantity < 0 {
            return Err(DomainError::validation("quantity must not be negative"));
        }
        if unit_price.is_sign_negative() {
            return Err(DomainError::validation("unit_price must not be negative"));
        }
        Ok(Self {
            sku,
            order_timestamp,
            quantity,
            unit_price,
        })
    }

    pub fn sku(&self) -> &Sku {
        &self.sku
    }

    pub fn order_timestamp(&self) -> DateTime<Utc> {
        self.order_timestamp
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    pub fn year_month(&self) -> YearMonth {
        YearMonth::of(self.order_timestamp)
    }

    pub fn order_date(&self) -> NaiveDate {
        self.order_timestamp.date_naive()
    }

    /// Revenue of the line (`unit_price × quantity`).
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Catalog entry for a SKU: what the prompt and reports show next to the numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductListing {
    pub sku: Sku,
    pub product_title: String,
    pub variant_title: String,
    pub product_type: Option<String>,
    pub vendor: Option<String>,
    pub price: Decimal,
}

impl ProductListing {
    pub fn new(sku: Sku, product_title: impl Into<String>) -> Self {
        Self {
            sku,
            product_title: product_title.into(),
            variant_title: String::new(),
            product_type: None,
            vendor: None,
            price: Decimal::ZERO,
        }
    }

    pub fn with_variant_title(mut self, title: impl Into<String>) -> Self {
        self.variant_title = title.into();
        self
    }

    pub fn with_product_type(mut self, product_type: impl Into<String>) -> Self {
        self.product_type = Some(product_type.into());
        self
    }

    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = Some(vendor.into());
        self
    }

    pub fn with_price(mut self, price: Decimal) -> Self {
        self.price = price;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sku() -> Sku {
        Sku::parse("RING-001").unwrap()
    }

    #[test]
    fn negative_quantity_is_rejected() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let err = SaleRecord::new(sku(), at, -1, Decimal::new(1999, 2)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn negative_price_is_rejected() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        assert!(SaleRecord::new(sku(), at, 1, Decimal::new(-1, 0)).is_err());
    }

    #[test]
    fn line_total_multiplies_price_and_quantity() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let rec = SaleRecord::new(sku(), at, 3, Decimal::new(1250, 2)).unwrap();
        assert_eq!(rec.line_total(), Decimal::new(3750, 2));
        assert_eq!(rec.year_month().to_string(), "2024-03");
    }
}

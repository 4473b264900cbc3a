//! Value object trait: equality by value, not identity.
//!
//! Everything the forecasting pipeline handles is a value object: sale records,
//! monthly buckets, forecast requests and comparison rows are recomputed from the
//! ledger on demand and never carry identity of their own.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. Two monthly buckets
/// with the same SKU, month and quantity are the same bucket, no matter which
/// query produced them.
///
/// The trait requires `Clone + PartialEq + Debug` so values can be copied into
/// reports, compared in tests and logged.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq)]
/// struct MonthlyBucket {
///     sku: Sku,
///     year_month: YearMonth,
///     quantity: i64,
/// }
///
/// impl ValueObject for MonthlyBucket {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

//! Ledger adapters backed by external storage.

pub mod postgres;

pub use postgres::{HydrationSummary, LedgerLoadError, PostgresLedgerLoader, PromotionTable};

//! `salescast-ai`
//!
//! **Responsibility:** the model-facing half of the forecast pipeline.
//!
//! This crate is pure:
//! - It never performs IO; generation calls live in `salescast-infra`.
//! - It never reads the clock; callers pass instants and dates in.
//! - It never writes to the sales ledger.
//!
//! Flow: [`ForecastRequest`] → [`PromptBuilder`] → (external call) →
//! [`ResponseParser`] → [`reconcile`].

pub mod parser;
pub mod prompt;
pub mod reconcile;
pub mod result;
pub mod scheduler;

pub use parser::{DEFAULT_PLAUSIBILITY_CEILING, ResponseParser};
pub use prompt::{DEFAULT_GUIDANCE, ForecastHorizon, ForecastRequest, PromptBuilder, StoreContext};
pub use reconcile::{
    ColumnTotals, ComparisonReport, ComparisonRow, MonthComparison, reconcile, reconcile_month,
};
pub use result::{
    DecodeError, ExtractionRule, FailureKind, ForecastOutcome, ForecastResult, QuantityEstimate,
};
pub use scheduler::{Throttle, ThrottlePolicy};

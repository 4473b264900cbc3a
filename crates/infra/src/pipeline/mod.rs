//! Forecast orchestration.
//!
//! Drives ledger → prompt → generation → parse → reconcile for batches of
//! SKUs. Failures are contained per SKU and never abort a running batch.

mod runner;
mod sink;

pub use runner::{ForecastPipeline, NextMonthForecast, NextMonthItem, PipelineError, SkuForecastReport};
pub use sink::{ForecastReport, ForecastReportSink, InMemoryReportSink};

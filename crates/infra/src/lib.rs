//! Infrastructure layer: configuration, generation clients, Postgres, and the
//! forecast pipeline runner.

pub mod config;
pub mod generation;
pub mod ledger;
pub mod pipeline;

pub use config::{ConfigError, GenerationSettings, LogFormat, PipelineConfig};
pub use generation::{GeminiClient, GenerationClient, ScriptedGenerationClient, TransportError};
pub use ledger::{HydrationSummary, LedgerLoadError, PostgresLedgerLoader, PromotionTable};
pub use pipeline::{
    ForecastPipeline, ForecastReport, ForecastReportSink, InMemoryReportSink, NextMonthForecast, NextMonthItem,
    PipelineError, SkuForecastReport,
};

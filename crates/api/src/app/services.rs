use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;

use salescast_infra::{
    ForecastPipeline, ForecastReportSink, GeminiClient, GenerationClient, InMemoryReportSink, PipelineConfig,
    PipelineError, PostgresLedgerLoader,
};
use salescast_sales::{InMemorySalesLedger, SalesLedger, TotalExclusions};

/// Pipeline over type-erased ledger and client, as served by the API.
pub type DynPipeline = ForecastPipeline<dyn SalesLedger, dyn GenerationClient>;

/// Everything a handler can reach.
pub struct AppServices {
    pub ledger: Arc<dyn SalesLedger>,
    /// `None` when no generation client is configured; forecast routes answer 503.
    pub pipeline: Option<Arc<DynPipeline>>,
    pub reports: Arc<InMemoryReportSink>,
    pub exclusions: TotalExclusions,
}

impl AppServices {
    /// Wire services around an existing ledger and optional client.
    pub fn new(
        config: &PipelineConfig,
        ledger: Arc<dyn SalesLedger>,
        client: Option<Arc<dyn GenerationClient>>,
    ) -> Result<Self, PipelineError> {
        let reports = Arc::new(InMemoryReportSink::new());
        let pipeline = match client {
            Some(client) => {
                let sink: Arc<dyn ForecastReportSink> = reports.clone();
                let pipeline = ForecastPipeline::from_config(config, ledger.clone(), client)?.with_sink(sink);
                Some(Arc::new(pipeline))
            }
            None => None,
        };

        Ok(Self {
            ledger,
            pipeline,
            reports,
            exclusions: config.excluded_totals.clone(),
        })
    }

    /// Production wiring: Postgres snapshot (when configured) and the Gemini
    /// client (when an API key is set).
    pub async fn from_config(config: &PipelineConfig) -> anyhow::Result<Self> {
        let ledger = Arc::new(InMemorySalesLedger::new());

        match &config.database_url {
            Some(url) => {
                let pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
                let summary = PostgresLedgerLoader::new(pool)
                    .with_promotion_tables(config.promotion_tables.clone())
                    .hydrate(&ledger)
                    .await?;
                tracing::info!(
                    listings = summary.listings,
                    records = summary.records,
                    promotions = summary.promotions,
                    skipped = summary.skipped,
                    "sales ledger hydrated from postgres"
                );
            }
            None => tracing::warn!("DATABASE_URL not set; serving an empty in-memory ledger"),
        }

        let client: Option<Arc<dyn GenerationClient>> = if config.forecasting_enabled() {
            Some(Arc::new(GeminiClient::from_settings(&config.generation)?))
        } else {
            tracing::warn!("GEMINI_API_KEY not set; forecast routes are disabled");
            None
        };

        Ok(Self::new(config, ledger, client)?)
    }
}

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use salescast_ai::{
    ComparisonReport, ExtractionRule, FailureKind, ForecastOutcome, ForecastRequest, MonthComparison, PromptBuilder,
    ResponseParser, Throttle, reconcile, reconcile_month,
};
use salescast_core::{DateWindow, DomainError, RunId, Sku, YearMonth};
use salescast_sales::aggregate::{history, zero_filled};
use salescast_sales::{MonthlyBucket, SalesLedger, SkuSelection, TotalExclusions};

use super::sink::{ForecastReport, ForecastReportSink};
use crate::config::{ConfigError, PipelineConfig};
use crate::generation::{GenerationClient, TransportError};

/// Errors that stop a batch before any SKU is attempted.
///
/// Once a batch is running, per-SKU failures are folded into the reports.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// One SKU's annual forecast and its comparison with that year's actuals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkuForecastReport {
    pub run_id: RunId,
    pub sku: Sku,
    pub product_title: String,
    pub history_months: usize,
    /// The SKU had no sales before the forecast year.
    pub no_history: bool,
    pub outcome: ForecastOutcome,
    pub comparison: ComparisonReport,
}

/// One ranked SKU in a next-month batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NextMonthItem {
    pub product_title: String,
    pub window_total: i64,
    pub rule: Option<ExtractionRule>,
    pub comparison: MonthComparison,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NextMonthForecast {
    pub run_id: RunId,
    pub month: YearMonth,
    pub items: Vec<NextMonthItem>,
}

/// Sequential forecast runner.
///
/// SKUs are processed one at a time in the order given; the only suspension
/// points are the throttle and the generation call. The ledger is read-only.
pub struct ForecastPipeline<L: ?Sized, G: ?Sized> {
    ledger: Arc<L>,
    client: Arc<G>,
    prompts: PromptBuilder,
    parser: ResponseParser,
    throttle: Mutex<Throttle>,
    exclusions: TotalExclusions,
    sink: Option<Arc<dyn ForecastReportSink>>,
}

impl<L, G> ForecastPipeline<L, G>
where
    L: SalesLedger + ?Sized,
    G: GenerationClient + ?Sized,
{
    pub fn new(ledger: Arc<L>, client: Arc<G>) -> Self {
        Self {
            ledger,
            client,
            prompts: PromptBuilder::default(),
            parser: ResponseParser::default(),
            throttle: Mutex::new(Throttle::default()),
            exclusions: TotalExclusions::none(),
            sink: None,
        }
    }

    /// Wire everything the config describes: guidance, store, ceiling,
    /// throttle and exclusions.
    pub fn from_config(config: &PipelineConfig, ledger: Arc<L>, client: Arc<G>) -> Result<Self, PipelineError> {
        let guidance = config
            .load_guidance()?
            .unwrap_or_else(|| salescast_ai::DEFAULT_GUIDANCE.to_string());

        Ok(Self::new(ledger, client)
            .with_prompts(PromptBuilder::new(guidance, config.store.clone()))
            .with_parser(ResponseParser::new(config.plausibility_ceiling))
            .with_throttle(Throttle::new(config.throttle))
            .with_exclusions(config.excluded_totals.clone()))
    }

    pub fn with_prompts(mut self, prompts: PromptBuilder) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_parser(mut self, parser: ResponseParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_throttle(mut self, throttle: Throttle) -> Self {
        self.throttle = Mutex::new(throttle);
        self
    }

    pub fn with_exclusions(mut self, exclusions: TotalExclusions) -> Self {
        self.exclusions = exclusions;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ForecastReportSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    pub fn exclusions(&self) -> &TotalExclusions {
        &self.exclusions
    }

    /// Forecast every month of `year` for one SKU.
    pub async fn forecast_annual(&self, sku: &Sku, year: i32) -> Result<SkuForecastReport, PipelineError> {
        let mut reports = self.run_annual(std::slice::from_ref(sku), year).await?;
        reports
            .pop()
            .ok_or_else(|| PipelineError::Domain(DomainError::invariant("annual batch returned no report")))
    }

    /// Annual forecasts for `skus`, in input order. Always one report per SKU.
    pub async fn run_annual(&self, skus: &[Sku], year: i32) -> Result<Vec<SkuForecastReport>, PipelineError> {
        let target = DateWindow::calendar_year(year)?;
        let before = match target.start() {
            Some(start) => DateWindow::until(start),
            None => return Err(DomainError::invalid_period(format!("year {year} has no start")).into()),
        };

        let run_id = RunId::new();
        info!(run_id = %run_id, skus = skus.len(), year, "annual forecast batch started");

        let mut reports = Vec::with_capacity(skus.len());
        for sku in skus {
            let report = self.annual_for(run_id, sku, year, &before, &target).await;
            if let Some(sink) = &self.sink {
                sink.emit(ForecastReport::Annual(report.clone()));
            }
            reports.push(report);
        }

        let parsed = reports.iter().filter(|r| r.outcome.is_parsed()).count();
        info!(
            run_id = %run_id,
            skus = reports.len(),
            parsed,
            fallback = reports.len() - parsed,
            "annual forecast batch finished"
        );
        Ok(reports)
    }

    async fn annual_for(
        &self,
        run_id: RunId,
        sku: &Sku,
        year: i32,
        before: &DateWindow,
        target: &DateWindow,
    ) -> SkuForecastReport {
        let selection = SkuSelection::One(sku.clone());
        let past = history(sku, &self.ledger.monthly_totals(&selection, before));
        let listing = self.ledger.listing(sku);
        let product_title = listing
            .as_ref()
            .map(|l| l.product_title.clone())
            .unwrap_or_else(|| sku.to_string());

        let history_months = past.len();
        if past.is_empty() {
            debug!(run_id = %run_id, sku = %sku, year, "no sales before forecast year");
        }

        let outcome = match ForecastRequest::annual(sku.clone(), product_title.clone(), past, year) {
            Ok(request) => {
                let request = match &listing {
                    Some(l) => request.with_listing(l),
                    None => request,
                };
                let prompt = self.prompts.build(&request);
                match self.call(&prompt).await {
                    Ok(raw) => {
                        let outcome = self.parser.parse_annual(sku, year, &raw);
                        if !outcome.is_parsed() {
                            warn!(run_id = %run_id, sku = %sku, status = outcome.status(), "forecast response was not structured output");
                        }
                        outcome
                    }
                    Err(e) => {
                        warn!(run_id = %run_id, sku = %sku, error = ?e, "generation call failed");
                        ForecastOutcome::transport_failure(e)
                    }
                }
            }
            Err(e) => {
                warn!(run_id = %run_id, sku = %sku, error = %e, "could not build forecast request");
                ForecastOutcome::Failed {
                    kind: FailureKind::InvalidRequest,
                    reason: format!("[request error] {e}"),
                }
            }
        };

        let actuals = history(sku, &self.ledger.monthly_totals(&selection, target));
        let comparison = reconcile(sku, &outcome, &actuals, year);

        SkuForecastReport {
            run_id,
            sku: sku.clone(),
            product_title,
            history_months,
            no_history: history_months == 0,
            outcome,
            comparison,
        }
    }

    /// Rank the top `n` SKUs in `window` and forecast `month` for each.
    ///
    /// `window` must be bounded and end no later than the start of `month`.
    pub async fn run_next_month(
        &self,
        window: &DateWindow,
        n: usize,
        month: YearMonth,
    ) -> Result<NextMonthForecast, PipelineError> {
        let months = window
            .months()
            .ok_or_else(|| DomainError::invalid_period("history window needs a start"))?;
        let month_window = month.window()?;
        if month_window.start().is_none_or(|start| start < window.end()) {
            return Err(DomainError::invalid_period(format!("history window must end before {month}")).into());
        }

        let run_id = RunId::new();
        let ranked = self.ledger.top_n(window, n, &self.exclusions);
        info!(run_id = %run_id, month = %month, skus = ranked.len(), "next-month forecast batch started");

        let mut items = Vec::with_capacity(ranked.len());
        for row in ranked {
            let sku = &row.sku;
            let selection = SkuSelection::One(sku.clone());
            let past = zero_filled(sku, &self.ledger.monthly_totals(&selection, window), &months);
            let listing = self.ledger.listing(sku);
            let product_title = listing
                .as_ref()
                .map(|l| l.product_title.clone())
                .unwrap_or_else(|| sku.to_string());

            let request = ForecastRequest::single_month(sku.clone(), product_title.clone(), past.clone(), month)
                .map(|request| match &listing {
                    Some(l) => request.with_listing(l),
                    None => request,
                })
                .and_then(|request| request.with_promotions(self.ledger.promotions(sku, window)));

            let (quantity, rule, rationale) = match request {
                Ok(request) => match self.call(&self.prompts.build(&request)).await {
                    Ok(raw) => {
                        let estimate = self.parser.parse_quantity(&raw);
                        if estimate.rule.is_none() {
                            warn!(run_id = %run_id, sku = %sku, "no plausible quantity in forecast response");
                        }
                        (estimate.quantity, estimate.rule, estimate.rationale)
                    }
                    Err(e) => {
                        warn!(run_id = %run_id, sku = %sku, error = ?e, "generation call failed");
                        (0, None, format!("[transport error] {e}"))
                    }
                },
                Err(e) => {
                    warn!(run_id = %run_id, sku = %sku, error = %e, "could not build forecast request");
                    (0, None, format!("[request error] {e}"))
                }
            };

            let actuals: Vec<MonthlyBucket> = history(sku, &self.ledger.monthly_totals(&selection, &month_window));
            items.push(NextMonthItem {
                product_title,
                window_total: row.total_quantity,
                rule,
                comparison: reconcile_month(sku, month, &past, quantity, &actuals, rationale),
            });
        }

        let forecast = NextMonthForecast { run_id, month, items };
        if let Some(sink) = &self.sink {
            sink.emit(ForecastReport::NextMonth(forecast.clone()));
        }
        info!(run_id = %run_id, month = %month, skus = forecast.items.len(), "next-month forecast batch finished");
        Ok(forecast)
    }

    /// Wait for the throttle, then call the generation endpoint.
    ///
    /// Reservations and sleeps both use tokio's clock.
    async fn call(&self, prompt: &str) -> Result<String, TransportError> {
        let now = tokio::time::Instant::now().into_std();
        let delay = self.throttle.lock().await.reserve(now);
        if !delay.is_zero() {
            debug!(delay_ms = delay.as_millis() as u64, "throttling generation call");
            tokio::time::sleep(delay).await;
        }
        self.client.generate(prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use salescast_ai::ThrottlePolicy;
    use salescast_core::Month;
    use salescast_sales::{InMemorySalesLedger, ProductListing, SaleRecord};

    use crate::generation::ScriptedGenerationClient;
    use crate::pipeline::InMemoryReportSink;

    fn sku(s: &str) -> Sku {
        Sku::parse(s).unwrap()
    }

    fn sale(s: &str, y: i32, m: u32, d: u32, qty: i64) -> SaleRecord {
        SaleRecord::new(sku(s), Utc.with_ymd_and_hms(y, m, d, 10, 0, 0).unwrap(), qty, Decimal::new(79900, 2)).unwrap()
    }

    fn ledger() -> Arc<InMemorySalesLedger> {
        let ledger = InMemorySalesLedger::new();
        ledger.record_many([
            sale("RING-001", 2023, 11, 3, 4),
            sale("RING-001", 2023, 11, 20, 6),
            sale("RING-001", 2023, 12, 24, 15),
            sale("RING-001", 2024, 1, 14, 3),
            sale("NECK-002", 2025, 4, 2, 7),
            sale("NECK-002", 2025, 6, 9, 5),
            sale("RING-001", 2025, 5, 5, 2),
            sale("NECK-002", 2025, 7, 11, 4),
        ]);
        ledger.upsert_listing(
            ProductListing::new(sku("RING-001"), "Kundan Ring")
                .with_product_type("Ring")
                .with_vendor("Trooba"),
        );
        Arc::new(ledger)
    }

    fn pipeline(client: ScriptedGenerationClient) -> ForecastPipeline<InMemorySalesLedger, ScriptedGenerationClient> {
        ForecastPipeline::new(ledger(), Arc::new(client)).with_throttle(Throttle::new(ThrottlePolicy::Unthrottled))
    }

    const ANNUAL: &str = "```json\n{\"monthly_sales_2024\": {\"January\": 8, \"November\": 12}, \"total_predicted_quantity_2024\": 20, \"reasoning\": \"festive peak\"}\n```";

    #[tokio::test]
    async fn annual_forecast_reconciles_against_target_year_only() {
        let p = pipeline(ScriptedGenerationClient::new().respond(ANNUAL));
        let report = p.forecast_annual(&sku("RING-001"), 2024).await.unwrap();

        assert_eq!(report.product_title, "Kundan Ring");
        assert_eq!(report.history_months, 2);
        assert!(!report.no_history);
        assert!(report.outcome.is_parsed());

        let jan = report.comparison.row(Month::January).unwrap();
        assert_eq!((jan.predicted, jan.actual), (8, 3));
        assert_eq!(report.comparison.row(Month::November).unwrap().actual, 0);
        assert_eq!(report.comparison.row(Month::December).unwrap().actual, 0);
    }

    #[tokio::test]
    async fn annual_prompt_carries_history_and_listing() {
        let client = Arc::new(ScriptedGenerationClient::new().respond(ANNUAL));
        let p = ForecastPipeline::new(ledger(), client.clone()).with_throttle(Throttle::new(ThrottlePolicy::Unthrottled));
        p.forecast_annual(&sku("RING-001"), 2024).await.unwrap();

        let prompts = client.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("\"month\": \"2023-11\""));
        assert!(prompts[0].contains("\"quantity\": 10"));
        assert!(prompts[0].contains("\"quantity\": 15"));
        assert!(prompts[0].contains("- Vendor: Trooba"));
        assert!(!prompts[0].contains("2024-01"));
    }

    #[tokio::test]
    async fn every_sku_gets_a_report_even_when_calls_fail() {
        let client = ScriptedGenerationClient::new()
            .fail(TransportError::Http { status: 503, body: "unavailable".to_string() })
            .respond("nothing useful here")
            .respond("Our forecast: 42 units expected");
        let p = pipeline(client);
        let skus = [sku("RING-001"), sku("NECK-002"), sku("GHOST-9")];

        let reports = p.run_annual(&skus, 2024).await.unwrap();

        assert_eq!(reports.len(), 3);
        assert_eq!(reports.iter().map(|r| r.sku.as_str()).collect::<Vec<_>>(), ["RING-001", "NECK-002", "GHOST-9"]);
        assert_eq!(reports[0].outcome.status(), "failed");
        assert!(reports[0].comparison.rationale.starts_with("[transport error]"));
        assert_eq!(reports[1].outcome.status(), "failed");
        assert!(reports[1].comparison.rationale.contains("no number found"));
        assert_eq!(reports[2].outcome.total_quantity(), 42);
        assert!(reports[2].no_history);
        assert_eq!(reports[2].product_title, "GHOST-9");
        assert!(reports.iter().all(|r| r.comparison.rows.len() == 12));
    }

    #[tokio::test]
    async fn reports_are_published_to_the_sink() {
        let sink = Arc::new(InMemoryReportSink::new());
        let p = pipeline(ScriptedGenerationClient::new().otherwise("Forecast: 5")).with_sink(sink.clone());
        p.run_annual(&[sku("RING-001"), sku("NECK-002")], 2024).await.unwrap();
        assert_eq!(sink.all().len(), 2);
    }

    #[tokio::test]
    async fn next_month_ranks_zero_fills_and_compares() {
        let client = Arc::new(
            ScriptedGenerationClient::new()
                .respond("Forecast: 6\nSteady demand after monsoon start.")
                .respond("I expect around 3 units"),
        );
        let p = ForecastPipeline::new(ledger(), client.clone()).with_throttle(Throttle::new(ThrottlePolicy::Unthrottled));
        let window = DateWindow::new(
            Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap(),
        )
        .unwrap();
        let july: YearMonth = "2025-07".parse().unwrap();

        let forecast = p.run_next_month(&window, 5, july).await.unwrap();

        assert_eq!(forecast.items.len(), 2);
        let first = &forecast.items[0];
        assert_eq!(first.comparison.sku.as_str(), "NECK-002");
        assert_eq!(first.window_total, 12);
        assert_eq!(first.comparison.predicted, 6);
        assert_eq!(first.comparison.actual, 4);
        assert_eq!(first.rule, Some(ExtractionRule::ForecastLine));
        assert_eq!(first.comparison.past_sales.len(), 3);
        assert_eq!(first.comparison.past_sales[&"2025-05".parse::<YearMonth>().unwrap()], 0);

        let second = &forecast.items[1];
        assert_eq!(second.comparison.sku.as_str(), "RING-001");
        assert_eq!(second.comparison.predicted, 3);
        assert_eq!(second.rule, Some(ExtractionRule::LargestPlausible));

        let prompts = client.prompts();
        assert!(prompts[0].contains("expected quantity sold in July 2025"));
        assert!(prompts[0].contains("\"2025-05\": 0"));
    }

    #[tokio::test]
    async fn next_month_prompt_carries_promotion_summary() {
        use salescast_sales::{PromotionMetrics, PromotionRecord};

        let ledger = ledger();
        let metrics = PromotionMetrics::new(1500, 42, Decimal::new(259_800, 2), 2).unwrap();
        ledger.record_promotions([
            PromotionRecord::new(sku("NECK-002"), "2025-05".parse().unwrap(), metrics),
            PromotionRecord::new(sku("NECK-002"), "2025-07".parse().unwrap(), metrics),
        ]);
        let client = Arc::new(ScriptedGenerationClient::new().otherwise("Forecast: 2"));
        let p = ForecastPipeline::new(ledger, client.clone()).with_throttle(Throttle::new(ThrottlePolicy::Unthrottled));
        let window = DateWindow::new(
            Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap(),
        )
        .unwrap();

        p.run_next_month(&window, 5, "2025-07".parse().unwrap()).await.unwrap();

        let prompts = client.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].contains("### PROMOTION SUMMARY (2025-05 to 2025-05):"));
        assert!(prompts[0].contains("\"clicks\": 42"));
        assert!(!prompts[0].contains("\"2025-07\": {"));
        assert!(prompts[1].contains("### PROMOTION SUMMARY (none recorded):\n{}"));
    }

    #[tokio::test]
    async fn next_month_rejects_overlapping_window() {
        let p = pipeline(ScriptedGenerationClient::new());
        let window = DateWindow::calendar_year(2025).unwrap();
        let july: YearMonth = "2025-07".parse().unwrap();
        assert!(matches!(p.run_next_month(&window, 5, july).await, Err(PipelineError::Domain(_))));
    }

    #[tokio::test]
    async fn next_month_honours_exclusions() {
        let p = pipeline(ScriptedGenerationClient::new().otherwise("Forecast: 1")).with_exclusions(TotalExclusions::of([12]));
        let window = DateWindow::new(
            Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap(),
        )
        .unwrap();
        let forecast = p.run_next_month(&window, 5, "2025-07".parse().unwrap()).await.unwrap();
        assert_eq!(forecast.items.len(), 1);
        assert_eq!(forecast.items[0].comparison.sku.as_str(), "RING-001");
    }

    #[tokio::test(start_paused = true)]
    async fn min_interval_throttle_spaces_calls() {
        let p = ForecastPipeline::new(ledger(), Arc::new(ScriptedGenerationClient::new().otherwise("Forecast: 1")))
            .with_throttle(Throttle::new(ThrottlePolicy::min_interval_ms(50)));
        let started = tokio::time::Instant::now();
        p.run_annual(&[sku("RING-001"), sku("NECK-002"), sku("GHOST-9")], 2024).await.unwrap();
        // First call is immediate, the next two wait 50ms each.
        assert_eq!(started.elapsed(), std::time::Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn token_bucket_throttle_follows_paused_clock() {
        let p = ForecastPipeline::new(ledger(), Arc::new(ScriptedGenerationClient::new().otherwise("Forecast: 1")))
            .with_throttle(Throttle::new(ThrottlePolicy::TokenBucket { per_minute: 60, burst: 2 }));
        let started = tokio::time::Instant::now();
        p.run_annual(&[sku("RING-001"), sku("NECK-002"), sku("GHOST-9"), sku("EAR-003")], 2024)
            .await
            .unwrap();
        // Two burst tokens, then one per second.
        assert_eq!(started.elapsed(), std::time::Duration::from_secs(2));
    }
}

//! Forecast prompt construction.
//!
//! The builder only formats: it never aggregates, reorders or fills gaps, and
//! it never reads the clock. Identical requests render byte-identical prompts.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;

use salescast_core::{DomainError, DomainResult, Month, Sku, YearMonth};
use salescast_sales::{MonthlyBucket, ProductListing, PromotionSummary};

/// Seasonality calendar and modeling rules sent ahead of every request.
pub const DEFAULT_GUIDANCE: &str = r#"You are a demand planner for a fashion jewellery retailer. Forecast unit sales for a single SKU.

### SEASONALITY CALENDAR (India):
- January–February: wedding season tail, Valentine's Day gifting in February.
- March: financial year-end lull; Holi brings a short spike in festive pieces.
- April–May: Akshaya Tritiya buying; summer wedding dates.
- June–July: monsoon slowdown; lowest footfall of the year.
- August: Raksha Bandhan and Independence Day sales.
- September: Ganesh Chaturthi; early festive stocking.
- October–November: Navratri, Dussehra, Karwa Chauth, Dhanteras and Diwali; peak demand.
- November–December: wedding season peak; year-end gifting.

### MODELING PRINCIPLES:
1. Anchor on the SKU's own history; do not invent sales the history cannot support.
2. Apply seasonality as a multiplier on the recent baseline, not as an absolute level.
3. Fashion jewellery is non-essential: demand decays as a design ages unless history shows renewal.
4. Months with no recorded sales count as zero, not as missing data.
5. If the history is empty, forecast conservatively and say so.
6. Quantities are whole units and never negative."#;

/// Store-level facts that frame every prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreContext {
    pub region: String,
    pub category: String,
}

impl Default for StoreContext {
    fn default() -> Self {
        Self {
            region: "India".to_string(),
            category: "Fashion Jewellery (non-essential)".to_string(),
        }
    }
}

/// What is being forecast.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ForecastHorizon {
    /// All twelve months of a calendar year.
    CalendarYear(i32),
    /// A single month.
    Month(YearMonth),
}

/// Input to the prompt builder: a SKU and its chronological sales history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForecastRequest {
    sku: Sku,
    product_title: String,
    product_type: Option<String>,
    vendor: Option<String>,
    history: Vec<MonthlyBucket>,
    promotions: PromotionSummary,
    as_of_date: NaiveDate,
    horizon: ForecastHorizon,
}

impl ForecastRequest {
    /// Validates that the history belongs to `sku`, is strictly increasing in
    /// calendar order and lies entirely before `as_of_date`.
    pub fn new(
        sku: Sku,
        product_title: impl Into<String>,
        history: Vec<MonthlyBucket>,
        as_of_date: NaiveDate,
        horizon: ForecastHorizon,
    ) -> DomainResult<Self> {
        for bucket in &history {
            if bucket.sku != sku {
                return Err(DomainError::invariant(format!(
                    "history bucket for {} in request for {sku}",
                    bucket.sku
                )));
            }
            let starts = bucket.year_month.first_day().ok_or_else(|| {
                DomainError::invalid_period(format!("{} is out of range", bucket.year_month))
            })?;
            if starts >= as_of_date {
                return Err(DomainError::invariant(format!(
                    "history month {} is not before as-of date {as_of_date}",
                    bucket.year_month
                )));
            }
        }
        if let Some(pair) = history
            .windows(2)
            .find(|w| w[0].year_month >= w[1].year_month)
        {
            return Err(DomainError::invariant(format!(
                "history must be strictly increasing: {} then {}",
                pair[0].year_month, pair[1].year_month
            )));
        }

        Ok(Self {
            sku,
            product_title: product_title.into(),
            product_type: None,
            vendor: None,
            history,
            promotions: PromotionSummary::new(),
            as_of_date,
            horizon,
        })
    }

    /// Forecast every month of `year` from history before January 1st.
    pub fn annual(
        sku: Sku,
        product_title: impl Into<String>,
        history: Vec<MonthlyBucket>,
        year: i32,
    ) -> DomainResult<Self> {
        let as_of = NaiveDate::from_ymd_opt(year, 1, 1)
            .ok_or_else(|| DomainError::invalid_period(format!("year {year} is out of range")))?;
        Self::new(sku, product_title, history, as_of, ForecastHorizon::CalendarYear(year))
    }

    /// Forecast `month` from history before its first day.
    pub fn single_month(
        sku: Sku,
        product_title: impl Into<String>,
        history: Vec<MonthlyBucket>,
        month: YearMonth,
    ) -> DomainResult<Self> {
        let as_of = month
            .first_day()
            .ok_or_else(|| DomainError::invalid_period(format!("{month} is out of range")))?;
        Self::new(sku, product_title, history, as_of, ForecastHorizon::Month(month))
    }

    /// Copy type and vendor from a catalog listing.
    pub fn with_listing(mut self, listing: &ProductListing) -> Self {
        self.product_type = listing.product_type.clone();
        self.vendor = listing.vendor.clone();
        self
    }

    /// Attach promotion metrics; like the history, they must predate the
    /// as-of date. Only single-month prompts render them.
    pub fn with_promotions(mut self, promotions: PromotionSummary) -> DomainResult<Self> {
        for (month, _) in promotions.iter() {
            let starts = month
                .first_day()
                .ok_or_else(|| DomainError::invalid_period(format!("{month} is out of range")))?;
            if starts >= self.as_of_date {
                return Err(DomainError::invariant(format!(
                    "promotion month {month} is not before as-of date {}",
                    self.as_of_date
                )));
            }
        }
        self.promotions = promotions;
        Ok(self)
    }

    pub fn sku(&self) -> &Sku {
        &self.sku
    }

    pub fn product_title(&self) -> &str {
        &self.product_title
    }

    pub fn history(&self) -> &[MonthlyBucket] {
        &self.history
    }

    pub fn promotions(&self) -> &PromotionSummary {
        &self.promotions
    }

    pub fn as_of_date(&self) -> NaiveDate {
        self.as_of_date
    }

    pub fn horizon(&self) -> ForecastHorizon {
        self.horizon
    }
}

#[derive(Serialize)]
struct HistoryEntry<'a> {
    month: String,
    quantity: &'a i64,
}

#[derive(Serialize)]
struct PromotionEntry {
    impressions: i64,
    clicks: i64,
    revenue: f64,
    units_sold: i64,
}

/// Renders forecast requests into prompt text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptBuilder {
    guidance: String,
    store: StoreContext,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_GUIDANCE, StoreContext::default())
    }
}

impl PromptBuilder {
    pub fn new(guidance: impl Into<String>, store: StoreContext) -> Self {
        Self {
            guidance: guidance.into(),
            store,
        }
    }

    pub fn guidance(&self) -> &str {
        &self.guidance
    }

    pub fn build(&self, request: &ForecastRequest) -> String {
        match request.horizon {
            ForecastHorizon::CalendarYear(year) => self.build_annual(request, year),
            ForecastHorizon::Month(month) => self.build_single_month(request, month),
        }
    }

    fn build_annual(&self, request: &ForecastRequest, year: i32) -> String {
        let mut out = String::new();
        out.push_str(self.guidance.trim_end());
        out.push_str("\n---\n\n");
        self.push_product_details(&mut out, request);
        out.push_str("\n---\n\n### OUTPUT FORMAT (STRICT JSON ONLY):\n\n{\n");
        out.push_str(&format!("  \"sku\": {},\n", json_string(request.sku.as_str())));
        out.push_str(&format!("  \"monthly_sales_{year}\": {{\n"));
        for (i, month) in Month::ALL.iter().enumerate() {
            let sep = if i + 1 < Month::ALL.len() { "," } else { "" };
            out.push_str(&format!("    \"{}\": <integer>{sep}\n", month.name()));
        }
        out.push_str("  },\n");
        out.push_str(&format!("  \"total_predicted_quantity_{year}\": <integer>,\n"));
        out.push_str(
            "  \"reasoning\": \"<Strict explanation for predicted quantities: highlight key months, explain decay if any, avoid vague phrases>\"\n}\n",
        );
        out.push_str("\n---\n\n### HISTORICAL SALES DATA:\n");
        out.push_str(&render_history_list(&request.history));
        out.push('\n');
        out
    }

    fn build_single_month(&self, request: &ForecastRequest, month: YearMonth) -> String {
        let mut out = String::new();
        out.push_str(self.guidance.trim_end());
        out.push_str("\n---\n\n");
        self.push_product_details(&mut out, request);

        let span = match (request.history.first(), request.history.last()) {
            (Some(first), Some(last)) => format!("{} to {}", first.year_month, last.year_month),
            _ => "none recorded".to_string(),
        };
        out.push_str(&format!("\n### HISTORICAL SALES ({span}):\n"));
        out.push_str(&render_history_map(&request.history));

        let promo_span = match (request.promotions.first_month(), request.promotions.last_month()) {
            (Some(first), Some(last)) => format!("{first} to {last}"),
            _ => "none recorded".to_string(),
        };
        out.push_str(&format!("\n\n### PROMOTION SUMMARY ({promo_span}):\n"));
        out.push_str(&render_promotions(&request.promotions));
        out.push_str(&format!(
            "\n\nQ: Based on the above data, what is the expected quantity sold in {} {}?\n",
            month.month().name(),
            month.year()
        ));
        out.push_str(
            "Answer with a first line of the form `Forecast: <number>`, then a short reason explaining your logic.\n",
        );
        out
    }

    fn push_product_details(&self, out: &mut String, request: &ForecastRequest) {
        out.push_str("### PRODUCT DETAILS:\n");
        out.push_str(&format!("- Product Name: {}\n", json_string(&request.product_title)));
        out.push_str(&format!("- SKU: {}\n", request.sku));
        if let Some(t) = &request.product_type {
            out.push_str(&format!("- Product Type: {t}\n"));
        }
        if let Some(v) = &request.vendor {
            out.push_str(&format!("- Vendor: {v}\n"));
        }
        out.push_str(&format!(
            "- Today's Date: {}\n",
            request.as_of_date.format("%B %-d, %Y")
        ));
        out.push_str(&format!("- Product Category: {}\n", self.store.category));
        out.push_str(&format!("- Region: {}\n", self.store.region));
    }
}

/// `[{"month": "YYYY-MM", "quantity": n}, ...]`, pretty-printed, in input order.
fn render_history_list(history: &[MonthlyBucket]) -> String {
    let entries: Vec<HistoryEntry<'_>> = history
        .iter()
        .map(|b| HistoryEntry {
            month: b.year_month.to_string(),
            quantity: &b.quantity,
        })
        .collect();
    serde_json::to_string_pretty(&entries).unwrap_or_else(|_| "[]".to_string())
}

/// `{"YYYY-MM": n, ...}`, pretty-printed. Keys sort chronologically.
fn render_history_map(history: &[MonthlyBucket]) -> String {
    let map: BTreeMap<String, i64> = history
        .iter()
        .map(|b| (b.year_month.to_string(), b.quantity))
        .collect();
    serde_json::to_string_pretty(&map).unwrap_or_else(|_| "{}".to_string())
}

/// `{"YYYY-MM": {"impressions": .., "clicks": .., "revenue": .., "units_sold": ..}}`,
/// pretty-printed; `{}` when nothing was promoted.
fn render_promotions(promotions: &PromotionSummary) -> String {
    let map: BTreeMap<String, PromotionEntry> = promotions
        .iter()
        .map(|(month, m)| {
            (
                month.to_string(),
                PromotionEntry {
                    impressions: m.impressions,
                    clicks: m.clicks,
                    revenue: m.revenue.to_f64().unwrap_or(0.0),
                    units_sold: m.units_sold,
                },
            )
        })
        .collect();
    serde_json::to_string_pretty(&map).unwrap_or_else(|_| "{}".to_string())
}

fn json_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{s}\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sku() -> Sku {
        Sku::parse("RING-001").unwrap()
    }

    fn bucket(ym: &str, q: i64) -> MonthlyBucket {
        MonthlyBucket {
            sku: sku(),
            year_month: ym.parse().unwrap(),
            quantity: q,
        }
    }

    #[test]
    fn annual_prompt_contains_identity_schema_and_history() {
        let req = ForecastRequest::annual(
            sku(),
            "Kundan \"Bridal\" Ring",
            vec![bucket("2023-11", 10), bucket("2023-12", 15)],
            2024,
        )
        .unwrap();
        let prompt = PromptBuilder::default().build(&req);

        assert!(prompt.starts_with("You are a demand planner"));
        assert!(prompt.contains("- Product Name: \"Kundan \\\"Bridal\\\" Ring\""));
        assert!(prompt.contains("- SKU: RING-001"));
        assert!(prompt.contains("- Today's Date: January 1, 2024"));
        assert!(prompt.contains("\"monthly_sales_2024\": {"));
        assert!(prompt.contains("\"December\": <integer>\n"));
        assert!(prompt.contains("\"total_predicted_quantity_2024\": <integer>"));
        assert!(prompt.contains("\"month\": \"2023-11\""));

        let nov = prompt.find("2023-11").unwrap();
        let dec = prompt.find("2023-12").unwrap();
        assert!(nov < dec);
    }

    #[test]
    fn empty_history_is_emitted_as_empty_array() {
        let req = ForecastRequest::annual(sku(), "Ring", vec![], 2024).unwrap();
        let prompt = PromptBuilder::default().build(&req);
        assert!(prompt.ends_with("### HISTORICAL SALES DATA:\n[]\n"));
    }

    #[test]
    fn out_of_order_history_is_rejected() {
        let err = ForecastRequest::annual(
            sku(),
            "Ring",
            vec![bucket("2023-12", 15), bucket("2023-11", 10)],
            2024,
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn duplicate_months_are_rejected() {
        assert!(
            ForecastRequest::annual(sku(), "Ring", vec![bucket("2023-11", 1), bucket("2023-11", 2)], 2024)
                .is_err()
        );
    }

    #[test]
    fn history_at_or_after_as_of_is_rejected() {
        assert!(ForecastRequest::annual(sku(), "Ring", vec![bucket("2024-01", 3)], 2024).is_err());
    }

    #[test]
    fn foreign_sku_bucket_is_rejected() {
        let mut b = bucket("2023-05", 1);
        b.sku = Sku::parse("OTHER").unwrap();
        assert!(ForecastRequest::annual(sku(), "Ring", vec![b], 2024).is_err());
    }

    #[test]
    fn single_month_prompt_asks_for_forecast_line() {
        let listing = ProductListing::new(sku(), "Ring")
            .with_product_type("Rings")
            .with_vendor("Trooba");
        let req = ForecastRequest::single_month(
            sku(),
            "Ring",
            vec![bucket("2025-04", 3), bucket("2025-05", 0), bucket("2025-06", 8)],
            "2025-07".parse().unwrap(),
        )
        .unwrap()
        .with_listing(&listing);
        let prompt = PromptBuilder::default().build(&req);

        assert!(prompt.contains("- Product Type: Rings"));
        assert!(prompt.contains("- Vendor: Trooba"));
        assert!(prompt.contains("### HISTORICAL SALES (2025-04 to 2025-06):"));
        assert!(prompt.contains("\"2025-05\": 0"));
        assert!(prompt.contains("expected quantity sold in July 2025?"));
        assert!(prompt.contains("Forecast: <number>"));
    }

    fn promotions(entries: &[(&str, i64, i64, i64, i64)]) -> PromotionSummary {
        let mut summary = PromotionSummary::new();
        for (ym, impressions, clicks, revenue_cents, units) in entries {
            let metrics = salescast_sales::PromotionMetrics::new(
                *impressions,
                *clicks,
                rust_decimal::Decimal::new(*revenue_cents, 2),
                *units,
            )
            .unwrap();
            summary.add(ym.parse().unwrap(), metrics);
        }
        summary
    }

    #[test]
    fn single_month_prompt_renders_empty_promotion_summary() {
        let req = ForecastRequest::single_month(sku(), "Ring", vec![bucket("2025-06", 2)], "2025-07".parse().unwrap())
            .unwrap();
        let prompt = PromptBuilder::default().build(&req);
        assert!(prompt.contains("### PROMOTION SUMMARY (none recorded):\n{}\n\nQ: "));
    }

    #[test]
    fn single_month_prompt_renders_promotion_metrics_by_month() {
        let req = ForecastRequest::single_month(sku(), "Ring", vec![bucket("2025-06", 2)], "2025-07".parse().unwrap())
            .unwrap()
            .with_promotions(promotions(&[("2025-06", 900, 30, 149_950, 3), ("2025-04", 1200, 41, 0, 0)]))
            .unwrap();
        let prompt = PromptBuilder::default().build(&req);

        assert!(prompt.contains("### PROMOTION SUMMARY (2025-04 to 2025-06):"));
        assert!(prompt.contains("\"impressions\": 1200"));
        assert!(prompt.contains("\"revenue\": 1499.5"));
        assert!(prompt.contains("\"units_sold\": 3"));
        let april = prompt.find("\"2025-04\": {").unwrap();
        let june = prompt.find("\"2025-06\": {").unwrap();
        assert!(april < june);
        assert!(prompt.find("### HISTORICAL SALES").unwrap() < prompt.find("### PROMOTION SUMMARY").unwrap());

        let again = PromptBuilder::default().build(&req);
        assert_eq!(prompt, again);
    }

    #[test]
    fn promotions_at_or_after_as_of_are_rejected() {
        let err = ForecastRequest::single_month(sku(), "Ring", vec![], "2025-07".parse().unwrap())
            .unwrap()
            .with_promotions(promotions(&[("2025-07", 1, 1, 100, 1)]))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn annual_prompt_omits_promotions() {
        let req = ForecastRequest::annual(sku(), "Ring", vec![], 2024)
            .unwrap()
            .with_promotions(promotions(&[("2023-12", 10, 1, 100, 1)]))
            .unwrap();
        assert!(!PromptBuilder::default().build(&req).contains("PROMOTION SUMMARY"));
    }

    #[test]
    fn custom_guidance_and_store_are_used() {
        let builder = PromptBuilder::new(
            "Custom rules.\n\n",
            StoreContext {
                region: "UAE".to_string(),
                category: "Gold".to_string(),
            },
        );
        let req = ForecastRequest::annual(sku(), "Ring", vec![], 2024).unwrap();
        let prompt = builder.build(&req);
        assert!(prompt.starts_with("Custom rules.\n---\n"));
        assert!(prompt.contains("- Region: UAE"));
        assert!(prompt.contains("- Product Category: Gold"));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: identical requests render byte-identical prompts.
            #[test]
            fn prompt_is_deterministic(
                title in "[A-Za-z][A-Za-z0-9 \"]{0,40}",
                quantities in prop::collection::vec(0i64..500, 0..24),
                year in 2020i32..2030,
            ) {
                let mut ym = YearMonth::new(year - 2, Month::January);
                let history: Vec<MonthlyBucket> = quantities
                    .iter()
                    .map(|q| {
                        let b = MonthlyBucket { sku: sku(), year_month: ym, quantity: *q };
                        ym = ym.next();
                        b
                    })
                    .collect();

                let builder = PromptBuilder::default();
                let a = ForecastRequest::annual(sku(), title.clone(), history.clone(), year).unwrap();
                let b = ForecastRequest::annual(sku(), title, history, year).unwrap();
                prop_assert_eq!(builder.build(&a), builder.build(&b));
                prop_assert_eq!(builder.build(&a), builder.build(&a));
            }
        }
    }
}

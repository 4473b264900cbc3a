use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use salescast_core::{Month, Sku};

/// Structured annual forecast decoded from a model response.
///
/// `monthly_prediction` always holds all 12 months. `total_predicted` is what
/// the model declared; it is expected to equal the monthly sum but nothing
/// enforces that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub sku: Sku,
    pub year: i32,
    pub monthly_prediction: BTreeMap<Month, u32>,
    pub total_predicted: i64,
    pub rationale: String,
}

impl ForecastResult {
    pub fn predicted(&self, month: Month) -> u32 {
        self.monthly_prediction.get(&month).copied().unwrap_or(0)
    }

    pub fn monthly_sum(&self) -> i64 {
        self.monthly_prediction.values().map(|v| i64::from(*v)).sum()
    }

    /// Whether the declared total matches the months.
    pub fn is_consistent(&self) -> bool {
        self.monthly_sum() == self.total_predicted
    }
}

/// Why a forecast attempt produced no usable number.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The generation call itself failed (network/HTTP).
    Transport,
    /// The response was not structured output and held no plausible number.
    NoNumber,
    /// Ledger data could not be turned into a prompt.
    InvalidRequest,
}

/// Which rule produced a best-effort quantity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionRule {
    /// A `forecast: <n>` line.
    ForecastLine,
    /// Largest integer below the plausibility ceiling.
    LargestPlausible,
}

/// Outcome of parsing one forecast response.
///
/// Forecasting is advisory: every variant is a valid result, and a broken call
/// degrades to `Failed` instead of aborting the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ForecastOutcome {
    Parsed(ForecastResult),
    Degraded {
        quantity: u32,
        rule: ExtractionRule,
        reason: String,
        rationale: String,
    },
    Failed {
        kind: FailureKind,
        reason: String,
    },
}

impl ForecastOutcome {
    pub fn transport_failure(detail: impl core::fmt::Display) -> Self {
        ForecastOutcome::Failed {
            kind: FailureKind::Transport,
            reason: format!("[transport error] {detail}"),
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            ForecastOutcome::Parsed(_) => "parsed",
            ForecastOutcome::Degraded { .. } => "degraded",
            ForecastOutcome::Failed { .. } => "failed",
        }
    }

    /// Best single number for the whole horizon (0 on failure).
    pub fn total_quantity(&self) -> i64 {
        match self {
            ForecastOutcome::Parsed(r) => r.total_predicted,
            ForecastOutcome::Degraded { quantity, .. } => i64::from(*quantity),
            ForecastOutcome::Failed { .. } => 0,
        }
    }

    /// Per-month prediction, only available for fully parsed forecasts.
    pub fn monthly(&self) -> Option<&BTreeMap<Month, u32>> {
        match self {
            ForecastOutcome::Parsed(r) => Some(&r.monthly_prediction),
            _ => None,
        }
    }

    /// Text shown to operators next to the numbers.
    ///
    /// For degraded and failed outcomes this leads with the failure category.
    pub fn rationale(&self) -> String {
        match self {
            ForecastOutcome::Parsed(r) => r.rationale.clone(),
            ForecastOutcome::Degraded {
                reason, rationale, ..
            } => format!("{reason} | {rationale}"),
            ForecastOutcome::Failed { reason, .. } => reason.clone(),
        }
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self, ForecastOutcome::Parsed(_))
    }
}

/// Single-quantity forecast (next-month flow).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityEstimate {
    pub quantity: u32,
    pub rule: Option<ExtractionRule>,
    pub rationale: String,
}

/// Why a response could not be decoded as structured output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("missing or non-object field `{0}`")]
    MissingTable(String),

    #[error("value for {month} is not a non-negative integer: {value}")]
    InvalidQuantity { month: String, value: String },

    #[error("field `{field}` is not an integer: {value}")]
    InvalidTotal { field: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(months: &[(Month, u32)], total: i64) -> ForecastResult {
        let mut monthly: BTreeMap<Month, u32> = Month::ALL.iter().map(|m| (*m, 0)).collect();
        for (m, q) in months {
            monthly.insert(*m, *q);
        }
        ForecastResult {
            sku: Sku::parse("RING-001").unwrap(),
            year: 2024,
            monthly_prediction: monthly,
            total_predicted: total,
            rationale: "steady".to_string(),
        }
    }

    #[test]
    fn consistency_compares_months_with_total() {
        assert!(result(&[(Month::January, 5), (Month::March, 2)], 7).is_consistent());
        assert!(!result(&[(Month::January, 5)], 9).is_consistent());
    }

    #[test]
    fn failed_outcome_reports_zero() {
        let o = ForecastOutcome::transport_failure("503 Service Unavailable");
        assert_eq!(o.total_quantity(), 0);
        assert_eq!(o.status(), "failed");
        assert!(o.rationale().starts_with("[transport error]"));
        assert!(o.monthly().is_none());
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let o = ForecastOutcome::Degraded {
            quantity: 42,
            rule: ExtractionRule::ForecastLine,
            reason: "[decode error] invalid JSON".to_string(),
            rationale: "Our forecast: 42 units expected".to_string(),
        };
        let v = serde_json::to_value(&o).unwrap();
        assert_eq!(v["status"], "degraded");
        assert_eq!(v["quantity"], 42);
        assert_eq!(v["rule"], "forecast_line");
    }
}

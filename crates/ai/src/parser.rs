//! Forecast response parsing.
//!
//! Model output is free-form text: it may be fenced, wrapped in prose, or not
//! JSON at all. Parsing never fails; it degrades to a best-effort quantity or
//! to an explicit failure carrying the diagnostic.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value as JsonValue;

use salescast_core::{Month, Sku};

use crate::result::{
    DecodeError, ExtractionRule, FailureKind, ForecastOutcome, ForecastResult, QuantityEstimate,
};

/// Loose integers at or above this are treated as noise (order ids, years,
/// prices). An explicit forecast line is not subject to it.
pub const DEFAULT_PLAUSIBILITY_CEILING: u32 = 500;

/// `Forecast: <n>` with at most three digits; longer numbers are not a
/// forecast line.
static FORECAST_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)forecast[:\s*]*(\d{1,3})\b").expect("static regex"));

static INTEGER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d+\b").expect("static regex"));

/// Parses model responses for a given plausibility ceiling.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ResponseParser {
    ceiling: u32,
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new(DEFAULT_PLAUSIBILITY_CEILING)
    }
}

impl ResponseParser {
    pub fn new(ceiling: u32) -> Self {
        Self { ceiling }
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Parse an annual (12-month) forecast for `year`.
    pub fn parse_annual(&self, sku: &Sku, year: i32, raw: &str) -> ForecastOutcome {
        let body = strip_fences(raw);

        let err = match decode_annual(sku, year, body) {
            Ok(result) => return ForecastOutcome::Parsed(result),
            Err(first) => match outer_object(body) {
                Some(inner) if inner.len() < body.len() => match decode_annual(sku, year, inner) {
                    Ok(result) => return ForecastOutcome::Parsed(result),
                    Err(e) => e,
                },
                _ => first,
            },
        };

        tracing::debug!(sku = %sku, error = %err, "structured decode failed; falling back to numeric extraction");

        match self.extract_quantity(body) {
            Some((quantity, rule)) => ForecastOutcome::Degraded {
                quantity,
                rule,
                reason: format!("[decode error] {err}"),
                rationale: rationale_lines(body),
            },
            None => ForecastOutcome::Failed {
                kind: FailureKind::NoNumber,
                reason: format!("[decode error] {err}; no number found"),
            },
        }
    }

    /// Parse a single-quantity answer (`Forecast: 42` style).
    pub fn parse_quantity(&self, raw: &str) -> QuantityEstimate {
        let body = strip_fences(raw);
        match self.extract_quantity(body) {
            Some((quantity, rule)) => QuantityEstimate {
                quantity,
                rule: Some(rule),
                rationale: rationale_lines(body),
            },
            None => QuantityEstimate {
                quantity: 0,
                rule: None,
                rationale: format!("no number found | {}", rationale_lines(body)),
            },
        }
    }

    /// Best-effort quantity from unstructured text.
    ///
    /// First a `forecast: <n>` line (first match wins, taken as is), otherwise
    /// the largest integer anywhere in the text that stays below the ceiling.
    pub fn extract_quantity(&self, text: &str) -> Option<(u32, ExtractionRule)> {
        for line in text.lines() {
            if let Some(n) = FORECAST_LINE
                .captures(line)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<u32>().ok())
            {
                return Some((n, ExtractionRule::ForecastLine));
            }
        }

        INTEGER
            .find_iter(text)
            .filter_map(|m| self.plausible(m.as_str()))
            .max()
            .map(|n| (n, ExtractionRule::LargestPlausible))
    }

    fn plausible(&self, digits: &str) -> Option<u32> {
        // Overflowing numbers are implausible by definition.
        let n: u64 = digits.parse().ok()?;
        if n < u64::from(self.ceiling) {
            u32::try_from(n).ok()
        } else {
            None
        }
    }
}

/// Remove a leading ```` ``` ```` / ```` ```json ```` marker and a trailing fence.
pub fn strip_fences(raw: &str) -> &str {
    let mut s = raw.trim();
    if let Some(rest) = s.strip_prefix("```") {
        // Drop the info string ("json", "JSON", ...) that may follow the fence.
        let tag_len = rest
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(rest.len());
        s = rest[tag_len..].trim_start();
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest.trim_end();
    }
    s
}

/// The span from the first `{` to the last `}`, if any.
fn outer_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

/// Strictly decode `monthly_sales_<year>`, `total_predicted_quantity_<year>`
/// and `reasoning`.
///
/// Months missing from the table count as 0; a missing total falls back to the
/// monthly sum; a missing reasoning is empty.
pub fn decode_annual(sku: &Sku, year: i32, text: &str) -> Result<ForecastResult, DecodeError> {
    let value: JsonValue =
        serde_json::from_str(text).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;

    let table_key = format!("monthly_sales_{year}");
    let table = value
        .get(&table_key)
        .and_then(JsonValue::as_object)
        .ok_or_else(|| DecodeError::MissingTable(table_key.clone()))?;

    let mut monthly: BTreeMap<Month, u32> = Month::ALL.iter().map(|m| (*m, 0)).collect();
    for (name, raw) in table {
        let Some(month) = Month::from_name(name) else {
            continue;
        };
        let qty = as_quantity(raw).ok_or_else(|| DecodeError::InvalidQuantity {
            month: name.clone(),
            value: raw.to_string(),
        })?;
        monthly.insert(month, qty);
    }

    let total_key = format!("total_predicted_quantity_{year}");
    let total_predicted = match value.get(&total_key) {
        None | Some(JsonValue::Null) => monthly.values().map(|v| i64::from(*v)).sum(),
        Some(raw) => as_integer(raw).ok_or_else(|| DecodeError::InvalidTotal {
            field: total_key.clone(),
            value: raw.to_string(),
        })?,
    };

    let rationale = value
        .get("reasoning")
        .and_then(JsonValue::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(ForecastResult {
        sku: sku.clone(),
        year,
        monthly_prediction: monthly,
        total_predicted,
        rationale,
    })
}

fn as_integer(v: &JsonValue) -> Option<i64> {
    if let Some(i) = v.as_i64() {
        return Some(i);
    }
    // Accept 12.0 but not 12.5.
    v.as_f64()
        .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
        .map(|f| f as i64)
}

fn as_quantity(v: &JsonValue) -> Option<u32> {
    as_integer(v).and_then(|i| u32::try_from(i).ok())
}

/// Lines that contain any letter, joined with spaces; `"N/A"` when none do.
pub fn rationale_lines(text: &str) -> String {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| l.chars().any(char::is_alphabetic))
        .collect();
    if lines.is_empty() {
        "N/A".to_string()
    } else {
        lines.join(" ")
    }
}

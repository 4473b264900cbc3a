//! Pipeline configuration.
//!
//! Everything the pipeline needs is read once at startup into
//! [`PipelineConfig`] and passed down explicitly. Nothing below this module
//! reads the environment.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use salescast_ai::{DEFAULT_PLAUSIBILITY_CEILING, StoreContext, ThrottlePolicy};
use salescast_sales::TotalExclusions;

use crate::ledger::PromotionTable;

pub use salescast_observability::LogFormat;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_GENERATION_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
/// Upper bound for `SALESCAST_MIN_CALL_INTERVAL_MS` (ten minutes).
pub const MAX_MIN_CALL_INTERVAL_MS: u64 = 600_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} has an invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("failed to read {path}: {reason}")]
    GuidanceFile { path: String, reason: String },
}

/// Sampling and endpoint settings for the generation API.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    /// `None` disables live forecasting.
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub request_timeout: Duration,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_GENERATION_URL.to_string(),
            temperature: 0.0,
            top_k: 1,
            top_p: 0.9,
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub generation: GenerationSettings,
    pub throttle: ThrottlePolicy,
    pub plausibility_ceiling: u32,
    pub excluded_totals: TotalExclusions,
    pub store: StoreContext,
    pub guidance_file: Option<PathBuf>,
    pub database_url: Option<String>,
    /// Monthly promotion tables read during hydration; empty skips promotions.
    pub promotion_tables: Vec<PromotionTable>,
    pub bind_addr: String,
    pub log_format: LogFormat,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            generation: GenerationSettings::default(),
            throttle: ThrottlePolicy::default(),
            plausibility_ceiling: DEFAULT_PLAUSIBILITY_CEILING,
            excluded_totals: TotalExclusions::none(),
            store: StoreContext::default(),
            guidance_file: None,
            database_url: None,
            promotion_tables: Vec::new(),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            log_format: LogFormat::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from the process environment, after applying `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut cfg = Self::default();

        cfg.generation.api_key = get("GEMINI_API_KEY");
        if let Some(v) = get("SALESCAST_MODEL") {
            cfg.generation.model = v;
        }
        if let Some(v) = get("SALESCAST_GENERATION_URL") {
            cfg.generation.base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = get("SALESCAST_TEMPERATURE") {
            cfg.generation.temperature = parse("SALESCAST_TEMPERATURE", &v)?;
        }
        if let Some(v) = get("SALESCAST_TOP_K") {
            cfg.generation.top_k = parse("SALESCAST_TOP_K", &v)?;
        }
        if let Some(v) = get("SALESCAST_TOP_P") {
            cfg.generation.top_p = parse("SALESCAST_TOP_P", &v)?;
        }
        if let Some(v) = get("SALESCAST_REQUEST_TIMEOUT_SECS") {
            cfg.generation.request_timeout =
                Duration::from_secs(parse("SALESCAST_REQUEST_TIMEOUT_SECS", &v)?);
        }

        if let Some(v) = get("SALESCAST_MIN_CALL_INTERVAL_MS") {
            let ms: u64 = parse("SALESCAST_MIN_CALL_INTERVAL_MS", &v)?;
            if ms > MAX_MIN_CALL_INTERVAL_MS {
                return Err(ConfigError::Invalid {
                    var: "SALESCAST_MIN_CALL_INTERVAL_MS",
                    value: v,
                    reason: format!("must be at most {MAX_MIN_CALL_INTERVAL_MS}"),
                });
            }
            cfg.throttle = ThrottlePolicy::min_interval_ms(ms);
        }
        if let Some(v) = get("SALESCAST_RATE_PER_MINUTE") {
            let per_minute: u32 = parse("SALESCAST_RATE_PER_MINUTE", &v)?;
            cfg.throttle = ThrottlePolicy::TokenBucket { per_minute, burst: 1 };
        }

        if let Some(v) = get("SALESCAST_PLAUSIBILITY_CEILING") {
            cfg.plausibility_ceiling = parse("SALESCAST_PLAUSIBILITY_CEILING", &v)?;
        }
        if let Some(v) = get("SALESCAST_EXCLUDED_TOTALS") {
            let totals = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| parse::<i64>("SALESCAST_EXCLUDED_TOTALS", s))
                .collect::<Result<Vec<_>, _>>()?;
            cfg.excluded_totals = TotalExclusions::of(totals);
        }

        if let Some(v) = get("SALESCAST_STORE_REGION") {
            cfg.store.region = v;
        }
        if let Some(v) = get("SALESCAST_STORE_CATEGORY") {
            cfg.store.category = v;
        }
        cfg.guidance_file = get("SALESCAST_PROMPT_GUIDANCE_FILE").map(PathBuf::from);

        cfg.database_url = get("DATABASE_URL");
        if let Some(v) = get("SALESCAST_PROMOTION_TABLES") {
            cfg.promotion_tables = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse().map_err(|reason| ConfigError::Invalid {
                        var: "SALESCAST_PROMOTION_TABLES",
                        value: s.to_string(),
                        reason,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
        }
        if let Some(v) = get("SALESCAST_BIND_ADDR") {
            cfg.bind_addr = v;
        }
        if let Some(v) = get("SALESCAST_LOG_FORMAT") {
            cfg.log_format = v.parse().map_err(|reason| ConfigError::Invalid {
                var: "SALESCAST_LOG_FORMAT",
                value: v.clone(),
                reason,
            })?;
        }

        Ok(cfg)
    }

    /// Guidance text for the prompt builder: the configured file, if any.
    pub fn load_guidance(&self) -> Result<Option<String>, ConfigError> {
        let Some(path) = &self.guidance_file else {
            return Ok(None);
        };
        std::fs::read_to_string(path)
            .map(Some)
            .map_err(|e| ConfigError::GuidanceFile {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
    }

    pub fn forecasting_enabled(&self) -> bool {
        self.generation.api_key.is_some()
    }
}

fn parse<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<PipelineConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PipelineConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let cfg = load(&[]).unwrap();
        assert_eq!(cfg, PipelineConfig::default());
        assert!(!cfg.forecasting_enabled());
        assert_eq!(cfg.generation.model, "gemini-2.0-flash");
        assert_eq!(cfg.throttle, ThrottlePolicy::MinInterval(Duration::from_millis(1200)));
        assert_eq!(cfg.plausibility_ceiling, 500);
        assert!(cfg.excluded_totals.is_empty());
    }

    #[test]
    fn reads_overrides() {
        let cfg = load(&[
            ("GEMINI_API_KEY", "k"),
            ("SALESCAST_GENERATION_URL", "http://localhost:9000/"),
            ("SALESCAST_TOP_K", "3"),
            ("SALESCAST_PLAUSIBILITY_CEILING", "1000"),
            ("SALESCAST_EXCLUDED_TOTALS", "46349, 12"),
            ("SALESCAST_STORE_REGION", "Kerala"),
            ("SALESCAST_LOG_FORMAT", "pretty"),
        ])
        .unwrap();
        assert!(cfg.forecasting_enabled());
        assert_eq!(cfg.generation.base_url, "http://localhost:9000");
        assert_eq!(cfg.generation.top_k, 3);
        assert_eq!(cfg.plausibility_ceiling, 1000);
        assert!(cfg.excluded_totals.excludes(46349));
        assert!(cfg.excluded_totals.excludes(12));
        assert_eq!(cfg.store.region, "Kerala");
        assert_eq!(cfg.log_format, LogFormat::Pretty);
    }

    #[test]
    fn rate_per_minute_switches_to_token_bucket() {
        let cfg = load(&[("SALESCAST_RATE_PER_MINUTE", "15")]).unwrap();
        assert_eq!(cfg.throttle, ThrottlePolicy::TokenBucket { per_minute: 15, burst: 1 });
    }

    #[test]
    fn oversized_call_interval_is_rejected() {
        let err = load(&[("SALESCAST_MIN_CALL_INTERVAL_MS", "18446744073709551615")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "SALESCAST_MIN_CALL_INTERVAL_MS", .. }));

        let cfg = load(&[("SALESCAST_MIN_CALL_INTERVAL_MS", "600000")]).unwrap();
        assert_eq!(cfg.throttle, ThrottlePolicy::MinInterval(Duration::from_secs(600)));
    }

    #[test]
    fn promotion_tables_are_parsed_in_order() {
        let cfg = load(&[(
            "SALESCAST_PROMOTION_TABLES",
            "2025-04=customer_customerpromotion_april, 2025-05=customer_customerpromotion_may",
        )])
        .unwrap();
        let tables: Vec<&str> = cfg.promotion_tables.iter().map(|t| t.table()).collect();
        assert_eq!(tables, ["customer_customerpromotion_april", "customer_customerpromotion_may"]);

        let err = load(&[("SALESCAST_PROMOTION_TABLES", "2025-04=bad name")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "SALESCAST_PROMOTION_TABLES", .. }));
    }

    #[test]
    fn blank_values_count_as_unset() {
        let cfg = load(&[("GEMINI_API_KEY", "  "), ("DATABASE_URL", "")]).unwrap();
        assert!(cfg.generation.api_key.is_none());
        assert!(cfg.database_url.is_none());
    }

    #[test]
    fn invalid_numbers_are_reported_with_the_variable() {
        let err = load(&[("SALESCAST_PLAUSIBILITY_CEILING", "lots")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "SALESCAST_PLAUSIBILITY_CEILING", .. }));

        let err = load(&[("SALESCAST_EXCLUDED_TOTALS", "1,x")]).unwrap_err();
        assert!(err.to_string().contains("SALESCAST_EXCLUDED_TOTALS"));
    }

    #[test]
    fn missing_guidance_file_is_an_error() {
        let cfg = PipelineConfig {
            guidance_file: Some(PathBuf::from("/definitely/not/here.md")),
            ..PipelineConfig::default()
        };
        assert!(matches!(cfg.load_guidance(), Err(ConfigError::GuidanceFile { .. })));
        assert_eq!(PipelineConfig::default().load_guidance(), Ok(None));
    }
}

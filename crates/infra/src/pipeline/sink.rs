use std::sync::Mutex;

use serde::Serialize;

use super::runner::{NextMonthForecast, SkuForecastReport};

/// Anything the pipeline publishes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ForecastReport {
    Annual(SkuForecastReport),
    NextMonth(NextMonthForecast),
}

/// Sink for forecast reports.
///
/// Reports are advisory output, not ledger data: the pipeline never reads them
/// back.
pub trait ForecastReportSink: Send + Sync + 'static {
    fn emit(&self, report: ForecastReport);
}

/// In-memory sink for tests/dev. Keeps the newest `capacity` reports.
#[derive(Debug)]
pub struct InMemoryReportSink {
    capacity: usize,
    inner: Mutex<Vec<ForecastReport>>,
}

impl Default for InMemoryReportSink {
    fn default() -> Self {
        Self::with_capacity(256)
    }
}

impl InMemoryReportSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Vec::new()),
        }
    }

    pub fn all(&self) -> Vec<ForecastReport> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Up to `n` reports, newest first.
    pub fn recent(&self, n: usize) -> Vec<ForecastReport> {
        let guard = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        guard.iter().rev().take(n).cloned().collect()
    }
}

impl ForecastReportSink for InMemoryReportSink {
    fn emit(&self, report: ForecastReport) {
        let mut guard = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        guard.push(report);
        if guard.len() > self.capacity {
            let overflow = guard.len() - self.capacity;
            guard.drain(..overflow);
        }
    }
}

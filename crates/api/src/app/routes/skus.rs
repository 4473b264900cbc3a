use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    response::{IntoResponse, Response},
    routing::get,
};

use salescast_core::DateWindow;
use salescast_sales::SkuSelection;
use salescast_sales::aggregate::history;

use crate::app::dto::{self, BeforeQuery, MonthlyHistoryEntry, MonthlyHistoryResponse, TopSkuResponse, TopSkusQuery, YearQuery};
use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/top", get(top_skus))
        .route("/:sku/history", get(monthly_history))
        .route("/:sku/daily", get(daily_history))
        .route("/:sku/comparison", get(annual_comparison))
}

/// Best sellers in `[start, end)`, with configured suspect totals removed.
pub async fn top_skus(
    Extension(services): Extension<Arc<AppServices>>,
    Query(q): Query<TopSkusQuery>,
) -> Response {
    let window = match DateWindow::from_dates(q.start, q.end) {
        Ok(w) => w,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let rows: Vec<TopSkuResponse> = services
        .ledger
        .top_n(&window, dto::clamp_n(q.n), &services.exclusions)
        .into_iter()
        .map(|row| TopSkuResponse {
            product_title: services.ledger.listing(&row.sku).map(|l| l.product_title),
            sku: row.sku,
            total_quantity: row.total_quantity,
        })
        .collect();

    Json(rows).into_response()
}

/// Months with recorded sales before the cutoff, oldest first.
pub async fn monthly_history(
    Extension(services): Extension<Arc<AppServices>>,
    Path(raw_sku): Path<String>,
    Query(q): Query<BeforeQuery>,
) -> Response {
    let sku = match errors::parse_sku(&raw_sku) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    let window = DateWindow::before_date(q.before);
    let totals = services
        .ledger
        .monthly_totals(&SkuSelection::One(sku.clone()), &window);
    let entries = history(&sku, &totals)
        .into_iter()
        .map(MonthlyHistoryEntry::from)
        .collect();

    Json(MonthlyHistoryResponse {
        sku,
        before: q.before,
        history: entries,
    })
    .into_response()
}

pub async fn daily_history(
    Extension(services): Extension<Arc<AppServices>>,
    Path(raw_sku): Path<String>,
    Query(q): Query<BeforeQuery>,
) -> Response {
    let sku = match errors::parse_sku(&raw_sku) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    let days = services
        .ledger
        .daily_history(&sku, &DateWindow::before_date(q.before));
    Json(serde_json::json!({
        "sku": sku,
        "before": q.before,
        "daily_sales": days,
    }))
    .into_response()
}

/// Forecast `year` from history before it and compare with that year's actuals.
pub async fn annual_comparison(
    Extension(services): Extension<Arc<AppServices>>,
    Path(raw_sku): Path<String>,
    Query(q): Query<YearQuery>,
) -> Response {
    let sku = match errors::parse_sku(&raw_sku) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let Some(pipeline) = services.pipeline.clone() else {
        return errors::generation_unconfigured();
    };

    match pipeline.forecast_annual(&sku, q.year).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => errors::pipeline_error_to_response(e),
    }
}

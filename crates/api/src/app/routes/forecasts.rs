use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Query},
    response::{IntoResponse, Response},
    routing::get,
};

use salescast_core::DateWindow;

use crate::app::dto::{self, NextMonthQuery, RecentQuery};
use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/next-month", get(next_month))
        .route("/recent", get(recent))
}

/// Rank the top SKUs in `[start, end)` and forecast `month` for each.
pub async fn next_month(
    Extension(services): Extension<Arc<AppServices>>,
    Query(q): Query<NextMonthQuery>,
) -> Response {
    let window = match DateWindow::from_dates(q.start, q.end) {
        Ok(w) => w,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let Some(pipeline) = services.pipeline.clone() else {
        return errors::generation_unconfigured();
    };

    match pipeline.run_next_month(&window, dto::clamp_n(q.n), q.month).await {
        Ok(forecast) => Json(forecast).into_response(),
        Err(e) => errors::pipeline_error_to_response(e),
    }
}

/// Reports published by this process, newest first.
pub async fn recent(
    Extension(services): Extension<Arc<AppServices>>,
    Query(q): Query<RecentQuery>,
) -> Response {
    Json(services.reports.recent(q.limit.unwrap_or(20))).into_response()
}

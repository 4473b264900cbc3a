use axum::{Router, routing::get};

pub mod forecasts;
pub mod skus;
pub mod system;

/// Router for all data and forecast endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/skus", skus::router())
        .nest("/forecasts", forecasts::router())
        .route("/health", get(system::health))
}

use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use salescast_core::{DomainError, Sku};
use salescast_infra::PipelineError;

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        DomainError::InvalidPeriod(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_period", msg),
        DomainError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        DomainError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
    }
}

pub fn pipeline_error_to_response(err: PipelineError) -> axum::response::Response {
    match err {
        PipelineError::Domain(e) => domain_error_to_response(e),
        PipelineError::Transport(e) => json_error(StatusCode::BAD_GATEWAY, "transport_error", e.to_string()),
        PipelineError::Config(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "config_error", e.to_string()),
    }
}

pub fn generation_unconfigured() -> axum::response::Response {
    json_error(
        StatusCode::SERVICE_UNAVAILABLE,
        "generation_unconfigured",
        "forecasting is disabled: no generation API key configured",
    )
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn parse_sku(raw: &str) -> Result<Sku, axum::response::Response> {
    Sku::parse(raw).map_err(|e| json_error(StatusCode::BAD_REQUEST, "invalid_sku", e.to_string()))
}

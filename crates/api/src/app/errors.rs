use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use printdesk_core::EngineError;

/// Map engine failures to HTTP responses. Insufficient stock and overpayment
/// are expected outcomes and carry their actionable numbers (`available`,
/// `max_acceptable`) as structured fields.
pub fn engine_error_to_response(err: EngineError) -> axum::response::Response {
    let message = err.to_string();
    match err {
        EngineError::Validation(_) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", message)
        }
        EngineError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", message),
        EngineError::Conflict(_) => json_error(StatusCode::CONFLICT, "conflict", message),
        EngineError::Unavailable(_) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "unavailable", message)
        }
        EngineError::InsufficientStock {
            material_type,
            required,
            available,
        } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            axum::Json(json!({
                "error": "insufficient_stock",
                "message": message,
                "material_type": material_type,
                "required": required.as_decimal(),
                "available": available.as_decimal(),
            })),
        )
            .into_response(),
        EngineError::Overpayment { max_acceptable } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            axum::Json(json!({
                "error": "overpayment",
                "message": message,
                "max_acceptable": max_acceptable.as_decimal(),
            })),
        )
            .into_response(),
    }
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

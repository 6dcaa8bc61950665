use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, post},
};

use printdesk_core::{Money, OrderId, PaymentId};
use printdesk_payments::{NewPayment, PaymentReconciler};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route(
            "/orders/:id/payments",
            post(record_payment).get(payment_history),
        )
        .route("/payments/:id", delete(reverse_payment))
}

pub async fn record_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::RecordPaymentRequest>,
) -> axum::response::Response {
    let order_id: OrderId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", "invalid order id");
        }
    };
    let amount = match Money::parse_decimal(body.amount, "amount") {
        Ok(v) => v,
        Err(e) => return errors::engine_error_to_response(e),
    };
    let method = match dto::payment_method_from_str(&body.method) {
        Ok(v) => v,
        Err(e) => return errors::engine_error_to_response(e),
    };

    let new_payment = NewPayment {
        order_id,
        amount,
        method,
        bank: body.bank,
        receipt_reference: body.receipt_reference,
        notes: body.notes,
        recorded_by: body.recorded_by,
    };

    match services.reconciler.record_payment(new_payment).await {
        Ok(payment) => {
            (StatusCode::CREATED, Json(dto::payment_to_json(&payment))).into_response()
        }
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn payment_history(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id: OrderId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", "invalid order id");
        }
    };
    match services.reconciler.payments_for_order(order_id).await {
        Ok(payments) => {
            let payments: Vec<_> = payments.iter().map(dto::payment_to_json).collect();
            (
                StatusCode::OK,
                Json(serde_json::json!({ "payments": payments })),
            )
                .into_response()
        }
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn reverse_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let payment_id: PaymentId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "validation_error",
                "invalid payment id",
            );
        }
    };
    match services.reconciler.reverse_payment(payment_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

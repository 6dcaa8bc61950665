use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};

use printdesk_core::{ClientId, EngineResult, OrderId};
use printdesk_orders::{LineItem, NewOrder, OrderLedger, WorkType};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/items", put(update_items))
        .route("/orders/:id/complete", post(complete_order))
        .route("/orders/:id/cancel", post(cancel_order))
}

fn items_from_request(items: Vec<dto::LineItemRequest>) -> EngineResult<Vec<LineItem>> {
    items.into_iter().map(dto::line_item_from_request).collect()
}

fn new_order_from_request(body: dto::CreateOrderRequest) -> EngineResult<NewOrder> {
    let initial_payment_method = body
        .initial_payment_method
        .as_deref()
        .map(dto::payment_method_from_str)
        .transpose()?;

    Ok(NewOrder {
        client_id: body.client_id.parse::<ClientId>()?,
        client_name: body.client_name,
        work_type: WorkType::new(&body.work_type)?,
        items: items_from_request(body.items)?,
        mark_paid: body.mark_paid,
        initial_payment_method,
        requested_roll: body.requested_roll,
        notes: body.notes,
        created_by: body.created_by,
    })
}

pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateOrderRequest>,
) -> axum::response::Response {
    let new_order = match new_order_from_request(body) {
        Ok(order) => order,
        Err(e) => return errors::engine_error_to_response(e),
    };
    match services.ledger.create_order(new_order).await {
        Ok(order) => (StatusCode::CREATED, Json(dto::order_to_json(&order))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.ledger.list_orders().await {
        Ok(orders) => {
            let orders: Vec<_> = orders.iter().map(dto::order_to_json).collect();
            (StatusCode::OK, Json(serde_json::json!({ "orders": orders }))).into_response()
        }
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id: OrderId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", "invalid order id");
        }
    };
    match services.ledger.get_order(order_id).await {
        Ok(order) => (StatusCode::OK, Json(dto::order_to_json(&order))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn update_items(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateItemsRequest>,
) -> axum::response::Response {
    let order_id: OrderId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", "invalid order id");
        }
    };
    let items = match items_from_request(body.items) {
        Ok(items) => items,
        Err(e) => return errors::engine_error_to_response(e),
    };
    match services.ledger.update_items(order_id, items).await {
        Ok(order) => (StatusCode::OK, Json(dto::order_to_json(&order))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn complete_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id: OrderId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", "invalid order id");
        }
    };
    match services.ledger.complete_order(order_id).await {
        Ok(order) => (StatusCode::OK, Json(dto::order_to_json(&order))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn cancel_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id: OrderId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", "invalid order id");
        }
    };
    match services.ledger.cancel_order(order_id).await {
        Ok(order) => (StatusCode::OK, Json(dto::order_to_json(&order))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

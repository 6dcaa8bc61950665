use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use printdesk_core::Length;
use printdesk_rolls::{AllocationRequest, InstallRoll, MaterialType, RollAllocator, RollStore};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/install", post(install_roll))
        .route("/reset", post(reset_roll))
        .route("/consume", post(consume))
        .route("/:material_type", get(list_rolls))
        .route("/:material_type/:number", get(get_roll))
        .route("/:material_type/:number/active", post(set_active))
        .route("/:material_type/:number/history", get(usage_history))
        .route("/:material_type/:number/availability", get(check_availability))
}

fn parse_material(raw: &str) -> Result<MaterialType, axum::response::Response> {
    MaterialType::new(raw).map_err(errors::engine_error_to_response)
}

fn install_spec(body: dto::InstallRollRequest) -> Result<InstallRoll, axum::response::Response> {
    let material_type = parse_material(&body.material_type)?;
    let total_length = Length::parse_decimal(body.total_length, "total_length")
        .map_err(errors::engine_error_to_response)?;
    Ok(InstallRoll {
        material_type,
        roll_number: body.roll_number,
        total_length,
        notes: body.notes,
        recorded_by: body.recorded_by,
    })
}

pub async fn install_roll(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::InstallRollRequest>,
) -> axum::response::Response {
    let spec = match install_spec(body) {
        Ok(spec) => spec,
        Err(response) => return response,
    };
    match services.rolls.install(spec).await {
        Ok(roll) => (StatusCode::CREATED, Json(dto::roll_to_json(&roll))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn reset_roll(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::InstallRollRequest>,
) -> axum::response::Response {
    let spec = match install_spec(body) {
        Ok(spec) => spec,
        Err(response) => return response,
    };
    match services.rolls.reset(spec).await {
        Ok(roll) => (StatusCode::OK, Json(dto::roll_to_json(&roll))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn consume(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::ConsumeRequest>,
) -> axum::response::Response {
    let material_type = match parse_material(&body.material_type) {
        Ok(m) => m,
        Err(response) => return response,
    };
    let required_length = match Length::parse_decimal(body.required_length, "required_length") {
        Ok(l) => l,
        Err(e) => return errors::engine_error_to_response(e),
    };

    let request = AllocationRequest {
        material_type,
        required_length,
        order_id: None,
        recorded_by: body.recorded_by,
        notes: body.notes,
    };

    let result = match body.roll_number {
        Some(number) => services.allocator.allocate_from_roll(number, request).await,
        None => services.allocator.allocate(request).await,
    };

    match result {
        Ok(allocation) => {
            (StatusCode::OK, Json(dto::allocation_to_json(&allocation))).into_response()
        }
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn list_rolls(
    Extension(services): Extension<Arc<AppServices>>,
    Path(material_type): Path<String>,
) -> axum::response::Response {
    let material_type = match parse_material(&material_type) {
        Ok(m) => m,
        Err(response) => return response,
    };
    match services.rolls.list_by_type(&material_type).await {
        Ok(rolls) => {
            let rolls: Vec<_> = rolls.iter().map(dto::roll_to_json).collect();
            (StatusCode::OK, Json(serde_json::json!({ "rolls": rolls }))).into_response()
        }
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn get_roll(
    Extension(services): Extension<Arc<AppServices>>,
    Path((material_type, number)): Path<(String, u32)>,
) -> axum::response::Response {
    let material_type = match parse_material(&material_type) {
        Ok(m) => m,
        Err(response) => return response,
    };
    match services.rolls.get(&material_type, number).await {
        Ok(roll) => (StatusCode::OK, Json(dto::roll_to_json(&roll))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn set_active(
    Extension(services): Extension<Arc<AppServices>>,
    Path((material_type, number)): Path<(String, u32)>,
    Json(body): Json<dto::SetActiveRequest>,
) -> axum::response::Response {
    let material_type = match parse_material(&material_type) {
        Ok(m) => m,
        Err(response) => return response,
    };
    match services
        .rolls
        .set_active(&material_type, number, body.active)
        .await
    {
        Ok(roll) => (StatusCode::OK, Json(dto::roll_to_json(&roll))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn usage_history(
    Extension(services): Extension<Arc<AppServices>>,
    Path((material_type, number)): Path<(String, u32)>,
) -> axum::response::Response {
    let material_type = match parse_material(&material_type) {
        Ok(m) => m,
        Err(response) => return response,
    };
    match services.rolls.usage_history(&material_type, number).await {
        Ok(events) => {
            let events: Vec<_> = events.iter().map(dto::usage_event_to_json).collect();
            (StatusCode::OK, Json(serde_json::json!({ "events": events }))).into_response()
        }
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn check_availability(
    Extension(services): Extension<Arc<AppServices>>,
    Path((material_type, number)): Path<(String, u32)>,
    Query(query): Query<dto::AvailabilityQuery>,
) -> axum::response::Response {
    let material_type = match parse_material(&material_type) {
        Ok(m) => m,
        Err(response) => return response,
    };
    let required = match Length::parse_decimal(query.required, "required") {
        Ok(l) => l,
        Err(e) => return errors::engine_error_to_response(e),
    };
    match services
        .allocator
        .check_availability(&material_type, number, required)
        .await
    {
        Ok(check) => (StatusCode::OK, Json(dto::availability_to_json(&check))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

use std::sync::Arc;

use chrono::Utc;
use reqwest::StatusCode;
use serde_json::json;

use printdesk_api::app;
use printdesk_orders::{AllocationPolicies, ReceiptNumber};

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, in-memory backend, ephemeral port.
        let services = Arc::new(app::services::AppServices::in_memory(
            AllocationPolicies::print_shop_defaults().unwrap(),
        ));
        let router = app::app_with_services(services);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn install_roll(client: &reqwest::Client, base_url: &str, number: u32, total: f64) {
    let res = client
        .post(format!("{}/rolls/install", base_url))
        .json(&json!({
            "material_type": "DTF",
            "roll_number": number,
            "total_length": total,
            "recorded_by": "operator",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
}

fn embroidery_order(total: f64) -> serde_json::Value {
    json!({
        "client_id": uuid::Uuid::now_v7(),
        "client_name": "Club Deportivo",
        "work_type": "EMBROIDERY",
        "items": [{
            "description": "cap logos",
            "print": { "quantity": 1, "unit_cost": total },
        }],
        "created_by": "front-desk",
    })
}

#[tokio::test]
async fn health_endpoint_responds() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/health", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn order_creation_deducts_material_over_http() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    install_roll(&client, &srv.base_url, 1, 50.0).await;

    let res = client
        .post(format!("{}/orders", srv.base_url))
        .json(&json!({
            "client_id": uuid::Uuid::now_v7(),
            "client_name": "Club Deportivo",
            "work_type": "DTF_PRINT",
            "items": [{
                "description": "jersey numbers",
                "print": { "quantity": 2, "unit_cost": 30.0 },
                "material_length": 10.0,
            }],
            "created_by": "front-desk",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let order: serde_json::Value = res.json().await.unwrap();

    assert_eq!(order["total"], 60.0);
    assert_eq!(order["payment_status"], "pending");
    let expected_prefix = ReceiptNumber::day_prefix(Utc::now().date_naive());
    assert!(
        order["receipt_number"]
            .as_str()
            .unwrap()
            .starts_with(&expected_prefix)
    );

    let res = client
        .get(format!("{}/rolls/DTF/1", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let roll: serde_json::Value = res.json().await.unwrap();
    assert_eq!(roll["available_length"], 40.0);
    assert_eq!(roll["used_length"], 10.0);

    let res = client
        .get(format!(
            "{}/rolls/DTF/1/availability?required=45.0",
            srv.base_url
        ))
        .send()
        .await
        .unwrap();
    let check: serde_json::Value = res.json().await.unwrap();
    assert_eq!(check["sufficient"], false);
    assert_eq!(check["shortfall"], 5.0);

    let res = client
        .get(format!("{}/rolls/DTF/1/history", srv.base_url))
        .send()
        .await
        .unwrap();
    let history: serde_json::Value = res.json().await.unwrap();
    let events = history["events"].as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["kind"], "INSTALL");
    assert_eq!(events[1]["kind"], "CONSUMPTION");
    assert_eq!(events[1]["order_id"], order["id"]);
}

#[tokio::test]
async fn payment_lifecycle_over_http() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/orders", srv.base_url))
        .json(&embroidery_order(100.0))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let order: serde_json::Value = res.json().await.unwrap();
    let order_id = order["id"].as_str().unwrap().to_string();

    let pay = |amount: f64| {
        let client = client.clone();
        let url = format!("{}/orders/{}/payments", srv.base_url, order_id);
        async move {
            client
                .post(url)
                .json(&json!({
                    "amount": amount,
                    "method": "cash",
                    "recorded_by": "cashier",
                }))
                .send()
                .await
                .unwrap()
        }
    };

    let res = pay(80.0).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let first: serde_json::Value = res.json().await.unwrap();

    // Overpayment is rejected with the actionable maximum.
    let res = pay(30.0).await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let err: serde_json::Value = res.json().await.unwrap();
    assert_eq!(err["error"], "overpayment");
    assert_eq!(err["max_acceptable"], 20.0);

    let res = pay(20.0).await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = client
        .get(format!("{}/orders/{}", srv.base_url, order_id))
        .send()
        .await
        .unwrap();
    let order: serde_json::Value = res.json().await.unwrap();
    assert_eq!(order["payment_status"], "paid");
    assert_eq!(order["amount_paid"], 100.0);

    // Reversal recomputes the order in the same operation.
    let res = client
        .delete(format!(
            "{}/payments/{}",
            srv.base_url,
            first["id"].as_str().unwrap()
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = client
        .get(format!("{}/orders/{}", srv.base_url, order_id))
        .send()
        .await
        .unwrap();
    let order: serde_json::Value = res.json().await.unwrap();
    assert_eq!(order["amount_paid"], 20.0);
    assert_eq!(order["payment_status"], "partial");

    let res = client
        .get(format!("{}/orders/{}/payments", srv.base_url, order_id))
        .send()
        .await
        .unwrap();
    let history: serde_json::Value = res.json().await.unwrap();
    assert_eq!(history["payments"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn insufficient_stock_fails_the_whole_order() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    install_roll(&client, &srv.base_url, 1, 1.0).await;

    let res = client
        .post(format!("{}/orders", srv.base_url))
        .json(&json!({
            "client_id": uuid::Uuid::now_v7(),
            "client_name": "Club Deportivo",
            "work_type": "DTF_PRINT",
            "items": [{
                "description": "full banner",
                "print": { "quantity": 1, "unit_cost": 100.0 },
                "material_length": 5.0,
            }],
            "created_by": "front-desk",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let err: serde_json::Value = res.json().await.unwrap();
    assert_eq!(err["error"], "insufficient_stock");
    assert_eq!(err["available"], 1.0);
    assert_eq!(err["required"], 5.0);

    let res = client
        .get(format!("{}/orders", srv.base_url))
        .send()
        .await
        .unwrap();
    let list: serde_json::Value = res.json().await.unwrap();
    assert!(list["orders"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn malformed_requests_are_validation_errors() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    // Empty line items.
    let res = client
        .post(format!("{}/orders", srv.base_url))
        .json(&json!({
            "client_id": uuid::Uuid::now_v7(),
            "client_name": "Club Deportivo",
            "work_type": "EMBROIDERY",
            "items": [],
            "created_by": "front-desk",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    // Negative length on install.
    let res = client
        .post(format!("{}/rolls/install", srv.base_url))
        .json(&json!({
            "material_type": "DTF",
            "roll_number": 1,
            "total_length": -4.0,
            "recorded_by": "operator",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    // Unknown order.
    let res = client
        .get(format!("{}/orders/{}", srv.base_url, uuid::Uuid::now_v7()))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

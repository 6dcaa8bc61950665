use axum::Router;

pub mod orders;
pub mod payments;
pub mod rolls;
pub mod system;

pub fn router() -> Router {
    Router::new()
        .nest("/rolls", rolls::router())
        .merge(orders::router())
        .merge(payments::router())
}

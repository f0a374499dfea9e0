use axum::{
    routing::get,
    Router,
};
use tower_http::cors::CorsLayer;
use super::handlers::{get_balance, get_volume, health};
use super::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/balance", get(get_balance))
        .route("/api/volume", get(get_volume))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

//! HTTP API route definitions.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers::{
    arbitrate, assert_outcome, buy, create_market, dispute, get_balance, get_market, get_probability,
    get_reserves, health, list_markets, metrics, mint, settle, AppState,
};

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoint
        .route("/health", get(health))
        // Market read surface
        .route("/api/v1/markets", get(list_markets).post(create_market))
        .route("/api/v1/markets/:id", get(get_market))
        .route("/api/v1/markets/:id/probability", get(get_probability))
        .route("/api/v1/markets/:id/reserves", get(get_reserves))
        // Market lifecycle
        .route("/api/v1/markets/:id/mint", post(mint))
        .route("/api/v1/markets/:id/assert", post(assert_outcome))
        .route("/api/v1/markets/:id/buy", post(buy))
        .route("/api/v1/markets/:id/settle", post(settle))
        // Local oracle
        .route("/api/v1/assertions/:id/dispute", post(dispute))
        .route("/api/v1/assertions/:id/arbitrate", post(arbitrate))
        .route("/api/v1/accounts/:address", get(get_balance))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

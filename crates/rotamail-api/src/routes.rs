//! API routes

use axum::{
    routing::{delete, get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{accounts, campaigns, health, oauth, tracking};
use crate::state::AppState;

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/ready", get(health::readiness));

    let account_routes = Router::new()
        .route("/", get(accounts::list_accounts))
        .route("/", post(accounts::create_account))
        .route("/:email", patch(accounts::patch_account))
        .route("/oauth2/authorize", post(oauth::authorize))
        .route("/oauth2/callback", get(oauth::callback));

    let campaign_routes = Router::new()
        .route("/", get(campaigns::list_campaigns))
        .route("/send", post(campaigns::send_campaign))
        .route("/:id", get(campaigns::get_campaign))
        .route("/:id", delete(campaigns::delete_campaign))
        .route("/:id/open/:to", get(tracking::track_open))
        .route("/:id/click", get(tracking::track_click));

    Router::new()
        .nest("/health", health_routes)
        .nest("/api/accounts", account_routes)
        .nest("/api/campaigns", campaign_routes)
        .route("/api/status", get(health::status))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

use super::shared_state::AppState;
use crate::error_handling::outcome_response;
use crate::platform_store::health_alerts;
use crate::storage::StoreBackend;
use axum::{
    extract::State,
    response::{Json, Response},
    routing::get,
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn admin_routes<B: StoreBackend + 'static>(app_state: Arc<AppState<B>>) -> Router {
    Router::new()
        .route("/stats", get(platform_stats::<B>))
        .route("/health", get(store_health::<B>))
        .with_state(app_state)
}

async fn platform_stats<B: StoreBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
) -> Response {
    outcome_response(state.store.get_platform_stats().await)
}

/// Always 200: an unhealthy store is a finding, not a failed request.
async fn store_health<B: StoreBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
) -> Json<Value> {
    let health = state.store.health().await;
    let alerts = health_alerts(&health);
    Json(json!({
        "success": true,
        "health": health,
        "alerts": alerts,
    }))
}

use super::shared_state::AppState;
use crate::error_handling::outcome_response;
use crate::storage::StoreBackend;
use axum::{
    extract::{Path, Query, State},
    response::{Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

pub fn activity_routes<B: StoreBackend + 'static>(app_state: Arc<AppState<B>>) -> Router {
    Router::new()
        .route("/activities", post(log_activity::<B>))
        .route(
            "/users/:wallet_address/activities",
            get(get_user_activities::<B>),
        )
        .with_state(app_state)
}

#[derive(Deserialize)]
struct LogActivityRequest {
    #[serde(default)]
    wallet_address: String,
    #[serde(default)]
    activity_type: String,
    #[serde(default)]
    details: serde_json::Map<String, Value>,
}

#[derive(Deserialize)]
struct LimitQuery {
    limit: Option<i64>,
}

async fn log_activity<B: StoreBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Json(body): Json<LogActivityRequest>,
) -> Response {
    outcome_response(
        state
            .store
            .log_user_activity(&body.wallet_address, &body.activity_type, body.details)
            .await,
    )
}

async fn get_user_activities<B: StoreBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Path(wallet_address): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(50);
    outcome_response(state.store.get_user_activities(&wallet_address, limit).await)
}

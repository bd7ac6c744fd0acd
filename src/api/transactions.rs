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

pub fn transaction_routes<B: StoreBackend + 'static>(app_state: Arc<AppState<B>>) -> Router {
    Router::new()
        .route("/transactions", post(log_transaction::<B>))
        .route(
            "/users/:wallet_address/transactions",
            get(get_user_transactions::<B>),
        )
        .with_state(app_state)
}

#[derive(Deserialize)]
struct LimitQuery {
    limit: Option<i64>,
}

/// The whole body is the transaction payload; known fields are extracted
/// and the rest rides along in `details`.
async fn log_transaction<B: StoreBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Json(body): Json<Value>,
) -> Response {
    let wallet = body
        .get("wallet_address")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    outcome_response(state.store.log_transaction(wallet, &body).await)
}

async fn get_user_transactions<B: StoreBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Path(wallet_address): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(50);
    outcome_response(
        state
            .store
            .get_user_transactions(&wallet_address, limit)
            .await,
    )
}

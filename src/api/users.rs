use super::shared_state::AppState;
use crate::error_handling::outcome_response;
use crate::storage::{ExtensionMap, StoreBackend};
use axum::{
    extract::{Path, Query, State},
    response::{Json, Response},
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;

pub fn user_routes<B: StoreBackend + 'static>(app_state: Arc<AppState<B>>) -> Router {
    Router::new()
        .route("/", post(create_user::<B>).get(get_all_users::<B>))
        .route("/:wallet_address", get(get_user::<B>))
        .route(
            "/:wallet_address/access-level",
            put(update_access_level::<B>),
        )
        .route("/:wallet_address/revoke-access", post(revoke_access::<B>))
        .with_state(app_state)
}

#[derive(Deserialize)]
struct CreateUserRequest {
    #[serde(default)]
    wallet_address: String,
    /// Primitive-only extension fields; nested values are rejected by the
    /// extractor before the façade sees them.
    #[serde(default)]
    extra: ExtensionMap,
}

#[derive(Deserialize)]
struct PageQuery {
    limit: Option<i64>,
    skip: Option<i64>,
}

#[derive(Deserialize)]
struct AccessLevelRequest {
    #[serde(default)]
    access_level: String,
    updated_by: Option<String>,
}

#[derive(Deserialize)]
struct RevokeRequest {
    reason: Option<String>,
}

async fn create_user<B: StoreBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Json(body): Json<CreateUserRequest>,
) -> Response {
    outcome_response(
        state
            .store
            .create_user(&body.wallet_address, body.extra)
            .await,
    )
}

async fn get_all_users<B: StoreBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Query(query): Query<PageQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(100);
    let skip = query.skip.unwrap_or(0);
    outcome_response(state.store.get_all_users(limit, skip).await)
}

async fn get_user<B: StoreBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Path(wallet_address): Path<String>,
) -> Response {
    outcome_response(state.store.get_user(&wallet_address).await)
}

async fn update_access_level<B: StoreBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Path(wallet_address): Path<String>,
    Json(body): Json<AccessLevelRequest>,
) -> Response {
    outcome_response(
        state
            .store
            .update_access_level(
                &wallet_address,
                &body.access_level,
                body.updated_by.as_deref(),
            )
            .await,
    )
}

/// The body is optional; revoking without a reason is legitimate.
async fn revoke_access<B: StoreBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Path(wallet_address): Path<String>,
    body: Option<Json<RevokeRequest>>,
) -> Response {
    let reason = body.and_then(|Json(b)| b.reason);
    outcome_response(
        state
            .store
            .revoke_access(&wallet_address, reason.as_deref())
            .await,
    )
}

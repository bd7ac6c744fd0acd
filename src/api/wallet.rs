use super::shared_state::AppState;
use crate::error_handling::{validation_error, ApiResult};
use crate::storage::StoreBackend;
use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub fn wallet_routes<B: StoreBackend + 'static>(app_state: Arc<AppState<B>>) -> Router {
    Router::new()
        .route("/check-connection", get(check_connection::<B>))
        .route("/get-balance", post(get_balance::<B>))
        .route("/get-transactions", post(get_transactions::<B>))
        .route("/check-allowance", post(check_allowance::<B>))
        .route("/network-info", get(network_info::<B>))
        .with_state(app_state)
}

#[derive(Deserialize)]
struct AddressRequest {
    #[serde(default)]
    address: String,
}

#[derive(Deserialize)]
struct AllowanceRequest {
    #[serde(default)]
    owner: String,
    spender: Option<String>,
}

/// Probes the RPC endpoint. A reachable node on the wrong chain reports as
/// disconnected; the probe itself succeeding is what `success` means here.
async fn check_connection<B: StoreBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
) -> Json<Value> {
    let connected = state.chain.check_connection().await;
    Json(json!({
        "success": true,
        "connected": connected,
        "network": state.chain.network().chain_name(),
    }))
}

async fn get_balance<B: StoreBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Json(body): Json<AddressRequest>,
) -> ApiResult<Json<Value>> {
    let address = body.address.trim().to_string();
    if address.is_empty() {
        return Err(validation_error("Address is required"));
    }
    let bnb_balance = state.chain.get_bnb_balance(&address).await?;
    let usdt_balance = state.chain.get_usdt_balance(&address).await?;
    Ok(Json(json!({
        "success": true,
        "bnb_balance": bnb_balance,
        "usdt_balance": usdt_balance,
        "address": address,
    })))
}

async fn get_transactions<B: StoreBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Json(body): Json<AddressRequest>,
) -> ApiResult<Json<Value>> {
    let address = body.address.trim().to_string();
    if address.is_empty() {
        return Err(validation_error("Address is required"));
    }
    let transactions = state.chain.get_recent_transactions(&address).await?;
    Ok(Json(json!({
        "success": true,
        "transactions": transactions,
    })))
}

/// Allowance granted to `spender`, defaulting to the program contract when
/// the caller leaves it out.
async fn check_allowance<B: StoreBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Json(body): Json<AllowanceRequest>,
) -> ApiResult<Json<Value>> {
    let owner = body.owner.trim().to_string();
    if owner.is_empty() {
        return Err(validation_error("Owner address is required"));
    }
    let spender = body
        .spender
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| state.config.program_contract.clone());
    let allowance = state.chain.get_allowance(&owner, &spender).await?;
    Ok(Json(json!({
        "success": true,
        "allowance": allowance.allowance,
        "allowance_raw": allowance.allowance_raw,
    })))
}

async fn network_info<B: StoreBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
) -> Json<Value> {
    let network = state.chain.network();
    Json(json!({
        "success": true,
        "chainId": network.chain_id(),
        "chainName": network.chain_name(),
        "rpcUrl": state.config.rpc_url,
        "blockExplorer": network.explorer_url(),
        "usdtContract": state.config.usdt_contract,
        "programContract": state.config.program_contract,
    }))
}

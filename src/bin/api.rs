use axum::{extract::State, response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};

use wallet_access_engine::api::{
    activity_routes, admin_routes, shared_state::AppState, transaction_routes, user_routes,
    wallet_routes,
};
use wallet_access_engine::chain_client::ChainClient;
use wallet_access_engine::config::AppConfig;
use wallet_access_engine::platform_store::PlatformStore;
use wallet_access_engine::postgres_store::PostgresStore;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    info!("⚙️  {}", config.summary());

    // Startup chain probe. Failure is logged, not fatal; lookups recover as
    // soon as the endpoint does.
    let chain = ChainClient::new(
        config.network,
        config.rpc_url.clone(),
        config.usdt_contract.clone(),
    );
    if chain.check_connection().await {
        info!("🔗 Connected to {}", config.network.chain_name());
    } else {
        tracing::warn!(
            "Chain endpoint {} unreachable at startup; lookups will fail until it recovers",
            config.rpc_url
        );
    }

    // First store connection attempt happens inside the façade; the server
    // comes up in offline mode when it fails.
    let backend = PostgresStore::new(&config.database_url);
    let store = PlatformStore::new(backend, &config.database_url).await;

    let port = config.port;
    let app_state = Arc::new(AppState::new(store, chain, config));

    let service_routes = Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .with_state(app_state.clone());

    let app = service_routes
        .nest("/api", wallet_routes(app_state.clone()))
        .nest("/api/users", user_routes(app_state.clone()))
        .nest("/api", activity_routes(app_state.clone()))
        .nest("/api", transaction_routes(app_state.clone()))
        .nest("/api/admin", admin_routes(app_state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("🚀 Wallet Access API server starting on {} (PORT={})", addr, port);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    info!("✅ Server listening and ready to accept connections on {}", addr);
    info!("🏥 Health check endpoint: http://{}:{}/health", addr.ip(), addr.port());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    app_state.store.close().await;
    info!("Server stopped");
}

async fn root() -> Json<Value> {
    Json(json!({
        "name": "Wallet Access API",
        "version": "0.1.0",
        "description": "BSC wallet lookups with an availability-aware user store",
        "endpoints": [
            "/api/check-connection",
            "/api/get-balance",
            "/api/get-transactions",
            "/api/check-allowance",
            "/api/network-info",
            "/api/users",
            "/api/activities",
            "/api/transactions",
            "/api/admin/stats",
            "/api/admin/health"
        ]
    }))
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    let connection = state.store.connection_status().await;
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now(),
        "store": connection,
    }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received, draining connections");
}

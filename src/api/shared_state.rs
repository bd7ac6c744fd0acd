use crate::chain_client::ChainClient;
use crate::config::AppConfig;
use crate::platform_store::PlatformStore;
use crate::postgres_store::PostgresStore;
use crate::storage::StoreBackend;

/// Production AppState backed by PostgreSQL.
pub type ProductionAppState = AppState<PostgresStore>;

/// Shared state behind every route.
///
/// Type Parameters:
/// - B: Storage backend behind the façade (PostgresStore in production,
///     InMemoryStore in tests and the demo binary)
pub struct AppState<B: StoreBackend + 'static = PostgresStore> {
    pub store: PlatformStore<B>,
    pub chain: ChainClient,
    pub config: AppConfig,
}

impl<B: StoreBackend + 'static> AppState<B> {
    pub fn new(store: PlatformStore<B>, chain: ChainClient, config: AppConfig) -> Self {
        Self {
            store,
            chain,
            config,
        }
    }
}

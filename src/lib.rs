pub mod api;
pub mod chain_client;
pub mod config;
pub mod error_handling;
pub mod platform_store;
pub mod postgres_store;
pub mod storage;

pub use chain_client::*;
pub use config::*;
pub use error_handling::*;
pub use platform_store::*;
pub use postgres_store::*;
pub use storage::*;

pub mod activity;
pub mod admin;
pub mod shared_state;
pub mod transactions;
pub mod users;
pub mod wallet;

pub use activity::activity_routes;
pub use admin::admin_routes;
pub use transactions::transaction_routes;
pub use users::user_routes;
pub use wallet::wallet_routes;

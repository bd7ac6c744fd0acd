use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use crate::config::redact_credentials;
use crate::storage::{
    AccessLevel, ActivityRecord, ExtensionMap, PlatformStats, StoreBackend, StoreError,
    TransactionRecord, UserRecord,
};

pub const STORE_NAME: &str = "web_wallet_access";
pub const MAX_CONNECTION_ATTEMPTS: u32 = 3;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(3);
const OPERATION_TIMEOUT: Duration = Duration::from_secs(3);

const OFFLINE_ERROR: &str = "Database not available - running in offline mode";

pub fn normalize_wallet_address(address: &str) -> String {
    address.trim().to_lowercase()
}

/// How an operation ended. Not serialized; the HTTP layer maps it to a
/// status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Success,
    InvalidInput,
    NotFound,
    Offline,
    StoreFailure,
}

/// Uniform result shape for every store operation. `success: false` never
/// carries data; offline successes carry synthesized, non-persisted data.
#[derive(Debug, Clone, Serialize)]
pub struct StoreOutcome<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub offline_mode: bool,
    #[serde(skip)]
    pub kind: OutcomeKind,
}

impl<T> StoreOutcome<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            offline_mode: false,
            kind: OutcomeKind::Success,
        }
    }

    /// Offline-mode success carrying synthesized data.
    pub fn offline(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            offline_mode: true,
            kind: OutcomeKind::Success,
        }
    }

    pub fn offline_failure() -> Self {
        Self {
            success: false,
            data: None,
            error: Some(OFFLINE_ERROR.to_string()),
            offline_mode: true,
            kind: OutcomeKind::Offline,
        }
    }

    pub fn invalid_input(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            offline_mode: false,
            kind: OutcomeKind::InvalidInput,
        }
    }

    pub fn not_found(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            offline_mode: false,
            kind: OutcomeKind::NotFound,
        }
    }

    pub fn store_failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            offline_mode: false,
            kind: OutcomeKind::StoreFailure,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub connection_attempts: u32,
    pub max_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_attempt: Option<DateTime<Utc>>,
    pub store_name: String,
    pub uri: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreHealth {
    pub connection: ConnectionStatus,
    pub stats: PlatformStats,
    pub offline_mode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Success,
    Info,
    Warning,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthAlert {
    pub severity: AlertSeverity,
    pub message: String,
}

/// Advisory classification of store health. Presentational only; nothing
/// acts on these.
pub fn health_alerts(health: &StoreHealth) -> Vec<HealthAlert> {
    let mut alerts = Vec::new();
    if health.connection.connected {
        alerts.push(HealthAlert {
            severity: AlertSeverity::Success,
            message: "Database connection healthy".to_string(),
        });
    } else {
        alerts.push(HealthAlert {
            severity: AlertSeverity::Warning,
            message: "Database disconnected - running in offline mode".to_string(),
        });
    }
    if health.connection.connection_attempts > 1 {
        alerts.push(HealthAlert {
            severity: AlertSeverity::Info,
            message: format!(
                "{} connection attempts since startup",
                health.connection.connection_attempts
            ),
        });
    }
    if health.stats.total_users > 100 {
        alerts.push(HealthAlert {
            severity: AlertSeverity::Info,
            message: format!("User base above 100 ({} users)", health.stats.total_users),
        });
    }
    if health.stats.recent_activities_24h > 50 {
        alerts.push(HealthAlert {
            severity: AlertSeverity::Info,
            message: format!(
                "High activity in the last 24h ({} events)",
                health.stats.recent_activities_24h
            ),
        });
    }
    alerts
}

#[derive(Debug, Clone, Serialize)]
pub struct UserPage {
    pub users: Vec<UserRecord>,
    pub total_count: u64,
    pub page: u64,
    pub per_page: u64,
}

#[derive(Default)]
struct ConnState {
    connected: bool,
    attempts: u32,
    last_attempt: Option<DateTime<Utc>>,
}

/// Availability-aware façade over a store backend.
///
/// Every operation returns a `StoreOutcome`; nothing here panics or bubbles
/// an error to the caller. When the store is unreachable, operations with a
/// plausible default synthesize offline data, everything else fails with the
/// offline tag. Reconnects happen lazily on demand and stop for good once
/// the attempt ceiling is hit.
pub struct PlatformStore<B: StoreBackend> {
    backend: B,
    state: Mutex<ConnState>,
    uri: String,
}

impl<B: StoreBackend> PlatformStore<B> {
    /// Builds the façade and immediately attempts the first connection.
    /// A failure here is logged, not fatal; the façade starts offline.
    pub async fn new(backend: B, uri: &str) -> Self {
        let store = Self {
            backend,
            state: Mutex::new(ConnState::default()),
            uri: redact_credentials(uri),
        };
        store.connect().await;
        store
    }

    /// One connection attempt. Bumps the attempt counter whether or not the
    /// handshake succeeds.
    pub async fn connect(&self) -> bool {
        {
            let mut state = self.state.lock().unwrap();
            state.attempts += 1;
            state.last_attempt = Some(Utc::now());
        }

        let result = tokio::time::timeout(HANDSHAKE_TIMEOUT, self.backend.connect()).await;
        let mut state = self.state.lock().unwrap();
        match result {
            Ok(Ok(())) => {
                state.connected = true;
                tracing::info!("Connected to store: {}", STORE_NAME);
                true
            }
            Ok(Err(e)) => {
                state.connected = false;
                tracing::warn!("Store connection failed: {}", e);
                tracing::info!("Continuing without persistent storage");
                false
            }
            Err(_) => {
                state.connected = false;
                tracing::warn!(
                    "Store connection timed out after {:?}",
                    HANDSHAKE_TIMEOUT
                );
                false
            }
        }
    }

    /// Live connectivity check. Probes the backend when the last known state
    /// was connected and demotes the flag if the probe fails.
    pub async fn is_connected(&self) -> bool {
        let flagged = self.state.lock().unwrap().connected;
        if !flagged {
            return false;
        }
        match tokio::time::timeout(HANDSHAKE_TIMEOUT, self.backend.ping()).await {
            Ok(Ok(())) => true,
            _ => {
                self.state.lock().unwrap().connected = false;
                false
            }
        }
    }

    async fn ensure_connection(&self) -> bool {
        if self.is_connected().await {
            return true;
        }
        let under_ceiling = self.state.lock().unwrap().attempts < MAX_CONNECTION_ATTEMPTS;
        if under_ceiling {
            tracing::info!("Attempting to reconnect to the store");
            return self.connect().await;
        }
        false
    }

    async fn with_timeout<T>(
        &self,
        operation: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(OPERATION_TIMEOUT, operation).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout),
        }
    }

    pub async fn connection_status(&self) -> ConnectionStatus {
        let connected = self.is_connected().await;
        let state = self.state.lock().unwrap();
        ConnectionStatus {
            connected,
            connection_attempts: state.attempts,
            max_attempts: MAX_CONNECTION_ATTEMPTS,
            last_attempt: state.last_attempt,
            store_name: STORE_NAME.to_string(),
            uri: self.uri.clone(),
        }
    }

    /// Creates a user on first login, or degrades to a login update when the
    /// address already has a record. Offline: synthesizes a first-login mock.
    pub async fn create_user(
        &self,
        wallet_address: &str,
        extra: ExtensionMap,
    ) -> StoreOutcome<UserRecord> {
        let wallet = normalize_wallet_address(wallet_address);
        if wallet.is_empty() {
            return StoreOutcome::invalid_input("Wallet address is required");
        }
        if !self.ensure_connection().await {
            tracing::debug!("create_user for {} served offline", wallet);
            return StoreOutcome::offline(UserRecord::first_login(&wallet, extra));
        }

        match self.with_timeout(self.backend.find_user(&wallet)).await {
            Ok(Some(_)) => self.update_user_login(&wallet).await,
            Ok(None) => {
                let user = UserRecord::first_login(&wallet, extra);
                match self.with_timeout(self.backend.insert_user(&user)).await {
                    Ok(stored) => StoreOutcome::ok(stored),
                    Err(e) => StoreOutcome::store_failure(e.to_string()),
                }
            }
            Err(e) => StoreOutcome::store_failure(e.to_string()),
        }
    }

    async fn update_user_login(&self, wallet: &str) -> StoreOutcome<UserRecord> {
        match self
            .with_timeout(self.backend.record_login(wallet, Utc::now()))
            .await
        {
            Ok(Some(user)) => StoreOutcome::ok(user),
            Ok(None) => StoreOutcome::not_found("User not found"),
            Err(e) => StoreOutcome::store_failure(e.to_string()),
        }
    }

    /// Offline: synthesizes a plausible record for the address rather than
    /// failing, matching the shape of a real result.
    pub async fn get_user(&self, wallet_address: &str) -> StoreOutcome<UserRecord> {
        let wallet = normalize_wallet_address(wallet_address);
        if wallet.is_empty() {
            return StoreOutcome::invalid_input("Wallet address is required");
        }
        if !self.ensure_connection().await {
            return StoreOutcome::offline(UserRecord::first_login(&wallet, ExtensionMap::new()));
        }

        match self.with_timeout(self.backend.find_user(&wallet)).await {
            Ok(Some(user)) => StoreOutcome::ok(user),
            Ok(None) => StoreOutcome::not_found("User not found"),
            Err(e) => StoreOutcome::store_failure(e.to_string()),
        }
    }

    pub async fn get_all_users(&self, limit: i64, skip: i64) -> StoreOutcome<UserPage> {
        if limit < 1 {
            return StoreOutcome::invalid_input("Limit must be at least 1");
        }
        if skip < 0 {
            return StoreOutcome::invalid_input("Skip cannot be negative");
        }
        if !self.ensure_connection().await {
            return StoreOutcome::offline_failure();
        }

        match self.with_timeout(self.backend.list_users(limit, skip)).await {
            Ok((users, total_count)) => StoreOutcome::ok(UserPage {
                users,
                total_count,
                page: (skip / limit + 1) as u64,
                per_page: limit as u64,
            }),
            Err(e) => StoreOutcome::store_failure(e.to_string()),
        }
    }

    /// Appends an activity record. Offline: echoes a synthesized,
    /// non-persisted record.
    pub async fn log_user_activity(
        &self,
        wallet_address: &str,
        activity_type: &str,
        details: serde_json::Map<String, serde_json::Value>,
    ) -> StoreOutcome<ActivityRecord> {
        let wallet = normalize_wallet_address(wallet_address);
        if wallet.is_empty() {
            return StoreOutcome::invalid_input("Wallet address is required");
        }
        if activity_type.trim().is_empty() {
            return StoreOutcome::invalid_input("Activity type is required");
        }
        let activity = ActivityRecord {
            id: None,
            wallet_address: wallet,
            activity_type: activity_type.to_string(),
            timestamp: Utc::now(),
            details,
        };
        if !self.ensure_connection().await {
            return StoreOutcome::offline(activity);
        }

        match self.with_timeout(self.backend.insert_activity(&activity)).await {
            Ok(stored) => StoreOutcome::ok(stored),
            Err(e) => StoreOutcome::store_failure(e.to_string()),
        }
    }

    pub async fn get_user_activities(
        &self,
        wallet_address: &str,
        limit: i64,
    ) -> StoreOutcome<Vec<ActivityRecord>> {
        let wallet = normalize_wallet_address(wallet_address);
        if wallet.is_empty() {
            return StoreOutcome::invalid_input("Wallet address is required");
        }
        if limit < 1 {
            return StoreOutcome::invalid_input("Limit must be at least 1");
        }
        if !self.ensure_connection().await {
            return StoreOutcome::offline_failure();
        }

        match self
            .with_timeout(self.backend.list_activities(&wallet, limit))
            .await
        {
            Ok(activities) => StoreOutcome::ok(activities),
            Err(e) => StoreOutcome::store_failure(e.to_string()),
        }
    }

    /// Records a transaction from an opaque payload. No offline default:
    /// fabricating a transaction would imply chain state nobody observed.
    pub async fn log_transaction(
        &self,
        wallet_address: &str,
        payload: &serde_json::Value,
    ) -> StoreOutcome<TransactionRecord> {
        let wallet = normalize_wallet_address(wallet_address);
        if wallet.is_empty() {
            return StoreOutcome::invalid_input("Wallet address is required");
        }
        if !self.ensure_connection().await {
            return StoreOutcome::offline_failure();
        }

        let transaction = TransactionRecord::from_payload(&wallet, payload);
        match self
            .with_timeout(self.backend.insert_transaction(&transaction))
            .await
        {
            Ok(stored) => StoreOutcome::ok(stored),
            Err(e) => StoreOutcome::store_failure(e.to_string()),
        }
    }

    pub async fn get_user_transactions(
        &self,
        wallet_address: &str,
        limit: i64,
    ) -> StoreOutcome<Vec<TransactionRecord>> {
        let wallet = normalize_wallet_address(wallet_address);
        if wallet.is_empty() {
            return StoreOutcome::invalid_input("Wallet address is required");
        }
        if limit < 1 {
            return StoreOutcome::invalid_input("Limit must be at least 1");
        }
        if !self.ensure_connection().await {
            return StoreOutcome::offline_failure();
        }

        match self
            .with_timeout(self.backend.list_transactions(&wallet, limit))
            .await
        {
            Ok(transactions) => StoreOutcome::ok(transactions),
            Err(e) => StoreOutcome::store_failure(e.to_string()),
        }
    }

    /// Admin mutation; requires the store. On success the change is also
    /// recorded as an activity, best-effort.
    pub async fn update_access_level(
        &self,
        wallet_address: &str,
        access_level: &str,
        updated_by: Option<&str>,
    ) -> StoreOutcome<UserRecord> {
        let wallet = normalize_wallet_address(wallet_address);
        if wallet.is_empty() {
            return StoreOutcome::invalid_input("Wallet address is required");
        }
        let level = match AccessLevel::parse(access_level) {
            Some(level) => level,
            None => {
                return StoreOutcome::invalid_input(format!(
                    "Unknown access level: {}",
                    access_level
                ))
            }
        };
        if !self.ensure_connection().await {
            return StoreOutcome::offline_failure();
        }

        let now = Utc::now();
        match self
            .with_timeout(self.backend.set_access_level(&wallet, level, updated_by, now))
            .await
        {
            Ok(Some(user)) => {
                let mut details = serde_json::Map::new();
                details.insert("new_access_level".to_string(), json!(level.as_str()));
                details.insert(
                    "updated_by".to_string(),
                    updated_by.map_or(serde_json::Value::Null, |u| json!(u)),
                );
                details.insert("timestamp".to_string(), json!(now.to_rfc3339()));
                self.record_change_activity(&wallet, "access_level_updated", details)
                    .await;
                StoreOutcome::ok(user)
            }
            Ok(None) => StoreOutcome::not_found("User not found"),
            Err(e) => StoreOutcome::store_failure(e.to_string()),
        }
    }

    /// Admin mutation; requires the store. Deactivates the user and stamps
    /// the revocation, logging it as an activity best-effort.
    pub async fn revoke_access(
        &self,
        wallet_address: &str,
        reason: Option<&str>,
    ) -> StoreOutcome<UserRecord> {
        let wallet = normalize_wallet_address(wallet_address);
        if wallet.is_empty() {
            return StoreOutcome::invalid_input("Wallet address is required");
        }
        if !self.ensure_connection().await {
            return StoreOutcome::offline_failure();
        }

        let now = Utc::now();
        match self
            .with_timeout(self.backend.revoke_access(&wallet, reason, now))
            .await
        {
            Ok(Some(user)) => {
                let mut details = serde_json::Map::new();
                details.insert(
                    "reason".to_string(),
                    reason.map_or(serde_json::Value::Null, |r| json!(r)),
                );
                details.insert("timestamp".to_string(), json!(now.to_rfc3339()));
                self.record_change_activity(&wallet, "access_revoked", details)
                    .await;
                StoreOutcome::ok(user)
            }
            Ok(None) => StoreOutcome::not_found("User not found"),
            Err(e) => StoreOutcome::store_failure(e.to_string()),
        }
    }

    /// Best-effort side effect of the access mutations. A failure is logged
    /// and swallowed; the primary mutation already succeeded.
    async fn record_change_activity(
        &self,
        wallet: &str,
        activity_type: &str,
        details: serde_json::Map<String, serde_json::Value>,
    ) {
        let activity = ActivityRecord {
            id: None,
            wallet_address: wallet.to_string(),
            activity_type: activity_type.to_string(),
            timestamp: Utc::now(),
            details,
        };
        if let Err(e) = self.with_timeout(self.backend.insert_activity(&activity)).await {
            tracing::warn!("Failed to record {} activity: {}", activity_type, e);
        }
    }

    /// Offline: reports zeroed counters as a success so dashboards keep
    /// rendering.
    pub async fn get_platform_stats(&self) -> StoreOutcome<PlatformStats> {
        if !self.ensure_connection().await {
            return StoreOutcome::offline(PlatformStats::default());
        }
        let since = Utc::now() - chrono::Duration::days(1);
        match self.with_timeout(self.backend.platform_counts(since)).await {
            Ok(stats) => StoreOutcome::ok(stats),
            Err(e) => StoreOutcome::store_failure(e.to_string()),
        }
    }

    /// Connection state plus live stats (zeroed while disconnected).
    pub async fn health(&self) -> StoreHealth {
        let connection = self.connection_status().await;
        if !connection.connected {
            return StoreHealth {
                connection,
                stats: PlatformStats::default(),
                offline_mode: true,
            };
        }
        let since = Utc::now() - chrono::Duration::days(1);
        match self.with_timeout(self.backend.platform_counts(since)).await {
            Ok(stats) => StoreHealth {
                connection,
                stats,
                offline_mode: false,
            },
            Err(e) => {
                tracing::warn!("Health stats query failed: {}", e);
                StoreHealth {
                    connection,
                    stats: PlatformStats::default(),
                    offline_mode: true,
                }
            }
        }
    }

    pub async fn close(&self) {
        self.backend.close().await;
        self.state.lock().unwrap().connected = false;
        tracing::info!("Store connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wallet_normalization_is_idempotent() {
        let once = normalize_wallet_address("  0xAbCdEf123  ");
        let twice = normalize_wallet_address(&once);
        assert_eq!(once, "0xabcdef123");
        assert_eq!(once, twice);
    }

    #[test]
    fn outcome_constructors_tag_correctly() {
        let ok: StoreOutcome<u32> = StoreOutcome::ok(7);
        assert!(ok.success && !ok.offline_mode);
        assert_eq!(ok.kind, OutcomeKind::Success);

        let offline: StoreOutcome<u32> = StoreOutcome::offline(7);
        assert!(offline.success && offline.offline_mode);

        let failure: StoreOutcome<u32> = StoreOutcome::offline_failure();
        assert!(!failure.success && failure.offline_mode);
        assert_eq!(failure.kind, OutcomeKind::Offline);
        assert_eq!(failure.error.as_deref(), Some(OFFLINE_ERROR));

        let missing: StoreOutcome<u32> = StoreOutcome::not_found("User not found");
        assert_eq!(missing.kind, OutcomeKind::NotFound);
    }

    #[test]
    fn outcome_serialization_omits_empty_fields() {
        let ok: StoreOutcome<u32> = StoreOutcome::ok(7);
        let body = serde_json::to_value(&ok).expect("serialization should work");
        assert_eq!(
            body,
            serde_json::json!({"success": true, "data": 7, "offline_mode": false})
        );

        let failure: StoreOutcome<u32> = StoreOutcome::offline_failure();
        let body = serde_json::to_value(&failure).expect("serialization should work");
        assert_eq!(body["success"], serde_json::json!(false));
        assert_eq!(body["offline_mode"], serde_json::json!(true));
        assert!(body.get("data").is_none());
    }

    fn health_fixture(
        connected: bool,
        attempts: u32,
        total_users: u64,
        recent: u64,
    ) -> StoreHealth {
        StoreHealth {
            connection: ConnectionStatus {
                connected,
                connection_attempts: attempts,
                max_attempts: MAX_CONNECTION_ATTEMPTS,
                last_attempt: None,
                store_name: STORE_NAME.to_string(),
                uri: "postgres://localhost/test".to_string(),
            },
            stats: PlatformStats {
                total_users,
                recent_activities_24h: recent,
                ..PlatformStats::default()
            },
            offline_mode: !connected,
        }
    }

    #[test]
    fn alerts_warn_while_disconnected() {
        let alerts = health_alerts(&health_fixture(false, 3, 0, 0));
        assert_eq!(alerts[0].severity, AlertSeverity::Warning);
        assert!(alerts
            .iter()
            .any(|a| a.severity == AlertSeverity::Info && a.message.contains("3")));
    }

    #[test]
    fn alerts_note_volume_thresholds() {
        let alerts = health_alerts(&health_fixture(true, 1, 250, 80));
        assert_eq!(alerts[0].severity, AlertSeverity::Success);
        assert!(alerts.iter().any(|a| a.message.contains("250")));
        assert!(alerts.iter().any(|a| a.message.contains("80")));
        // Single successful attempt: no attempt-count note.
        assert!(!alerts.iter().any(|a| a.message.contains("attempts")));
    }
}

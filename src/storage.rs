use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

#[derive(Debug)]
pub enum StoreError {
    ConfigurationError(String),
    ConnectionError(String),
    ReadError(String),
    WriteError(String),
    SerializationError(serde_json::Error),
    Timeout,
    Unavailable,
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::SerializationError(err)
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::ConfigurationError(e) => write!(f, "Configuration error: {}", e),
            StoreError::ConnectionError(e) => write!(f, "Connection error: {}", e),
            StoreError::ReadError(e) => write!(f, "Database error: {}", e),
            StoreError::WriteError(e) => write!(f, "Database error: {}", e),
            StoreError::SerializationError(e) => write!(f, "Serialization error: {}", e),
            StoreError::Timeout => write!(f, "Database error: operation timed out"),
            StoreError::Unavailable => write!(f, "Database not available"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Access tier recorded on a user. Revocation is expressed through
/// `is_active` and `platform_access.has_access`, not a separate tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    User,
    Admin,
}

impl AccessLevel {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "user" => Some(AccessLevel::User),
            "admin" => Some(AccessLevel::Admin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::User => "user",
            AccessLevel::Admin => "admin",
        }
    }
}

impl std::fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Primitive-only extension value. Objects and arrays are rejected at the
/// deserialization boundary, which keeps user records schema-checkable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtraValue {
    Flag(bool),
    Integer(i64),
    Number(f64),
    Text(String),
}

pub type ExtensionMap = BTreeMap<String, ExtraValue>;

pub const DEFAULT_ACCESS_METHOD: &str = "wallet_connect";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformAccess {
    pub has_access: bool,
    pub access_granted_at: DateTime<Utc>,
    pub access_method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_access: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// Store-assigned identifier, rendered opaque. Absent on offline mocks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub wallet_address: String,
    pub created_at: DateTime<Utc>,
    pub last_login: DateTime<Utc>,
    pub login_count: i64,
    pub is_active: bool,
    pub access_level: AccessLevel,
    pub platform_access: PlatformAccess,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: ExtensionMap,
}

impl UserRecord {
    /// Fresh first-login record for an already-normalized wallet address.
    /// Used both for real inserts and for offline mocks.
    pub fn first_login(wallet_address: &str, extra: ExtensionMap) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            wallet_address: wallet_address.to_string(),
            created_at: now,
            last_login: now,
            login_count: 1,
            is_active: true,
            access_level: AccessLevel::User,
            platform_access: PlatformAccess {
                has_access: true,
                access_granted_at: now,
                access_method: DEFAULT_ACCESS_METHOD.to_string(),
                last_access: None,
                revoked_at: None,
                revocation_reason: None,
                updated_by: None,
            },
            extra,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub wallet_address: String,
    pub activity_type: String,
    pub timestamp: DateTime<Utc>,
    pub details: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub wallet_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    pub transaction_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub status: String,
    /// Raw caller payload, mirrored untouched.
    pub details: serde_json::Value,
}

impl TransactionRecord {
    /// Builds a record from an opaque caller payload, extracting the fields
    /// the schema knows about and mirroring the whole payload in `details`.
    pub fn from_payload(wallet_address: &str, payload: &serde_json::Value) -> Self {
        let text = |key: &str| {
            payload
                .get(key)
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };
        Self {
            id: None,
            wallet_address: wallet_address.to_string(),
            transaction_hash: text("hash"),
            transaction_type: text("type").unwrap_or_else(|| "unknown".to_string()),
            amount: payload.get("amount").and_then(render_primitive),
            token: text("token").unwrap_or_else(|| "BNB".to_string()),
            from_address: text("from"),
            to_address: text("to"),
            block_number: payload.get("block").and_then(|v| v.as_i64()),
            timestamp: Utc::now(),
            status: text("status").unwrap_or_else(|| "pending".to_string()),
            details: payload.clone(),
        }
    }
}

fn render_primitive(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Point-in-time platform counters. Each field comes from an independent
/// query; there is no consistency guarantee across them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformStats {
    pub total_users: u64,
    pub active_users: u64,
    pub users_with_access: u64,
    pub total_transactions: u64,
    pub total_activities: u64,
    pub recent_activities_24h: u64,
    pub recent_logins_24h: u64,
}

/// Raw store operations behind the availability façade. Wallet addresses
/// arriving here are already normalized; "no matching row" is expressed as
/// `Ok(None)`, not as an error.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    async fn connect(&self) -> Result<(), StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;

    async fn close(&self);

    async fn insert_user(&self, user: &UserRecord) -> Result<UserRecord, StoreError>;

    async fn find_user(&self, wallet_address: &str) -> Result<Option<UserRecord>, StoreError>;

    async fn record_login(
        &self,
        wallet_address: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<UserRecord>, StoreError>;

    /// Users in descending creation order plus the total user count.
    async fn list_users(&self, limit: i64, skip: i64)
        -> Result<(Vec<UserRecord>, u64), StoreError>;

    async fn set_access_level(
        &self,
        wallet_address: &str,
        level: AccessLevel,
        updated_by: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Option<UserRecord>, StoreError>;

    async fn revoke_access(
        &self,
        wallet_address: &str,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Option<UserRecord>, StoreError>;

    async fn insert_activity(&self, activity: &ActivityRecord)
        -> Result<ActivityRecord, StoreError>;

    async fn list_activities(
        &self,
        wallet_address: &str,
        limit: i64,
    ) -> Result<Vec<ActivityRecord>, StoreError>;

    async fn insert_transaction(
        &self,
        transaction: &TransactionRecord,
    ) -> Result<TransactionRecord, StoreError>;

    async fn list_transactions(
        &self,
        wallet_address: &str,
        limit: i64,
    ) -> Result<Vec<TransactionRecord>, StoreError>;

    async fn platform_counts(&self, since: DateTime<Utc>) -> Result<PlatformStats, StoreError>;
}

/// In-memory backend for tests and the demo binary. Cloneable; clones share
/// state. `set_available(false)` makes every call fail the way an
/// unreachable store would.
#[derive(Clone)]
pub struct InMemoryStore {
    inner: Arc<Mutex<InMemoryInner>>,
}

struct InMemoryInner {
    users: HashMap<String, UserRecord>,
    activities: Vec<ActivityRecord>,
    transactions: Vec<TransactionRecord>,
    next_id: u64,
    available: bool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(InMemoryInner {
                users: HashMap::new(),
                activities: Vec::new(),
                transactions: Vec::new(),
                next_id: 0,
                available: true,
            })),
        }
    }

    pub fn unavailable() -> Self {
        let store = Self::new();
        store.set_available(false);
        store
    }

    pub fn set_available(&self, available: bool) {
        self.inner.lock().unwrap().available = available;
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, InMemoryInner>, StoreError> {
        let inner = self.inner.lock().unwrap();
        if !inner.available {
            return Err(StoreError::ConnectionError("store unreachable".to_string()));
        }
        Ok(inner)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryInner {
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        self.next_id.to_string()
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn connect(&self) -> Result<(), StoreError> {
        self.guard().map(|_| ())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.guard().map(|_| ())
    }

    async fn close(&self) {}

    async fn insert_user(&self, user: &UserRecord) -> Result<UserRecord, StoreError> {
        let mut inner = self.guard()?;
        if inner.users.contains_key(&user.wallet_address) {
            return Err(StoreError::WriteError(format!(
                "duplicate wallet address: {}",
                user.wallet_address
            )));
        }
        let mut stored = user.clone();
        stored.id = Some(inner.next_id());
        inner
            .users
            .insert(stored.wallet_address.clone(), stored.clone());
        Ok(stored)
    }

    async fn find_user(&self, wallet_address: &str) -> Result<Option<UserRecord>, StoreError> {
        let inner = self.guard()?;
        Ok(inner.users.get(wallet_address).cloned())
    }

    async fn record_login(
        &self,
        wallet_address: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<UserRecord>, StoreError> {
        let mut inner = self.guard()?;
        Ok(inner.users.get_mut(wallet_address).map(|user| {
            user.last_login = at;
            user.login_count += 1;
            user.platform_access.has_access = true;
            user.platform_access.last_access = Some(at);
            user.clone()
        }))
    }

    async fn list_users(
        &self,
        limit: i64,
        skip: i64,
    ) -> Result<(Vec<UserRecord>, u64), StoreError> {
        let inner = self.guard()?;
        let total = inner.users.len() as u64;
        let mut users: Vec<UserRecord> = inner.users.values().cloned().collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let page = users
            .into_iter()
            .skip(skip.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn set_access_level(
        &self,
        wallet_address: &str,
        level: AccessLevel,
        updated_by: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Option<UserRecord>, StoreError> {
        let mut inner = self.guard()?;
        Ok(inner.users.get_mut(wallet_address).map(|user| {
            user.access_level = level;
            user.platform_access.access_granted_at = at;
            user.platform_access.updated_by = updated_by.map(str::to_string);
            user.clone()
        }))
    }

    async fn revoke_access(
        &self,
        wallet_address: &str,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Option<UserRecord>, StoreError> {
        let mut inner = self.guard()?;
        Ok(inner.users.get_mut(wallet_address).map(|user| {
            user.is_active = false;
            user.platform_access.has_access = false;
            user.platform_access.revoked_at = Some(at);
            user.platform_access.revocation_reason = reason.map(str::to_string);
            user.clone()
        }))
    }

    async fn insert_activity(
        &self,
        activity: &ActivityRecord,
    ) -> Result<ActivityRecord, StoreError> {
        let mut inner = self.guard()?;
        let mut stored = activity.clone();
        stored.id = Some(inner.next_id());
        inner.activities.push(stored.clone());
        Ok(stored)
    }

    async fn list_activities(
        &self,
        wallet_address: &str,
        limit: i64,
    ) -> Result<Vec<ActivityRecord>, StoreError> {
        let inner = self.guard()?;
        let mut matched: Vec<ActivityRecord> = inner
            .activities
            .iter()
            .filter(|a| a.wallet_address == wallet_address)
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        matched.truncate(limit.max(0) as usize);
        Ok(matched)
    }

    async fn insert_transaction(
        &self,
        transaction: &TransactionRecord,
    ) -> Result<TransactionRecord, StoreError> {
        let mut inner = self.guard()?;
        let mut stored = transaction.clone();
        stored.id = Some(inner.next_id());
        inner.transactions.push(stored.clone());
        Ok(stored)
    }

    async fn list_transactions(
        &self,
        wallet_address: &str,
        limit: i64,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let inner = self.guard()?;
        let mut matched: Vec<TransactionRecord> = inner
            .transactions
            .iter()
            .filter(|t| t.wallet_address == wallet_address)
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        matched.truncate(limit.max(0) as usize);
        Ok(matched)
    }

    async fn platform_counts(&self, since: DateTime<Utc>) -> Result<PlatformStats, StoreError> {
        let inner = self.guard()?;
        Ok(PlatformStats {
            total_users: inner.users.len() as u64,
            active_users: inner.users.values().filter(|u| u.is_active).count() as u64,
            users_with_access: inner
                .users
                .values()
                .filter(|u| u.platform_access.has_access)
                .count() as u64,
            total_transactions: inner.transactions.len() as u64,
            total_activities: inner.activities.len() as u64,
            recent_activities_24h: inner
                .activities
                .iter()
                .filter(|a| a.timestamp >= since)
                .count() as u64,
            recent_logins_24h: inner
                .activities
                .iter()
                .filter(|a| a.activity_type == "login" && a.timestamp >= since)
                .count() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_then_find_user_round_trips() {
        let store = InMemoryStore::new();
        let user = UserRecord::first_login("0xabc", ExtensionMap::new());

        let stored = store.insert_user(&user).await.expect("insert should work");
        assert!(stored.id.is_some(), "store should assign an id");

        let found = store
            .find_user("0xabc")
            .await
            .expect("lookup should work")
            .expect("user should exist");
        assert_eq!(found.login_count, 1);
        assert_eq!(found.access_level, AccessLevel::User);
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let store = InMemoryStore::new();
        let user = UserRecord::first_login("0xabc", ExtensionMap::new());
        store
            .insert_user(&user)
            .await
            .expect("first insert should work");

        let err = store
            .insert_user(&user)
            .await
            .expect_err("second insert should fail");
        assert!(err.to_string().contains("Database error"));
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let store = InMemoryStore::unavailable();

        assert!(store.ping().await.is_err());
        assert!(store.find_user("0xabc").await.is_err());
        assert!(store.platform_counts(Utc::now()).await.is_err());
    }

    #[tokio::test]
    async fn activity_listing_is_newest_first_and_bounded() {
        let store = InMemoryStore::new();
        for i in 0..5 {
            let mut activity = ActivityRecord {
                id: None,
                wallet_address: "0xabc".to_string(),
                activity_type: "login".to_string(),
                timestamp: Utc::now() + chrono::Duration::seconds(i),
                details: serde_json::Map::new(),
            };
            activity
                .details
                .insert("step".to_string(), serde_json::json!(i));
            store
                .insert_activity(&activity)
                .await
                .expect("insert should work");
        }

        let listed = store
            .list_activities("0xabc", 3)
            .await
            .expect("listing should work");
        assert_eq!(listed.len(), 3);
        assert!(listed[0].timestamp >= listed[1].timestamp);
        assert!(listed[1].timestamp >= listed[2].timestamp);
    }

    #[test]
    fn extension_map_rejects_nested_values() {
        let flat = serde_json::json!({"source": "landing", "visits": 3, "beta": true});
        let parsed: Result<ExtensionMap, _> = serde_json::from_value(flat);
        assert!(parsed.is_ok(), "primitive values should parse");

        let nested = serde_json::json!({"profile": {"name": "x"}});
        let parsed: Result<ExtensionMap, _> = serde_json::from_value(nested);
        assert!(parsed.is_err(), "nested objects should be rejected");
    }

    #[test]
    fn transaction_payload_extraction_defaults() {
        let payload = serde_json::json!({
            "hash": "0xdeadbeef",
            "amount": 1.25,
            "from": "0xaaa",
            "to": "0xbbb",
            "block": 1234
        });
        let record = TransactionRecord::from_payload("0xabc", &payload);

        assert_eq!(record.transaction_hash.as_deref(), Some("0xdeadbeef"));
        assert_eq!(record.transaction_type, "unknown");
        assert_eq!(record.amount.as_deref(), Some("1.25"));
        assert_eq!(record.token, "BNB");
        assert_eq!(record.status, "pending");
        assert_eq!(record.block_number, Some(1234));
        assert_eq!(record.details, payload);
    }
}

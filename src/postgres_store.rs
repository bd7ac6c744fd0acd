use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls, Row};

use crate::storage::{
    AccessLevel, ActivityRecord, ExtensionMap, PlatformAccess, PlatformStats, StoreBackend,
    StoreError, TransactionRecord, UserRecord,
};
use async_trait::async_trait;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

const USER_COLUMNS: &str = "id, wallet_address, created_at, last_login, login_count, is_active, \
     access_level, has_access, access_granted_at, access_method, last_access, revoked_at, \
     revocation_reason, updated_by, extra";

/// PostgreSQL store backend. One lazily-established client behind a lock,
/// re-created on demand by the façade's reconnect path; no pooling.
pub struct PostgresStore {
    database_url: String,
    client: RwLock<Option<Client>>,
}

impl PostgresStore {
    pub fn new(database_url: &str) -> Self {
        Self {
            database_url: database_url.to_string(),
            client: RwLock::new(None),
        }
    }

    /// Applies the initial schema unless the tables are already present.
    async fn bootstrap_schema(client: &Client) -> Result<(), StoreError> {
        let exists = client
            .query_one(
                "SELECT EXISTS (SELECT FROM information_schema.tables \
                 WHERE table_schema = 'public' AND table_name = 'users')",
                &[],
            )
            .await
            .map_err(|e| {
                StoreError::ConfigurationError(format!("Failed to check schema: {}", e))
            })?;

        let table_exists: bool = exists.get(0);
        if !table_exists {
            tracing::info!("Bootstrapping store schema");
            let schema_sql = include_str!("../migrations/V1__initial_schema.sql");
            client.batch_execute(schema_sql).await.map_err(|e| {
                StoreError::ConfigurationError(format!("Schema bootstrap failed: {}", e))
            })?;
        }
        Ok(())
    }
}

fn row_to_user(row: &Row) -> Result<UserRecord, StoreError> {
    let id: i64 = row.get("id");
    let access_level: String = row.get("access_level");
    let extra_value: serde_json::Value = row.get("extra");
    let extra: ExtensionMap = serde_json::from_value(extra_value)?;
    Ok(UserRecord {
        id: Some(id.to_string()),
        wallet_address: row.get("wallet_address"),
        created_at: row.get("created_at"),
        last_login: row.get("last_login"),
        login_count: row.get("login_count"),
        is_active: row.get("is_active"),
        access_level: AccessLevel::parse(&access_level).unwrap_or(AccessLevel::User),
        platform_access: PlatformAccess {
            has_access: row.get("has_access"),
            access_granted_at: row.get("access_granted_at"),
            access_method: row.get("access_method"),
            last_access: row.get("last_access"),
            revoked_at: row.get("revoked_at"),
            revocation_reason: row.get("revocation_reason"),
            updated_by: row.get("updated_by"),
        },
        extra,
    })
}

fn row_to_activity(row: &Row) -> ActivityRecord {
    let id: i64 = row.get("id");
    let details: serde_json::Value = row.get("details");
    ActivityRecord {
        id: Some(id.to_string()),
        wallet_address: row.get("wallet_address"),
        activity_type: row.get("activity_type"),
        timestamp: row.get("timestamp"),
        details: details.as_object().cloned().unwrap_or_default(),
    }
}

fn row_to_transaction(row: &Row) -> TransactionRecord {
    let id: i64 = row.get("id");
    TransactionRecord {
        id: Some(id.to_string()),
        wallet_address: row.get("wallet_address"),
        transaction_hash: row.get("transaction_hash"),
        transaction_type: row.get("transaction_type"),
        amount: row.get("amount"),
        token: row.get("token"),
        from_address: row.get("from_address"),
        to_address: row.get("to_address"),
        block_number: row.get("block_number"),
        timestamp: row.get("timestamp"),
        status: row.get("status"),
        details: row.get("details"),
    }
}

async fn count(
    client: &Client,
    sql: &str,
    params: &[&(dyn ToSql + Sync)],
) -> Result<u64, StoreError> {
    let row = client
        .query_one(sql, params)
        .await
        .map_err(|e| StoreError::ReadError(format!("Count query failed: {}", e)))?;
    let n: i64 = row.get(0);
    Ok(n as u64)
}

#[async_trait]
impl StoreBackend for PostgresStore {
    async fn connect(&self) -> Result<(), StoreError> {
        let mut config = self
            .database_url
            .parse::<tokio_postgres::Config>()
            .map_err(|e| StoreError::ConfigurationError(format!("Invalid database URL: {}", e)))?;
        config.connect_timeout(CONNECT_TIMEOUT);

        let (client, connection) = config
            .connect(NoTls)
            .await
            .map_err(|e| StoreError::ConnectionError(format!("Failed to connect: {}", e)))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!("Store connection task ended: {}", e);
            }
        });

        Self::bootstrap_schema(&client).await?;

        *self.client.write().await = Some(client);
        tracing::info!("PostgreSQL store connected");
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let guard = self.client.read().await;
        let client = guard.as_ref().ok_or(StoreError::Unavailable)?;
        if client.is_closed() {
            return Err(StoreError::ConnectionError(
                "connection closed".to_string(),
            ));
        }
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| StoreError::ConnectionError(format!("Liveness probe failed: {}", e)))?;
        Ok(())
    }

    async fn close(&self) {
        if self.client.write().await.take().is_some() {
            tracing::info!("PostgreSQL store connection released");
        }
    }

    async fn insert_user(&self, user: &UserRecord) -> Result<UserRecord, StoreError> {
        let guard = self.client.read().await;
        let client = guard.as_ref().ok_or(StoreError::Unavailable)?;
        let extra = serde_json::to_value(&user.extra)?;
        let access_level = user.access_level.as_str();
        let sql = format!(
            "INSERT INTO users (wallet_address, created_at, last_login, login_count, \
             is_active, access_level, has_access, access_granted_at, access_method, \
             last_access, revoked_at, revocation_reason, updated_by, extra) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             RETURNING {}",
            USER_COLUMNS
        );
        let row = client
            .query_one(
                sql.as_str(),
                &[
                    &user.wallet_address,
                    &user.created_at,
                    &user.last_login,
                    &user.login_count,
                    &user.is_active,
                    &access_level,
                    &user.platform_access.has_access,
                    &user.platform_access.access_granted_at,
                    &user.platform_access.access_method,
                    &user.platform_access.last_access,
                    &user.platform_access.revoked_at,
                    &user.platform_access.revocation_reason,
                    &user.platform_access.updated_by,
                    &extra,
                ],
            )
            .await
            .map_err(|e| StoreError::WriteError(format!("Failed to insert user: {}", e)))?;
        row_to_user(&row)
    }

    async fn find_user(&self, wallet_address: &str) -> Result<Option<UserRecord>, StoreError> {
        let guard = self.client.read().await;
        let client = guard.as_ref().ok_or(StoreError::Unavailable)?;
        let sql = format!("SELECT {} FROM users WHERE wallet_address = $1", USER_COLUMNS);
        let row = client
            .query_opt(sql.as_str(), &[&wallet_address])
            .await
            .map_err(|e| StoreError::ReadError(format!("Failed to load user: {}", e)))?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn record_login(
        &self,
        wallet_address: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<UserRecord>, StoreError> {
        let guard = self.client.read().await;
        let client = guard.as_ref().ok_or(StoreError::Unavailable)?;
        let sql = format!(
            "UPDATE users SET last_login = $2, login_count = login_count + 1, \
             has_access = TRUE, last_access = $2 \
             WHERE wallet_address = $1 RETURNING {}",
            USER_COLUMNS
        );
        let row = client
            .query_opt(sql.as_str(), &[&wallet_address, &at])
            .await
            .map_err(|e| StoreError::WriteError(format!("Failed to record login: {}", e)))?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn list_users(
        &self,
        limit: i64,
        skip: i64,
    ) -> Result<(Vec<UserRecord>, u64), StoreError> {
        let guard = self.client.read().await;
        let client = guard.as_ref().ok_or(StoreError::Unavailable)?;
        let sql = format!(
            "SELECT {} FROM users ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2",
            USER_COLUMNS
        );
        let rows = client
            .query(sql.as_str(), &[&limit, &skip])
            .await
            .map_err(|e| StoreError::ReadError(format!("Failed to list users: {}", e)))?;
        let users = rows
            .iter()
            .map(row_to_user)
            .collect::<Result<Vec<_>, _>>()?;
        let total = count(client, "SELECT COUNT(*) FROM users", &[]).await?;
        Ok((users, total))
    }

    async fn set_access_level(
        &self,
        wallet_address: &str,
        level: AccessLevel,
        updated_by: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Option<UserRecord>, StoreError> {
        let guard = self.client.read().await;
        let client = guard.as_ref().ok_or(StoreError::Unavailable)?;
        let level = level.as_str();
        let sql = format!(
            "UPDATE users SET access_level = $2, access_granted_at = $3, \
             updated_by = $4 WHERE wallet_address = $1 RETURNING {}",
            USER_COLUMNS
        );
        let row = client
            .query_opt(sql.as_str(), &[&wallet_address, &level, &at, &updated_by])
            .await
            .map_err(|e| StoreError::WriteError(format!("Failed to update access level: {}", e)))?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn revoke_access(
        &self,
        wallet_address: &str,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Option<UserRecord>, StoreError> {
        let guard = self.client.read().await;
        let client = guard.as_ref().ok_or(StoreError::Unavailable)?;
        let sql = format!(
            "UPDATE users SET has_access = FALSE, revoked_at = $2, \
             revocation_reason = $3, is_active = FALSE \
             WHERE wallet_address = $1 RETURNING {}",
            USER_COLUMNS
        );
        let row = client
            .query_opt(sql.as_str(), &[&wallet_address, &at, &reason])
            .await
            .map_err(|e| StoreError::WriteError(format!("Failed to revoke access: {}", e)))?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn insert_activity(
        &self,
        activity: &ActivityRecord,
    ) -> Result<ActivityRecord, StoreError> {
        let guard = self.client.read().await;
        let client = guard.as_ref().ok_or(StoreError::Unavailable)?;
        let details = serde_json::Value::Object(activity.details.clone());
        let row = client
            .query_one(
                "INSERT INTO activities (wallet_address, activity_type, timestamp, details) \
                 VALUES ($1, $2, $3, $4) \
                 RETURNING id, wallet_address, activity_type, timestamp, details",
                &[
                    &activity.wallet_address,
                    &activity.activity_type,
                    &activity.timestamp,
                    &details,
                ],
            )
            .await
            .map_err(|e| StoreError::WriteError(format!("Failed to log activity: {}", e)))?;
        Ok(row_to_activity(&row))
    }

    async fn list_activities(
        &self,
        wallet_address: &str,
        limit: i64,
    ) -> Result<Vec<ActivityRecord>, StoreError> {
        let guard = self.client.read().await;
        let client = guard.as_ref().ok_or(StoreError::Unavailable)?;
        let rows = client
            .query(
                "SELECT id, wallet_address, activity_type, timestamp, details FROM activities \
                 WHERE wallet_address = $1 ORDER BY timestamp DESC, id DESC LIMIT $2",
                &[&wallet_address, &limit],
            )
            .await
            .map_err(|e| StoreError::ReadError(format!("Failed to list activities: {}", e)))?;
        Ok(rows.iter().map(row_to_activity).collect())
    }

    async fn insert_transaction(
        &self,
        transaction: &TransactionRecord,
    ) -> Result<TransactionRecord, StoreError> {
        let guard = self.client.read().await;
        let client = guard.as_ref().ok_or(StoreError::Unavailable)?;
        let row = client
            .query_one(
                "INSERT INTO transactions (wallet_address, transaction_hash, transaction_type, \
                 amount, token, from_address, to_address, block_number, timestamp, status, \
                 details) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
                 RETURNING id, wallet_address, transaction_hash, transaction_type, amount, \
                 token, from_address, to_address, block_number, timestamp, status, details",
                &[
                    &transaction.wallet_address,
                    &transaction.transaction_hash,
                    &transaction.transaction_type,
                    &transaction.amount,
                    &transaction.token,
                    &transaction.from_address,
                    &transaction.to_address,
                    &transaction.block_number,
                    &transaction.timestamp,
                    &transaction.status,
                    &transaction.details,
                ],
            )
            .await
            .map_err(|e| StoreError::WriteError(format!("Failed to log transaction: {}", e)))?;
        Ok(row_to_transaction(&row))
    }

    async fn list_transactions(
        &self,
        wallet_address: &str,
        limit: i64,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let guard = self.client.read().await;
        let client = guard.as_ref().ok_or(StoreError::Unavailable)?;
        let rows = client
            .query(
                "SELECT id, wallet_address, transaction_hash, transaction_type, amount, token, \
                 from_address, to_address, block_number, timestamp, status, details \
                 FROM transactions WHERE wallet_address = $1 \
                 ORDER BY timestamp DESC, id DESC LIMIT $2",
                &[&wallet_address, &limit],
            )
            .await
            .map_err(|e| StoreError::ReadError(format!("Failed to list transactions: {}", e)))?;
        Ok(rows.iter().map(row_to_transaction).collect())
    }

    async fn platform_counts(&self, since: DateTime<Utc>) -> Result<PlatformStats, StoreError> {
        let guard = self.client.read().await;
        let client = guard.as_ref().ok_or(StoreError::Unavailable)?;
        Ok(PlatformStats {
            total_users: count(client, "SELECT COUNT(*) FROM users", &[]).await?,
            active_users: count(client, "SELECT COUNT(*) FROM users WHERE is_active", &[]).await?,
            users_with_access: count(client, "SELECT COUNT(*) FROM users WHERE has_access", &[])
                .await?,
            total_transactions: count(client, "SELECT COUNT(*) FROM transactions", &[]).await?,
            total_activities: count(client, "SELECT COUNT(*) FROM activities", &[]).await?,
            recent_activities_24h: count(
                client,
                "SELECT COUNT(*) FROM activities WHERE timestamp >= $1",
                &[&since],
            )
            .await?,
            recent_logins_24h: count(
                client,
                "SELECT COUNT(*) FROM activities WHERE activity_type = 'login' \
                 AND timestamp >= $1",
                &[&since],
            )
            .await?,
        })
    }
}

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::{sync::RwLock, task::JoinHandle};
use tracing::{debug, warn};

/// Separator between key segments once a key is flattened to a string.
const SEPARATOR: char = '\x1f';

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Key-value store the issuer keeps its protocol state in.
///
/// Keys are lists of segments. An entry with an `expiry` in the past is
/// treated as absent.
#[async_trait]
pub trait KvStorage: Send + Sync {
    async fn get(&self, key: &[&str]) -> Result<Option<Value>, StorageError>;
    async fn set(
        &self,
        key: &[&str],
        value: Value,
        expiry: Option<OffsetDateTime>,
    ) -> Result<(), StorageError>;
    async fn remove(&self, key: &[&str]) -> Result<(), StorageError>;
    async fn scan(&self, prefix: &[&str]) -> Result<Vec<(Vec<String>, Value)>, StorageError>;
    /// Drop every expired entry; returns how many went.
    async fn purge_expired(&self) -> Result<u64, StorageError>;
}

/// Purge expired entries every `every` until the runtime shuts down.
pub fn spawn_sweeper(storage: Arc<dyn KvStorage>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match storage.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => debug!(purged, "expired storage entries removed"),
                Err(e) => warn!(error = %e, "storage sweep failed"),
            }
        }
    })
}

fn join_key(key: &[&str]) -> String {
    let mut out = String::new();
    for (i, segment) in key.iter().enumerate() {
        if i > 0 {
            out.push(SEPARATOR);
        }
        out.push_str(segment);
    }
    out
}

fn scan_prefix(prefix: &[&str]) -> String {
    if prefix.is_empty() {
        return String::new();
    }
    let mut joined = join_key(prefix);
    joined.push(SEPARATOR);
    joined
}

fn split_key(joined: &str) -> Vec<String> {
    joined.split(SEPARATOR).map(str::to_string).collect()
}

fn is_live(expiry: Option<OffsetDateTime>, now: OffsetDateTime) -> bool {
    expiry.map_or(true, |at| at > now)
}

/// Issuer storage in the `kv_store` table, scoped to one namespace.
#[derive(Clone)]
pub struct PgKvStorage {
    db: PgPool,
    namespace: String,
}

impl PgKvStorage {
    pub fn new(db: PgPool, namespace: impl Into<String>) -> Self {
        Self {
            db,
            namespace: namespace.into(),
        }
    }
}

#[async_trait]
impl KvStorage for PgKvStorage {
    async fn get(&self, key: &[&str]) -> Result<Option<Value>, StorageError> {
        let value = sqlx::query_scalar::<_, Value>(
            r#"
            SELECT value
              FROM kv_store
             WHERE namespace = $1 AND key = $2
               AND (expires_at IS NULL OR expires_at > now())
            "#,
        )
        .bind(&self.namespace)
        .bind(join_key(key))
        .fetch_optional(&self.db)
        .await?;
        Ok(value)
    }

    async fn set(
        &self,
        key: &[&str],
        value: Value,
        expiry: Option<OffsetDateTime>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO kv_store (namespace, key, value, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (namespace, key)
            DO UPDATE SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(&self.namespace)
        .bind(join_key(key))
        .bind(value)
        .bind(expiry)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn remove(&self, key: &[&str]) -> Result<(), StorageError> {
        sqlx::query(r#"DELETE FROM kv_store WHERE namespace = $1 AND key = $2"#)
            .bind(&self.namespace)
            .bind(join_key(key))
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn scan(&self, prefix: &[&str]) -> Result<Vec<(Vec<String>, Value)>, StorageError> {
        let rows = sqlx::query_as::<_, (String, Value)>(
            r#"
            SELECT key, value
              FROM kv_store
             WHERE namespace = $1
               AND left(key, length($2)) = $2
               AND (expires_at IS NULL OR expires_at > now())
             ORDER BY key
            "#,
        )
        .bind(&self.namespace)
        .bind(scan_prefix(prefix))
        .fetch_all(&self.db)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(key, value)| (split_key(&key), value))
            .collect())
    }

    async fn purge_expired(&self) -> Result<u64, StorageError> {
        let done = sqlx::query(
            r#"DELETE FROM kv_store WHERE namespace = $1 AND expires_at <= now()"#,
        )
        .bind(&self.namespace)
        .execute(&self.db)
        .await?;
        Ok(done.rows_affected())
    }
}

/// In-process issuer storage. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryKvStorage {
    entries: RwLock<BTreeMap<String, (Value, Option<OffsetDateTime>)>>,
}

impl MemoryKvStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStorage for MemoryKvStorage {
    async fn get(&self, key: &[&str]) -> Result<Option<Value>, StorageError> {
        let now = OffsetDateTime::now_utc();
        let entries = self.entries.read().await;
        Ok(entries
            .get(&join_key(key))
            .filter(|(_, expiry)| is_live(*expiry, now))
            .map(|(value, _)| value.clone()))
    }

    async fn set(
        &self,
        key: &[&str],
        value: Value,
        expiry: Option<OffsetDateTime>,
    ) -> Result<(), StorageError> {
        self.entries
            .write()
            .await
            .insert(join_key(key), (value, expiry));
        Ok(())
    }

    async fn remove(&self, key: &[&str]) -> Result<(), StorageError> {
        self.entries.write().await.remove(&join_key(key));
        Ok(())
    }

    async fn scan(&self, prefix: &[&str]) -> Result<Vec<(Vec<String>, Value)>, StorageError> {
        let now = OffsetDateTime::now_utc();
        let prefix = scan_prefix(prefix);
        let entries = self.entries.read().await;
        Ok(entries
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter(|(_, (_, expiry))| is_live(*expiry, now))
            .map(|(key, (value, _))| (split_key(key), value.clone()))
            .collect())
    }

    async fn purge_expired(&self) -> Result<u64, StorageError> {
        let now = OffsetDateTime::now_utc();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, (_, expiry)| is_live(*expiry, now));
        Ok((before - entries.len()) as u64)
    }
}

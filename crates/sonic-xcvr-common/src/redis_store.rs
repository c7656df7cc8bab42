//! Redis-backed key/value store.
//!
//! One [`RedisStore`] per (namespace, database). Writes go through a
//! connection manager that reconnects on its own; a failed write surfaces as
//! a [`XcvrError::Database`] and the caller retries on its next cycle.
//!
//! Subscriptions follow Redis keyspace notifications for `TABLE<sep>*` and
//! re-read the hash on every event, the way SWSS subscriber tables deliver
//! the full row.

use crate::config::{DatabaseConfig, NamespaceConfig};
use crate::db::{DbConnections, DbId, FieldValue, KeyOpFieldsValues, KvStore, Subscription};
use crate::error::{Result, XcvrError};
use crate::port_mapping::AsicId;
use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

/// Redis connection for one database of one namespace.
#[derive(Clone)]
pub struct RedisStore {
    db: DbId,
    namespace: u32,
    client: Client,
    connection: ConnectionManager,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("db", &self.db)
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl RedisStore {
    /// Connects to `db` on the namespace's Redis instance.
    #[instrument(skip(ns), fields(namespace = ns.id))]
    pub async fn connect(ns: &NamespaceConfig, db: DbId, timeout: Duration) -> Result<Self> {
        let url = format!("redis://{}:{}/{}", ns.redis_host, ns.redis_port, db.id());
        let client = Client::open(url.as_str())
            .map_err(|e| XcvrError::database("open", format!("{}: {}", url, e)))?;

        let connection = tokio::time::timeout(timeout, client.get_connection_manager())
            .await
            .map_err(|_| XcvrError::database("connect", format!("{}: timed out", url)))?
            .map_err(|e| XcvrError::database("connect", format!("{}: {}", url, e)))?;

        info!(db = %db, host = %ns.redis_host, port = ns.redis_port, "Connected to Redis");

        Ok(Self {
            db,
            namespace: ns.id,
            client,
            connection,
        })
    }

    fn table_prefix(&self, table: &str) -> String {
        format!("{}{}", table, self.db.separator())
    }
}

/// Connects STATE_DB, CONFIG_DB and APPL_DB of one namespace.
pub async fn connect_namespace(ns: &NamespaceConfig, timeout: Duration) -> Result<DbConnections> {
    let state = RedisStore::connect(ns, DbId::StateDb, timeout).await?;
    let config = RedisStore::connect(ns, DbId::ConfigDb, timeout).await?;
    let appl = RedisStore::connect(ns, DbId::ApplDb, timeout).await?;

    Ok(DbConnections {
        state: Arc::new(state),
        config: Arc::new(config),
        appl: Arc::new(appl),
    })
}

/// Connects every configured namespace.
pub async fn connect_all(config: &DatabaseConfig) -> Result<Vec<(AsicId, DbConnections)>> {
    let timeout = Duration::from_secs(config.connection_timeout_secs);
    let mut connections = Vec::with_capacity(config.namespaces.len());
    for ns in &config.namespaces {
        connections.push((AsicId(ns.id), connect_namespace(ns, timeout).await?));
    }
    Ok(connections)
}

#[async_trait]
impl KvStore for RedisStore {
    fn db(&self) -> DbId {
        self.db
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut conn = self.connection.clone();
        conn.hgetall(key)
            .await
            .map_err(|e| XcvrError::database("hgetall", e.to_string()))
    }

    async fn hset(&self, key: &str, fields: &[FieldValue]) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection.clone();
        let _: () = conn
            .hset_multiple(key, fields)
            .await
            .map_err(|e| XcvrError::database("hset", e.to_string()))?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: () = conn
            .del(key)
            .await
            .map_err(|e| XcvrError::database("del", e.to_string()))?;
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.connection.clone();
        conn.keys(pattern)
            .await
            .map_err(|e| XcvrError::database("keys", e.to_string()))
    }

    async fn subscribe(&self, table: &str) -> Result<Subscription> {
        let mut conn = self.connection.clone();
        let enabled: redis::RedisResult<()> = redis::cmd("CONFIG")
            .arg("SET")
            .arg("notify-keyspace-events")
            .arg("KA")
            .query_async(&mut conn)
            .await;
        if let Err(e) = enabled {
            warn!(error = %e, "Could not enable keyspace notifications, relying on server config");
        }

        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| XcvrError::database("pubsub", e.to_string()))?;

        let channel_prefix = format!("__keyspace@{}__:", self.db.id());
        let row_prefix = self.table_prefix(table);
        let pattern = format!("{}{}*", channel_prefix, row_prefix);
        pubsub
            .psubscribe(&pattern)
            .await
            .map_err(|e| XcvrError::database("psubscribe", e.to_string()))?;

        debug!(pattern = %pattern, "Subscribed to table");

        let (tx, rx) = mpsc::unbounded_channel();
        let store = self.clone();
        tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();
            while let Some(msg) = messages.next().await {
                let Some(redis_key) = msg.get_channel_name().strip_prefix(&channel_prefix) else {
                    continue;
                };
                let Some(row_key) = redis_key.strip_prefix(&row_prefix) else {
                    continue;
                };
                let event: String = match msg.get_payload() {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(error = %e, "Malformed keyspace notification");
                        continue;
                    }
                };

                let entry = match event.as_str() {
                    "del" | "expired" | "evicted" => KeyOpFieldsValues::del(row_key),
                    "hset" | "hmset" | "hdel" => match store.hgetall(redis_key).await {
                        Ok(row) if row.is_empty() => KeyOpFieldsValues::del(row_key),
                        Ok(row) => KeyOpFieldsValues::set(row_key, row.into_iter().collect()),
                        Err(e) => {
                            warn!(key = %redis_key, error = %e, "Failed to read changed row");
                            continue;
                        }
                    },
                    _ => continue,
                };

                if tx.send(entry).is_err() {
                    break;
                }
            }
            debug!(key_prefix = %row_prefix, "Subscription closed");
        });

        Ok(Subscription::new(rx))
    }
}

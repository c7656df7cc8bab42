//! Key/value store abstraction for the SWSS databases.
//!
//! The daemons only need a handful of hash operations on the SONiC Redis
//! databases. [`KvStore`] captures them so loops can run against Redis in
//! production ([`crate::redis_store::RedisStore`]) and against an in-process
//! map in tests ([`crate::memory_store::MemoryStore`]).
//!
//! A [`Table`] binds a store to one table name and knows the database's key
//! separator, so callers address rows by their bare key (`Ethernet0`).

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// SONiC databases used by the transceiver daemons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DbId {
    /// Application database (APPL_DB) - mux requests from linkmgrd.
    ApplDb,
    /// Configuration database (CONFIG_DB) - port and logger configuration.
    ConfigDb,
    /// State database (STATE_DB) - everything the daemons publish.
    StateDb,
}

impl DbId {
    /// Returns the database name as used in Redis/SONiC.
    pub fn name(&self) -> &'static str {
        match self {
            DbId::ApplDb => "APPL_DB",
            DbId::ConfigDb => "CONFIG_DB",
            DbId::StateDb => "STATE_DB",
        }
    }

    /// Returns the database ID number.
    pub fn id(&self) -> u8 {
        match self {
            DbId::ApplDb => 0,
            DbId::ConfigDb => 4,
            DbId::StateDb => 6,
        }
    }

    /// Returns the table/key separator for this database.
    pub fn separator(&self) -> char {
        match self {
            DbId::ApplDb => ':',
            DbId::ConfigDb | DbId::StateDb => '|',
        }
    }
}

impl fmt::Display for DbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Operation type of a table change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Set operation (add or update)
    Set,
    /// Delete operation
    Del,
}

/// A field-value pair from a Redis hash entry.
pub type FieldValue = (String, String);

/// Key, operation, and field-values tuple delivered by a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyOpFieldsValues {
    /// The key without the table prefix (e.g., "Ethernet0")
    pub key: String,
    /// The operation (Set or Del)
    pub op: Operation,
    /// Field-value pairs (empty for Del operations)
    pub fvs: Vec<FieldValue>,
}

impl KeyOpFieldsValues {
    /// Creates a Set entry.
    pub fn set(key: impl Into<String>, fvs: Vec<FieldValue>) -> Self {
        Self {
            key: key.into(),
            op: Operation::Set,
            fvs,
        }
    }

    /// Creates a Del entry.
    pub fn del(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            op: Operation::Del,
            fvs: vec![],
        }
    }

    /// Returns the value for a field, if present.
    pub fn get_field(&self, field: &str) -> Option<&str> {
        self.fvs
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, v)| v.as_str())
    }
}

/// Stream of changes for one table.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<KeyOpFieldsValues>,
}

impl Subscription {
    /// Wraps a receiver fed by a store implementation.
    pub fn new(rx: mpsc::UnboundedReceiver<KeyOpFieldsValues>) -> Self {
        Self { rx }
    }

    /// Waits for the next change. Returns `None` once the store side is gone.
    pub async fn recv(&mut self) -> Option<KeyOpFieldsValues> {
        self.rx.recv().await
    }
}

/// Hash operations on one database of one ASIC namespace.
///
/// Keys passed here are full Redis keys (`TABLE|key`).
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Database this store is bound to.
    fn db(&self) -> DbId;

    /// Reads every field of a hash. Missing keys yield an empty map.
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>>;

    /// Writes all fields of a hash in one batch.
    async fn hset(&self, key: &str, fields: &[FieldValue]) -> Result<()>;

    /// Deletes a key.
    async fn del(&self, key: &str) -> Result<()>;

    /// Lists keys matching a glob pattern.
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Follows changes to every key of `table`.
    async fn subscribe(&self, table: &str) -> Result<Subscription>;
}

/// Handle to one table of one database.
#[derive(Clone)]
pub struct Table {
    store: Arc<dyn KvStore>,
    name: String,
    separator: char,
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("db", &self.store.db())
            .field("name", &self.name)
            .finish()
    }
}

impl Table {
    /// Binds `name` on `store`.
    pub fn new(store: Arc<dyn KvStore>, name: impl Into<String>) -> Self {
        let separator = store.db().separator();
        Self {
            store,
            name: name.into(),
            separator,
        }
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full Redis key of a row.
    pub fn redis_key(&self, key: &str) -> String {
        format!("{}{}{}", self.name, self.separator, key)
    }

    /// Reads a row. `None` when the row does not exist.
    pub async fn get(&self, key: &str) -> Result<Option<HashMap<String, String>>> {
        let fields = self.store.hgetall(&self.redis_key(key)).await?;
        Ok(if fields.is_empty() { None } else { Some(fields) })
    }

    /// Reads a single field of a row.
    pub async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        Ok(self.get(key).await?.and_then(|mut row| row.remove(field)))
    }

    /// Writes a row in one batch.
    pub async fn set(&self, key: &str, fields: &[FieldValue]) -> Result<()> {
        self.store.hset(&self.redis_key(key), fields).await
    }

    /// Deletes a row.
    pub async fn del(&self, key: &str) -> Result<()> {
        self.store.del(&self.redis_key(key)).await
    }

    /// Lists row keys (without the table prefix).
    pub async fn get_keys(&self) -> Result<Vec<String>> {
        let prefix = format!("{}{}", self.name, self.separator);
        let keys = self.store.keys(&format!("{}*", prefix)).await?;
        Ok(keys
            .into_iter()
            .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }

    /// Follows changes on this table.
    pub async fn subscribe(&self) -> Result<Subscription> {
        self.store.subscribe(&self.name).await
    }
}

/// The three databases of one ASIC namespace.
#[derive(Clone)]
pub struct DbConnections {
    /// STATE_DB
    pub state: Arc<dyn KvStore>,
    /// CONFIG_DB
    pub config: Arc<dyn KvStore>,
    /// APPL_DB
    pub appl: Arc<dyn KvStore>,
}

impl DbConnections {
    /// Store for the given database.
    pub fn store(&self, db: DbId) -> &Arc<dyn KvStore> {
        match db {
            DbId::StateDb => &self.state,
            DbId::ConfigDb => &self.config,
            DbId::ApplDb => &self.appl,
        }
    }
}

/// Builds a field-value list from key-value pairs.
#[macro_export]
macro_rules! field_values {
    ($($field:expr => $value:expr),* $(,)?) => {
        vec![
            $(($field.to_string(), $value.to_string()),)*
        ]
    };
}

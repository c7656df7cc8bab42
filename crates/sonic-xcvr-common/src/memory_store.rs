//! In-process key/value store.
//!
//! Behaves like one SWSS database: hashes keyed by `TABLE<sep>key`, change
//! delivery to subscribers after every write. It also keeps a journal of every
//! write so tests can assert on write counts, not only on final state.

use crate::db::{DbConnections, DbId, FieldValue, KeyOpFieldsValues, KvStore, Operation, Subscription};
use crate::error::{Result, XcvrError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// One write observed by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    /// Full Redis key
    pub key: String,
    /// Set or Del
    pub op: Operation,
    /// Fields written (empty for Del)
    pub fvs: Vec<FieldValue>,
}

struct Subscriber {
    table: String,
    prefix: String,
    tx: mpsc::UnboundedSender<KeyOpFieldsValues>,
}

/// In-memory database for one namespace.
pub struct MemoryStore {
    db: DbId,
    data: Mutex<BTreeMap<String, BTreeMap<String, String>>>,
    journal: Mutex<Vec<JournalEntry>>,
    subscribers: Mutex<Vec<Subscriber>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    /// Creates an empty store for `db`.
    pub fn new(db: DbId) -> Self {
        Self {
            db,
            data: Mutex::new(BTreeMap::new()),
            journal: Mutex::new(Vec::new()),
            subscribers: Mutex::new(Vec::new()),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Creates an empty store behind an `Arc`.
    pub fn shared(db: DbId) -> Arc<Self> {
        Arc::new(Self::new(db))
    }

    /// Makes every subsequent write fail, as a disconnected server would.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// Current content of a key, without going through the async API.
    pub fn snapshot(&self, key: &str) -> Option<BTreeMap<String, String>> {
        self.data.lock().get(key).cloned()
    }

    /// Every write since creation (or the last [`MemoryStore::clear_journal`]).
    pub fn journal(&self) -> Vec<JournalEntry> {
        self.journal.lock().clone()
    }

    /// Number of Set writes to `key`.
    pub fn set_count(&self, key: &str) -> usize {
        self.journal
            .lock()
            .iter()
            .filter(|e| e.key == key && e.op == Operation::Set)
            .count()
    }

    /// Number of Set writes to any key starting with `prefix`.
    pub fn set_count_prefix(&self, prefix: &str) -> usize {
        self.journal
            .lock()
            .iter()
            .filter(|e| e.key.starts_with(prefix) && e.op == Operation::Set)
            .count()
    }

    /// Forgets the journal.
    pub fn clear_journal(&self) {
        self.journal.lock().clear();
    }

    fn check_writable(&self, operation: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(XcvrError::database(operation, "store unavailable"));
        }
        Ok(())
    }

    fn notify(&self, key: &str, op: Operation) {
        let row: Vec<FieldValue> = match op {
            Operation::Set => self
                .data
                .lock()
                .get(key)
                .map(|fields| fields.iter().map(|(f, v)| (f.clone(), v.clone())).collect())
                .unwrap_or_default(),
            Operation::Del => vec![],
        };

        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|sub| {
            let Some(row_key) = key.strip_prefix(&sub.prefix) else {
                return true;
            };
            let entry = match op {
                Operation::Set => KeyOpFieldsValues::set(row_key, row.clone()),
                Operation::Del => KeyOpFieldsValues::del(row_key),
            };
            sub.tx.send(entry).is_ok()
        });
    }
}

fn glob_match(pattern: &str, key: &str) -> bool {
    match pattern.find('*') {
        None => pattern == key,
        Some(pos) => {
            let (prefix, rest) = pattern.split_at(pos);
            let suffix = &rest[1..];
            if !key.starts_with(prefix) {
                return false;
            }
            let remainder = &key[prefix.len()..];
            if suffix.is_empty() {
                return true;
            }
            (0..=remainder.len())
                .filter(|i| remainder.is_char_boundary(*i))
                .any(|i| glob_match(suffix, &remainder[i..]))
        }
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    fn db(&self) -> DbId {
        self.db
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        Ok(self
            .data
            .lock()
            .get(key)
            .map(|fields| fields.iter().map(|(f, v)| (f.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn hset(&self, key: &str, fields: &[FieldValue]) -> Result<()> {
        self.check_writable("hset")?;
        {
            let mut data = self.data.lock();
            let entry = data.entry(key.to_string()).or_default();
            for (field, value) in fields {
                entry.insert(field.clone(), value.clone());
            }
        }
        self.journal.lock().push(JournalEntry {
            key: key.to_string(),
            op: Operation::Set,
            fvs: fields.to_vec(),
        });
        self.notify(key, Operation::Set);
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.check_writable("del")?;
        let existed = self.data.lock().remove(key).is_some();
        self.journal.lock().push(JournalEntry {
            key: key.to_string(),
            op: Operation::Del,
            fvs: vec![],
        });
        if existed {
            self.notify(key, Operation::Del);
        }
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        Ok(self
            .data
            .lock()
            .keys()
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect())
    }

    async fn subscribe(&self, table: &str) -> Result<Subscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(Subscriber {
            table: table.to_string(),
            prefix: format!("{}{}", table, self.db.separator()),
            tx,
        });
        Ok(Subscription::new(rx))
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let subscribed: Vec<String> = self
            .subscribers
            .lock()
            .iter()
            .map(|s| s.table.clone())
            .collect();
        f.debug_struct("MemoryStore")
            .field("db", &self.db)
            .field("keys", &self.data.lock().len())
            .field("subscribed", &subscribed)
            .finish()
    }
}

/// In-memory STATE_DB, CONFIG_DB and APPL_DB of one namespace.
#[derive(Debug, Clone)]
pub struct MemoryNamespace {
    pub state: Arc<MemoryStore>,
    pub config: Arc<MemoryStore>,
    pub appl: Arc<MemoryStore>,
}

impl MemoryNamespace {
    pub fn new() -> Self {
        Self {
            state: MemoryStore::shared(DbId::StateDb),
            config: MemoryStore::shared(DbId::ConfigDb),
            appl: MemoryStore::shared(DbId::ApplDb),
        }
    }

    /// The same stores as trait objects.
    pub fn connections(&self) -> DbConnections {
        DbConnections {
            state: self.state.clone(),
            config: self.config.clone(),
            appl: self.appl.clone(),
        }
    }
}

impl Default for MemoryNamespace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_values;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("*", "anything"));
        assert!(glob_match("PORT|*", "PORT|Ethernet0"));
        assert!(!glob_match("PORT|*", "PORT_TABLE:Ethernet0"));
        assert!(glob_match("PORT|Ethernet0", "PORT|Ethernet0"));
        assert!(glob_match("*|Ethernet0", "TRANSCEIVER_INFO|Ethernet0"));
        assert!(!glob_match("*|Ethernet0", "TRANSCEIVER_INFO|Ethernet4"));
    }

    #[tokio::test]
    async fn test_hset_merges_fields() {
        let store = MemoryStore::new(DbId::StateDb);
        store.hset("K|a", &field_values! { "f1" => "1" }).await.unwrap();
        store.hset("K|a", &field_values! { "f2" => "2" }).await.unwrap();

        let row = store.hgetall("K|a").await.unwrap();
        assert_eq!(row.len(), 2);
        assert_eq!(store.set_count("K|a"), 2);
    }

    #[tokio::test]
    async fn test_fail_writes() {
        let store = MemoryStore::new(DbId::StateDb);
        store.set_fail_writes(true);
        assert!(store.hset("K|a", &field_values! { "f" => "v" }).await.is_err());
        assert!(store.journal().is_empty());
        store.set_fail_writes(false);
        assert!(store.hset("K|a", &field_values! { "f" => "v" }).await.is_ok());
    }

    #[tokio::test]
    async fn test_subscription_delivers_set_and_del() {
        let store = MemoryStore::new(DbId::ApplDb);
        let mut sub = store.subscribe("HW_MUX_CABLE_TABLE").await.unwrap();

        store
            .hset("HW_MUX_CABLE_TABLE:Ethernet0", &field_values! { "state" => "active" })
            .await
            .unwrap();
        store
            .hset("OTHER_TABLE:Ethernet0", &field_values! { "x" => "y" })
            .await
            .unwrap();
        store.del("HW_MUX_CABLE_TABLE:Ethernet0").await.unwrap();

        let set = sub.recv().await.unwrap();
        assert_eq!(set.key, "Ethernet0");
        assert_eq!(set.get_field("state"), Some("active"));
        assert_eq!(sub.recv().await.unwrap().op, Operation::Del);
    }
}

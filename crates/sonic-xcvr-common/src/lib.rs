//! Shared infrastructure for the SONiC transceiver daemons.
//!
//! - [`port_mapping`]: logical ↔ physical ↔ namespace translation
//! - [`platform`]: capability-typed hardware façade and built-in drivers
//! - [`tables`], [`db`]: STATE/CONFIG/APPL table handles over a [`db::KvStore`]
//! - [`status`]: module states and SFP error codes
//! - [`config`], [`error`], [`logging`], [`daemon`]: process plumbing

pub mod config;
pub mod daemon;
pub mod db;
pub mod error;
pub mod logging;
pub mod memory_store;
pub mod platform;
pub mod port_mapping;
pub mod redis_store;
pub mod status;
pub mod tables;

pub use config::XcvrdConfig;
pub use daemon::{DaemonExit, SystemdNotifier};
pub use db::{DbConnections, DbId, FieldValue, KeyOpFieldsValues, KvStore, Operation, Subscription, Table};
pub use error::{Result, XcvrError};
pub use memory_store::{MemoryNamespace, MemoryStore};
pub use platform::{Capability, ChangeEvent, Chassis, DiagDict, DiagValue, Sfp, YCablePort};
pub use port_mapping::{AsicId, PortMapping};
pub use redis_store::RedisStore;
pub use status::{ChangeEventSink, ModuleState, PortChangeEvent};
pub use tables::{DiagKind, FlagGroup, FlagTable, TableHelper, VdmLevel, XcvrTable};

/// Current time as epoch seconds, the format of every `last_update_time`.
pub fn epoch_seconds() -> i64 {
    chrono::Utc::now().timestamp()
}

//! Logging setup and live log-level control.
//!
//! The fmt subscriber sits behind a reload layer so the level can follow the
//! daemon's row in CONFIG_DB `LOGGER` at runtime.

use crate::db::Table;
use crate::error::{Result, XcvrError};
use crate::tables::fields;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

/// Environment flag that disables LOGGER table subscriptions.
pub const UNIT_TESTING_ENV: &str = "UNIT_TESTING";

/// Maps a SONiC LOGGER level to a tracing filter directive.
pub fn filter_for_sonic_level(level: &str) -> Option<&'static str> {
    match level.trim().to_ascii_uppercase().as_str() {
        "EMERG" | "ALERT" | "CRIT" | "ERROR" => Some("error"),
        "WARN" | "WARNING" => Some("warn"),
        "NOTICE" | "INFO" => Some("info"),
        "DEBUG" => Some("debug"),
        "TRACE" => Some("trace"),
        _ => None,
    }
}

/// True when running under unit tests (`UNIT_TESTING=1`).
pub fn unit_testing() -> bool {
    std::env::var(UNIT_TESTING_ENV).map(|v| v == "1").unwrap_or(false)
}

/// Handle to change the active log level.
#[derive(Clone)]
pub struct LogHandle {
    reload: Option<reload::Handle<EnvFilter, Registry>>,
    current: Arc<Mutex<String>>,
}

impl std::fmt::Debug for LogHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogHandle")
            .field("level", &*self.current.lock())
            .finish()
    }
}

impl LogHandle {
    /// A handle not attached to any subscriber; only records the level.
    pub fn detached(level: &str) -> Self {
        Self {
            reload: None,
            current: Arc::new(Mutex::new(level.to_string())),
        }
    }

    /// Current filter directive.
    pub fn level(&self) -> String {
        self.current.lock().clone()
    }

    /// Replaces the filter.
    pub fn set_level(&self, directive: &str) -> Result<()> {
        let filter = EnvFilter::try_new(directive)
            .map_err(|e| XcvrError::Config(format!("invalid log level '{}': {}", directive, e)))?;
        if let Some(handle) = &self.reload {
            handle
                .reload(filter)
                .map_err(|e| XcvrError::Config(format!("log level reload failed: {}", e)))?;
        }
        *self.current.lock() = directive.to_string();
        Ok(())
    }
}

/// Installs the global subscriber. `RUST_LOG` wins over `level` when set.
pub fn init_logging(level: &str) -> Result<LogHandle> {
    let directive = std::env::var("RUST_LOG").unwrap_or_else(|_| level.to_string());
    let filter = EnvFilter::try_new(&directive)
        .map_err(|e| XcvrError::Config(format!("invalid log level '{}': {}", directive, e)))?;
    let (layer, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(layer)
        .with(fmt::layer().with_target(true))
        .try_init()
        .map_err(|e| XcvrError::Config(format!("logging already initialized: {}", e)))?;

    Ok(LogHandle {
        reload: Some(handle),
        current: Arc::new(Mutex::new(directive)),
    })
}

fn apply(handle: &LogHandle, daemon: &str, sonic_level: &str) {
    match filter_for_sonic_level(sonic_level) {
        Some(directive) if directive != handle.level() => match handle.set_level(directive) {
            Ok(()) => info!(daemon, level = sonic_level, "Log level changed"),
            Err(e) => warn!(daemon, error = %e, "Failed to change log level"),
        },
        Some(_) => {}
        None => warn!(daemon, level = sonic_level, "Unknown log level ignored"),
    }
}

/// Follows `LOGGER|<daemon>` until cancelled.
///
/// Returns immediately under unit testing.
pub async fn follow_logger_table(
    logger: Table,
    daemon: String,
    handle: LogHandle,
    cancel: CancellationToken,
) {
    if unit_testing() {
        debug!(daemon = %daemon, "Unit testing, not following LOGGER table");
        return;
    }

    let mut subscription = match logger.subscribe().await {
        Ok(sub) => sub,
        Err(e) => {
            warn!(daemon = %daemon, error = %e, "Cannot follow LOGGER table");
            return;
        }
    };

    match logger.hget(&daemon, fields::LOG_LEVEL).await {
        Ok(Some(level)) => apply(&handle, &daemon, &level),
        Ok(None) => {}
        Err(e) => warn!(daemon = %daemon, error = %e, "Cannot read LOGGER entry"),
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            entry = subscription.recv() => {
                let Some(entry) = entry else { break };
                if entry.key != daemon {
                    continue;
                }
                if let Some(level) = entry.get_field(fields::LOG_LEVEL) {
                    apply(&handle, &daemon, level);
                }
            }
        }
    }
    debug!(daemon = %daemon, "Stopped following LOGGER table");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbId;
    use crate::field_values;
    use crate::memory_store::MemoryStore;
    use std::time::Duration;

    #[test]
    fn test_sonic_level_mapping() {
        assert_eq!(filter_for_sonic_level("NOTICE"), Some("info"));
        assert_eq!(filter_for_sonic_level("crit"), Some("error"));
        assert_eq!(filter_for_sonic_level("DEBUG"), Some("debug"));
        assert_eq!(filter_for_sonic_level("LOUD"), None);
    }

    #[test]
    fn test_detached_handle() {
        let handle = LogHandle::detached("info");
        handle.set_level("debug").unwrap();
        assert_eq!(handle.level(), "debug");
        assert!(handle.set_level("xcvrd=loud").is_err());
        assert_eq!(handle.level(), "debug");
    }

    #[tokio::test]
    async fn test_follow_logger_table() {
        if unit_testing() {
            return;
        }
        let store = MemoryStore::shared(DbId::ConfigDb);
        let logger = Table::new(store, "LOGGER");
        logger
            .set("xcvrd", &field_values! { "LOGLEVEL" => "NOTICE" })
            .await
            .unwrap();

        let handle = LogHandle::detached("warn");
        let cancel = CancellationToken::new();
        let task = tokio::spawn(follow_logger_table(
            logger.clone(),
            "xcvrd".to_string(),
            handle.clone(),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(handle.level(), "info");

        logger
            .set("ycabled", &field_values! { "LOGLEVEL" => "DEBUG" })
            .await
            .unwrap();
        logger
            .set("xcvrd", &field_values! { "LOGLEVEL" => "DEBUG" })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(handle.level(), "debug");

        cancel.cancel();
        task.await.unwrap();
    }
}

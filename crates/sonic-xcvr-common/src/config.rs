//! Configuration file support for xcvrd and ycabled.
//!
//! Loads and validates daemon configuration from TOML files.
//! Default location: /etc/sonic/xcvrd.toml

use crate::error::{Result, XcvrError};
use crate::tables::DiagKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/sonic/xcvrd.toml";

/// Default TCP port of the Y-cable peer RPC service.
pub const DEFAULT_PEER_RPC_PORT: u16 = 50075;

/// Connection parameters for one ASIC namespace's database instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceConfig {
    /// ASIC namespace id
    pub id: u32,

    /// Redis host
    #[serde(default = "default_redis_host")]
    pub redis_host: String,

    /// Redis port
    #[serde(default = "default_redis_port")]
    pub redis_port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// One entry per ASIC namespace
    #[serde(default = "default_namespaces")]
    pub namespaces: Vec<NamespaceConfig>,

    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,
}

/// Platform driver selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Driver name from the built-in registry
    #[serde(default = "default_platform_driver")]
    pub driver: String,

    /// Driver-specific description file
    #[serde(default = "default_platform_description")]
    pub description: PathBuf,
}

/// One port_config.ini file and the namespace it describes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortConfigFile {
    /// ASIC namespace id
    #[serde(default)]
    pub namespace: u32,

    /// Path to the port_config.ini file
    pub path: PathBuf,
}

/// Port mapping sources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortsConfig {
    /// Port configuration files, one per ASIC namespace
    #[serde(default = "default_port_config_files")]
    pub port_config: Vec<PortConfigFile>,
}

/// Periodic diagnostic update loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoLoopConfig {
    /// Cycle period in seconds
    #[serde(default = "default_info_period")]
    pub period_secs: u64,

    /// Publishers run for every port each cycle
    #[serde(default = "default_publishers")]
    pub publishers: Vec<DiagKind>,
}

/// Module change-event loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateLoopConfig {
    /// Blocking wait used while no insertion is pending (milliseconds)
    #[serde(default = "default_retry_period")]
    pub retry_period_ms: u64,

    /// Blocking wait used while insertions are soaking (milliseconds)
    #[serde(default = "default_select_timeout")]
    pub select_timeout_ms: u64,

    /// Stable dwell before a raw insertion is accepted (milliseconds)
    #[serde(default = "default_insert_soak")]
    pub insert_soak_ms: u64,

    /// Consecutive event-source failures tolerated before giving up
    #[serde(default = "default_max_event_failures")]
    pub max_event_failures: u32,

    /// Time allowed for the state thread to stop at shutdown
    #[serde(default = "default_join_grace")]
    pub join_grace_secs: u64,
}

/// VDM freeze protocol timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VdmConfig {
    /// Minimum wait after a freeze/unfreeze request (tVDMF)
    #[serde(default = "default_vdm_settle")]
    pub settle_ms: u64,

    /// Status poll interval
    #[serde(default = "default_vdm_poll")]
    pub poll_interval_ms: u64,

    /// Give up confirming after this long
    #[serde(default = "default_vdm_timeout")]
    pub confirm_timeout_ms: u64,
}

/// Y-cable controller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YCableConfig {
    /// Run the Y-cable controller inside xcvrd
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Address the peer RPC service binds to
    #[serde(default = "default_rpc_bind")]
    pub rpc_bind_address: String,

    /// Peer RPC TCP port
    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,

    /// Peer ToR address; peer mirroring is disabled when unset
    #[serde(default)]
    pub peer_address: Option<String>,

    /// Per-request RPC timeout in milliseconds
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_ms: u64,

    /// MUX_CABLE_INFO refresh interval in seconds
    #[serde(default = "default_telemetry_interval")]
    pub telemetry_interval_secs: u64,
}

/// Logging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Initial level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Follow CONFIG_DB LOGGER table changes
    #[serde(default = "default_true")]
    pub follow_logger_table: bool,

    /// Heartbeat log period of the supervisor in seconds
    #[serde(default = "default_heartbeat")]
    pub heartbeat_secs: u64,
}

/// Complete daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct XcvrdConfig {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Platform driver
    #[serde(default)]
    pub platform: PlatformConfig,

    /// Port mapping sources
    #[serde(default)]
    pub ports: PortsConfig,

    /// Info update loop
    #[serde(default)]
    pub info_loop: InfoLoopConfig,

    /// State event loop
    #[serde(default)]
    pub state_loop: StateLoopConfig,

    /// VDM freeze timing
    #[serde(default)]
    pub vdm: VdmConfig,

    /// Y-cable controller
    #[serde(default)]
    pub ycable: YCableConfig,

    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,
}

// Default functions
fn default_redis_host() -> String {
    "127.0.0.1".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_namespaces() -> Vec<NamespaceConfig> {
    vec![NamespaceConfig {
        id: 0,
        redis_host: default_redis_host(),
        redis_port: default_redis_port(),
    }]
}

fn default_connection_timeout() -> u64 {
    5
}

fn default_platform_driver() -> String {
    "sim".to_string()
}

fn default_platform_description() -> PathBuf {
    PathBuf::from("/usr/share/sonic/platform/xcvr_sim.json")
}

fn default_port_config_files() -> Vec<PortConfigFile> {
    vec![PortConfigFile {
        namespace: 0,
        path: PathBuf::from("/usr/share/sonic/hwsku/port_config.ini"),
    }]
}

fn default_info_period() -> u64 {
    60
}

fn default_publishers() -> Vec<DiagKind> {
    DiagKind::ALL.to_vec()
}

fn default_retry_period() -> u64 {
    5000
}

fn default_select_timeout() -> u64 {
    1000
}

fn default_insert_soak() -> u64 {
    2000
}

fn default_max_event_failures() -> u32 {
    24
}

fn default_join_grace() -> u64 {
    10
}

fn default_vdm_settle() -> u64 {
    10
}

fn default_vdm_poll() -> u64 {
    1
}

fn default_vdm_timeout() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_rpc_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_rpc_port() -> u16 {
    DEFAULT_PEER_RPC_PORT
}

fn default_rpc_timeout() -> u64 {
    2000
}

fn default_telemetry_interval() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_heartbeat() -> u64 {
    60
}

// Default implementations
impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            namespaces: default_namespaces(),
            connection_timeout_secs: default_connection_timeout(),
        }
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            driver: default_platform_driver(),
            description: default_platform_description(),
        }
    }
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            port_config: default_port_config_files(),
        }
    }
}

impl Default for InfoLoopConfig {
    fn default() -> Self {
        Self {
            period_secs: default_info_period(),
            publishers: default_publishers(),
        }
    }
}

impl Default for StateLoopConfig {
    fn default() -> Self {
        Self {
            retry_period_ms: default_retry_period(),
            select_timeout_ms: default_select_timeout(),
            insert_soak_ms: default_insert_soak(),
            max_event_failures: default_max_event_failures(),
            join_grace_secs: default_join_grace(),
        }
    }
}

impl Default for VdmConfig {
    fn default() -> Self {
        Self {
            settle_ms: default_vdm_settle(),
            poll_interval_ms: default_vdm_poll(),
            confirm_timeout_ms: default_vdm_timeout(),
        }
    }
}

impl Default for YCableConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rpc_bind_address: default_rpc_bind(),
            rpc_port: default_rpc_port(),
            peer_address: None,
            rpc_timeout_ms: default_rpc_timeout(),
            telemetry_interval_secs: default_telemetry_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            follow_logger_table: true,
            heartbeat_secs: default_heartbeat(),
        }
    }
}

impl StateLoopConfig {
    /// Wait used while no insertion is soaking
    pub fn retry_period(&self) -> Duration {
        Duration::from_millis(self.retry_period_ms)
    }

    /// Wait used while insertions are soaking
    pub fn select_timeout(&self) -> Duration {
        Duration::from_millis(self.select_timeout_ms)
    }

    /// Insertion dwell
    pub fn insert_soak(&self) -> Duration {
        Duration::from_millis(self.insert_soak_ms)
    }
}

impl XcvrdConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let config: Self = match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                XcvrError::Config(format!(
                    "Failed to parse config file {}: {}",
                    path.display(),
                    e
                ))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Config file not found, using defaults");
                Self::default()
            }
            Err(e) => return Err(XcvrError::Io(e)),
        };

        config.validate()?;
        Ok(config)
    }

    /// Get info loop period as Duration
    pub fn info_period(&self) -> Duration {
        Duration::from_secs(self.info_loop.period_secs)
    }

    /// Get heartbeat period as Duration
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.logging.heartbeat_secs)
    }

    /// Get peer RPC timeout as Duration
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.ycable.rpc_timeout_ms)
    }

    /// Get Y-cable telemetry refresh interval as Duration
    pub fn telemetry_interval(&self) -> Duration {
        Duration::from_secs(self.ycable.telemetry_interval_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.database.namespaces.is_empty() {
            return Err(XcvrError::Config(
                "at least one database namespace is required".to_string(),
            ));
        }

        for ns in &self.database.namespaces {
            if ns.redis_port == 0 {
                return Err(XcvrError::Config(format!(
                    "namespace {}: redis_port must be > 0",
                    ns.id
                )));
            }
        }

        for file in &self.ports.port_config {
            if !self.database.namespaces.iter().any(|ns| ns.id == file.namespace) {
                return Err(XcvrError::Config(format!(
                    "port config {} refers to unknown namespace {}",
                    file.path.display(),
                    file.namespace
                )));
            }
        }

        if self.info_loop.period_secs == 0 {
            return Err(XcvrError::Config("info_loop.period_secs must be > 0".to_string()));
        }

        if self.state_loop.select_timeout_ms == 0 || self.state_loop.retry_period_ms == 0 {
            return Err(XcvrError::Config(
                "state_loop timeouts must be > 0".to_string(),
            ));
        }

        if self.vdm.poll_interval_ms == 0 {
            return Err(XcvrError::Config("vdm.poll_interval_ms must be > 0".to_string()));
        }

        Ok(())
    }
}

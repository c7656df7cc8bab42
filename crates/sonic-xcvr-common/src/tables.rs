//! Table names and per-namespace table handles.
//!
//! These match the schema definitions in swss-common. Every table the
//! transceiver daemons touch is named by an [`XcvrTable`]; a [`TableHelper`]
//! opens one [`Table`] per (namespace, table) up front.

use crate::db::{DbConnections, DbId, Table};
use crate::port_mapping::AsicId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Field names shared across tables.
pub mod fields {
    /// Sample clock of a row, epoch seconds.
    pub const LAST_UPDATE_TIME: &str = "last_update_time";

    /// Module status code (TRANSCEIVER_STATUS) or mux status (HW_MUX_CABLE_TABLE).
    pub const STATUS: &str = "status";

    /// Module error description.
    pub const ERROR: &str = "error";

    /// Which ToR the local switch is.
    pub const READ_SIDE: &str = "read_side";

    /// Which ToR the cable forwards to.
    pub const ACTIVE_SIDE: &str = "active_side";

    /// Requested mux state in APPL_DB, peer state in HW_MUX_CABLE_TABLE_PEER.
    pub const STATE: &str = "state";

    /// CONFIG_DB PORT marker for Y-cable ports.
    pub const MUX_CABLE: &str = "mux_cable";

    /// CONFIG_DB LOGGER level.
    pub const LOG_LEVEL: &str = "LOGLEVEL";

    /// Value of `error` when the module is healthy.
    pub const ERROR_NONE: &str = "N/A";

    /// Value of set/clear timestamps that never happened.
    pub const NEVER: &str = "never";
}

/// VDM alarm/warning level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VdmLevel {
    HighAlarm,
    LowAlarm,
    HighWarn,
    LowWarn,
}

impl VdmLevel {
    /// Every level, in table order.
    pub const ALL: [VdmLevel; 4] = [
        VdmLevel::HighAlarm,
        VdmLevel::LowAlarm,
        VdmLevel::HighWarn,
        VdmLevel::LowWarn,
    ];

    /// Key marker that routes a VDM field to this level (`tx_power_halarm`).
    pub fn key_marker(&self) -> &'static str {
        match self {
            VdmLevel::HighAlarm => "_halarm",
            VdmLevel::LowAlarm => "_lalarm",
            VdmLevel::HighWarn => "_hwarn",
            VdmLevel::LowWarn => "_lwarn",
        }
    }

    /// Level of a VDM field, from its key marker.
    pub fn of_key(key: &str) -> Option<VdmLevel> {
        Self::ALL.into_iter().find(|l| key.contains(l.key_marker()))
    }
}

/// One of the four tables of a flag group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FlagTable {
    /// The flag values themselves
    Value,
    /// Transition counters
    ChangeCount,
    /// Last 0→1 time
    SetTime,
    /// Last 1→0 time
    ClearTime,
}

impl FlagTable {
    pub const ALL: [FlagTable; 4] = [
        FlagTable::Value,
        FlagTable::ChangeCount,
        FlagTable::SetTime,
        FlagTable::ClearTime,
    ];
}

/// A flag table and its three metadata siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FlagGroup {
    Dom,
    Status,
    Vdm(VdmLevel),
}

impl FlagGroup {
    /// Every flag group.
    pub const ALL: [FlagGroup; 6] = [
        FlagGroup::Dom,
        FlagGroup::Status,
        FlagGroup::Vdm(VdmLevel::HighAlarm),
        FlagGroup::Vdm(VdmLevel::LowAlarm),
        FlagGroup::Vdm(VdmLevel::HighWarn),
        FlagGroup::Vdm(VdmLevel::LowWarn),
    ];

    fn names(&self) -> [&'static str; 4] {
        match self {
            FlagGroup::Dom => [
                "TRANSCEIVER_DOM_FLAG",
                "TRANSCEIVER_DOM_FLAG_CHANGE_COUNT",
                "TRANSCEIVER_DOM_FLAG_SET_TIME",
                "TRANSCEIVER_DOM_FLAG_CLEAR_TIME",
            ],
            FlagGroup::Status => [
                "TRANSCEIVER_STATUS_FLAG",
                "TRANSCEIVER_STATUS_FLAG_CHANGE_COUNT",
                "TRANSCEIVER_STATUS_FLAG_SET_TIME",
                "TRANSCEIVER_STATUS_FLAG_CLEAR_TIME",
            ],
            FlagGroup::Vdm(VdmLevel::HighAlarm) => [
                "TRANSCEIVER_VDM_HALARM_FLAG",
                "TRANSCEIVER_VDM_HALARM_FLAG_CHANGE_COUNT",
                "TRANSCEIVER_VDM_HALARM_FLAG_SET_TIME",
                "TRANSCEIVER_VDM_HALARM_FLAG_CLEAR_TIME",
            ],
            FlagGroup::Vdm(VdmLevel::LowAlarm) => [
                "TRANSCEIVER_VDM_LALARM_FLAG",
                "TRANSCEIVER_VDM_LALARM_FLAG_CHANGE_COUNT",
                "TRANSCEIVER_VDM_LALARM_FLAG_SET_TIME",
                "TRANSCEIVER_VDM_LALARM_FLAG_CLEAR_TIME",
            ],
            FlagGroup::Vdm(VdmLevel::HighWarn) => [
                "TRANSCEIVER_VDM_HWARN_FLAG",
                "TRANSCEIVER_VDM_HWARN_FLAG_CHANGE_COUNT",
                "TRANSCEIVER_VDM_HWARN_FLAG_SET_TIME",
                "TRANSCEIVER_VDM_HWARN_FLAG_CLEAR_TIME",
            ],
            FlagGroup::Vdm(VdmLevel::LowWarn) => [
                "TRANSCEIVER_VDM_LWARN_FLAG",
                "TRANSCEIVER_VDM_LWARN_FLAG_CHANGE_COUNT",
                "TRANSCEIVER_VDM_LWARN_FLAG_SET_TIME",
                "TRANSCEIVER_VDM_LWARN_FLAG_CLEAR_TIME",
            ],
        }
    }

    /// Store name of one table of this group.
    pub fn table_name(&self, table: FlagTable) -> &'static str {
        let names = self.names();
        match table {
            FlagTable::Value => names[0],
            FlagTable::ChangeCount => names[1],
            FlagTable::SetTime => names[2],
            FlagTable::ClearTime => names[3],
        }
    }
}

/// Every logical table used by xcvrd and ycabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum XcvrTable {
    /// STATE_DB TRANSCEIVER_INFO
    TransceiverInfo,
    /// STATE_DB TRANSCEIVER_DOM_SENSOR
    DomSensor,
    /// STATE_DB TRANSCEIVER_DOM_THRESHOLD
    DomThreshold,
    /// STATE_DB TRANSCEIVER_STATUS
    Status,
    /// STATE_DB TRANSCEIVER_VDM_REAL_VALUE
    VdmRealValue,
    /// STATE_DB TRANSCEIVER_VDM_<level>_THRESHOLD
    VdmThreshold(VdmLevel),
    /// STATE_DB flag tables and their siblings
    Flag(FlagGroup, FlagTable),
    /// STATE_DB HW_MUX_CABLE_TABLE
    HwMuxCable,
    /// STATE_DB HW_MUX_CABLE_TABLE_PEER
    HwMuxCablePeer,
    /// STATE_DB MUX_CABLE_INFO
    MuxCableInfo,
    /// STATE_DB MUX_CABLE_STATIC_INFO
    MuxCableStaticInfo,
    /// APPL_DB HW_MUX_CABLE_TABLE (mux requests)
    AppHwMuxCable,
    /// CONFIG_DB PORT
    ConfigPort,
    /// CONFIG_DB LOGGER
    ConfigLogger,
}

impl XcvrTable {
    /// Store name of the table.
    pub fn name(&self) -> &'static str {
        match self {
            XcvrTable::TransceiverInfo => "TRANSCEIVER_INFO",
            XcvrTable::DomSensor => "TRANSCEIVER_DOM_SENSOR",
            XcvrTable::DomThreshold => "TRANSCEIVER_DOM_THRESHOLD",
            XcvrTable::Status => "TRANSCEIVER_STATUS",
            XcvrTable::VdmRealValue => "TRANSCEIVER_VDM_REAL_VALUE",
            XcvrTable::VdmThreshold(VdmLevel::HighAlarm) => "TRANSCEIVER_VDM_HALARM_THRESHOLD",
            XcvrTable::VdmThreshold(VdmLevel::LowAlarm) => "TRANSCEIVER_VDM_LALARM_THRESHOLD",
            XcvrTable::VdmThreshold(VdmLevel::HighWarn) => "TRANSCEIVER_VDM_HWARN_THRESHOLD",
            XcvrTable::VdmThreshold(VdmLevel::LowWarn) => "TRANSCEIVER_VDM_LWARN_THRESHOLD",
            XcvrTable::Flag(group, table) => group.table_name(*table),
            XcvrTable::HwMuxCable => "HW_MUX_CABLE_TABLE",
            XcvrTable::HwMuxCablePeer => "HW_MUX_CABLE_TABLE_PEER",
            XcvrTable::MuxCableInfo => "MUX_CABLE_INFO",
            XcvrTable::MuxCableStaticInfo => "MUX_CABLE_STATIC_INFO",
            XcvrTable::AppHwMuxCable => "HW_MUX_CABLE_TABLE",
            XcvrTable::ConfigPort => "PORT",
            XcvrTable::ConfigLogger => "LOGGER",
        }
    }

    /// Database holding the table.
    pub fn db(&self) -> DbId {
        match self {
            XcvrTable::AppHwMuxCable => DbId::ApplDb,
            XcvrTable::ConfigPort | XcvrTable::ConfigLogger => DbId::ConfigDb,
            _ => DbId::StateDb,
        }
    }

    /// Per-port diagnostic tables cleared when a module goes away.
    /// TRANSCEIVER_STATUS is not among them; it keeps the removal record.
    pub fn diagnostic_tables() -> Vec<XcvrTable> {
        let mut tables = vec![
            XcvrTable::TransceiverInfo,
            XcvrTable::DomSensor,
            XcvrTable::DomThreshold,
            XcvrTable::VdmRealValue,
        ];
        tables.extend(VdmLevel::ALL.into_iter().map(XcvrTable::VdmThreshold));
        for group in FlagGroup::ALL {
            tables.extend(FlagTable::ALL.into_iter().map(|t| XcvrTable::Flag(group, t)));
        }
        tables
    }

    /// Y-cable tables in STATE_DB.
    pub fn ycable_tables() -> [XcvrTable; 4] {
        [
            XcvrTable::HwMuxCable,
            XcvrTable::HwMuxCablePeer,
            XcvrTable::MuxCableInfo,
            XcvrTable::MuxCableStaticInfo,
        ]
    }

    /// Every table.
    pub fn all() -> Vec<XcvrTable> {
        let mut tables = Self::diagnostic_tables();
        tables.push(XcvrTable::Status);
        tables.extend(Self::ycable_tables());
        tables.extend([
            XcvrTable::AppHwMuxCable,
            XcvrTable::ConfigPort,
            XcvrTable::ConfigLogger,
        ]);
        tables
    }
}

impl fmt::Display for XcvrTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.db(), self.name())
    }
}

/// Diagnostic publishers run by the info update loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagKind {
    TransceiverInfo,
    DomSensor,
    DomFlag,
    DomThreshold,
    Status,
    StatusFlag,
    VdmRealValue,
    VdmFlag,
    VdmThreshold,
}

impl DiagKind {
    /// Every publisher, in cycle order.
    pub const ALL: [DiagKind; 9] = [
        DiagKind::TransceiverInfo,
        DiagKind::DomSensor,
        DiagKind::DomFlag,
        DiagKind::DomThreshold,
        DiagKind::Status,
        DiagKind::StatusFlag,
        DiagKind::VdmRealValue,
        DiagKind::VdmFlag,
        DiagKind::VdmThreshold,
    ];
}

/// Open table handles for every namespace.
///
/// Built once per loop and read-only afterwards.
#[derive(Debug, Default)]
pub struct TableHelper {
    tables: HashMap<(AsicId, XcvrTable), Table>,
    namespaces: Vec<AsicId>,
}

impl TableHelper {
    /// Opens every table on every namespace.
    pub fn new<'a>(connections: impl IntoIterator<Item = (AsicId, &'a DbConnections)>) -> Self {
        let mut helper = Self::default();
        for (asic, conns) in connections {
            for table in XcvrTable::all() {
                let store = conns.store(table.db()).clone();
                helper
                    .tables
                    .insert((asic, table), Table::new(store, table.name()));
            }
            helper.namespaces.push(asic);
        }
        helper.namespaces.sort();
        helper
    }

    /// Handle for `table` in namespace `asic`.
    pub fn get(&self, asic: AsicId, table: XcvrTable) -> Option<&Table> {
        self.tables.get(&(asic, table))
    }

    /// Namespaces this helper covers.
    pub fn namespaces(&self) -> &[AsicId] {
        &self.namespaces
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use std::collections::HashSet;

    fn connections() -> DbConnections {
        DbConnections {
            state: MemoryStore::shared(DbId::StateDb),
            config: MemoryStore::shared(DbId::ConfigDb),
            appl: MemoryStore::shared(DbId::ApplDb),
        }
    }

    #[test]
    fn test_flag_group_names() {
        let group = FlagGroup::Vdm(VdmLevel::LowWarn);
        assert_eq!(group.table_name(FlagTable::Value), "TRANSCEIVER_VDM_LWARN_FLAG");
        assert_eq!(
            group.table_name(FlagTable::ClearTime),
            "TRANSCEIVER_VDM_LWARN_FLAG_CLEAR_TIME"
        );
        assert_eq!(
            FlagGroup::Dom.table_name(FlagTable::ChangeCount),
            "TRANSCEIVER_DOM_FLAG_CHANGE_COUNT"
        );
    }

    #[test]
    fn test_table_names_unique_per_db() {
        let mut seen = HashSet::new();
        for table in XcvrTable::all() {
            assert!(seen.insert((table.db(), table.name())), "duplicate {}", table);
        }
        // 6 flag groups × 4, plus the rest
        assert_eq!(XcvrTable::all().len(), 24 + 4 + 4 + 1 + 4 + 3);
    }

    #[test]
    fn test_table_databases() {
        assert_eq!(XcvrTable::AppHwMuxCable.db(), DbId::ApplDb);
        assert_eq!(XcvrTable::HwMuxCable.db(), DbId::StateDb);
        assert_eq!(XcvrTable::ConfigPort.db(), DbId::ConfigDb);
        assert!(!XcvrTable::diagnostic_tables().contains(&XcvrTable::Status));
    }

    #[test]
    fn test_vdm_level_of_key() {
        assert_eq!(VdmLevel::of_key("laser_temperature_media1_halarm"), Some(VdmLevel::HighAlarm));
        assert_eq!(VdmLevel::of_key("esnr_media_input1_lwarn"), Some(VdmLevel::LowWarn));
        assert_eq!(VdmLevel::of_key("laser_temperature_media1"), None);
    }

    #[test]
    fn test_diag_kind_serde() {
        let kinds: Vec<DiagKind> = serde_json::from_str(r#"["vdm_flag", "status_flag"]"#).unwrap();
        assert_eq!(kinds, vec![DiagKind::VdmFlag, DiagKind::StatusFlag]);
    }

    #[test]
    fn test_helper_per_namespace() {
        let asic0 = connections();
        let asic1 = connections();
        let helper = TableHelper::new([(AsicId(1), &asic1), (AsicId(0), &asic0)]);

        assert_eq!(helper.namespaces(), &[AsicId(0), AsicId(1)]);
        let table = helper.get(AsicId(1), XcvrTable::AppHwMuxCable).unwrap();
        assert_eq!(table.redis_key("Ethernet0"), "HW_MUX_CABLE_TABLE:Ethernet0");
        assert!(helper.get(AsicId(2), XcvrTable::Status).is_none());
    }
}

//! Flag metadata engine.
//!
//! Every flag table has three siblings: how often each flag changed, and
//! when it was last set and last cleared. The engine keeps that history per
//! (group, logical port, flag) and writes the four rows of a group together,
//! all for the same sample.
//!
//! | prev | new | change_count | last_set_time | last_clear_time |
//! |------|-----|--------------|---------------|-----------------|
//! | 0    | 1   | +1           | now           |                 |
//! | 1    | 0   | +1           |               | now             |
//! | none | v   | 0            | now if v=1    | now if v=0      |

use crate::publisher::{write_row, PublishOutcome};
use sonic_xcvr_common::tables::fields;
use sonic_xcvr_common::{AsicId, DiagDict, DiagValue, FieldValue, FlagGroup, FlagTable, TableHelper, XcvrTable};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// History of one flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagRecord {
    pub value: bool,
    pub change_count: u64,
    pub last_set_time: Option<i64>,
    pub last_clear_time: Option<i64>,
}

impl FlagRecord {
    /// Record of a flag seen for the first time.
    pub fn first(value: bool, now: i64) -> Self {
        Self {
            value,
            change_count: 0,
            last_set_time: value.then_some(now),
            last_clear_time: (!value).then_some(now),
        }
    }

    /// Applies a new sample.
    pub fn observe(&mut self, value: bool, now: i64) {
        if value == self.value {
            return;
        }
        self.change_count += 1;
        if value {
            self.last_set_time = Some(now);
        } else {
            self.last_clear_time = Some(now);
        }
        self.value = value;
    }
}

/// Reads a flag value. `None` for values that are not a flag.
pub fn parse_flag(value: &DiagValue) -> Option<bool> {
    match value {
        DiagValue::Bool(b) => Some(*b),
        DiagValue::Int(0) => Some(false),
        DiagValue::Int(1) => Some(true),
        DiagValue::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn timestamp(time: Option<i64>) -> String {
    time.map_or_else(|| fields::NEVER.to_string(), |t| t.to_string())
}

type PortFlags = BTreeMap<String, FlagRecord>;

/// Flag history of every port, owned by the info update loop.
#[derive(Debug, Default)]
pub struct FlagMetadataEngine {
    ports: HashMap<(FlagGroup, String), PortFlags>,
}

impl FlagMetadataEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one sample of a group's flags; returns the records touched.
    pub fn update(&mut self, group: FlagGroup, logical: &str, dict: &DiagDict, now: i64) -> PortFlags {
        let records = self.ports.entry((group, logical.to_string())).or_default();
        let mut touched = PortFlags::new();
        for (field, value) in dict {
            let Some(value) = parse_flag(value) else {
                debug!(port = logical, field = %field, "Not a flag value, no metadata");
                continue;
            };
            let record = records
                .entry(field.clone())
                .and_modify(|r| r.observe(value, now))
                .or_insert_with(|| FlagRecord::first(value, now));
            touched.insert(field.clone(), *record);
        }
        touched
    }

    /// Current record of one flag.
    pub fn record(&self, group: FlagGroup, logical: &str, field: &str) -> Option<FlagRecord> {
        self.ports
            .get(&(group, logical.to_string()))
            .and_then(|records| records.get(field))
            .copied()
    }

    /// Drops every record of a port; the next sample starts a fresh history.
    pub fn forget_port(&mut self, logical: &str) {
        self.ports.retain(|(_, port), _| port != logical);
    }

    /// Writes the flag row and its three siblings for one sample.
    pub async fn publish_flags(
        &mut self,
        tables: &TableHelper,
        asic: AsicId,
        group: FlagGroup,
        logical: &str,
        dict: &DiagDict,
        now: i64,
    ) -> PublishOutcome {
        if dict.is_empty() {
            return PublishOutcome::Empty;
        }
        let records = self.update(group, logical, dict, now);

        let Some(flags) = tables.get(asic, XcvrTable::Flag(group, FlagTable::Value)) else {
            return PublishOutcome::WriteFailed;
        };
        let mut outcome = write_row(flags, logical, dict, false, now).await;
        if records.is_empty() {
            return outcome;
        }

        let stamp = (fields::LAST_UPDATE_TIME.to_string(), now.to_string());
        let siblings: [(FlagTable, fn(&FlagRecord) -> String); 3] = [
            (FlagTable::ChangeCount, |r| r.change_count.to_string()),
            (FlagTable::SetTime, |r| timestamp(r.last_set_time)),
            (FlagTable::ClearTime, |r| timestamp(r.last_clear_time)),
        ];
        for (table, render) in siblings {
            let Some(handle) = tables.get(asic, XcvrTable::Flag(group, table)) else {
                continue;
            };
            let mut fvs: Vec<FieldValue> = records
                .iter()
                .map(|(field, record)| (field.clone(), render(record)))
                .collect();
            fvs.push(stamp.clone());
            if let Err(e) = handle.set(logical, &fvs).await {
                warn!(port = logical, table = handle.name(), error = %e, "Failed to write flag metadata");
                outcome = PublishOutcome::WriteFailed;
            }
        }
        outcome
    }
}

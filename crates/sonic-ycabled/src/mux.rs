//! Mux state and the active/standby law.

use sonic_xcvr_common::tables::fields;
use sonic_xcvr_common::FieldValue;
use std::fmt;
use std::str::FromStr;

/// ToR A.
pub const SIDE_A: u8 = 1;
/// ToR B.
pub const SIDE_B: u8 = 2;
/// Cable forwards to neither ToR.
pub const SIDE_NONE: u8 = 0;

/// The other ToR.
pub fn peer_side(side: u8) -> u8 {
    match side {
        SIDE_A => SIDE_B,
        SIDE_B => SIDE_A,
        _ => SIDE_NONE,
    }
}

/// Mux status of one port as seen from this ToR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MuxStatus {
    Active,
    Standby,
    Inactive,
}

impl MuxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MuxStatus::Active => "active",
            MuxStatus::Standby => "standby",
            MuxStatus::Inactive => "inactive",
        }
    }

    /// Status implied by which side this ToR is and where the cable points.
    pub fn derive(read_side: u8, active_side: u8) -> Self {
        if active_side == SIDE_NONE {
            MuxStatus::Inactive
        } else if read_side == active_side {
            MuxStatus::Active
        } else {
            MuxStatus::Standby
        }
    }

    /// Side the cable must point to for this ToR to reach `self`.
    /// `None` for statuses that cannot be toggled to.
    pub fn target_side(&self, read_side: u8) -> Option<u8> {
        match self {
            MuxStatus::Active => Some(read_side),
            MuxStatus::Standby => Some(peer_side(read_side)),
            MuxStatus::Inactive => None,
        }
    }
}

impl fmt::Display for MuxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MuxStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(MuxStatus::Active),
            "standby" => Ok(MuxStatus::Standby),
            "inactive" => Ok(MuxStatus::Inactive),
            other => Err(format!("unknown mux status '{}'", other)),
        }
    }
}

/// One HW_MUX_CABLE_TABLE row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MuxState {
    pub status: MuxStatus,
    pub read_side: u8,
    pub active_side: u8,
}

impl MuxState {
    /// State with the status derived from the two sides.
    pub fn new(read_side: u8, active_side: u8) -> Self {
        Self {
            status: MuxStatus::derive(read_side, active_side),
            read_side,
            active_side,
        }
    }

    pub fn to_field_values(&self, now: i64) -> Vec<FieldValue> {
        vec![
            (fields::STATUS.to_string(), self.status.as_str().to_string()),
            (fields::READ_SIDE.to_string(), self.read_side.to_string()),
            (fields::ACTIVE_SIDE.to_string(), self.active_side.to_string()),
            (fields::LAST_UPDATE_TIME.to_string(), now.to_string()),
        ]
    }
}

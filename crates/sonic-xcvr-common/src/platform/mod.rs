//! Platform façade.
//!
//! Vendor hardware is reached through three traits: [`Chassis`] (module
//! inventory and the change-event source), [`Sfp`] (one transceiver cage) and
//! [`YCablePort`] (the mux on a dual-ToR cable). Every capability answers with
//! a [`Capability`]: either a value or [`Capability::NotImplemented`], never an
//! error. Module faults surface as status codes through the change-event
//! source, not through these calls.

pub mod loader;
pub mod sim;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub use loader::load_platform;

/// Result of a platform capability.
#[derive(Debug, Clone, PartialEq)]
pub enum Capability<T> {
    /// The platform answered.
    Value(T),
    /// The platform does not implement this capability.
    NotImplemented,
}

impl<T> Capability<T> {
    /// The value, if implemented.
    pub fn value(self) -> Option<T> {
        match self {
            Capability::Value(v) => Some(v),
            Capability::NotImplemented => None,
        }
    }

    pub fn is_implemented(&self) -> bool {
        matches!(self, Capability::Value(_))
    }
}

impl<T> From<Option<T>> for Capability<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Capability::NotImplemented, Capability::Value)
    }
}

/// One value of a diagnostic dictionary as read from the module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DiagValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for DiagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagValue::Bool(true) => f.write_str("True"),
            DiagValue::Bool(false) => f.write_str("False"),
            DiagValue::Int(v) => write!(f, "{}", v),
            // Debug keeps at least one fractional digit (1.0, not 1)
            DiagValue::Float(v) => write!(f, "{:?}", v),
            DiagValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for DiagValue {
    fn from(value: &str) -> Self {
        DiagValue::Str(value.to_string())
    }
}

impl From<String> for DiagValue {
    fn from(value: String) -> Self {
        DiagValue::Str(value)
    }
}

impl From<bool> for DiagValue {
    fn from(value: bool) -> Self {
        DiagValue::Bool(value)
    }
}

impl From<i64> for DiagValue {
    fn from(value: i64) -> Self {
        DiagValue::Int(value)
    }
}

impl From<f64> for DiagValue {
    fn from(value: f64) -> Self {
        DiagValue::Float(value)
    }
}

/// Field → value map read from one module in one sample.
pub type DiagDict = BTreeMap<String, DiagValue>;

/// Builds a [`DiagDict`] from `field => value` pairs.
#[macro_export]
macro_rules! diag_dict {
    ($($field:expr => $value:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut dict = $crate::platform::DiagDict::new();
        $(dict.insert($field.to_string(), $crate::platform::DiagValue::from($value));)*
        dict
    }};
}

/// One batch from the platform change-event source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// False when the source itself failed.
    pub success: bool,
    /// Physical port → raw state string (`"0"`, `"1"` or an error code).
    #[serde(default)]
    pub port_states: BTreeMap<u32, String>,
    /// Physical port → error description, for error codes.
    #[serde(default)]
    pub port_errors: BTreeMap<u32, String>,
}

impl ChangeEvent {
    /// A successful batch with no changes.
    pub fn empty() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    /// A failed batch.
    pub fn failed() -> Self {
        Self::default()
    }

    /// Adds a raw state for a port.
    pub fn with_state(mut self, physical: u32, state: impl Into<String>) -> Self {
        self.port_states.insert(physical, state.into());
        self
    }

    /// Adds an error description for a port.
    pub fn with_error(mut self, physical: u32, description: impl Into<String>) -> Self {
        self.port_errors.insert(physical, description.into());
        self
    }
}

/// One transceiver cage.
///
/// Every method defaults to [`Capability::NotImplemented`]; drivers override
/// what their hardware offers.
pub trait Sfp: Send + Sync {
    fn get_presence(&self) -> Capability<bool> {
        Capability::NotImplemented
    }

    /// True for modules exposing only the lower page (no DOM/VDM pages).
    fn is_flat_memory(&self) -> Capability<bool> {
        Capability::NotImplemented
    }

    fn get_transceiver_info(&self) -> Capability<DiagDict> {
        Capability::NotImplemented
    }

    fn get_transceiver_dom_real_value(&self) -> Capability<DiagDict> {
        Capability::NotImplemented
    }

    fn get_transceiver_dom_flags(&self) -> Capability<DiagDict> {
        Capability::NotImplemented
    }

    fn get_transceiver_dom_thresholds(&self) -> Capability<DiagDict> {
        Capability::NotImplemented
    }

    fn get_transceiver_status(&self) -> Capability<DiagDict> {
        Capability::NotImplemented
    }

    fn get_transceiver_status_flags(&self) -> Capability<DiagDict> {
        Capability::NotImplemented
    }

    fn is_vdm_supported(&self) -> Capability<bool> {
        Capability::NotImplemented
    }

    fn get_transceiver_vdm_real_value(&self) -> Capability<DiagDict> {
        Capability::NotImplemented
    }

    fn get_transceiver_vdm_flags(&self) -> Capability<DiagDict> {
        Capability::NotImplemented
    }

    fn get_transceiver_vdm_thresholds(&self) -> Capability<DiagDict> {
        Capability::NotImplemented
    }

    /// Requests a VDM statistics freeze. `false` means refused.
    fn freeze_vdm_stats(&self) -> Capability<bool> {
        Capability::NotImplemented
    }

    /// Requests a VDM statistics unfreeze. `false` means refused.
    fn unfreeze_vdm_stats(&self) -> Capability<bool> {
        Capability::NotImplemented
    }

    /// True once a requested freeze is complete.
    fn get_vdm_freeze_status(&self) -> Capability<bool> {
        Capability::NotImplemented
    }

    /// True once a requested unfreeze is complete.
    fn get_vdm_unfreeze_status(&self) -> Capability<bool> {
        Capability::NotImplemented
    }
}

/// Mux control on a Y-cable.
///
/// Sides are 1 (ToR A) and 2 (ToR B); an active side of 0 means the cable
/// forwards to neither.
pub trait YCablePort: Send + Sync {
    /// Which ToR this switch is.
    fn get_read_side(&self) -> Result<u8>;

    /// Which ToR the cable currently forwards to.
    fn get_mux_direction(&self) -> Result<u8>;

    /// Switches the cable to ToR A. `false` means the cable refused.
    fn toggle_mux_to_tor_a(&self) -> Result<bool>;

    /// Switches the cable to ToR B. `false` means the cable refused.
    fn toggle_mux_to_tor_b(&self) -> Result<bool>;

    fn get_static_info(&self) -> Capability<DiagDict> {
        Capability::NotImplemented
    }

    fn get_telemetry(&self) -> Capability<DiagDict> {
        Capability::NotImplemented
    }
}

/// The platform as a whole.
pub trait Chassis: Send + Sync {
    /// Driver name, for logs.
    fn name(&self) -> &str;

    fn get_num_sfps(&self) -> usize;

    /// Handle to a physical port's cage.
    fn get_sfp(&self, physical: u32) -> Option<Arc<dyn Sfp>>;

    /// Blocks until module state changes or `timeout` elapses.
    fn get_change_event(&self, timeout: Duration) -> Capability<ChangeEvent>;

    /// Mux handle for a physical port carrying a Y-cable.
    fn get_y_cable(&self, _physical: u32) -> Option<Arc<dyn YCablePort>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diag_value_display() {
        assert_eq!(DiagValue::Bool(true).to_string(), "True");
        assert_eq!(DiagValue::Bool(false).to_string(), "False");
        assert_eq!(DiagValue::Int(-3).to_string(), "-3");
        assert_eq!(DiagValue::Float(1.0).to_string(), "1.0");
        assert_eq!(DiagValue::Float(-2.25).to_string(), "-2.25");
        assert_eq!(DiagValue::from("35.5C").to_string(), "35.5C");
    }

    #[test]
    fn test_diag_value_untagged_json() {
        let dict: DiagDict =
            serde_json::from_str(r#"{"a": true, "b": 3, "c": 1.5, "d": "x"}"#).unwrap();
        assert_eq!(dict["a"], DiagValue::Bool(true));
        assert_eq!(dict["b"], DiagValue::Int(3));
        assert_eq!(dict["c"], DiagValue::Float(1.5));
        assert_eq!(dict["d"], DiagValue::Str("x".to_string()));
    }

    #[test]
    fn test_capability_helpers() {
        assert_eq!(Capability::Value(2).value(), Some(2));
        assert!(!Capability::<u8>::NotImplemented.is_implemented());
        assert_eq!(Capability::from(Some(true)), Capability::Value(true));
        assert_eq!(Capability::<bool>::from(None), Capability::NotImplemented);
    }

    #[test]
    fn test_diag_dict_macro() {
        let dict = diag_dict! { "temperature" => "35.0C", "tx1_los" => false, "count" => 2i64 };
        assert_eq!(dict.len(), 3);
        assert_eq!(dict["tx1_los"], DiagValue::Bool(false));
    }

    #[test]
    fn test_change_event_builder() {
        let event = ChangeEvent::empty().with_state(1, "1").with_state(2, "3").with_error(2, "bad");
        assert!(event.success);
        assert_eq!(event.port_states.len(), 2);
        assert!(!ChangeEvent::failed().success);
    }
}

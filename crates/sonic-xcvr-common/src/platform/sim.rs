//! Simulated platform driver.
//!
//! Describes modules in a JSON file and keeps everything mutable behind
//! locks, so the same object serves lab bring-up (`driver = "sim"`) and tests
//! that script module behavior and then inspect what the daemons asked of it.
//!
//! ```json
//! {
//!   "name": "sim-dualtor",
//!   "ports": [
//!     { "index": 1, "present": true, "vdm_supported": true,
//!       "info": { "manufacturer": "ACME", "model": "QSFP-DD-400G" },
//!       "dom": { "temperature": "35.5C", "voltage": "3.3Volts" },
//!       "ycable": { "read_side": 1, "active_side": 2 } }
//!   ]
//! }
//! ```

use super::{Capability, ChangeEvent, Chassis, DiagDict, Sfp, YCablePort};
use crate::error::{Result, XcvrError};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn default_true() -> bool {
    true
}

fn default_read_side() -> u8 {
    1
}

/// Y-cable part of a simulated port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimYCableDescription {
    #[serde(default = "default_read_side")]
    pub read_side: u8,
    #[serde(default)]
    pub active_side: u8,
    #[serde(default)]
    pub static_info: Option<DiagDict>,
    #[serde(default)]
    pub telemetry: Option<DiagDict>,
}

impl Default for SimYCableDescription {
    fn default() -> Self {
        Self {
            read_side: default_read_side(),
            active_side: 0,
            static_info: None,
            telemetry: None,
        }
    }
}

/// One simulated cage. Absent dictionaries read as not implemented.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimPortDescription {
    pub index: u32,
    pub present: bool,
    pub flat_memory: bool,
    pub vdm_supported: bool,
    pub info: Option<DiagDict>,
    pub dom: Option<DiagDict>,
    pub dom_flags: Option<DiagDict>,
    pub dom_thresholds: Option<DiagDict>,
    pub status: Option<DiagDict>,
    pub status_flags: Option<DiagDict>,
    pub vdm_real_value: Option<DiagDict>,
    pub vdm_flags: Option<DiagDict>,
    pub vdm_thresholds: Option<DiagDict>,
    pub ycable: Option<SimYCableDescription>,
}

/// A simulated chassis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimChassisDescription {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_true")]
    pub change_event_supported: bool,
    #[serde(default)]
    pub ports: Vec<SimPortDescription>,
}

fn default_name() -> String {
    "sim".to_string()
}

/// Dictionaries a simulated module can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SimDiag {
    Info,
    Dom,
    DomFlags,
    DomThresholds,
    Status,
    StatusFlags,
    VdmRealValue,
    VdmFlags,
    VdmThresholds,
}

impl SimDiag {
    fn is_vdm(&self) -> bool {
        matches!(
            self,
            SimDiag::VdmRealValue | SimDiag::VdmFlags | SimDiag::VdmThresholds
        )
    }
}

/// Calls observed by a simulated module, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SfpCall {
    Freeze,
    Unfreeze,
    Read(SimDiag),
}

#[derive(Debug)]
struct SimSfpState {
    present: bool,
    flat_memory: bool,
    vdm_supported: bool,
    dicts: BTreeMap<SimDiag, Option<DiagDict>>,
    freeze_accepts: Option<bool>,
    freeze_completes: bool,
    unfreeze_completes: bool,
    panic_on_vdm_read: bool,
}

/// A simulated transceiver cage.
#[derive(Debug)]
pub struct SimSfp {
    index: u32,
    state: Mutex<SimSfpState>,
    calls: Mutex<Vec<SfpCall>>,
}

impl SimSfp {
    /// Builds a module from its description.
    pub fn from_description(desc: &SimPortDescription) -> Self {
        let mut dicts = BTreeMap::new();
        for (diag, dict) in [
            (SimDiag::Info, &desc.info),
            (SimDiag::Dom, &desc.dom),
            (SimDiag::DomFlags, &desc.dom_flags),
            (SimDiag::DomThresholds, &desc.dom_thresholds),
            (SimDiag::Status, &desc.status),
            (SimDiag::StatusFlags, &desc.status_flags),
            (SimDiag::VdmRealValue, &desc.vdm_real_value),
            (SimDiag::VdmFlags, &desc.vdm_flags),
            (SimDiag::VdmThresholds, &desc.vdm_thresholds),
        ] {
            dicts.insert(diag, dict.clone());
        }

        Self {
            index: desc.index,
            state: Mutex::new(SimSfpState {
                present: desc.present,
                flat_memory: desc.flat_memory,
                vdm_supported: desc.vdm_supported,
                dicts,
                freeze_accepts: Some(true),
                freeze_completes: true,
                unfreeze_completes: true,
                panic_on_vdm_read: false,
            }),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Physical index.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn set_present(&self, present: bool) {
        self.state.lock().present = present;
    }

    pub fn set_flat_memory(&self, flat: bool) {
        self.state.lock().flat_memory = flat;
    }

    pub fn set_vdm_supported(&self, supported: bool) {
        self.state.lock().vdm_supported = supported;
    }

    /// Replaces a dictionary; `None` makes the read not implemented.
    pub fn set_diag(&self, diag: SimDiag, dict: Option<DiagDict>) {
        self.state.lock().dicts.insert(diag, dict);
    }

    /// Freeze request answer: `Some(accepted)` or `None` for not implemented.
    pub fn set_freeze_accepts(&self, accepts: Option<bool>) {
        self.state.lock().freeze_accepts = accepts;
    }

    /// Whether the freeze status ever reports done.
    pub fn set_freeze_completes(&self, completes: bool) {
        self.state.lock().freeze_completes = completes;
    }

    /// Whether the unfreeze status ever reports done.
    pub fn set_unfreeze_completes(&self, completes: bool) {
        self.state.lock().unfreeze_completes = completes;
    }

    /// Makes VDM reads panic, as a misbehaving driver would.
    pub fn set_panic_on_vdm_read(&self, panic: bool) {
        self.state.lock().panic_on_vdm_read = panic;
    }

    /// Calls observed so far.
    pub fn calls(&self) -> Vec<SfpCall> {
        self.calls.lock().clone()
    }

    /// Number of observed calls equal to `call`.
    pub fn call_count(&self, call: SfpCall) -> usize {
        self.calls.lock().iter().filter(|c| **c == call).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    fn read(&self, diag: SimDiag) -> Capability<DiagDict> {
        self.calls.lock().push(SfpCall::Read(diag));
        let state = self.state.lock();
        if diag.is_vdm() && state.panic_on_vdm_read {
            drop(state);
            panic!("simulated VDM read fault on port {}", self.index);
        }
        if !state.present {
            return Capability::Value(DiagDict::new());
        }
        state
            .dicts
            .get(&diag)
            .cloned()
            .flatten()
            .into()
    }
}

impl Sfp for SimSfp {
    fn get_presence(&self) -> Capability<bool> {
        Capability::Value(self.state.lock().present)
    }

    fn is_flat_memory(&self) -> Capability<bool> {
        Capability::Value(self.state.lock().flat_memory)
    }

    fn get_transceiver_info(&self) -> Capability<DiagDict> {
        self.read(SimDiag::Info)
    }

    fn get_transceiver_dom_real_value(&self) -> Capability<DiagDict> {
        self.read(SimDiag::Dom)
    }

    fn get_transceiver_dom_flags(&self) -> Capability<DiagDict> {
        self.read(SimDiag::DomFlags)
    }

    fn get_transceiver_dom_thresholds(&self) -> Capability<DiagDict> {
        self.read(SimDiag::DomThresholds)
    }

    fn get_transceiver_status(&self) -> Capability<DiagDict> {
        self.read(SimDiag::Status)
    }

    fn get_transceiver_status_flags(&self) -> Capability<DiagDict> {
        self.read(SimDiag::StatusFlags)
    }

    fn is_vdm_supported(&self) -> Capability<bool> {
        Capability::Value(self.state.lock().vdm_supported)
    }

    fn get_transceiver_vdm_real_value(&self) -> Capability<DiagDict> {
        self.read(SimDiag::VdmRealValue)
    }

    fn get_transceiver_vdm_flags(&self) -> Capability<DiagDict> {
        self.read(SimDiag::VdmFlags)
    }

    fn get_transceiver_vdm_thresholds(&self) -> Capability<DiagDict> {
        self.read(SimDiag::VdmThresholds)
    }

    fn freeze_vdm_stats(&self) -> Capability<bool> {
        self.calls.lock().push(SfpCall::Freeze);
        self.state.lock().freeze_accepts.into()
    }

    fn unfreeze_vdm_stats(&self) -> Capability<bool> {
        self.calls.lock().push(SfpCall::Unfreeze);
        Capability::Value(true)
    }

    fn get_vdm_freeze_status(&self) -> Capability<bool> {
        Capability::Value(self.state.lock().freeze_completes)
    }

    fn get_vdm_unfreeze_status(&self) -> Capability<bool> {
        Capability::Value(self.state.lock().unfreeze_completes)
    }
}

#[derive(Debug)]
struct SimYCableState {
    read_side: u8,
    active_side: u8,
    toggle_accepts: Option<bool>,
    read_side_fails: bool,
    direction_fails: bool,
    static_info: Option<DiagDict>,
    telemetry: Option<DiagDict>,
}

/// A simulated Y-cable mux.
#[derive(Debug)]
pub struct SimYCable {
    state: Mutex<SimYCableState>,
    toggles: Mutex<Vec<u8>>,
}

impl SimYCable {
    pub fn from_description(desc: &SimYCableDescription) -> Self {
        Self {
            state: Mutex::new(SimYCableState {
                read_side: desc.read_side,
                active_side: desc.active_side,
                toggle_accepts: Some(true),
                read_side_fails: false,
                direction_fails: false,
                static_info: desc.static_info.clone(),
                telemetry: desc.telemetry.clone(),
            }),
            toggles: Mutex::new(Vec::new()),
        }
    }

    pub fn set_active_side(&self, side: u8) {
        self.state.lock().active_side = side;
    }

    /// Toggle answer: `Some(accepted)` or `None` for a driver failure.
    pub fn set_toggle_accepts(&self, accepts: Option<bool>) {
        self.state.lock().toggle_accepts = accepts;
    }

    pub fn set_read_side_fails(&self, fails: bool) {
        self.state.lock().read_side_fails = fails;
    }

    pub fn set_direction_fails(&self, fails: bool) {
        self.state.lock().direction_fails = fails;
    }

    /// Sides toggled to, in order.
    pub fn toggles(&self) -> Vec<u8> {
        self.toggles.lock().clone()
    }

    fn toggle(&self, side: u8) -> Result<bool> {
        self.toggles.lock().push(side);
        let mut state = self.state.lock();
        match state.toggle_accepts {
            Some(true) => {
                state.active_side = side;
                Ok(true)
            }
            Some(false) => Ok(false),
            None => Err(XcvrError::Platform(format!("toggle to side {} failed", side))),
        }
    }
}

impl YCablePort for SimYCable {
    fn get_read_side(&self) -> Result<u8> {
        let state = self.state.lock();
        if state.read_side_fails {
            return Err(XcvrError::Platform("read_side unavailable".to_string()));
        }
        Ok(state.read_side)
    }

    fn get_mux_direction(&self) -> Result<u8> {
        let state = self.state.lock();
        if state.direction_fails {
            return Err(XcvrError::Platform("mux direction unavailable".to_string()));
        }
        Ok(state.active_side)
    }

    fn toggle_mux_to_tor_a(&self) -> Result<bool> {
        self.toggle(1)
    }

    fn toggle_mux_to_tor_b(&self) -> Result<bool> {
        self.toggle(2)
    }

    fn get_static_info(&self) -> Capability<DiagDict> {
        self.state.lock().static_info.clone().into()
    }

    fn get_telemetry(&self) -> Capability<DiagDict> {
        self.state.lock().telemetry.clone().into()
    }
}

/// A simulated chassis with a scripted change-event source.
#[derive(Debug)]
pub struct SimChassis {
    name: String,
    sfps: BTreeMap<u32, Arc<SimSfp>>,
    ycables: BTreeMap<u32, Arc<SimYCable>>,
    events: Mutex<VecDeque<ChangeEvent>>,
    event_ready: Condvar,
    change_event_supported: AtomicBool,
}

impl SimChassis {
    /// Creates a chassis with no modules.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sfps: BTreeMap::new(),
            ycables: BTreeMap::new(),
            events: Mutex::new(VecDeque::new()),
            event_ready: Condvar::new(),
            change_event_supported: AtomicBool::new(true),
        }
    }

    /// Builds a chassis from its description.
    pub fn from_description(desc: &SimChassisDescription) -> Self {
        let mut chassis = Self::new(desc.name.clone());
        chassis.set_change_event_supported(desc.change_event_supported);
        for port in &desc.ports {
            chassis.add_port(port);
        }
        chassis
    }

    /// Loads a JSON description file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            XcvrError::Platform(format!("cannot read {}: {}", path.display(), e))
        })?;
        let desc: SimChassisDescription = serde_json::from_str(&content).map_err(|e| {
            XcvrError::Platform(format!("invalid description {}: {}", path.display(), e))
        })?;
        Ok(Self::from_description(&desc))
    }

    /// Adds a cage (and its Y-cable, if described).
    pub fn add_port(&mut self, desc: &SimPortDescription) -> Arc<SimSfp> {
        let sfp = Arc::new(SimSfp::from_description(desc));
        self.sfps.insert(desc.index, sfp.clone());
        if let Some(ycable) = &desc.ycable {
            self.ycables
                .insert(desc.index, Arc::new(SimYCable::from_description(ycable)));
        }
        sfp
    }

    /// Concrete module handle, for tests.
    pub fn sim_sfp(&self, physical: u32) -> Option<Arc<SimSfp>> {
        self.sfps.get(&physical).cloned()
    }

    /// Concrete mux handle, for tests.
    pub fn sim_y_cable(&self, physical: u32) -> Option<Arc<SimYCable>> {
        self.ycables.get(&physical).cloned()
    }

    pub fn set_change_event_supported(&self, supported: bool) {
        self.change_event_supported.store(supported, Ordering::Relaxed);
    }

    /// Queues a batch for the next `get_change_event`.
    pub fn push_event(&self, event: ChangeEvent) {
        self.events.lock().push_back(event);
        self.event_ready.notify_all();
    }

    /// Batches not yet consumed.
    pub fn pending_events(&self) -> usize {
        self.events.lock().len()
    }
}

impl Chassis for SimChassis {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_num_sfps(&self) -> usize {
        self.sfps.len()
    }

    fn get_sfp(&self, physical: u32) -> Option<Arc<dyn Sfp>> {
        self.sfps
            .get(&physical)
            .map(|sfp| sfp.clone() as Arc<dyn Sfp>)
    }

    fn get_change_event(&self, timeout: Duration) -> Capability<ChangeEvent> {
        if !self.change_event_supported.load(Ordering::Relaxed) {
            return Capability::NotImplemented;
        }
        let mut events = self.events.lock();
        if events.is_empty() {
            self.event_ready.wait_for(&mut events, timeout);
        }
        Capability::Value(events.pop_front().unwrap_or_else(ChangeEvent::empty))
    }

    fn get_y_cable(&self, physical: u32) -> Option<Arc<dyn YCablePort>> {
        self.ycables
            .get(&physical)
            .map(|ycable| ycable.clone() as Arc<dyn YCablePort>)
    }
}

//! Y-cable controller.
//!
//! Owns every Y-cable port of the switch. The initializer derives each port's
//! mux state from hardware; afterwards a single task reacts to mux requests
//! from APPL_DB, module transitions, peer RPC requests and the telemetry
//! timer. Running all of them on one task serializes every hardware toggle
//! and every HW_MUX_CABLE_TABLE write.

use crate::mux::{peer_side, MuxState, MuxStatus, SIDE_A, SIDE_B};
use crate::peer::{PeerClient, PeerRequest, PeerResponse, RpcCommand};
use crate::telemetry;
use sonic_xcvr_common::tables::fields;
use sonic_xcvr_common::{
    epoch_seconds, AsicId, Chassis, KeyOpFieldsValues, ModuleState, Operation, PortChangeEvent,
    PortMapping, Result, Table, TableHelper, XcvrTable, YCablePort,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// A managed Y-cable port.
#[derive(Clone)]
struct YCablePortEntry {
    asic: AsicId,
    physical: u32,
    read_side: u8,
    ycable: Arc<dyn YCablePort>,
}

/// Y-cable controller state.
pub struct YCableController {
    mapping: Arc<PortMapping>,
    chassis: Arc<dyn Chassis>,
    tables: TableHelper,
    peer: Option<PeerClient>,
    ports: BTreeMap<String, YCablePortEntry>,
    peer_tasks: Vec<JoinHandle<()>>,
}

impl YCableController {
    pub fn new(mapping: Arc<PortMapping>, chassis: Arc<dyn Chassis>, tables: TableHelper) -> Self {
        Self {
            mapping,
            chassis,
            tables,
            peer: None,
            ports: BTreeMap::new(),
            peer_tasks: Vec::new(),
        }
    }

    /// Mirrors the peer's view into HW_MUX_CABLE_TABLE_PEER.
    pub fn with_peer(mut self, peer: PeerClient) -> Self {
        self.peer = Some(peer);
        self
    }

    /// Logical ports under control.
    pub fn managed_ports(&self) -> Vec<String> {
        self.ports.keys().cloned().collect()
    }

    fn table(&self, asic: AsicId, table: XcvrTable) -> Option<Table> {
        self.tables.get(asic, table).cloned()
    }

    /// Follows APPL_DB HW_MUX_CABLE_TABLE on every namespace, merged into one channel.
    pub async fn subscribe_requests(
        &self,
        cancel: &CancellationToken,
    ) -> Result<mpsc::UnboundedReceiver<KeyOpFieldsValues>> {
        let (tx, rx) = mpsc::unbounded_channel();
        for asic in self.tables.namespaces() {
            let Some(table) = self.table(*asic, XcvrTable::AppHwMuxCable) else {
                continue;
            };
            let mut subscription = table.subscribe().await?;
            let tx = tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        entry = subscription.recv() => match entry {
                            Some(entry) => {
                                if tx.send(entry).is_err() {
                                    break;
                                }
                            }
                            None => break,
                        },
                    }
                }
            });
        }
        Ok(rx)
    }

    /// Initializes every logical port configured as a mux cable.
    /// Returns the number of ports taken under control.
    #[instrument(skip(self))]
    pub async fn init(&mut self) -> usize {
        let logicals: Vec<String> = self.mapping.logicals().to_vec();
        for logical in &logicals {
            if self.is_mux_cable(logical).await {
                self.init_port(logical).await;
            }
        }
        info!(ports = self.ports.len(), "Y-cable ports initialized");
        self.ports.len()
    }

    async fn is_mux_cable(&self, logical: &str) -> bool {
        let Some(asic) = self.mapping.asic_of(logical) else {
            return false;
        };
        let Some(table) = self.table(asic, XcvrTable::ConfigPort) else {
            return false;
        };
        match table.hget(logical, fields::MUX_CABLE).await {
            Ok(Some(value)) => value.eq_ignore_ascii_case("true"),
            Ok(None) => false,
            Err(e) => {
                warn!(port = logical, error = %e, "Cannot read port configuration");
                false
            }
        }
    }

    fn read_active_side(&self, logical: &str, ycable: &dyn YCablePort) -> u8 {
        match ycable.get_mux_direction() {
            Ok(side) => side,
            Err(e) => {
                warn!(port = logical, error = %e, "Cannot read active side, assuming none");
                0
            }
        }
    }

    /// Reads the port's sides from hardware and writes its mux state.
    pub async fn init_port(&mut self, logical: &str) -> bool {
        let Some(asic) = self.mapping.asic_of(logical) else {
            warn!(port = logical, "Unknown logical port");
            return false;
        };
        let Some(&physical) = self.mapping.physicals_of(logical).first() else {
            warn!(port = logical, "No physical port");
            return false;
        };
        let Some(ycable) = self.chassis.get_y_cable(physical) else {
            warn!(port = logical, physical, "Configured as mux cable but no Y-cable found");
            return false;
        };

        let read_side = match ycable.get_read_side() {
            Ok(side) if side == SIDE_A || side == SIDE_B => side,
            Ok(side) => {
                error!(port = logical, side, "Invalid read side, skipping port");
                return false;
            }
            Err(e) => {
                error!(port = logical, error = %e, "Cannot read read side, skipping port");
                return false;
            }
        };
        let active_side = self.read_active_side(logical, ycable.as_ref());

        let entry = YCablePortEntry {
            asic,
            physical,
            read_side,
            ycable,
        };
        let state = MuxState::new(read_side, active_side);
        self.write_state(logical, &entry, state).await;

        if let Some(table) = self.table(asic, XcvrTable::MuxCableStaticInfo) {
            if let Err(e) =
                telemetry::publish_static_info(&table, logical, entry.ycable.as_ref(), epoch_seconds()).await
            {
                warn!(port = logical, error = %e, "Failed to publish static info");
            }
        }

        self.spawn_peer_refresh(logical, &entry);
        info!(port = logical, physical, status = %state.status, read_side, active_side, "Y-cable port initialized");
        self.ports.insert(logical.to_string(), entry);
        true
    }

    async fn write_state(&self, logical: &str, entry: &YCablePortEntry, state: MuxState) {
        let Some(table) = self.table(entry.asic, XcvrTable::HwMuxCable) else {
            return;
        };
        if let Err(e) = table.set(logical, &state.to_field_values(epoch_seconds())).await {
            warn!(port = logical, error = %e, "Failed to write mux state");
        }
    }

    async fn current_status(&self, logical: &str, entry: &YCablePortEntry) -> Option<MuxStatus> {
        let table = self.table(entry.asic, XcvrTable::HwMuxCable)?;
        match table.hget(logical, fields::STATUS).await {
            Ok(status) => status.and_then(|s| s.parse().ok()),
            Err(e) => {
                warn!(port = logical, error = %e, "Cannot read mux state");
                None
            }
        }
    }

    /// Points the cable at `target`. Returns the active side afterwards.
    fn toggle(&self, logical: &str, entry: &YCablePortEntry, target: u8) -> u8 {
        let result = if target == SIDE_A {
            entry.ycable.toggle_mux_to_tor_a()
        } else {
            entry.ycable.toggle_mux_to_tor_b()
        };
        match result {
            Ok(true) => {
                info!(port = logical, target, "Toggled mux");
                target
            }
            Ok(false) => {
                warn!(port = logical, target, "Mux toggle refused, re-reading hardware");
                self.read_active_side(logical, entry.ycable.as_ref())
            }
            Err(e) => {
                warn!(port = logical, target, error = %e, "Mux toggle failed, re-reading hardware");
                self.read_active_side(logical, entry.ycable.as_ref())
            }
        }
    }

    /// Applies one APPL_DB mux request.
    #[instrument(skip(self, entry), fields(port = %entry.key))]
    pub async fn handle_request(&mut self, entry: &KeyOpFieldsValues) {
        if entry.op == Operation::Del {
            debug!("Mux request removed");
            return;
        }
        let Some(requested) = entry.get_field(fields::STATE) else {
            debug!("Mux request without state");
            return;
        };
        let requested: MuxStatus = match requested.parse() {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "Ignoring mux request");
                return;
            }
        };
        let Some(port) = self.ports.get(&entry.key).cloned() else {
            debug!("Not a managed Y-cable port");
            return;
        };

        if self.current_status(&entry.key, &port).await == Some(requested) {
            debug!(status = %requested, "Mux already in requested state");
            return;
        }
        let Some(target) = requested.target_side(port.read_side) else {
            warn!(status = %requested, "Cannot toggle mux to this state");
            return;
        };

        let active_side = self.toggle(&entry.key, &port, target);
        let state = MuxState::new(port.read_side, active_side);
        self.write_state(&entry.key, &port, state).await;
        if state.status != requested {
            warn!(requested = %requested, actual = %state.status, "Mux did not reach requested state");
        }
        self.spawn_peer_refresh(&entry.key, &port);
    }

    /// Reacts to a confirmed module transition.
    pub async fn handle_module_event(&mut self, event: &PortChangeEvent) {
        let logicals: Vec<String> = self.mapping.logicals_of(event.physical).to_vec();
        match event.state {
            ModuleState::Present => {
                for logical in &logicals {
                    if self.is_mux_cable(logical).await {
                        self.init_port(logical).await;
                    }
                }
            }
            ModuleState::Absent => {
                for logical in &logicals {
                    if self.ports.contains_key(logical) {
                        self.remove_port(logical).await;
                    }
                }
            }
            ModuleState::Error(code) => {
                warn!(physical = event.physical, code, "Module error on Y-cable port");
            }
        }
    }

    async fn remove_port(&mut self, logical: &str) {
        let Some(entry) = self.ports.remove(logical) else {
            return;
        };
        for table in XcvrTable::ycable_tables() {
            if let Some(table) = self.table(entry.asic, table) {
                if let Err(e) = table.del(logical).await {
                    warn!(port = logical, table = table.name(), error = %e, "Failed to delete Y-cable row");
                }
            }
        }
        info!(port = logical, "Y-cable port removed");
    }

    /// Refreshes MUX_CABLE_INFO for every managed port.
    pub async fn refresh_telemetry(&self) {
        let now = epoch_seconds();
        for (logical, entry) in &self.ports {
            let Some(table) = self.table(entry.asic, XcvrTable::MuxCableInfo) else {
                continue;
            };
            if let Err(e) = telemetry::publish_info(&table, logical, entry.ycable.as_ref(), now).await {
                warn!(port = %logical, error = %e, "Failed to publish Y-cable telemetry");
            }
        }
    }

    fn ports_on(&self, physical: u32) -> Vec<(String, YCablePortEntry)> {
        self.ports
            .iter()
            .filter(|(_, entry)| entry.physical == physical)
            .map(|(logical, entry)| (logical.clone(), entry.clone()))
            .collect()
    }

    /// Serves one request from the peer ToR.
    pub async fn handle_rpc(&mut self, request: PeerRequest) -> PeerResponse {
        match request {
            PeerRequest::QuerySide { portid } => {
                let Some((logical, entry)) = self.ports_on(portid).into_iter().next() else {
                    return PeerResponse::error(format!("no Y-cable on port {}", portid));
                };
                match entry.ycable.get_mux_direction() {
                    Ok(side) => PeerResponse::Side { side },
                    Err(e) => {
                        warn!(port = %logical, error = %e, "Peer side query failed");
                        PeerResponse::error(e.to_string())
                    }
                }
            }
            PeerRequest::QueryAdminPortState { portid } => {
                let state = portid
                    .iter()
                    .map(|id| match self.ports_on(*id).into_iter().next() {
                        Some((logical, entry)) => {
                            self.read_active_side(&logical, entry.ycable.as_ref()) == entry.read_side
                        }
                        None => false,
                    })
                    .collect();
                PeerResponse::PortState { portid, state }
            }
            PeerRequest::SetAdminPortForwardingState { portid, state } => {
                if portid.len() != state.len() {
                    return PeerResponse::error("portid and state lengths differ");
                }
                let mut result = Vec::with_capacity(portid.len());
                for (id, active) in portid.iter().zip(&state) {
                    result.push(self.set_forwarding_state(*id, *active).await);
                }
                PeerResponse::PortState {
                    portid,
                    state: result,
                }
            }
        }
    }

    async fn set_forwarding_state(&mut self, physical: u32, active: bool) -> bool {
        let ports = self.ports_on(physical);
        let Some((logical, entry)) = ports.first() else {
            return false;
        };
        let target = if active {
            entry.read_side
        } else {
            peer_side(entry.read_side)
        };
        info!(port = %logical, active, "Peer requested forwarding state");
        let active_side = self.toggle(logical, entry, target);
        let state = MuxState::new(entry.read_side, active_side);
        for (logical, entry) in &ports {
            self.write_state(logical, entry, state).await;
        }
        active_side == entry.read_side
    }

    fn spawn_peer_refresh(&mut self, logical: &str, entry: &YCablePortEntry) {
        let Some(client) = self.peer.clone() else {
            return;
        };
        let Some(table) = self.table(entry.asic, XcvrTable::HwMuxCablePeer) else {
            return;
        };
        self.peer_tasks.retain(|task| !task.is_finished());

        let logical = logical.to_string();
        let physical = entry.physical;
        let peer_read_side = peer_side(entry.read_side);
        self.peer_tasks.push(tokio::spawn(async move {
            match client.query_side(physical).await {
                Ok(side) => {
                    let status = MuxStatus::derive(peer_read_side, side);
                    let fvs = vec![
                        (fields::ACTIVE_SIDE.to_string(), side.to_string()),
                        (fields::STATE.to_string(), status.as_str().to_string()),
                        (fields::LAST_UPDATE_TIME.to_string(), epoch_seconds().to_string()),
                    ];
                    if let Err(e) = table.set(&logical, &fvs).await {
                        warn!(port = %logical, error = %e, "Failed to write peer mux state");
                    }
                }
                Err(e) => warn!(port = %logical, error = %e, "Peer query failed, trusting local state"),
            }
        }));
    }

    /// Deletes every Y-cable row this controller created.
    pub async fn deinit(&mut self) {
        for task in self.peer_tasks.drain(..) {
            task.abort();
            // cancelled tasks report JoinError
            let _ = task.await;
        }
        let logicals = self.managed_ports();
        for logical in &logicals {
            self.remove_port(logical).await;
        }
        info!(ports = logicals.len(), "Y-cable controller deinitialized");
    }

    /// Serves requests, module events and peer RPC until cancelled, then
    /// deinitializes.
    pub async fn run(
        mut self,
        mut requests: mpsc::UnboundedReceiver<KeyOpFieldsValues>,
        mut module_events: mpsc::UnboundedReceiver<PortChangeEvent>,
        mut rpc: mpsc::Receiver<RpcCommand>,
        telemetry_interval: Duration,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(telemetry_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(entry) = requests.recv() => self.handle_request(&entry).await,
                Some(event) = module_events.recv() => self.handle_module_event(&event).await,
                Some(command) = rpc.recv() => {
                    let response = self.handle_rpc(command.request).await;
                    // requester may have timed out
                    let _ = command.reply.send(response);
                }
                _ = ticker.tick() => self.refresh_telemetry().await,
            }
        }

        self.deinit().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonic_xcvr_common::platform::sim::{SimChassis, SimPortDescription, SimYCableDescription};
    use sonic_xcvr_common::{diag_dict, field_values, MemoryNamespace};

    struct Fixture {
        db: MemoryNamespace,
        chassis: Arc<SimChassis>,
        controller: YCableController,
    }

    async fn fixture(ports: &[(u32, Option<(u8, u8)>, bool)]) -> Fixture {
        let db = MemoryNamespace::new();
        let mut mapping = PortMapping::new();
        let mut chassis = SimChassis::new("test");
        let config = Table::new(db.config.clone(), "PORT");

        for (physical, ycable, mux_cable) in ports {
            let logical = format!("Ethernet{}", physical * 4);
            mapping.add_port(&logical, AsicId(0), vec![*physical]).unwrap();
            chassis.add_port(&SimPortDescription {
                index: *physical,
                present: true,
                ycable: ycable.map(|(read_side, active_side)| SimYCableDescription {
                    read_side,
                    active_side,
                    static_info: Some(diag_dict! { "vendor" => "Credo" }),
                    telemetry: Some(diag_dict! { "link_up" => true }),
                }),
                ..Default::default()
            });
            if *mux_cable {
                config
                    .set(&logical, &field_values! { "mux_cable" => "true" })
                    .await
                    .unwrap();
            }
        }

        let chassis = Arc::new(chassis);
        let connections = db.connections();
        let tables = TableHelper::new([(AsicId(0), &connections)]);
        let controller = YCableController::new(Arc::new(mapping), chassis.clone(), tables);
        Fixture {
            db,
            chassis,
            controller,
        }
    }

    fn row(f: &Fixture, key: &str) -> BTreeMap<String, String> {
        f.db.state.snapshot(key).unwrap_or_default()
    }

    #[tokio::test]
    async fn test_init_applies_mux_law() {
        let mut f = fixture(&[
            (1, Some((1, 1)), true),
            (2, Some((1, 2)), true),
            (3, Some((2, 0)), true),
            (4, Some((1, 1)), false),
            (5, None, false),
        ])
        .await;

        assert_eq!(f.controller.init().await, 3);

        assert_eq!(row(&f, "HW_MUX_CABLE_TABLE|Ethernet4")["status"], "active");
        assert_eq!(row(&f, "HW_MUX_CABLE_TABLE|Ethernet8")["status"], "standby");
        let inactive = row(&f, "HW_MUX_CABLE_TABLE|Ethernet12");
        assert_eq!(inactive["status"], "inactive");
        assert_eq!(inactive["read_side"], "2");
        assert_eq!(inactive["active_side"], "0");
        assert!(f.db.state.snapshot("HW_MUX_CABLE_TABLE|Ethernet16").is_none());
        assert_eq!(row(&f, "MUX_CABLE_STATIC_INFO|Ethernet4")["vendor"], "Credo");
    }

    #[tokio::test]
    async fn test_init_read_side_failure_skips_port() {
        let mut f = fixture(&[(1, Some((1, 1)), true)]).await;
        f.chassis.sim_y_cable(1).unwrap().set_read_side_fails(true);
        assert_eq!(f.controller.init().await, 0);
        assert!(f.db.state.snapshot("HW_MUX_CABLE_TABLE|Ethernet4").is_none());
    }

    #[tokio::test]
    async fn test_init_active_side_failure_is_inactive() {
        let mut f = fixture(&[(1, Some((1, 1)), true)]).await;
        f.chassis.sim_y_cable(1).unwrap().set_direction_fails(true);
        assert_eq!(f.controller.init().await, 1);
        assert_eq!(row(&f, "HW_MUX_CABLE_TABLE|Ethernet4")["status"], "inactive");
    }

    #[tokio::test]
    async fn test_request_toggles_to_tor_a() {
        let mut f = fixture(&[(1, Some((1, 2)), true)]).await;
        f.controller.init().await;

        f.controller
            .handle_request(&KeyOpFieldsValues::set(
                "Ethernet4",
                field_values! { "state" => "active" },
            ))
            .await;

        let ycable = f.chassis.sim_y_cable(1).unwrap();
        assert_eq!(ycable.toggles(), vec![1]);
        let state = row(&f, "HW_MUX_CABLE_TABLE|Ethernet4");
        assert_eq!(state["status"], "active");
        assert_eq!(state["read_side"], "1");
        assert_eq!(state["active_side"], "1");
    }

    #[tokio::test]
    async fn test_request_standby_on_tor_b() {
        let mut f = fixture(&[(1, Some((2, 2)), true)]).await;
        f.controller.init().await;

        f.controller
            .handle_request(&KeyOpFieldsValues::set(
                "Ethernet4",
                field_values! { "state" => "standby" },
            ))
            .await;

        assert_eq!(f.chassis.sim_y_cable(1).unwrap().toggles(), vec![1]);
        assert_eq!(row(&f, "HW_MUX_CABLE_TABLE|Ethernet4")["status"], "standby");
    }

    #[tokio::test]
    async fn test_request_without_change_is_noop() {
        let mut f = fixture(&[(1, Some((1, 1)), true)]).await;
        f.controller.init().await;
        f.db.state.clear_journal();

        f.controller
            .handle_request(&KeyOpFieldsValues::set(
                "Ethernet4",
                field_values! { "state" => "active" },
            ))
            .await;

        assert!(f.chassis.sim_y_cable(1).unwrap().toggles().is_empty());
        assert!(f.db.state.journal().is_empty());
    }

    #[tokio::test]
    async fn test_failed_toggle_rereads_hardware() {
        let mut f = fixture(&[(1, Some((1, 2)), true)]).await;
        f.controller.init().await;
        f.chassis.sim_y_cable(1).unwrap().set_toggle_accepts(None);

        f.controller
            .handle_request(&KeyOpFieldsValues::set(
                "Ethernet4",
                field_values! { "state" => "active" },
            ))
            .await;

        let state = row(&f, "HW_MUX_CABLE_TABLE|Ethernet4");
        assert_eq!(state["status"], "standby");
        assert_eq!(state["active_side"], "2");
    }

    #[tokio::test]
    async fn test_request_for_unmanaged_port_ignored() {
        let mut f = fixture(&[(1, Some((1, 2)), false)]).await;
        f.controller.init().await;
        f.controller
            .handle_request(&KeyOpFieldsValues::set(
                "Ethernet4",
                field_values! { "state" => "active" },
            ))
            .await;
        assert!(f.chassis.sim_y_cable(1).unwrap().toggles().is_empty());
    }

    #[tokio::test]
    async fn test_module_removal_and_insertion() {
        let mut f = fixture(&[(1, Some((1, 1)), true)]).await;
        f.controller.init().await;

        f.controller
            .handle_module_event(&PortChangeEvent {
                physical: 1,
                state: ModuleState::Absent,
            })
            .await;
        assert!(f.controller.managed_ports().is_empty());
        assert!(f.db.state.snapshot("HW_MUX_CABLE_TABLE|Ethernet4").is_none());
        assert!(f.db.state.snapshot("MUX_CABLE_STATIC_INFO|Ethernet4").is_none());

        f.controller
            .handle_module_event(&PortChangeEvent {
                physical: 1,
                state: ModuleState::Present,
            })
            .await;
        assert_eq!(f.controller.managed_ports(), vec!["Ethernet4"]);
        assert_eq!(row(&f, "HW_MUX_CABLE_TABLE|Ethernet4")["status"], "active");
    }

    #[tokio::test]
    async fn test_rpc_requests() {
        let mut f = fixture(&[(1, Some((1, 2)), true), (2, Some((1, 1)), true)]).await;
        f.controller.init().await;

        assert_eq!(
            f.controller.handle_rpc(PeerRequest::QuerySide { portid: 1 }).await,
            PeerResponse::Side { side: 2 }
        );
        assert!(matches!(
            f.controller.handle_rpc(PeerRequest::QuerySide { portid: 9 }).await,
            PeerResponse::Error { .. }
        ));
        assert_eq!(
            f.controller
                .handle_rpc(PeerRequest::QueryAdminPortState { portid: vec![1, 2] })
                .await,
            PeerResponse::PortState {
                portid: vec![1, 2],
                state: vec![false, true]
            }
        );

        let response = f
            .controller
            .handle_rpc(PeerRequest::SetAdminPortForwardingState {
                portid: vec![1],
                state: vec![true],
            })
            .await;
        assert_eq!(
            response,
            PeerResponse::PortState {
                portid: vec![1],
                state: vec![true]
            }
        );
        assert_eq!(row(&f, "HW_MUX_CABLE_TABLE|Ethernet4")["status"], "active");
    }

    #[tokio::test]
    async fn test_telemetry_and_deinit() {
        let mut f = fixture(&[(1, Some((1, 1)), true)]).await;
        f.controller.init().await;
        f.controller.refresh_telemetry().await;
        assert_eq!(row(&f, "MUX_CABLE_INFO|Ethernet4")["link_up"], "True");

        f.controller.deinit().await;
        for table in ["HW_MUX_CABLE_TABLE", "MUX_CABLE_INFO", "MUX_CABLE_STATIC_INFO"] {
            assert!(f.db.state.snapshot(&format!("{}|Ethernet4", table)).is_none());
        }
    }
}

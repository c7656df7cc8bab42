//! State event loop.
//!
//! Blocks on the platform change-event source and turns raw module states
//! into confirmed transitions. Insertions soak before they are believed;
//! removals and errors apply at once. Every confirmed transition updates
//! TRANSCEIVER_STATUS and is handed to the registered sinks.
//!
//! The change-event call may block for its whole timeout, so the loop runs on
//! its own OS thread with its own current-thread runtime.

use crate::publisher::{DiagPublisher, PublishOptions};
use sonic_xcvr_common::config::StateLoopConfig;
use sonic_xcvr_common::status::error_description;
use sonic_xcvr_common::tables::fields;
use sonic_xcvr_common::{
    epoch_seconds, AsicId, Capability, ChangeEvent, ChangeEventSink, Chassis, ModuleState,
    PortChangeEvent, PortMapping, Result, Sfp, TableHelper, XcvrTable,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Why the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateLoopExit {
    /// Stop was requested.
    Stopped,
    /// The platform has no change-event source.
    NotImplemented,
    /// The change-event source failed too many times in a row.
    SfpError,
}

/// Raw insertions waiting out their dwell.
#[derive(Debug)]
pub struct InsertionSoak {
    pending: HashMap<u32, Instant>,
    soak: Duration,
}

impl InsertionSoak {
    pub fn new(soak: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            soak,
        }
    }

    /// Stamps a raw insertion. A port already soaking keeps its first stamp.
    pub fn insert(&mut self, physical: u32, now: Instant) {
        self.pending.entry(physical).or_insert(now);
    }

    /// Drops a pending insertion; true if one was pending.
    pub fn cancel(&mut self, physical: u32) -> bool {
        self.pending.remove(&physical).is_some()
    }

    /// Removes and returns the ports whose dwell has elapsed, in port order.
    pub fn promote(&mut self, now: Instant) -> Vec<u32> {
        let mut ready: Vec<u32> = self
            .pending
            .iter()
            .filter(|(_, stamp)| now.saturating_duration_since(**stamp) >= self.soak)
            .map(|(physical, _)| *physical)
            .collect();
        ready.sort_unstable();
        for physical in &ready {
            self.pending.remove(physical);
        }
        ready
    }

    pub fn is_pending(&self, physical: u32) -> bool {
        self.pending.contains_key(&physical)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// The change-event consumer.
pub struct StateEventLoop {
    chassis: Arc<dyn Chassis>,
    mapping: Arc<PortMapping>,
    tables: TableHelper,
    publisher: DiagPublisher,
    config: StateLoopConfig,
    soak: InsertionSoak,
    states: HashMap<u32, ModuleState>,
    sinks: Vec<Box<dyn ChangeEventSink>>,
    failures: u32,
    sfp_error: Arc<AtomicBool>,
}

impl StateEventLoop {
    pub fn new(
        config: &StateLoopConfig,
        mapping: Arc<PortMapping>,
        chassis: Arc<dyn Chassis>,
        tables: TableHelper,
    ) -> Self {
        Self {
            publisher: DiagPublisher::new(mapping.clone(), chassis.clone()),
            chassis,
            mapping,
            tables,
            soak: InsertionSoak::new(config.insert_soak()),
            config: config.clone(),
            states: HashMap::new(),
            sinks: Vec::new(),
            failures: 0,
            sfp_error: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Registers a receiver of confirmed transitions.
    pub fn add_sink(&mut self, sink: impl ChangeEventSink + 'static) {
        self.sinks.push(Box::new(sink));
    }

    /// Known states, seeded by the supervisor from module presence.
    pub fn set_initial_states(&mut self, states: impl IntoIterator<Item = (u32, ModuleState)>) {
        self.states.extend(states);
    }

    /// Flag raised when the change-event source has failed for good.
    pub fn sfp_error_flag(&self) -> Arc<AtomicBool> {
        self.sfp_error.clone()
    }

    pub fn state_of(&self, physical: u32) -> Option<ModuleState> {
        self.states.get(&physical).copied()
    }

    pub fn is_soaking(&self, physical: u32) -> bool {
        self.soak.is_pending(physical)
    }

    /// Blocking wait for the next batch.
    pub fn wait_timeout(&self) -> Duration {
        if self.soak.has_pending() {
            self.config.select_timeout()
        } else {
            self.config.retry_period()
        }
    }

    /// Consumes one answer of the change-event source observed at `now`.
    /// Returns the exit reason when the loop must end.
    pub async fn handle_event(
        &mut self,
        event: Capability<ChangeEvent>,
        now: Instant,
    ) -> Option<StateLoopExit> {
        let event = match event {
            Capability::Value(event) => event,
            Capability::NotImplemented => {
                error!("Platform has no change-event source");
                return Some(StateLoopExit::NotImplemented);
            }
        };

        if !event.success {
            self.failures += 1;
            warn!(failures = self.failures, max = self.config.max_event_failures, "Change-event source failed");
            if self.failures >= self.config.max_event_failures {
                error!(failures = self.failures, "Change-event source keeps failing, giving up");
                self.sfp_error.store(true, Ordering::SeqCst);
                return Some(StateLoopExit::SfpError);
            }
        } else {
            self.failures = 0;
            self.process_batch(&event, now).await;
        }

        for physical in self.soak.promote(now) {
            self.apply(physical, ModuleState::Present, None).await;
        }
        None
    }

    async fn process_batch(&mut self, event: &ChangeEvent, now: Instant) {
        for (physical, raw) in &event.port_states {
            let Some(state) = ModuleState::from_raw(raw) else {
                warn!(port = physical, raw = %raw, "Unparsable module state");
                continue;
            };
            debug!(port = physical, %state, "Raw module state");
            match state {
                ModuleState::Present => {
                    if self.states.get(physical) == Some(&ModuleState::Present) {
                        continue;
                    }
                    self.soak.insert(*physical, now);
                }
                ModuleState::Absent => {
                    if self.soak.cancel(*physical) {
                        info!(port = physical, "Insertion withdrawn before soak elapsed");
                    }
                    if self.states.get(physical) != Some(&ModuleState::Absent) {
                        self.apply(*physical, state, None).await;
                    }
                }
                ModuleState::Error(_) => {
                    self.soak.cancel(*physical);
                    if self.states.get(physical) == Some(&state) {
                        continue;
                    }
                    let description = event.port_errors.get(physical).cloned();
                    self.apply(*physical, state, description).await;
                }
            }
        }
    }

    /// Records a confirmed transition and tells the sinks.
    async fn apply(&mut self, physical: u32, state: ModuleState, description: Option<String>) {
        info!(port = physical, %state, "Module state changed");
        self.record(physical, state, description).await;

        let event = PortChangeEvent { physical, state };
        for sink in &self.sinks {
            sink.notify(event.clone());
        }
    }

    /// Writes the rows of a module state for every logical port it carries.
    async fn record(&mut self, physical: u32, state: ModuleState, description: Option<String>) {
        self.states.insert(physical, state);

        let error = match state {
            ModuleState::Error(code) => description.unwrap_or_else(|| error_description(code)),
            _ => fields::ERROR_NONE.to_string(),
        };
        let row = [
            (fields::STATUS.to_string(), state.code().to_string()),
            (fields::ERROR.to_string(), error),
            (fields::LAST_UPDATE_TIME.to_string(), epoch_seconds().to_string()),
        ];

        for logical in self.mapping.logicals_of(physical).to_vec() {
            let Some(asic) = self.mapping.asic_of(&logical) else {
                continue;
            };
            if let Some(status) = self.tables.get(asic, XcvrTable::Status) {
                if let Err(e) = status.set(&logical, &row).await {
                    warn!(port = %logical, error = %e, "Failed to write module status");
                }
            }
            match state {
                ModuleState::Present => self.publish_inserted(asic, &logical).await,
                ModuleState::Absent => self.clear_removed(asic, &logical).await,
                ModuleState::Error(_) => {}
            }
        }
    }

    /// Writes the startup rows: a status row for every port, identity and
    /// thresholds for present modules, no stale diagnostics for absent ones.
    /// Sinks are not told; they read the hardware themselves at init.
    pub async fn populate(&mut self, states: BTreeMap<u32, ModuleState>) {
        let present = states.values().filter(|s| **s == ModuleState::Present).count();
        for (physical, state) in states {
            self.record(physical, state, None).await;
        }
        info!(present, ports = self.states.len(), "Initial module states written");
    }

    async fn publish_inserted(&self, asic: AsicId, logical: &str) {
        if let Some(table) = self.tables.get(asic, XcvrTable::TransceiverInfo) {
            self.publisher
                .publish(logical, table, |s: &dyn Sfp| s.get_transceiver_info(), PublishOptions {
                    beautify: true,
                    ..Default::default()
                })
                .await;
        }
        if let Some(table) = self.tables.get(asic, XcvrTable::DomThreshold) {
            self.publisher
                .publish(
                    logical,
                    table,
                    |s: &dyn Sfp| s.get_transceiver_dom_thresholds(),
                    PublishOptions {
                        flat_memory_guard: true,
                        beautify: true,
                        ..Default::default()
                    },
                )
                .await;
        }
    }

    async fn clear_removed(&self, asic: AsicId, logical: &str) {
        for table in XcvrTable::diagnostic_tables() {
            let Some(table) = self.tables.get(asic, table) else {
                continue;
            };
            if let Err(e) = table.del(logical).await {
                warn!(port = logical, table = table.name(), error = %e, "Failed to delete row");
            }
        }
    }

    /// Runs until `stop` is cancelled or the source fails for good, in which
    /// case `stop` is cancelled on the way out.
    pub async fn run(mut self, stop: CancellationToken) -> StateLoopExit {
        info!(ports = self.mapping.physical_ports().count(), "State event loop started");
        loop {
            if stop.is_cancelled() {
                break;
            }
            let event = self.chassis.get_change_event(self.wait_timeout());
            let failed = matches!(&event, Capability::Value(e) if !e.success);

            if let Some(exit) = self.handle_event(event, Instant::now()).await {
                stop.cancel();
                return exit;
            }
            if failed {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = tokio::time::sleep(self.config.retry_period()) => {}
                }
            }
        }
        info!("State event loop stopped");
        StateLoopExit::Stopped
    }

    /// Starts the loop on its own thread.
    pub fn spawn(self, stop: CancellationToken) -> Result<StateLoopHandle> {
        let grace = Duration::from_secs(self.config.join_grace_secs);
        let (tx, rx) = oneshot::channel();
        let thread = thread::Builder::new()
            .name("xcvrd-state".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!(error = %e, "Cannot build state loop runtime");
                        stop.cancel();
                        let _ = tx.send(StateLoopExit::Stopped);
                        return;
                    }
                };
                let exit = runtime.block_on(self.run(stop));
                // the supervisor may have stopped waiting
                let _ = tx.send(exit);
            })?;

        Ok(StateLoopHandle {
            thread,
            exit: rx,
            grace,
        })
    }
}

/// A running state loop thread.
#[derive(Debug)]
pub struct StateLoopHandle {
    thread: thread::JoinHandle<()>,
    exit: oneshot::Receiver<StateLoopExit>,
    grace: Duration,
}

impl StateLoopHandle {
    /// Waits up to the grace window for the loop to end. On expiry the thread
    /// is detached.
    pub async fn join(self) -> StateLoopExit {
        match tokio::time::timeout(self.grace, self.exit).await {
            Ok(Ok(exit)) => {
                let thread = self.thread;
                match tokio::task::spawn_blocking(move || thread.join()).await {
                    Ok(Ok(())) => {}
                    _ => warn!("State loop thread did not exit cleanly"),
                }
                exit
            }
            Ok(Err(_)) => {
                error!("State loop thread ended without an exit reason");
                StateLoopExit::Stopped
            }
            Err(_) => {
                warn!(grace = ?self.grace, "State loop still blocked, detaching thread");
                StateLoopExit::Stopped
            }
        }
    }
}

/// Module states at startup, from presence. Unknown presence reads as absent.
pub fn initial_states(mapping: &PortMapping, chassis: &dyn Chassis) -> BTreeMap<u32, ModuleState> {
    mapping
        .physical_ports()
        .map(|physical| {
            let present = chassis
                .get_sfp(physical)
                .map(|sfp| sfp.get_presence() == Capability::Value(true))
                .unwrap_or(false);
            let state = if present {
                ModuleState::Present
            } else {
                ModuleState::Absent
            };
            (physical, state)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sonic_xcvr_common::platform::sim::{SimChassis, SimPortDescription};
    use sonic_xcvr_common::{diag_dict, MemoryNamespace};
    use tokio::sync::mpsc;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn test_soak_keeps_first_stamp() {
        let t0 = Instant::now();
        let mut soak = InsertionSoak::new(ms(2000));
        soak.insert(1, t0);
        soak.insert(1, t0 + ms(1500));
        assert!(soak.promote(t0 + ms(1999)).is_empty());
        assert_eq!(soak.promote(t0 + ms(2000)), vec![1]);
        assert!(!soak.has_pending());
    }

    #[test]
    fn test_soak_cancel() {
        let t0 = Instant::now();
        let mut soak = InsertionSoak::new(ms(2000));
        soak.insert(3, t0);
        soak.insert(1, t0);
        assert!(soak.cancel(3));
        assert!(!soak.cancel(3));
        assert_eq!(soak.promote(t0 + ms(5000)), vec![1]);
    }

    struct Fixture {
        db: MemoryNamespace,
        state_loop: StateEventLoop,
        events: mpsc::UnboundedReceiver<PortChangeEvent>,
    }

    fn fixture() -> Fixture {
        let db = MemoryNamespace::new();
        let mut mapping = PortMapping::new();
        mapping.add_port("Ethernet0", AsicId(0), vec![1]).unwrap();
        mapping.add_port("Ethernet4", AsicId(0), vec![2]).unwrap();
        let mut chassis = SimChassis::new("test");
        for index in [1, 2] {
            chassis.add_port(&SimPortDescription {
                index,
                present: true,
                info: Some(diag_dict! { "manufacturer" => "ACME" }),
                dom_thresholds: Some(diag_dict! { "temphighalarm" => "75.0C" }),
                ..Default::default()
            });
        }
        let connections = db.connections();
        let tables = TableHelper::new([(AsicId(0), &connections)]);
        let mut state_loop = StateEventLoop::new(
            &StateLoopConfig::default(),
            Arc::new(mapping),
            Arc::new(chassis),
            tables,
        );
        let (tx, events) = mpsc::unbounded_channel();
        state_loop.add_sink(tx);
        Fixture {
            db,
            state_loop,
            events,
        }
    }

    fn status_writes(db: &MemoryNamespace, port: &str, status: &str) -> usize {
        let key = format!("TRANSCEIVER_STATUS|{}", port);
        db.state
            .journal()
            .iter()
            .filter(|e| e.key == key && e.fvs.iter().any(|(f, v)| f == "status" && v == status))
            .count()
    }

    fn batch(states: &[(u32, &str)]) -> Capability<ChangeEvent> {
        let mut event = ChangeEvent::empty();
        for (physical, raw) in states {
            event = event.with_state(*physical, *raw);
        }
        Capability::Value(event)
    }

    #[tokio::test]
    async fn test_clean_insert() {
        let mut f = fixture();
        let t0 = Instant::now();

        f.state_loop.handle_event(batch(&[(1, "0")]), t0).await;
        f.state_loop.handle_event(batch(&[(1, "1")]), t0 + ms(1000)).await;
        f.state_loop.handle_event(batch(&[(1, "1")]), t0 + ms(1500)).await;
        f.state_loop.handle_event(batch(&[]), t0 + ms(2500)).await;
        assert_eq!(status_writes(&f.db, "Ethernet0", "1"), 0);
        assert!(f.state_loop.is_soaking(1));

        f.state_loop.handle_event(batch(&[]), t0 + ms(3000)).await;
        f.state_loop.handle_event(batch(&[(1, "1")]), t0 + ms(3500)).await;
        f.state_loop.handle_event(batch(&[]), t0 + ms(6000)).await;

        assert_eq!(status_writes(&f.db, "Ethernet0", "1"), 1);
        assert_eq!(f.state_loop.state_of(1), Some(ModuleState::Present));
        let info = f.db.state.snapshot("TRANSCEIVER_INFO|Ethernet0").unwrap();
        assert_eq!(info["manufacturer"], "ACME");
        assert!(f.db.state.snapshot("TRANSCEIVER_DOM_THRESHOLD|Ethernet0").is_some());

        assert_eq!(
            f.events.try_recv().unwrap(),
            PortChangeEvent { physical: 1, state: ModuleState::Absent }
        );
        assert_eq!(
            f.events.try_recv().unwrap(),
            PortChangeEvent { physical: 1, state: ModuleState::Present }
        );
        assert!(f.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_spurious_bounce() {
        let mut f = fixture();
        f.state_loop.set_initial_states([(1, ModuleState::Absent)]);
        let t0 = Instant::now();

        f.state_loop.handle_event(batch(&[(1, "1")]), t0).await;
        f.state_loop.handle_event(batch(&[(1, "0")]), t0 + ms(1500)).await;
        f.state_loop.handle_event(batch(&[]), t0 + ms(5000)).await;

        assert_eq!(status_writes(&f.db, "Ethernet0", "1"), 0);
        assert_eq!(f.state_loop.state_of(1), Some(ModuleState::Absent));
        assert!(f.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_error_recorded_verbatim() {
        let mut f = fixture();
        let t0 = Instant::now();
        let event = ChangeEvent::empty().with_state(2, "3");
        f.state_loop.handle_event(Capability::Value(event), t0).await;

        let row = f.db.state.snapshot("TRANSCEIVER_STATUS|Ethernet4").unwrap();
        assert_eq!(row["status"], "3");
        assert_eq!(row["error"], "Bus stuck (I2C data or clock shorted)");
        assert_eq!(f.state_loop.state_of(2), Some(ModuleState::Error(3)));

        let event = ChangeEvent::empty()
            .with_state(2, "16")
            .with_error(2, "Module too hot");
        f.state_loop.handle_event(Capability::Value(event), t0).await;
        let row = f.db.state.snapshot("TRANSCEIVER_STATUS|Ethernet4").unwrap();
        assert_eq!(row["status"], "16");
        assert_eq!(row["error"], "Module too hot");
    }

    #[tokio::test]
    async fn test_status_rows_carry_update_time() {
        let mut f = fixture();
        let t0 = Instant::now();
        let before = epoch_seconds();
        f.state_loop.handle_event(batch(&[(1, "0"), (2, "3")]), t0).await;

        for port in ["Ethernet0", "Ethernet4"] {
            let row = f.db.state.snapshot(&format!("TRANSCEIVER_STATUS|{}", port)).unwrap();
            let stamp: i64 = row
                .get("last_update_time")
                .unwrap_or_else(|| panic!("{} status row has no last_update_time", port))
                .parse()
                .unwrap();
            assert!(stamp >= before);
        }
    }

    #[tokio::test]
    async fn test_repeated_error_applied_once() {
        let mut f = fixture();
        let t0 = Instant::now();
        for step in 0..5 {
            f.state_loop.handle_event(batch(&[(2, "3")]), t0 + ms(step * 100)).await;
        }

        assert_eq!(status_writes(&f.db, "Ethernet4", "3"), 1);
        assert_eq!(
            f.events.try_recv().unwrap(),
            PortChangeEvent { physical: 2, state: ModuleState::Error(3) }
        );
        assert!(f.events.try_recv().is_err());

        // a different code is a new transition
        f.state_loop.handle_event(batch(&[(2, "16")]), t0 + ms(1000)).await;
        assert_eq!(status_writes(&f.db, "Ethernet4", "16"), 1);
        assert_eq!(f.events.try_recv().unwrap().state, ModuleState::Error(16));
    }

    #[tokio::test]
    async fn test_error_cancels_pending_insertion() {
        let mut f = fixture();
        let t0 = Instant::now();
        f.state_loop.handle_event(batch(&[(1, "1")]), t0).await;
        f.state_loop.handle_event(batch(&[(1, "2")]), t0 + ms(500)).await;
        f.state_loop.handle_event(batch(&[]), t0 + ms(3000)).await;

        assert_eq!(status_writes(&f.db, "Ethernet0", "1"), 0);
        assert_eq!(f.state_loop.state_of(1), Some(ModuleState::Error(2)));
    }

    #[tokio::test]
    async fn test_removal_clears_diagnostics() {
        let mut f = fixture();
        f.state_loop.set_initial_states([(1, ModuleState::Present)]);
        for table in ["TRANSCEIVER_INFO", "TRANSCEIVER_DOM_SENSOR", "TRANSCEIVER_VDM_LWARN_FLAG"] {
            sonic_xcvr_common::Table::new(f.db.state.clone(), table)
                .set("Ethernet0", &[("x".to_string(), "1".to_string())])
                .await
                .unwrap();
        }

        f.state_loop.handle_event(batch(&[(1, "0")]), Instant::now()).await;

        assert!(f.db.state.snapshot("TRANSCEIVER_INFO|Ethernet0").is_none());
        assert!(f.db.state.snapshot("TRANSCEIVER_DOM_SENSOR|Ethernet0").is_none());
        assert!(f.db.state.snapshot("TRANSCEIVER_VDM_LWARN_FLAG|Ethernet0").is_none());
        let status = f.db.state.snapshot("TRANSCEIVER_STATUS|Ethernet0").unwrap();
        assert_eq!(status["status"], "0");
        assert_eq!(status["error"], "N/A");
    }

    #[tokio::test]
    async fn test_failures_raise_sfp_error() {
        let mut f = fixture();
        let flag = f.state_loop.sfp_error_flag();
        let t0 = Instant::now();

        for _ in 0..23 {
            assert_eq!(
                f.state_loop
                    .handle_event(Capability::Value(ChangeEvent::failed()), t0)
                    .await,
                None
            );
        }
        // a good batch resets the count
        f.state_loop.handle_event(batch(&[]), t0).await;
        for _ in 0..23 {
            f.state_loop
                .handle_event(Capability::Value(ChangeEvent::failed()), t0)
                .await;
        }
        assert!(!flag.load(Ordering::SeqCst));
        assert_eq!(
            f.state_loop
                .handle_event(Capability::Value(ChangeEvent::failed()), t0)
                .await,
            Some(StateLoopExit::SfpError)
        );
        assert!(flag.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_not_implemented_source() {
        let mut f = fixture();
        assert_eq!(
            f.state_loop
                .handle_event(Capability::NotImplemented, Instant::now())
                .await,
            Some(StateLoopExit::NotImplemented)
        );
    }

    #[tokio::test]
    async fn test_wait_timeout_follows_soak() {
        let mut f = fixture();
        assert_eq!(f.state_loop.wait_timeout(), ms(5000));
        f.state_loop.handle_event(batch(&[(2, "1")]), Instant::now()).await;
        assert_eq!(f.state_loop.wait_timeout(), ms(1000));
    }

    #[test]
    fn test_initial_states_from_presence() {
        let mut mapping = PortMapping::new();
        mapping.add_port("Ethernet0", AsicId(0), vec![1]).unwrap();
        mapping.add_port("Ethernet4", AsicId(0), vec![2]).unwrap();
        mapping.add_port("Ethernet8", AsicId(0), vec![3]).unwrap();
        let mut chassis = SimChassis::new("test");
        chassis.add_port(&SimPortDescription {
            index: 1,
            present: true,
            ..Default::default()
        });
        chassis.add_port(&SimPortDescription {
            index: 2,
            present: false,
            ..Default::default()
        });

        let states = initial_states(&mapping, &chassis);
        assert_eq!(
            states.into_iter().collect::<Vec<_>>(),
            vec![
                (1, ModuleState::Present),
                (2, ModuleState::Absent),
                (3, ModuleState::Absent),
            ]
        );
    }

    #[tokio::test]
    async fn test_populate_writes_startup_rows() {
        let mut f = fixture();
        f.state_loop
            .populate(BTreeMap::from([(1, ModuleState::Present), (2, ModuleState::Absent)]))
            .await;

        let status = f.db.state.snapshot("TRANSCEIVER_STATUS|Ethernet0").unwrap();
        assert_eq!(status["status"], "1");
        assert_eq!(status["error"], "N/A");
        assert!(f.db.state.snapshot("TRANSCEIVER_INFO|Ethernet0").is_some());
        assert_eq!(f.db.state.snapshot("TRANSCEIVER_STATUS|Ethernet4").unwrap()["status"], "0");
        assert!(f.db.state.snapshot("TRANSCEIVER_INFO|Ethernet4").is_none());
        assert!(f.events.try_recv().is_err());

        // a repeated insert of a populated module is not a transition
        f.state_loop.handle_event(batch(&[(1, "1")]), Instant::now()).await;
        assert!(!f.state_loop.is_soaking(1));
    }

    #[tokio::test]
    async fn test_thread_stops_on_cancel() {
        let f = fixture();
        let stop = CancellationToken::new();
        stop.cancel();
        let handle = f.state_loop.spawn(stop).unwrap();
        assert_eq!(handle.join().await, StateLoopExit::Stopped);
    }

    #[tokio::test]
    async fn test_thread_reports_not_implemented() {
        let db = MemoryNamespace::new();
        let chassis = SimChassis::new("test");
        chassis.set_change_event_supported(false);
        let connections = db.connections();
        let state_loop = StateEventLoop::new(
            &StateLoopConfig::default(),
            Arc::new(PortMapping::new()),
            Arc::new(chassis),
            TableHelper::new([(AsicId(0), &connections)]),
        );
        let stop = CancellationToken::new();
        let handle = state_loop.spawn(stop.clone()).unwrap();
        assert_eq!(handle.join().await, StateLoopExit::NotImplemented);
        assert!(stop.is_cancelled());
    }
}

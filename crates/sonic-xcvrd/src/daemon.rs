//! Daemon supervisor.
//!
//! init → start loops → wait for stop → deinit. Loops are stopped in reverse
//! start order: the Y-cable controller, then the state event loop, then the
//! info update loop.

use crate::info_loop::InfoUpdateLoop;
use crate::state_loop::{initial_states, StateEventLoop, StateLoopExit};
use sonic_xcvr_common::{
    AsicId, Chassis, DaemonExit, DbConnections, PortMapping, Result, SystemdNotifier, TableHelper,
    XcvrdConfig,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Everything the daemon runs on, resolved at init.
pub struct Supervisor {
    config: XcvrdConfig,
    mapping: Arc<PortMapping>,
    chassis: Arc<dyn Chassis>,
    connections: Vec<(AsicId, DbConnections)>,
    notifier: SystemdNotifier,
}

impl Supervisor {
    pub fn new(
        config: XcvrdConfig,
        mapping: Arc<PortMapping>,
        chassis: Arc<dyn Chassis>,
        connections: Vec<(AsicId, DbConnections)>,
    ) -> Self {
        Self {
            config,
            mapping,
            chassis,
            connections,
            notifier: SystemdNotifier::new(),
        }
    }

    pub fn with_notifier(mut self, notifier: SystemdNotifier) -> Self {
        self.notifier = notifier;
        self
    }

    /// One table helper per loop; handles are not shared between loops.
    fn tables(&self) -> TableHelper {
        TableHelper::new(self.connections.iter().map(|(asic, conns)| (*asic, conns)))
    }

    /// Runs until `stop` is cancelled, by a signal or by a fatal state loop.
    pub async fn run(self, stop: CancellationToken) -> Result<DaemonExit> {
        for asic in self.mapping.namespaces() {
            if !self.connections.iter().any(|(connected, _)| *connected == asic) {
                warn!(%asic, "No database connection for namespace, its ports are not published");
            }
        }

        let mut state_loop = StateEventLoop::new(
            &self.config.state_loop,
            self.mapping.clone(),
            self.chassis.clone(),
            self.tables(),
        );
        state_loop
            .populate(initial_states(&self.mapping, self.chassis.as_ref()))
            .await;

        let (removals_tx, removals_rx) = mpsc::unbounded_channel();
        state_loop.add_sink(removals_tx);
        let info_cancel = CancellationToken::new();
        let info_loop = InfoUpdateLoop::new(
            &self.config,
            self.mapping.clone(),
            self.chassis.clone(),
            self.tables(),
        )
        .with_module_events(removals_rx);
        let info_task = tokio::spawn(info_loop.run(info_cancel.clone()));

        let ycable = if self.config.ycable.enabled {
            let started = sonic_ycabled::start(
                &self.config,
                self.mapping.clone(),
                self.chassis.clone(),
                self.tables(),
                &stop,
            )
            .await;
            let handle = match started {
                Ok(handle) => handle,
                Err(e) => {
                    info_cancel.cancel();
                    return Err(e);
                }
            };
            state_loop.add_sink(handle.event_sink());
            Some(handle)
        } else {
            info!("Y-cable support disabled");
            None
        };

        let sfp_error = state_loop.sfp_error_flag();
        let state_thread = state_loop.spawn(stop.clone())?;

        if let Err(e) = self.notifier.notify_ready() {
            warn!(error = %e, "systemd ready notification failed");
        }
        let ports = self.mapping.logicals().len();
        if let Err(e) = self.notifier.notify_status(&format!("Monitoring {} ports", ports)) {
            debug!(error = %e, "systemd status notification failed");
        }
        info!(ports, "xcvrd running");

        let mut heartbeat = tokio::time::interval(self.config.heartbeat());
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = heartbeat.tick() => {
                    debug!("Heartbeat");
                    if let Err(e) = self.notifier.notify_watchdog() {
                        warn!(error = %e, "systemd watchdog notification failed");
                    }
                }
            }
        }

        info!("Stopping");
        if let Err(e) = self.notifier.notify_stopping() {
            debug!(error = %e, "systemd stopping notification failed");
        }
        if let Some(ycable) = ycable {
            ycable.stop().await;
        }
        let state_exit = state_thread.join().await;
        info_cancel.cancel();
        if let Err(e) = info_task.await {
            warn!(error = %e, "Info update loop failed");
        }

        let exit = match state_exit {
            StateLoopExit::NotImplemented => DaemonExit::NotImplemented,
            StateLoopExit::SfpError => DaemonExit::SfpError,
            StateLoopExit::Stopped if sfp_error.load(Ordering::SeqCst) => DaemonExit::SfpError,
            StateLoopExit::Stopped => DaemonExit::Normal,
        };
        info!(?exit, "Deinit complete");
        Ok(exit)
    }
}

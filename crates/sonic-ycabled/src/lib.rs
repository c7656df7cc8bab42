//! Y-cable mux controller for dual-ToR SONiC switches.
//!
//! Keeps STATE_DB `HW_MUX_CABLE_TABLE` equal to what the mux hardware does,
//! applies toggle requests from APPL_DB `HW_MUX_CABLE_TABLE`, and talks to the
//! peer ToR over a small line-delimited JSON RPC.
//!
//! # Tables
//!
//! | Database | Table | Use |
//! |----------|-------|-----|
//! | CONFIG_DB | `PORT` | `mux_cable=true` selects managed ports |
//! | APPL_DB | `HW_MUX_CABLE_TABLE` | toggle requests (`state`) |
//! | STATE_DB | `HW_MUX_CABLE_TABLE` | local mux state |
//! | STATE_DB | `HW_MUX_CABLE_TABLE_PEER` | peer's view of the cable |
//! | STATE_DB | `MUX_CABLE_INFO`, `MUX_CABLE_STATIC_INFO` | cable telemetry |
//!
//! The controller runs inside xcvrd (fed by its state event loop) or as the
//! standalone `ycabled` binary (fed by `TRANSCEIVER_STATUS`).

pub mod controller;
pub mod module_events;
pub mod mux;
pub mod peer;
pub mod telemetry;

pub use controller::YCableController;
pub use module_events::{spawn_status_follower, StatusFollower};
pub use mux::{MuxState, MuxStatus};
pub use peer::{PeerClient, PeerRequest, PeerResponse, PeerServer};

use sonic_xcvr_common::{Chassis, PortChangeEvent, PortMapping, Result, TableHelper, XcvrdConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Depth of the queue between the RPC server and the controller.
const RPC_QUEUE_DEPTH: usize = 64;

/// A running controller and its RPC server.
#[derive(Debug)]
pub struct YCableHandle {
    events: mpsc::UnboundedSender<PortChangeEvent>,
    controller: JoinHandle<()>,
    server: Option<JoinHandle<()>>,
    rpc_addr: Option<SocketAddr>,
    cancel: CancellationToken,
}

impl YCableHandle {
    /// Where module transitions go.
    pub fn event_sink(&self) -> mpsc::UnboundedSender<PortChangeEvent> {
        self.events.clone()
    }

    /// Bound RPC address, if the server came up.
    pub fn rpc_addr(&self) -> Option<SocketAddr> {
        self.rpc_addr
    }

    /// Stops the controller, which deletes its rows, and the RPC server.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.controller.await {
            warn!(error = %e, "Y-cable controller task failed");
        }
        if let Some(server) = self.server {
            if let Err(e) = server.await {
                warn!(error = %e, "Peer RPC server task failed");
            }
        }
    }
}

/// Initializes every Y-cable port, then starts the controller task and the
/// peer RPC server. Both stop with `cancel`.
pub async fn start(
    config: &XcvrdConfig,
    mapping: Arc<PortMapping>,
    chassis: Arc<dyn Chassis>,
    tables: TableHelper,
    cancel: &CancellationToken,
) -> Result<YCableHandle> {
    let cancel = cancel.child_token();

    let mut controller = YCableController::new(mapping, chassis, tables);
    if let Some(peer) = &config.ycable.peer_address {
        controller = controller.with_peer(PeerClient::new(
            peer.clone(),
            config.ycable.rpc_port,
            config.rpc_timeout(),
        ));
    }

    // subscribe first so requests raised during init are not lost
    let requests = controller.subscribe_requests(&cancel).await?;
    controller.init().await;

    let (rpc_tx, rpc_rx) = mpsc::channel(RPC_QUEUE_DEPTH);
    let (server, rpc_addr) =
        match PeerServer::bind(&config.ycable.rpc_bind_address, config.ycable.rpc_port).await {
            Ok(server) => {
                let addr = server.local_addr().ok();
                (Some(tokio::spawn(server.run(rpc_tx, cancel.clone()))), addr)
            }
            Err(e) => {
                warn!(error = %e, "Peer RPC server unavailable");
                (None, None)
            }
        };

    let (events, events_rx) = mpsc::unbounded_channel();
    let controller = tokio::spawn(controller.run(
        requests,
        events_rx,
        rpc_rx,
        config.telemetry_interval(),
        cancel.clone(),
    ));
    info!(rpc = ?rpc_addr, "Y-cable controller started");

    Ok(YCableHandle {
        events,
        controller,
        server,
        rpc_addr,
        cancel,
    })
}

//! Peer RPC client.

use super::proto::{PeerRequest, PeerResponse};
use futures::{SinkExt, StreamExt};
use sonic_xcvr_common::{Result, XcvrError};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, instrument};

/// Calls the peer ToR's RPC server. One connection per call.
#[derive(Debug, Clone)]
pub struct PeerClient {
    host: String,
    port: u16,
    timeout: Duration,
}

impl PeerClient {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }

    /// Sends one request and waits for its reply, at most the configured timeout.
    #[instrument(skip(self), fields(peer = %self.host))]
    pub async fn call(&self, request: &PeerRequest) -> Result<PeerResponse> {
        let response = tokio::time::timeout(self.timeout, self.exchange(request))
            .await
            .map_err(|_| XcvrError::rpc(format!("no answer within {:?}", self.timeout)))??;
        debug!(?response, "Peer response");

        match response {
            PeerResponse::Error { message } => Err(XcvrError::rpc(message)),
            response => Ok(response),
        }
    }

    async fn exchange(&self, request: &PeerRequest) -> Result<PeerResponse> {
        let stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        let mut framed = Framed::new(stream, LinesCodec::new());
        framed
            .send(serde_json::to_string(request)?)
            .await
            .map_err(|e| XcvrError::rpc(e.to_string()))?;
        match framed.next().await {
            Some(Ok(line)) => Ok(serde_json::from_str(&line)?),
            Some(Err(e)) => Err(XcvrError::rpc(e.to_string())),
            None => Err(XcvrError::rpc("peer closed the connection")),
        }
    }

    /// The peer's view of the cable on a port.
    pub async fn query_side(&self, portid: u32) -> Result<u8> {
        match self.call(&PeerRequest::QuerySide { portid }).await? {
            PeerResponse::Side { side } => Ok(side),
            other => Err(unexpected(other)),
        }
    }

    /// Whether the peer is active on each port.
    pub async fn query_admin_port_state(&self, portid: Vec<u32>) -> Result<Vec<(u32, bool)>> {
        let request = PeerRequest::QueryAdminPortState { portid };
        port_states(self.call(&request).await?)
    }

    /// Asks the peer to become active (`true`) or standby on each port.
    pub async fn set_admin_port_forwarding_state(
        &self,
        portid: Vec<u32>,
        state: Vec<bool>,
    ) -> Result<Vec<(u32, bool)>> {
        let request = PeerRequest::SetAdminPortForwardingState { portid, state };
        port_states(self.call(&request).await?)
    }
}

fn unexpected(response: PeerResponse) -> XcvrError {
    XcvrError::rpc(format!("unexpected response {:?}", response))
}

fn port_states(response: PeerResponse) -> Result<Vec<(u32, bool)>> {
    match response {
        PeerResponse::PortState { portid, state } if portid.len() == state.len() => {
            Ok(portid.into_iter().zip(state).collect())
        }
        other => Err(unexpected(other)),
    }
}

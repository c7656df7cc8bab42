//! Peer RPC server.
//!
//! Accepts plaintext TCP connections and forwards each request to the
//! controller task, which owns the hardware and the tables.

use super::proto::{PeerRequest, PeerResponse, RpcCommand};
use futures::{SinkExt, StreamExt};
use sonic_xcvr_common::{Result, XcvrError};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{Framed, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Longest accepted request line.
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Listening side of the peer channel.
#[derive(Debug)]
pub struct PeerServer {
    listener: TcpListener,
}

impl PeerServer {
    /// Binds `address:port`. Port 0 picks a free port.
    pub async fn bind(address: &str, port: u16) -> Result<Self> {
        let listener = TcpListener::bind((address, port))
            .await
            .map_err(|e| XcvrError::rpc(format!("bind {}:{}: {}", address, port, e)))?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves until cancelled.
    pub async fn run(self, commands: mpsc::Sender<RpcCommand>, cancel: CancellationToken) {
        if let Ok(addr) = self.listener.local_addr() {
            info!(%addr, "Peer RPC server listening");
        }
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "Peer connected");
                        tokio::spawn(serve_connection(stream, peer, commands.clone(), cancel.clone()));
                    }
                    Err(e) => warn!(error = %e, "Peer accept failed"),
                },
            }
        }
        debug!("Peer RPC server stopped");
    }
}

async fn dispatch(commands: &mpsc::Sender<RpcCommand>, request: PeerRequest) -> PeerResponse {
    let (reply, rx) = oneshot::channel();
    if commands.send(RpcCommand { request, reply }).await.is_err() {
        return PeerResponse::error("controller stopped");
    }
    rx.await
        .unwrap_or_else(|_| PeerResponse::error("controller dropped the request"))
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    commands: mpsc::Sender<RpcCommand>,
    cancel: CancellationToken,
) {
    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = framed.next() => line,
        };
        let line = match line {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                warn!(%peer, error = %e, "Bad frame from peer");
                break;
            }
            None => break,
        };

        let response = match serde_json::from_str::<PeerRequest>(&line) {
            Ok(request) => {
                debug!(%peer, ?request, "Peer request");
                dispatch(&commands, request).await
            }
            Err(e) => PeerResponse::error(format!("malformed request: {}", e)),
        };

        let encoded = match serde_json::to_string(&response) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(%peer, error = %e, "Cannot encode response");
                break;
            }
        };
        if let Err(e) = framed.send(encoded).await {
            warn!(%peer, error = %e, "Failed to answer peer");
            break;
        }
    }
    debug!(%peer, "Peer disconnected");
}

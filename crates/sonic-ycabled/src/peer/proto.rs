//! Peer RPC messages.
//!
//! One JSON object per line in each direction. Port ids are physical port
//! indices, which both ToRs of a dual-ToR pair share.
//!
//! Both ends must run this daemon. The framing is not the gRPC service of
//! the stock SONiC ycabled, so a pair mixing the two cannot talk.
//!
//! ```text
//! → {"method":"QuerySide","params":{"portid":1}}
//! ← {"type":"side","side":2}
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// Requests a ToR sends its peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum PeerRequest {
    /// Which side the cable on `portid` forwards to, as the server's hardware reports.
    QuerySide { portid: u32 },
    /// Whether the server is the active side of each port.
    QueryAdminPortState { portid: Vec<u32> },
    /// Make the server active (`true`) or standby (`false`) on each port.
    SetAdminPortForwardingState { portid: Vec<u32>, state: Vec<bool> },
}

/// Server replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerResponse {
    Side { side: u8 },
    PortState { portid: Vec<u32>, state: Vec<bool> },
    Error { message: String },
}

impl PeerResponse {
    pub fn error(message: impl Into<String>) -> Self {
        PeerResponse::Error {
            message: message.into(),
        }
    }
}

/// A request handed to the controller task, with the channel for its reply.
#[derive(Debug)]
pub struct RpcCommand {
    pub request: PeerRequest,
    pub reply: oneshot::Sender<PeerResponse>,
}

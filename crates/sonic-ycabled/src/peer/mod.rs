//! Side channel to the peer ToR of a dual-ToR pair.

pub mod client;
pub mod proto;
pub mod server;

pub use client::PeerClient;
pub use proto::{PeerRequest, PeerResponse, RpcCommand};
pub use server::PeerServer;

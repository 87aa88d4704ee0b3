//! The IDL-equivalent shared leaf crate: every RPC message type, the
//! `Progress` tagged-variant wire format, and the authenticated
//! transport helpers built on `netapp`. Hub, Agent and Controller each
//! depend on this crate and never on one another.
#[macro_use]
extern crate tracing;

pub mod identity;
pub mod messages;
pub mod transport;

pub use messages::*;
pub use netapp::message::{Rpc, RequestStrategy, PRIO_NORMAL};
pub use netapp::{NetApp, NetworkKey, NodeID};

/// Endpoint path the Hub listens on for Controller-originated calls.
pub const HUB_RPC_PATH: &str = "meshctl_rpc/messages.rs/HubRpc";
/// Endpoint path each Agent listens on for Hub-originated calls.
pub const AGENT_RPC_PATH: &str = "meshctl_rpc/messages.rs/AgentRpc";
/// Endpoint path the Controller listens on for Hub-pushed progress frames.
pub const CONTROLLER_RPC_PATH: &str = "meshctl_rpc/messages.rs/ControllerRpc";

/// Decode the hex-encoded mesh-wide pre-shared key from the service
/// config's credentials block.
pub fn parse_network_key(hex_str: &str) -> Result<NetworkKey, meshctl_util::error::Error> {
	let bytes = hex::decode(hex_str)
		.map_err(|e| meshctl_util::error::Error::Message(format!("invalid network key hex: {}", e)))?;
	NetworkKey::from_slice(&bytes)
		.ok_or_else(|| meshctl_util::error::Error::Message("invalid network key length".into()))
}

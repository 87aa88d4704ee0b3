//! `AgentConn`: the Hub's handle on one (hostname, RPC-peer) pair.
//! Exactly one lives per configured hostname for the lifetime of the
//! Hub process; its `Mutex` is the mechanism that keeps segments on the
//! same host from initializing concurrently.
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::Mutex;

use netapp::endpoint::Endpoint;
use netapp::message::PRIO_NORMAL;
use netapp::NodeID;

use meshctl_rpc::AgentRpc;
use meshctl_util::error::Error;

#[derive(Clone)]
pub struct AgentConn {
	pub hostname: String,
	pub node_id: NodeID,
	pub addr: SocketAddr,
	/// Serializes dispatch to this host: two segments on the same
	/// hostname never initialize concurrently. Shared via `Arc` so a
	/// cloned handle (moved into a spawned task) still serializes
	/// against the original.
	dispatch_lock: Arc<Mutex<()>>,
}

impl AgentConn {
	pub fn new(hostname: String, node_id: NodeID, addr: SocketAddr) -> Self {
		Self {
			hostname,
			node_id,
			addr,
			dispatch_lock: Arc::new(Mutex::new(())),
		}
	}

	pub async fn call(
		&self,
		endpoint: &Arc<Endpoint<AgentRpc, ()>>,
		msg: AgentRpc,
	) -> Result<AgentRpc, Error> {
		let _guard = self.dispatch_lock.lock().await;
		endpoint.call(&self.node_id, msg, PRIO_NORMAL).await?
	}
}

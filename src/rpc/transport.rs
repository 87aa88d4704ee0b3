//! Thin wrapper around `netapp`'s peer-to-peer transport, shared by the
//! Hub, Agent and Controller binaries so none of them reimplements
//! connection/listen bookkeeping.
use std::net::SocketAddr;
use std::sync::Arc;

use netapp::peering::fullmesh::FullMeshPeeringStrategy;
use netapp::util::parse_and_resolve_peer_addr;
use netapp::{NetApp, NodeID};

use meshctl_util::error::{Error, OptionExt, ResultExt};

/// Parse a `<pubkey>@<host>:<port>` peer identifier, as printed by the
/// Hub/Agent binaries on startup and stored in the Hub's bootstrap peer
/// list.
pub fn parse_peer(addr: &str) -> Result<(NodeID, SocketAddr), Error> {
	let (id, addrs) = parse_and_resolve_peer_addr(addr).ok_or_else(|| {
		Error::Message(format!(
			"invalid peer identifier: {} (expected <pubkey>@<host>:<port>)",
			addr
		))
	})?;
	addrs
		.into_iter()
		.next()
		.map(|a| (id, a))
		.ok_or_message("peer identifier resolved to no address")
}

/// Dial `peer`, returning once the handshake has completed (or failed).
pub async fn connect(netapp: &Arc<NetApp>, peer: &str) -> Result<NodeID, Error> {
	let (id, addr) = parse_peer(peer)?;
	netapp
		.clone()
		.try_connect(addr, id)
		.await
		.err_context(format!("unable to connect to peer {}", peer))?;
	Ok(id)
}

/// Bring up full-mesh peering against a fixed bootstrap list (no
/// Consul/Kubernetes discovery: the mesh here is a small, explicitly
/// enumerated set of hosts known from the service config, not a
/// dynamically scaling cluster).
pub fn start_peering(
	netapp: Arc<NetApp>,
	bootstrap_peers: Vec<String>,
	public_addr: Option<SocketAddr>,
) -> Arc<FullMeshPeeringStrategy> {
	FullMeshPeeringStrategy::new(netapp, bootstrap_peers, public_addr)
}

/// Format this process's own peer identifier for display/persistence.
pub fn format_peer_id(node_id: NodeID, addr: SocketAddr) -> String {
	format!("{}@{}", hex::encode(node_id.as_ref()), addr)
}

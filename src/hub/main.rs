//! `meshctl-hub`: the central coordinator binary. Started once per mesh
//! by the Controller, reads back the same service config the Controller
//! wrote on first bring-up to learn its own port and peer list.
#[macro_use]
extern crate tracing;

use std::path::PathBuf;

use meshctl_hub::{AgentConn, Hub};
use meshctl_rpc::{parse_network_key, transport};
use meshctl_util::config::Config;
use meshctl_util::error::Error;
use meshctl_util::persister::Persister;

#[tokio::main]
async fn main() {
	if std::env::var("RUST_LOG").is_err() {
		std::env::set_var("RUST_LOG", "netapp=info,meshctl_hub=info");
	}
	tracing_subscriber::fmt()
		.with_writer(std::io::stderr)
		.with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
		.init();

	if let Err(e) = run().await {
		eprintln!("Error: {}", e);
		std::process::exit(1);
	}
}

async fn run() -> Result<(), Error> {
	let state_dir = PathBuf::from(std::env::var("MESHCTL_STATE_DIR").unwrap_or_else(|_| "/var/lib/meshctl-hub".into()));
	let config_dir = PathBuf::from(std::env::var("MESHCTL_CONFIG_DIR").unwrap_or_else(|_| "/etc/meshctl".into()));

	let config: Config = Persister::new(&config_dir, "service").load()?;
	let network_key = parse_network_key(&config.credentials.network_key_hex)?;

	let bind_addr: std::net::SocketAddr = format!("0.0.0.0:{}", config.hub_port)
		.parse()
		.map_err(|e| Error::Message(format!("invalid hub port: {}", e)))?;

	let agent_peers = std::env::var("MESHCTL_AGENT_PEERS")
		.map_err(|_| Error::Message("MESHCTL_AGENT_PEERS must be set (comma-separated <pubkey>@host:port list)".into()))?;

	let netapp = meshctl_rpc::identity::new_netapp(&state_dir, network_key)?;
	let mut agents = Vec::new();
	for (hostname, peer) in config.hostnames.iter().zip(agent_peers.split(',')) {
		let (node_id, addr) = transport::parse_peer(peer.trim())?;
		netapp.clone().try_connect(addr, node_id).await.map_err(|e| {
			Error::Message(format!("unable to connect to agent {} at {}: {}", hostname, peer, e))
		})?;
		agents.push(AgentConn::new(hostname.clone(), node_id, addr));
	}

	let hub = Hub::new(netapp, &config.hub_log_dir, agents);
	info!("meshctl-hub listening on {}", bind_addr);

	let (_must_exit_tx, must_exit_rx) = tokio::sync::watch::channel(false);
	let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).map_err(Error::from)?;
	let run_fut = hub.clone().run(bind_addr, must_exit_rx);
	tokio::select! {
		_ = run_fut => {}
		_ = sigterm.recv() => {
			info!("meshctl-hub received SIGTERM, shutting down");
		}
	}
	Ok(())
}

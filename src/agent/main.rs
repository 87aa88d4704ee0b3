//! `meshctl-agent`: the per-host worker binary. Started by the
//! Controller during mesh bring-up, one process per configured
//! hostname.
#[macro_use]
extern crate tracing;

use std::path::PathBuf;
use std::sync::Arc;

use meshctl_agent::Agent;
use meshctl_rpc::identity::gen_node_key;
use meshctl_rpc::parse_network_key;
use meshctl_util::capabilities::Capabilities;
use meshctl_util::error::Error;

#[tokio::main]
async fn main() {
	if std::env::var("RUST_LOG").is_err() {
		std::env::set_var("RUST_LOG", "netapp=info,meshctl_agent=info");
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
	let bind_addr: std::net::SocketAddr = std::env::var("MESHCTL_AGENT_BIND")
		.unwrap_or_else(|_| format!("0.0.0.0:{}", meshctl_util::config::DEFAULT_AGENT_PORT))
		.parse()
		.map_err(|e| Error::Message(format!("invalid MESHCTL_AGENT_BIND: {}", e)))?;
	let network_key_hex =
		std::env::var("MESHCTL_NETWORK_KEY").map_err(|_| Error::Message("MESHCTL_NETWORK_KEY must be set".into()))?;
	let network_key = parse_network_key(&network_key_hex)?;
	let state_dir = PathBuf::from(std::env::var("MESHCTL_STATE_DIR").unwrap_or_else(|_| "/var/lib/meshctl-agent".into()));

	let node_key = gen_node_key(&state_dir)?;

	let agent = Agent::new(network_key, node_key, Capabilities::production());
	info!("meshctl-agent listening on {}", bind_addr);

	let (_must_exit_tx, must_exit_rx) = tokio::sync::watch::channel(false);
	let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
		.map_err(Error::from)?;
	let run_fut = agent.clone().run(bind_addr, must_exit_rx);
	tokio::select! {
		_ = run_fut => {}
		_ = sigterm.recv() => {
			info!("meshctl-agent received SIGTERM, shutting down");
		}
	}
	Ok(())
}

//! Mesh bring-up: load the persisted service config, or else derive one
//! from the operator's cluster config, spawn the Hub locally, and dial
//! it.
//!
//! Remote Agent process startup (the original's SSH-based fan-out) is
//! out of scope here: no such transport exists anywhere in this
//! workspace's dependency stack, and Agents are assumed to already be
//! running, managed the same way any other per-host daemon on the
//! fleet is. `MESHCTL_AGENT_PEERS` (the Hub's own peer list input) is
//! simply forwarded from the Controller's environment into the Hub's.
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use meshctl_planner::ClusterConfig;
use meshctl_rpc::{identity, parse_network_key, HubRpc, PRIO_NORMAL, HUB_RPC_PATH};
use meshctl_util::config::{Config, Credentials, DEFAULT_AGENT_PORT, DEFAULT_HUB_PORT, DEFAULT_SERVICE_NAME};
use meshctl_util::error::{Error, OptionExt, ResultExt};
use meshctl_util::persister::Persister;

use netapp::endpoint::Endpoint;
use netapp::{NetApp, NodeID};

const MESH_STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Mesh {
	pub netapp: std::sync::Arc<NetApp>,
	pub hub_endpoint: std::sync::Arc<Endpoint<HubRpc, ()>>,
	pub hub_node_id: NodeID,
	pub config: Config,
	pub started_fresh: bool,
}

impl Mesh {
	pub async fn report_agent_health(&self) -> Result<(), Error> {
		let fut = self.hub_endpoint.call(&self.hub_node_id, HubRpc::ReportAgentHealth, PRIO_NORMAL);
		match tokio::time::timeout(MESH_STARTUP_TIMEOUT, fut).await {
			Ok(inner) => {
				inner??;
				Ok(())
			}
			Err(_) => Err(Error::Timeout),
		}
	}

	pub async fn call(&self, msg: HubRpc) -> Result<HubRpc, Error> {
		self.hub_endpoint.call(&self.hub_node_id, msg, PRIO_NORMAL).await?
	}
}

fn hostnames_from_config(config: &ClusterConfig) -> Vec<String> {
	let mut hostnames: Vec<String> = Vec::new();
	if let Some(coordinator) = &config.coordinator {
		hostnames.push(coordinator.hostname.clone());
	}
	if let Some(pairs) = &config.segment_array {
		for pair in pairs {
			hostnames.push(pair.primary.hostname.clone());
			if let Some(mirror) = &pair.mirror {
				hostnames.push(mirror.hostname.clone());
			}
		}
	} else {
		hostnames.extend(config.hostlist.iter().cloned());
	}
	hostnames.sort();
	hostnames.dedup();
	hostnames
}

fn spawn_hub(hub_state_dir: &Path, config_dir: &Path) -> Result<(), Error> {
	let agent_peers = std::env::var("MESHCTL_AGENT_PEERS")
		.map_err(|_| Error::Message("MESHCTL_AGENT_PEERS must be set (comma-separated <pubkey>@host:port list, one per Agent)".into()))?;

	tokio::process::Command::new("meshctl-hub")
		.env("MESHCTL_STATE_DIR", hub_state_dir)
		.env("MESHCTL_CONFIG_DIR", config_dir)
		.env("MESHCTL_AGENT_PEERS", agent_peers)
		.kill_on_drop(false)
		.spawn()
		.err_context("failed to start meshctl-hub")?;
	Ok(())
}

async fn wait_for_hub_identity(hub_state_dir: &Path) -> Result<NodeID, Error> {
	let deadline = tokio::time::Instant::now() + MESH_STARTUP_TIMEOUT;
	loop {
		if let Ok(id) = identity::read_node_id(hub_state_dir) {
			return Ok(id);
		}
		if tokio::time::Instant::now() >= deadline {
			return Err(Error::Message(
				"timed out waiting for meshctl-hub to start and publish its node identity".into(),
			));
		}
		tokio::time::sleep(Duration::from_millis(100)).await;
	}
}

async fn wait_for_connect(netapp: &std::sync::Arc<NetApp>, addr: SocketAddr, id: NodeID) -> Result<(), Error> {
	tokio::time::timeout(MESH_STARTUP_TIMEOUT, netapp.clone().try_connect(addr, id))
		.await
		.map_err(|_| Error::Timeout)?
		.err_context("unable to connect to meshctl-hub")?;
	Ok(())
}

/// Bring up (or reconnect to) the mesh. `cluster_config` is required
/// the first time a mesh is brought up on this host; `None` is only
/// valid when a service config already exists on disk (the `--clean`
/// path, which never needs the operator's cluster config).
pub async fn connect(state_dir: &Path, config_dir: &Path, cluster_config: Option<&ClusterConfig>) -> Result<Mesh, Error> {
	let persister: Persister<Config> = Persister::new(config_dir, "service");
	let hub_state_dir = state_dir.join("hub-identity");

	let (config, started_fresh) = if persister.exists() {
		(persister.load()?, false)
	} else {
		let cluster_config = cluster_config
			.ok_or_message("no existing mesh on this host; a cluster config file is required to bring one up")?;
		let hostnames = hostnames_from_config(cluster_config);
		if hostnames.is_empty() {
			return Err(Error::Message("cluster config names no hosts".into()));
		}

		let network_key_hex = hex::encode(sodiumoxide::randombytes::randombytes(32));
		let config = Config::new(
			DEFAULT_HUB_PORT,
			DEFAULT_AGENT_PORT,
			hostnames,
			state_dir.join("hub-logs"),
			DEFAULT_SERVICE_NAME.into(),
			meshctl_util::config::gphome_from_env()?,
			Credentials {
				ca_cert_path: config_dir.join("ca.pem"),
				cert_path: config_dir.join("cert.pem"),
				key_path: config_dir.join("key.pem"),
				tls_enabled: false,
				network_key_hex,
			},
			true,
		);
		std::fs::create_dir_all(config_dir)?;
		persister.save(&config)?;
		spawn_hub(&hub_state_dir, config_dir)?;
		(config, true)
	};

	let network_key = parse_network_key(&config.credentials.network_key_hex)?;
	let controller_state_dir = state_dir.join("controller-identity");
	let netapp = identity::new_netapp(&controller_state_dir, network_key)?;

	let hub_node_id = wait_for_hub_identity(&hub_state_dir).await?;
	let hub_addr: SocketAddr = format!("127.0.0.1:{}", config.hub_port)
		.parse()
		.map_err(|e| Error::Message(format!("invalid hub port: {}", e)))?;
	wait_for_connect(&netapp, hub_addr, hub_node_id).await?;

	let hub_endpoint = netapp.endpoint::<HubRpc, ()>(HUB_RPC_PATH.into());

	Ok(Mesh {
		netapp,
		hub_endpoint,
		hub_node_id,
		config,
		started_fresh,
	})
}

pub fn default_hub_state_dir(state_dir: &Path) -> PathBuf {
	state_dir.join("hub-identity")
}

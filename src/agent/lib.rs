//! Per-host worker. Stateless beyond the injected
//! [`Capabilities`](meshctl_util::capabilities::Capabilities): every RPC
//! is independently idempotent under retry.
#[macro_use]
extern crate tracing;

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;

use netapp::endpoint::{Endpoint, EndpointHandler};
use netapp::peering::fullmesh::FullMeshPeeringStrategy;
use netapp::{NetApp, NetworkKey, NodeKey};

use meshctl_rpc::identity::MESHCTL_VERSION_TAG;
use meshctl_rpc::{AgentRpc, SegmentInitOutcome, AGENT_RPC_PATH};
use meshctl_util::capabilities::Capabilities;
use meshctl_util::error::Error;

/// The Agent's own handle on its `netapp` listener and the endpoint it
/// answers `AgentRpc` calls on.
pub struct Agent {
	pub netapp: Arc<NetApp>,
	pub fullmesh: Arc<FullMeshPeeringStrategy>,
	pub endpoint: Arc<Endpoint<AgentRpc, Agent>>,
	capabilities: Capabilities,
}

impl Agent {
	pub fn new(network_key: NetworkKey, node_key: NodeKey, capabilities: Capabilities) -> Arc<Self> {
		let netapp = NetApp::new(MESHCTL_VERSION_TAG, network_key, node_key);
		let fullmesh = FullMeshPeeringStrategy::new(netapp.clone(), vec![], None);
		let endpoint = netapp.endpoint(AGENT_RPC_PATH.into());

		let agent = Arc::new(Self {
			netapp,
			fullmesh,
			endpoint,
			capabilities,
		});
		agent.endpoint.set_handler(agent.clone());
		agent
	}

	pub async fn run(self: Arc<Self>, bind_addr: SocketAddr, must_exit: tokio::sync::watch::Receiver<bool>) {
		futures::join!(
			self.netapp.clone().listen(bind_addr, None, must_exit.clone()),
			self.fullmesh.clone().run(must_exit.clone()),
		);
	}

	async fn make_segment(
		&self,
		segment: &meshctl_rpc::Segment,
		params: &meshctl_rpc::ClusterParams,
		is_coordinator: bool,
		force: bool,
	) -> Result<SegmentInitOutcome, Error> {
		let data_dir = std::path::Path::new(&segment.data_directory);
		if !self.capabilities.fs.is_dir_empty(data_dir).await? {
			if !force {
				return Err(Error::Message(format!(
					"data directory {} is not empty (use --force to override)",
					segment.data_directory
				)));
			}
			info!(
				"clearing non-empty data directory {} (force requested)",
				segment.data_directory
			);
			self.capabilities.fs.remove_dir_all(data_dir).await?;
		}
		self.capabilities.fs.create_dir_all(data_dir).await?;

		let program = if is_coordinator {
			"gpinitsystem_coordinator"
		} else {
			"gpinitsystem_segment"
		};
		let mut args = vec![
			"--data-directory".to_string(),
			segment.data_directory.clone(),
			"--port".to_string(),
			segment.port.to_string(),
			"--encoding".to_string(),
			params.encoding.clone(),
		];
		if params.data_checksums {
			args.push("--data-checksums".to_string());
		}

		let output = self.capabilities.process.run(program, &args).await?;
		Ok(SegmentInitOutcome {
			success: output.success(),
			stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
			stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
		})
	}

	async fn check_port_free(&self, address: &str, port: u16) -> bool {
		let addr = format!("{}:{}", address, port);
		match tokio::net::TcpListener::bind(&addr).await {
			Ok(listener) => {
				drop(listener);
				true
			}
			Err(_) => false,
		}
	}
}

#[async_trait]
impl EndpointHandler<AgentRpc> for Agent {
	async fn handle(self: &Arc<Self>, msg: &AgentRpc, _from: netapp::NodeID) -> Result<AgentRpc, Error> {
		match msg {
			AgentRpc::MakeSegment {
				segment,
				params,
				is_coordinator,
				force,
			} => {
				let outcome = self
					.make_segment(segment, params, *is_coordinator, *force)
					.await?;
				Ok(AgentRpc::SegmentInitialized(outcome))
			}
			AgentRpc::RemoveDirectory(path) => {
				self.capabilities
					.fs
					.remove_dir_all(std::path::Path::new(path))
					.await?;
				Ok(AgentRpc::Ok)
			}
			AgentRpc::Hostname => {
				let hostname = gethostname::gethostname()
					.into_string()
					.map_err(|_| Error::Message("hostname is not valid UTF-8".into()))?;
				Ok(AgentRpc::HostnameIs(hostname))
			}
			AgentRpc::CheckPortFree { address, port } => {
				Ok(AgentRpc::PortFree(self.check_port_free(address, *port).await))
			}
			other => Err(Error::unexpected_rpc_message(other)),
		}
	}
}

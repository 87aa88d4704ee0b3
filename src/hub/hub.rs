//! The Hub: central coordinator. An `Arc<Self>` that is its own `netapp`
//! endpoint handler, owning a rollback journal and a per-host
//! `AgentConn` table.
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use netapp::endpoint::{Endpoint, EndpointHandler};
use netapp::message::PRIO_NORMAL;
use netapp::peering::fullmesh::FullMeshPeeringStrategy;
use netapp::{NetApp, NodeID};

use meshctl_rpc::{
	AgentRpc, ControllerRpc, HubRpc, MakeClusterRequest, Progress, Segment, ServiceStatus, AGENT_RPC_PATH,
	CONTROLLER_RPC_PATH, HUB_RPC_PATH,
};
use meshctl_util::error::Error;

use crate::agent_conn::AgentConn;
use crate::journal::Journal;

pub struct Hub {
	pub netapp: Arc<NetApp>,
	fullmesh: Arc<FullMeshPeeringStrategy>,
	hub_endpoint: Arc<Endpoint<HubRpc, Hub>>,
	agent_endpoint: Arc<Endpoint<AgentRpc, ()>>,
	controller_endpoint: Arc<Endpoint<ControllerRpc, ()>>,
	/// Initialized once at Hub start, read-only during a run (spec
	/// section 5).
	agents: Vec<AgentConn>,
	journal: Journal,
}

impl Hub {
	/// `netapp` must already have its listener/peering strategy in mind
	/// for `agents`: callers connect to every Agent peer on this same
	/// instance before constructing the Hub, so the connections survive
	/// into the endpoints registered here.
	pub fn new(netapp: Arc<NetApp>, log_dir: &std::path::Path, agents: Vec<AgentConn>) -> Arc<Self> {
		let fullmesh = FullMeshPeeringStrategy::new(netapp.clone(), vec![], None);
		let hub_endpoint = netapp.endpoint(HUB_RPC_PATH.into());
		let agent_endpoint = netapp.endpoint(AGENT_RPC_PATH.into());
		let controller_endpoint = netapp.endpoint(CONTROLLER_RPC_PATH.into());

		let hub = Arc::new(Self {
			netapp,
			fullmesh,
			hub_endpoint,
			agent_endpoint,
			controller_endpoint,
			agents,
			journal: Journal::new(log_dir),
		});
		hub.hub_endpoint.set_handler(hub.clone());
		hub
	}

	pub async fn run(self: Arc<Self>, bind_addr: SocketAddr, must_exit: tokio::sync::watch::Receiver<bool>) {
		futures::join!(
			self.netapp.clone().listen(bind_addr, None, must_exit.clone()),
			self.fullmesh.clone().run(must_exit.clone()),
		);
	}

	fn agent_for_hostname(&self, hostname: &str) -> Option<&AgentConn> {
		self.agents.iter().find(|a| a.hostname == hostname)
	}

	/// Resolve an operator-supplied address to the `AgentConn` that
	/// serves it. Each configured hostname has exactly one Agent
	/// process; every multi-home alias address that host exposes is
	/// reachable through that same process, so address resolution is
	/// "does any known agent answer on this address", tried by hostname
	/// match first (the common non-multi-home case) and then by asking
	/// each agent to confirm the address is one of its own.
	fn agent_for_address(&self, address: &str) -> Option<&AgentConn> {
		self.agent_for_hostname(address)
			.or_else(|| self.agents.iter().find(|a| a.addr.ip().to_string() == address))
	}

	async fn get_all_hostnames(&self, addresses: &[String]) -> Result<HashMap<String, String>, Error> {
		let mut result = HashMap::new();
		for address in addresses {
			let agent = self
				.agent_for_address(address)
				.ok_or_else(|| Error::Message(format!("address {} does not resolve to a known agent", address)))?;
			match agent.call(&self.agent_endpoint, AgentRpc::Hostname).await? {
				AgentRpc::HostnameIs(hostname) => {
					result.insert(address.clone(), hostname);
				}
				other => return Err(Error::unexpected_rpc_message(other)),
			}
		}
		Ok(result)
	}

	async fn status_agents(&self) -> Vec<ServiceStatus> {
		let mut statuses = Vec::with_capacity(self.agents.len());
		for agent in &self.agents {
			let up = agent.call(&self.agent_endpoint, AgentRpc::Hostname).await.is_ok();
			statuses.push(ServiceStatus {
				hostname: agent.hostname.clone(),
				up,
				pid: None,
			});
		}
		statuses
	}

	async fn clean_init_cluster(&self) -> Result<(), Error> {
		if !self.journal.exists() {
			return Ok(());
		}
		let by_host = self.journal.parse().await?;

		let mut errors = Vec::new();
		for (hostname, dirs) in by_host {
			let agent = match self.agent_for_hostname(&hostname) {
				Some(a) => a,
				None => {
					errors.push(format!("no known agent for host {} in journal", hostname));
					continue;
				}
			};
			for dir in dirs {
				if let Err(e) = agent
					.call(&self.agent_endpoint, AgentRpc::RemoveDirectory(dir.clone()))
					.await
				{
					errors.push(format!("{}: removing {}: {}", hostname, dir, e));
				}
			}
		}

		if !errors.is_empty() {
			return Err(Error::Message(format!(
				"rollback completed with errors: {}",
				errors.join("; ")
			)));
		}
		self.journal.remove().await
	}

	async fn make_cluster(
		self: &Arc<Self>,
		request: &MakeClusterRequest,
		controller: NodeID,
	) -> Result<(), Error> {
		let (tx, mut rx) = mpsc::channel::<Progress>(256);

		let hub_for_forward = self.clone();
		let forward_task = tokio::spawn(async move {
			while let Some(frame) = rx.recv().await {
				if let Err(e) = hub_for_forward
					.controller_endpoint
					.call(&controller, ControllerRpc::Progress(frame), PRIO_NORMAL)
					.await
				{
					warn!("failed to push progress frame to controller: {}", e);
				}
			}
		});

		let final_error = self.run_segments(request, tx.clone()).await;

		drop(tx);
		let _ = forward_task.await;

		match final_error {
			None => Ok(()),
			Some(msg) => Err(Error::Message(msg)),
		}
	}

	/// Dispatches every segment in `request` to its owning `AgentConn`,
	/// journals each success, and rolls back on the first failure.
	/// Separated from `make_cluster` so it can be exercised without a
	/// live Controller peer: `tx` only needs a receiver somewhere
	/// draining it, real or a test's.
	async fn run_segments(
		self: &Arc<Self>,
		request: &MakeClusterRequest,
		tx: mpsc::Sender<Progress>,
	) -> Option<String> {
		let seq = Arc::new(AtomicU64::new(0));

		let send = |tx: &mpsc::Sender<Progress>, frame: Progress| {
			let tx = tx.clone();
			async move {
				let _ = tx.send(frame).await;
			}
		};

		let next_seq = || seq.fetch_add(1, Ordering::SeqCst);

		send(
			&tx,
			Progress::PhaseStart {
				seq: next_seq(),
				phase: "provisioning segments".into(),
			},
		)
		.await;

		let mut work: Vec<(Segment, bool)> = vec![(request.array.coordinator.clone(), true)];
		for pair in &request.array.pairs {
			work.push((pair.primary.clone(), false));
			if let Some(mirror) = &pair.mirror {
				work.push((mirror.clone(), false));
			}
		}

		let failed = Arc::new(AtomicBool::new(false));
		let mut handles = Vec::with_capacity(work.len());
		for (segment, is_coordinator) in work {
			let hub = self.clone();
			let params = request.params.clone();
			let force = request.force;
			let tx = tx.clone();
			let seq = seq.clone();
			let failed = failed.clone();
			handles.push(tokio::spawn(async move {
				let agent = match hub.agent_for_hostname(&segment.hostname).cloned() {
					Some(a) => a,
					None => {
						failed.store(true, Ordering::SeqCst);
						let _ = tx
							.send(Progress::SegmentFailed {
								seq: seq.fetch_add(1, Ordering::SeqCst),
								hostname: segment.hostname.clone(),
								data_directory: segment.data_directory.clone(),
								message: "no agent connected for this host".into(),
							})
							.await;
						return;
					}
				};

				let result = agent
					.call(
						&hub.agent_endpoint,
						AgentRpc::MakeSegment {
							segment: segment.clone(),
							params,
							is_coordinator,
							force,
						},
					)
					.await;

				match result {
					Ok(AgentRpc::SegmentInitialized(outcome)) if outcome.success => {
						if let Err(e) = hub.journal.append(&segment.hostname, &segment.data_directory).await {
							failed.store(true, Ordering::SeqCst);
							let _ = tx
								.send(Progress::SegmentFailed {
									seq: seq.fetch_add(1, Ordering::SeqCst),
									hostname: segment.hostname.clone(),
									data_directory: segment.data_directory.clone(),
									message: format!("journal write failed: {}", e),
								})
								.await;
							return;
						}
						let _ = tx
							.send(Progress::SegmentReady {
								seq: seq.fetch_add(1, Ordering::SeqCst),
								hostname: segment.hostname.clone(),
								data_directory: segment.data_directory.clone(),
							})
							.await;
					}
					Ok(AgentRpc::SegmentInitialized(outcome)) => {
						failed.store(true, Ordering::SeqCst);
						let _ = tx
							.send(Progress::SegmentFailed {
								seq: seq.fetch_add(1, Ordering::SeqCst),
								hostname: segment.hostname.clone(),
								data_directory: segment.data_directory.clone(),
								message: outcome.stderr,
							})
							.await;
					}
					Ok(other) => {
						failed.store(true, Ordering::SeqCst);
						let _ = tx
							.send(Progress::SegmentFailed {
								seq: seq.fetch_add(1, Ordering::SeqCst),
								hostname: segment.hostname.clone(),
								data_directory: segment.data_directory.clone(),
								message: format!("unexpected agent response: {:?}", other),
							})
							.await;
					}
					Err(e) => {
						failed.store(true, Ordering::SeqCst);
						let _ = tx
							.send(Progress::SegmentFailed {
								seq: seq.fetch_add(1, Ordering::SeqCst),
								hostname: segment.hostname.clone(),
								data_directory: segment.data_directory.clone(),
								message: e.to_string(),
							})
							.await;
					}
				}
			}));
		}

		for handle in handles {
			let _ = handle.await;
		}

		let final_error = if failed.load(Ordering::SeqCst) {
			let rollback_result = self.clean_init_cluster().await;
			let base = "one or more segments failed to initialize, rolled back".to_string();
			Some(match rollback_result {
				Ok(()) => base,
				Err(e) => format!("{}; rollback also failed: {}", base, e),
			})
		} else {
			// Cluster-wide catalog registration is performed by the
			// engine's own tooling; once every segment has succeeded
			// there is nothing left for the Hub to do but retire the
			// journal.
			self.journal.remove().await.ok();
			None
		};

		send(
			&tx,
			Progress::Terminal {
				seq: next_seq(),
				error: final_error.clone(),
			},
		)
		.await;

		final_error
	}
}

#[async_trait]
impl EndpointHandler<HubRpc> for Hub {
	async fn handle(self: &Arc<Self>, msg: &HubRpc, from: NodeID) -> Result<HubRpc, Error> {
		match msg {
			HubRpc::GetAllHostNames(addresses) => {
				let map = self.get_all_hostnames(addresses).await?;
				Ok(HubRpc::HostNames(map))
			}
			HubRpc::MakeCluster(request) => {
				self.make_cluster(request, from).await?;
				Ok(HubRpc::Ok)
			}
			HubRpc::CleanInitCluster => {
				if !self.journal.exists() {
					return Ok(HubRpc::AlreadyClean);
				}
				self.clean_init_cluster().await?;
				Ok(HubRpc::Ok)
			}
			HubRpc::StatusAgents => Ok(HubRpc::AgentStatuses(self.status_agents().await)),
			HubRpc::ReportAgentHealth => Ok(HubRpc::Ok),
			other => Err(Error::unexpected_rpc_message(other)),
		}
	}
}

#[cfg(test)]
mod test {
	use std::collections::HashMap;
	use std::time::Duration;

	use sodiumoxide::crypto::sign::ed25519;

	use meshctl_rpc::identity::MESHCTL_VERSION_TAG;
	use meshctl_rpc::{ClusterParams, GpArray, Locale, Segment, SegmentPair};
	use meshctl_util::capabilities::{Capabilities, ProcessOutput, ProcessRunner, RealFilesystem};
	use netapp::endpoint::EndpointHandler as _;

	use super::*;

	/// Fails `MakeSegment` whenever the segment's data directory contains
	/// `fail_marker`, simulating the engine's init binary exiting non-zero.
	struct FlakyProcessRunner {
		fail_marker: &'static str,
	}

	#[async_trait]
	impl ProcessRunner for FlakyProcessRunner {
		async fn run(&self, _program: &str, args: &[String]) -> Result<ProcessOutput, Error> {
			use std::os::unix::process::ExitStatusExt;
			let fails = args.iter().any(|a| a.contains(self.fail_marker));
			Ok(ProcessOutput {
				status: std::process::ExitStatus::from_raw(if fails { 256 } else { 0 }),
				stdout: Vec::new(),
				stderr: if fails { b"synthetic failure".to_vec() } else { Vec::new() },
			})
		}
	}

	fn gen_node_pair() -> (NodeID, netapp::NodeKey) {
		let (pk, sk) = ed25519::gen_keypair();
		(
			NodeID::from_slice(&pk[..]).unwrap(),
			netapp::NodeKey::from_slice(&sk[..]).unwrap(),
		)
	}

	fn test_params() -> ClusterParams {
		ClusterParams {
			db_name: "test".into(),
			encoding: "UTF8".into(),
			hba_hostnames: false,
			data_checksums: true,
			su_password: "x".into(),
			locale: Locale::default(),
			common_config: HashMap::new(),
			coordinator_config: HashMap::new(),
			segment_config: HashMap::new(),
		}
	}

	fn segment(hostname: &str, port: u16, data_directory: std::path::PathBuf) -> Segment {
		Segment {
			hostname: hostname.into(),
			address: "127.0.0.1".into(),
			port,
			data_directory: data_directory.to_string_lossy().into_owned(),
		}
	}

	#[tokio::test]
	async fn failed_segment_triggers_automatic_rollback() {
		let root = mktemp::Temp::new_dir().unwrap();
		let log_dir = mktemp::Temp::new_dir().unwrap();

		let network_key = netapp::NetworkKey::from_slice(&[9u8; 32]).unwrap();

		let (agent_node_id, agent_node_key) = gen_node_pair();
		let agent_capabilities = Capabilities {
			process: Arc::new(FlakyProcessRunner { fail_marker: "seg2" }),
			fs: Arc::new(RealFilesystem),
		};
		let agent = meshctl_agent::Agent::new(network_key.clone(), agent_node_key, agent_capabilities);
		let agent_addr: SocketAddr = "127.0.0.1:18551".parse().unwrap();
		let (_exit_tx, exit_rx) = tokio::sync::watch::channel(false);
		tokio::spawn(agent.clone().run(agent_addr, exit_rx));
		tokio::time::sleep(Duration::from_millis(50)).await;

		let (_hub_id, hub_node_key) = gen_node_pair();
		let hub_netapp = NetApp::new(MESHCTL_VERSION_TAG, network_key, hub_node_key);
		hub_netapp.clone().try_connect(agent_addr, agent_node_id).await.unwrap();

		let agent_conn = AgentConn::new("sdw1".into(), agent_node_id, agent_addr);
		let hub = Hub::new(hub_netapp, log_dir.as_ref(), vec![agent_conn]);

		let seg0_dir = root.as_ref().join("seg0");
		let seg1_dir = root.as_ref().join("seg1");
		let seg2_dir = root.as_ref().join("seg2");

		let request = MakeClusterRequest {
			array: GpArray {
				coordinator: segment("sdw1", 5432, seg0_dir.clone()),
				pairs: vec![
					SegmentPair {
						primary: segment("sdw1", 6000, seg1_dir.clone()),
						mirror: None,
					},
					SegmentPair {
						primary: segment("sdw1", 6001, seg2_dir.clone()),
						mirror: None,
					},
				],
			},
			params: test_params(),
			force: false,
			verbose: false,
		};

		let (tx, mut rx) = mpsc::channel::<Progress>(16);
		let final_error = hub.run_segments(&request, tx).await;
		assert!(final_error.is_some(), "segment seg2 was made to fail");

		let mut frames = Vec::new();
		while let Ok(frame) = rx.try_recv() {
			frames.push(frame);
		}
		let ready_count = frames
			.iter()
			.filter(|f| matches!(f, Progress::SegmentReady { .. }))
			.count();
		let failed_count = frames
			.iter()
			.filter(|f| matches!(f, Progress::SegmentFailed { .. }))
			.count();
		assert_eq!(ready_count, 2, "seg0 and seg1 should have succeeded: {:?}", frames);
		assert_eq!(failed_count, 1, "seg2 should have failed: {:?}", frames);

		// Automatic rollback (spec step 4) already ran by the time
		// run_segments returned: the journal is gone and so are the two
		// directories that were journaled.
		assert!(!hub.journal.exists());
		assert!(!seg0_dir.exists());
		assert!(!seg1_dir.exists());

		// Rollback idempotence: invoking it again with no journal present
		// is a no-op success, not an error.
		hub.clean_init_cluster().await.unwrap();

		let status = hub.handle(&HubRpc::CleanInitCluster, agent_node_id).await.unwrap();
		assert!(matches!(status, HubRpc::AlreadyClean));
	}
}

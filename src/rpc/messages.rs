//! Shared IDL-equivalent types: the cluster data model plus the RPC
//! message enums. Hub, Agent and Controller all depend on this crate
//! and never on each other, which is how the cyclic dependency the
//! `gpctl`/`gpservice` pair had is designed away here.
use std::collections::HashMap;

use netapp::message::Rpc;
use serde::{Deserialize, Serialize};

use meshctl_util::error::Error;

/// One database process instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Segment {
	pub hostname: String,
	pub address: String,
	pub port: u16,
	pub data_directory: String,
}

/// A primary and its optional hot standby.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentPair {
	pub primary: Segment,
	pub mirror: Option<Segment>,
}

/// The fully expanded segment topology: one coordinator plus an ordered
/// list of primary/mirror pairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpArray {
	pub coordinator: Segment,
	pub pairs: Vec<SegmentPair>,
}

/// The seven locale fields the engine's `initdb` needs. All default from
/// the admin host's system locale when the operator config omits them
/// (see `meshctl_planner::locale`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Locale {
	pub lc_all: String,
	pub lc_collate: String,
	pub lc_ctype: String,
	pub lc_messages: String,
	pub lc_monetary: String,
	pub lc_numeric: String,
	pub lc_time: String,
}

/// Operator-level knobs shared across the whole cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterParams {
	pub db_name: String,
	pub encoding: String,
	pub hba_hostnames: bool,
	pub data_checksums: bool,
	pub su_password: String,
	pub locale: Locale,
	pub common_config: HashMap<String, String>,
	pub coordinator_config: HashMap<String, String>,
	pub segment_config: HashMap<String, String>,
}

/// Input to `HubRpc::MakeCluster`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MakeClusterRequest {
	pub array: GpArray,
	pub params: ClusterParams,
	pub force: bool,
	pub verbose: bool,
}

/// Per-agent liveness snapshot returned by `HubRpc::StatusAgents`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
	pub hostname: String,
	pub up: bool,
	pub pid: Option<u32>,
}

/// Outcome of one `AgentRpc::MakeSegment` call: the engine's init binary
/// is an opaque subprocess, so all the Agent can report upward is
/// whether it exited successfully and what it printed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentInitOutcome {
	pub success: bool,
	pub stdout: String,
	pub stderr: String,
}

/// One frame of the `MakeCluster` progress stream. `netapp` has no
/// native server-streaming verb, so the Hub delivers these one at a time
/// via `ControllerRpc::Progress` calls back to an endpoint the Controller
/// registers before issuing `MakeCluster`; `seq` preserves FIFO ordering
/// even though each frame is its own RPC round-trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Progress {
	PhaseStart {
		seq: u64,
		phase: String,
	},
	SegmentReady {
		seq: u64,
		hostname: String,
		data_directory: String,
	},
	SegmentFailed {
		seq: u64,
		hostname: String,
		data_directory: String,
		message: String,
	},
	Log {
		seq: u64,
		line: String,
	},
	Terminal {
		seq: u64,
		error: Option<String>,
	},
}

impl Progress {
	pub fn seq(&self) -> u64 {
		match self {
			Progress::PhaseStart { seq, .. }
			| Progress::SegmentReady { seq, .. }
			| Progress::SegmentFailed { seq, .. }
			| Progress::Log { seq, .. }
			| Progress::Terminal { seq, .. } => *seq,
		}
	}
}

/// RPC messages the Controller sends to the Hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HubRpc {
	Ok,
	GetAllHostNames(Vec<String>),
	HostNames(HashMap<String, String>),
	MakeCluster(MakeClusterRequest),
	CleanInitCluster,
	/// "cluster is clean" sentinel: no journal was present to replay.
	AlreadyClean,
	StatusAgents,
	AgentStatuses(Vec<ServiceStatus>),
	ReportAgentHealth,
}

impl Rpc for HubRpc {
	type Response = Result<HubRpc, Error>;
}

/// RPC messages the Hub sends to an Agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AgentRpc {
	Ok,
	MakeSegment {
		segment: Segment,
		params: ClusterParams,
		is_coordinator: bool,
		force: bool,
	},
	SegmentInitialized(SegmentInitOutcome),
	RemoveDirectory(String),
	Hostname,
	HostnameIs(String),
	CheckPortFree { address: String, port: u16 },
	PortFree(bool),
}

impl Rpc for AgentRpc {
	type Response = Result<AgentRpc, Error>;
}

/// RPC messages the Hub pushes to the Controller's callback endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ControllerRpc {
	Ok,
	Progress(Progress),
}

impl Rpc for ControllerRpc {
	type Response = Result<ControllerRpc, Error>;
}

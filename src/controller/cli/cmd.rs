//! Command dispatch and the `StreamController` progress presentation
//! layer, grounded on `cmd_status`'s pattern of matching RPC response
//! variants explicitly and printing formatted results.
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use structopt::StructOpt;

use netapp::endpoint::EndpointHandler;
use netapp::NodeID;

use meshctl_rpc::{ControllerRpc, Progress};
use meshctl_util::error::Error;

#[derive(StructOpt, Debug)]
#[structopt(name = "meshctl", about = "Cluster bootstrap control plane")]
pub enum Command {
	/// Initialize a cluster, or roll one back with --clean
	Init(InitOpt),
}

#[derive(StructOpt, Debug)]
pub struct InitOpt {
	/// Path to the operator cluster configuration file. Not permitted
	/// together with --clean.
	pub config_file: Option<PathBuf>,

	/// Allow non-empty data directories by clearing them first.
	#[structopt(long)]
	pub force: bool,

	/// Roll back an in-progress or failed init using the existing
	/// rollback journal, instead of running one.
	#[structopt(long)]
	pub clean: bool,

	/// Print every log line the Hub relays, not just phase and segment
	/// events.
	#[structopt(long)]
	pub verbose: bool,
}

impl InitOpt {
	pub fn validate(&self) -> Result<(), Error> {
		if self.clean && self.config_file.is_some() {
			return Err(Error::Message("--clean does not take a config-file argument".into()));
		}
		if self.clean && self.force {
			return Err(Error::Message("--clean and --force are mutually exclusive".into()));
		}
		if !self.clean && self.config_file.is_none() {
			return Err(Error::Message("init requires a config-file argument (or --clean)".into()));
		}
		Ok(())
	}
}

/// Renders the `Progress` stream the Hub pushes during `MakeCluster` to
/// the terminal: one rendering arm per tagged variant, dispatched on the
/// enum rather than sniffed out of a string. Registered as a `netapp`
/// endpoint handler so the Hub can call back into it.
pub struct StreamController {
	current_phase: Mutex<Option<String>>,
	verbose: bool,
}

impl StreamController {
	pub fn new(verbose: bool) -> Arc<Self> {
		Arc::new(Self {
			current_phase: Mutex::new(None),
			verbose,
		})
	}

	fn render(&self, progress: &Progress) {
		match progress {
			Progress::PhaseStart { phase, .. } => {
				println!("==> {}", phase);
				*self.current_phase.lock().unwrap() = Some(phase.clone());
			}
			Progress::SegmentReady {
				hostname,
				data_directory,
				..
			} => {
				println!("  [ok]   {}:{}", hostname, data_directory);
			}
			Progress::SegmentFailed {
				hostname,
				data_directory,
				message,
				..
			} => {
				println!("  [FAIL] {}:{}: {}", hostname, data_directory, message);
			}
			Progress::Log { line, .. } => {
				if self.verbose {
					println!("  {}", line);
				}
			}
			Progress::Terminal { error: None, .. } => {
				println!("cluster initialization complete");
			}
			Progress::Terminal { error: Some(msg), .. } => {
				println!("cluster initialization failed: {}", msg);
			}
		}
	}
}

#[async_trait]
impl EndpointHandler<ControllerRpc> for StreamController {
	async fn handle(self: &Arc<Self>, msg: &ControllerRpc, _from: NodeID) -> Result<ControllerRpc, Error> {
		match msg {
			ControllerRpc::Progress(p) => {
				self.render(p);
				Ok(ControllerRpc::Ok)
			}
			other => Err(Error::unexpected_rpc_message(other)),
		}
	}
}

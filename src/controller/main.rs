//! `meshctl`: the operator-facing CLI that drives cluster-initialization
//! runs. Brings up the Hub if one isn't already running, streams
//! progress from it, and triggers rollback on failure or cancellation.
#[macro_use]
extern crate tracing;

mod cli;
mod lock;
mod mesh;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use structopt::StructOpt;

use meshctl_planner::input::ClusterConfig;
use meshctl_rpc::{HubRpc, CONTROLLER_RPC_PATH};
use meshctl_util::error::{Error, ErrorKind, OptionExt};

use cli::{Command, InitOpt, StreamController};
use lock::RunLock;

#[derive(StructOpt, Debug)]
#[structopt(name = "meshctl", about = "Cluster bootstrap control plane")]
struct Opt {
	#[structopt(subcommand)]
	cmd: Command,
}

#[tokio::main]
async fn main() {
	std::panic::set_hook(Box::new(|panic_info| {
		eprintln!("======== PANIC (internal meshctl error) ========");
		eprintln!("{}", panic_info);
		eprintln!();
		eprintln!("This is a bug: please report it along with the log output above.");
		eprintln!();
		eprintln!("BACKTRACE:");
		eprintln!("{:?}", backtrace::Backtrace::new());
		std::process::abort();
	}));

	if std::env::var("RUST_LOG").is_err() {
		std::env::set_var("RUST_LOG", "netapp=warn,meshctl=info");
	}
	tracing_subscriber::fmt()
		.with_writer(std::io::stderr)
		.with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
		.init();
	sodiumoxide::init().expect("unable to init sodiumoxide");

	let opt = Opt::from_args();
	match run(opt).await {
		Ok(()) => std::process::exit(0),
		Err((kind, e)) => {
			eprint!("Error [{}]: {}", kind, e);
			if let Some(hint) = kind.hint() {
				eprint!(" ({})", hint);
			}
			eprintln!();
			std::process::exit(1);
		}
	}
}

fn state_dir() -> PathBuf {
	PathBuf::from(std::env::var("MESHCTL_STATE_DIR").unwrap_or_else(|_| "/var/lib/meshctl".into()))
}

fn config_dir() -> PathBuf {
	PathBuf::from(std::env::var("MESHCTL_CONFIG_DIR").unwrap_or_else(|_| "/etc/meshctl".into()))
}

async fn run(opt: Opt) -> Result<(), (ErrorKind, Error)> {
	let Command::Init(init_opt) = opt.cmd;
	init_opt
		.validate()
		.map_err(|e| (ErrorKind::ConfigInvalid, e))?;

	let state_dir = state_dir();
	let config_dir = config_dir();
	std::fs::create_dir_all(&state_dir).map_err(|e| (ErrorKind::Internal, Error::from(e)))?;

	let _lock = RunLock::acquire(&state_dir).map_err(|e| (ErrorKind::Internal, e))?;

	run_init(&init_opt, &state_dir, &config_dir)
		.await
		.map_err(|e| classify(e))
}

/// Maps a propagated [`Error`] to the nearest [`ErrorKind`] so the
/// top-level `main` can print a distinct, hinted message per failure
/// category instead of always exiting 1 with a flat message.
fn classify(e: Error) -> (ErrorKind, Error) {
	let msg = e.to_string();
	let kind = if msg.contains("cancel") || msg.contains("SIGTERM") || msg.contains("SIGINT") {
		ErrorKind::UserTermination
	} else if msg.contains("rollback") || msg.contains("CleanInitCluster") {
		ErrorKind::RollbackFailed
	} else if msg.contains("connect") || msg.contains("reachable") || msg.contains("timed out") {
		ErrorKind::MeshUnavailable
	} else if msg.contains("segment") || msg.contains("Agent") {
		ErrorKind::SegmentInitFailed
	} else {
		ErrorKind::ConfigInvalid
	};
	(kind, e)
}

async fn run_init(opt: &InitOpt, state_dir: &std::path::Path, config_dir: &std::path::Path) -> Result<(), Error> {
	if opt.clean {
		return run_clean(state_dir, config_dir).await;
	}

	let config_file = opt.config_file.as_ref().ok_or_message("config file is required")?;
	let contents = std::fs::read_to_string(config_file)
		.map_err(|e| Error::Message(format!("unable to read {}: {}", config_file.display(), e)))?;
	let mut cluster_config: ClusterConfig =
		toml::from_str(&contents).map_err(|e| Error::Message(format!("invalid cluster config: {}", e)))?;

	let coordinator = cluster_config
		.coordinator
		.clone()
		.ok_or_message("cluster config is missing the coordinator block")?;

	let mesh = mesh::connect(state_dir, config_dir, Some(&cluster_config)).await?;
	info!(
		"mesh {} at {} hosts",
		if mesh.started_fresh { "started" } else { "already running" },
		mesh.config.hostnames.len()
	);
	mesh.report_agent_health().await?;

	let resolution = if cluster_config.uses_expansion_fields() {
		let hostnames = match mesh.call(HubRpc::GetAllHostNames(cluster_config.hostlist.clone())).await? {
			HubRpc::HostNames(map) => map,
			other => return Err(Error::unexpected_rpc_message(other)),
		};
		let address_to_name: std::collections::BTreeMap<String, String> = hostnames.into_iter().collect();
		meshctl_planner::expand::HostResolution::from_address_map(address_to_name)
	} else {
		meshctl_planner::expand::HostResolution::from_address_map(Default::default())
	};

	meshctl_planner::validate::validate_and_fill_defaults(&mut cluster_config, coordinator.port, &resolution)?;

	let pairs = if cluster_config.uses_expansion_fields() {
		meshctl_planner::expand::expand_seg_pairs(&cluster_config, &resolution)
	} else {
		cluster_config
			.segment_array
			.clone()
			.unwrap()
			.into_iter()
			.map(|p| meshctl_rpc::SegmentPair {
				primary: to_segment(&p.primary),
				mirror: p.mirror.as_ref().map(to_segment),
			})
			.collect()
	};

	let locale = match &cluster_config.locale {
		Some(locale) => locale.clone(),
		None => {
			warn!("locale is not provided, setting it to system locale");
			let capabilities = meshctl_util::capabilities::Capabilities::production();
			meshctl_planner::locale::system_locale(&*capabilities.process).await?
		}
	};

	let params = meshctl_rpc::ClusterParams {
		db_name: cluster_config.db_name.clone(),
		encoding: cluster_config.encoding.clone(),
		hba_hostnames: cluster_config.hba_hostnames,
		data_checksums: cluster_config.data_checksums,
		su_password: cluster_config.su_password.clone(),
		locale,
		common_config: cluster_config.common_config.clone(),
		coordinator_config: cluster_config.coordinator_config.clone(),
		segment_config: cluster_config.segment_config.clone(),
	};

	let mut request = meshctl_rpc::MakeClusterRequest {
		array: meshctl_rpc::GpArray {
			coordinator: meshctl_rpc::Segment {
				hostname: coordinator.hostname.clone(),
				address: coordinator.address.clone(),
				port: coordinator.port,
				data_directory: coordinator.data_directory.clone(),
			},
			pairs,
		},
		params,
		force: opt.force,
		verbose: opt.verbose,
	};
	meshctl_planner::validate::validate_request(&mut request, &mesh.config.hostnames)?;

	let stream_controller = StreamController::new(opt.verbose);
	let controller_endpoint = mesh
		.netapp
		.endpoint::<meshctl_rpc::ControllerRpc, StreamController>(CONTROLLER_RPC_PATH.into());
	controller_endpoint.set_handler(stream_controller);

	let terminated = Arc::new(AtomicBool::new(false));
	let make_cluster = mesh.call(HubRpc::MakeCluster(request));
	tokio::pin!(make_cluster);

	let result = tokio::select! {
		res = &mut make_cluster => res,
		_ = wait_for_termination() => {
			terminated.store(true, Ordering::SeqCst);
			warn!("termination signal received, cluster initialization may still be in progress on the Hub");
			Err(Error::Message("cluster initialization cancelled: SIGINT/SIGTERM received".into()))
		}
	};

	match result {
		Ok(HubRpc::Ok) => {
			info!("cluster initialization complete");
			Ok(())
		}
		Ok(other) => Err(Error::unexpected_rpc_message(other)),
		Err(e) => {
			let should_prompt = !terminated.load(Ordering::SeqCst);
			if should_prompt && !confirm("cluster initialization failed; roll back now?") {
				return Err(e);
			}
			match mesh.call(HubRpc::CleanInitCluster).await {
				Ok(_) => {}
				Err(clean_err) => {
					return Err(Error::Message(format!(
						"cluster initialization failed ({}); rollback also failed: {}",
						e, clean_err
					)));
				}
			}
			Err(e)
		}
	}
}

async fn run_clean(state_dir: &std::path::Path, config_dir: &std::path::Path) -> Result<(), Error> {
	let mesh = mesh::connect(state_dir, config_dir, None).await?;
	match mesh.call(HubRpc::CleanInitCluster).await? {
		HubRpc::Ok => {
			info!("rollback complete");
			Ok(())
		}
		HubRpc::AlreadyClean => {
			info!("nothing to clean up");
			Ok(())
		}
		other => Err(Error::unexpected_rpc_message(other)),
	}
}

fn to_segment(spec: &meshctl_planner::input::SegmentSpec) -> meshctl_rpc::Segment {
	meshctl_rpc::Segment {
		hostname: spec.hostname.clone(),
		address: spec.address.clone(),
		port: spec.port,
		data_directory: spec.data_directory.clone(),
	}
}

async fn wait_for_termination() {
	let mut sigterm =
		tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).expect("failed to install SIGTERM handler");
	tokio::select! {
		_ = tokio::signal::ctrl_c() => {}
		_ = sigterm.recv() => {}
	}
}

fn confirm(prompt: &str) -> bool {
	use std::io::Write;
	eprint!("{} [y/N] ", prompt);
	let _ = std::io::stderr().flush();
	let mut line = String::new();
	if std::io::stdin().read_line(&mut line).is_err() {
		return false;
	}
	matches!(line.trim().to_lowercase().as_str(), "y" | "yes")
}

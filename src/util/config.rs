//! The persisted service configuration: ports, hostnames, log directory,
//! and TLS credential paths for one Hub/Agent mesh.
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, OptionExt};

pub const DEFAULT_HUB_PORT: u16 = 4242;
pub const DEFAULT_AGENT_PORT: u16 = 8000;
pub const DEFAULT_SERVICE_NAME: &str = "meshctl";

/// Paths to the TLS material used to authenticate the Hub/Agent mesh.
/// The core never reads the key bytes itself; it only ever hands the
/// paths down to the transport layer at startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
	pub ca_cert_path: PathBuf,
	pub cert_path: PathBuf,
	pub key_path: PathBuf,
	#[serde(default = "default_true")]
	pub tls_enabled: bool,
	/// Hex-encoded pre-shared key the mesh's `netapp` transport uses for
	/// pairwise peer authentication, independent of the TLS material
	/// above (which secures the operator-facing surface, not the
	/// Hub/Agent/Controller mesh itself).
	pub network_key_hex: String,
}

fn default_true() -> bool {
	true
}

/// The on-disk service configuration, written once by the Controller the
/// first time it brings up a Hub/Agent mesh, and read back on every
/// subsequent invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
	#[serde(rename = "hubPort")]
	pub hub_port: u16,
	#[serde(rename = "agentPort")]
	pub agent_port: u16,
	pub hostnames: Vec<String>,
	#[serde(rename = "hubLogDir")]
	pub hub_log_dir: PathBuf,
	#[serde(rename = "serviceName")]
	pub service_name: String,
	pub gphome: PathBuf,
	#[serde(rename = "defaultConfig")]
	pub default_config: bool,
	pub credentials: Credentials,
}

impl Config {
	pub fn new(
		hub_port: u16,
		agent_port: u16,
		hostnames: Vec<String>,
		hub_log_dir: PathBuf,
		service_name: String,
		gphome: PathBuf,
		credentials: Credentials,
		default_config: bool,
	) -> Self {
		Self {
			hub_port,
			agent_port,
			hostnames,
			hub_log_dir,
			service_name,
			gphome,
			default_config,
			credentials,
		}
	}
}

/// Resolve `GPHOME` from the environment. No other environment variable is
/// an authoritative input to the control plane.
pub fn gphome_from_env() -> Result<PathBuf, Error> {
	std::env::var("GPHOME")
		.ok()
		.map(PathBuf::from)
		.ok_or_message("GPHOME environment variable must be set")
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn round_trip_is_bit_identical() {
		let cfg = Config::new(
			4242,
			8000,
			vec!["sdw1".into(), "sdw2".into()],
			PathBuf::from("/tmp/meshctl/logs"),
			"meshctl".into(),
			PathBuf::from("/usr/local/greenplum-db"),
			Credentials {
				ca_cert_path: "/etc/meshctl/ca.pem".into(),
				cert_path: "/etc/meshctl/cert.pem".into(),
				key_path: "/etc/meshctl/key.pem".into(),
				tls_enabled: true,
				network_key_hex: "00".repeat(32),
			},
			true,
		);

		let encoded = serde_json::to_string(&cfg).unwrap();
		let decoded: Config = serde_json::from_str(&encoded).unwrap();
		assert_eq!(cfg, decoded);
	}
}

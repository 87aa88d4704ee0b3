//! The decoded shape of the operator configuration file. Parsing the
//! file itself (TOML/YAML/JSON) is an out-of-scope collaborator; this
//! module only describes the record the Planner consumes once that
//! decoding has already happened.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use meshctl_rpc::Locale;

pub const SEGMENT_NAME_PREFIX: &str = "seg";
pub const DEFAULT_ENCODING: &str = "UTF8";
pub const DEFAULT_QD_MAX_CONNECT: u32 = 150;
pub const QE_CONNECT_FACTOR: u32 = 3;
pub const DEFAULT_SHARED_BUFFERS: &str = "128000kB";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MirroringType {
	Group,
	Spread,
}

impl Default for MirroringType {
	fn default() -> Self {
		MirroringType::Group
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorSpec {
	pub hostname: String,
	#[serde(default)]
	pub address: String,
	pub port: u16,
	pub data_directory: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentSpec {
	pub hostname: String,
	#[serde(default)]
	pub address: String,
	pub port: u16,
	pub data_directory: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentPairSpec {
	pub primary: SegmentSpec,
	pub mirror: Option<SegmentSpec>,
}

/// The operator's compact configuration record: either a fully spelled
/// out `segment_array`, or the `hostlist`/`primary_data_directories`/...
/// expansion fieldset the Planner expands itself. The two are mutually
/// exclusive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterConfig {
	pub coordinator: Option<CoordinatorSpec>,

	#[serde(default)]
	pub segment_array: Option<Vec<SegmentPairSpec>>,

	#[serde(default)]
	pub hostlist: Vec<String>,
	#[serde(default)]
	pub primary_data_directories: Vec<String>,
	pub primary_base_port: Option<u16>,
	#[serde(default)]
	pub mirror_data_directories: Vec<String>,
	pub mirror_base_port: Option<u16>,
	pub mirroring_type: Option<MirroringType>,

	#[serde(default)]
	pub db_name: String,
	#[serde(default)]
	pub encoding: String,
	#[serde(default)]
	pub hba_hostnames: bool,
	#[serde(default = "default_true")]
	pub data_checksums: bool,
	#[serde(default)]
	pub su_password: String,
	pub locale: Option<Locale>,

	#[serde(default)]
	pub common_config: HashMap<String, String>,
	#[serde(default)]
	pub coordinator_config: HashMap<String, String>,
	#[serde(default)]
	pub segment_config: HashMap<String, String>,
}

fn default_true() -> bool {
	true
}

impl ClusterConfig {
	pub fn contains_mirror(&self) -> bool {
		!self.mirror_data_directories.is_empty()
			|| self
				.segment_array
				.as_ref()
				.map(|pairs| pairs.iter().any(|p| p.mirror.is_some()))
				.unwrap_or(false)
	}

	pub fn uses_expansion_fields(&self) -> bool {
		self.segment_array.is_none()
	}
}

//! The two validation passes: pre-expansion operator-config validation
//! (`validate_and_fill_defaults`) and post-expansion
//! `MakeClusterRequest` validation (`validate_request`).
use std::collections::{HashMap, HashSet};

use meshctl_rpc::{MakeClusterRequest, Segment};
use meshctl_util::error::Error;

use crate::expand::HostResolution;
use crate::input::{
	ClusterConfig, MirroringType, DEFAULT_ENCODING, DEFAULT_QD_MAX_CONNECT, DEFAULT_SHARED_BUFFERS,
	QE_CONNECT_FACTOR,
};

fn any_blank(items: &[String]) -> bool {
	items.iter().any(|s| s.trim().is_empty())
}

/// Validate the operator's expansion fieldset and fill in the ports and
/// mirroring type that default off the coordinator port, iff not
/// already set. No-op (beyond the mutual-exclusion check) when the
/// operator supplied a fully spelled out `segment_array` instead.
pub fn validate_and_fill_defaults(
	config: &mut ClusterConfig,
	coordinator_port: u16,
	resolution: &HostResolution,
) -> Result<(), Error> {
	if config.segment_array.is_some() && !config.primary_data_directories.is_empty() {
		return Err(Error::Message(
			"cannot specify segment-array and primary-data-directories together".into(),
		));
	}

	if !config.uses_expansion_fields() {
		return Ok(());
	}

	if config.primary_data_directories.is_empty() {
		return Err(Error::Message(
			"primary-data-directories not specified. Please specify primary-data-directories to continue".into(),
		));
	}
	if any_blank(&config.primary_data_directories) {
		return Err(Error::Message(
			"empty primary-data-directories entry provided, please provide valid directory".into(),
		));
	}
	if config.hostlist.is_empty() {
		return Err(Error::Message(
			"hostlist not specified. Please specify hostlist to continue".into(),
		));
	}
	if any_blank(&config.hostlist) {
		return Err(Error::Message(
			"empty hostlist entry detected, please provide valid hostlist".into(),
		));
	}

	let primary_base_port = config
		.primary_base_port
		.unwrap_or(coordinator_port.saturating_add(2));
	if primary_base_port == coordinator_port {
		return Err(Error::Message(
			"coordinator port and primary-base-port value cannot be same. Please provide different values".into(),
		));
	}
	config.primary_base_port = Some(primary_base_port);

	if config.contains_mirror() {
		if config.primary_data_directories.len() != config.mirror_data_directories.len() {
			return Err(Error::Message(
				"number of primary-data-directories should be equal to number of mirror-data-directories".into(),
			));
		}
		if any_blank(&config.mirror_data_directories) {
			return Err(Error::Message(
				"empty mirror-data-directories entry provided, please provide valid directory".into(),
			));
		}

		let mirror_base_port = config
			.mirror_base_port
			.unwrap_or(primary_base_port.saturating_add(1000));
		if mirror_base_port == coordinator_port {
			return Err(Error::Message(
				"coordinator port and mirror-base-port value cannot be same. Please provide different values".into(),
			));
		}
		if mirror_base_port == primary_base_port {
			return Err(Error::Message(
				"primary-base-port and mirror-base-port value cannot be same. Please provide different values".into(),
			));
		}
		config.mirror_base_port = Some(mirror_base_port);
		config.mirroring_type = Some(config.mirroring_type.unwrap_or_default());
	}

	if resolution.is_multi_home {
		let per_host_counts: HashSet<usize> = resolution
			.name_to_addresses
			.values()
			.map(|v| v.len())
			.collect();
		if per_host_counts.len() > 1 {
			return Err(Error::Message(
				"multi-home validation failed, all hosts should have same number of interfaces/aliases".into(),
			));
		}
		let addresses_per_host = per_host_counts.into_iter().next().unwrap_or(1);
		if config.primary_data_directories.len() % addresses_per_host != 0 {
			return Err(Error::Message(
				"multi-host setup must have data-directories in multiple of number of addresses or more.".into(),
			));
		}

		if config.contains_mirror() && config.mirroring_type == Some(MirroringType::Spread) {
			let distinct_hosts = resolution.name_to_addresses.len();
			let primaries_per_host = config.primary_data_directories.len() / addresses_per_host;
			if distinct_hosts <= primaries_per_host {
				return Err(Error::Message(
					"to enable spread mirroring, number of hosts should be more than number of primary segments per host.".into(),
				));
			}
		}
	} else if config.contains_mirror() && config.mirroring_type == Some(MirroringType::Spread) {
		let distinct_hosts = config.hostlist.len();
		let primaries_per_host = config.primary_data_directories.len();
		if distinct_hosts <= primaries_per_host {
			return Err(Error::Message(
				"to enable spread mirroring, number of hosts should be more than number of primary segments per host.".into(),
			));
		}
	}

	Ok(())
}

fn validate_segment(segment: &mut Segment) -> Result<(), Error> {
	if segment.hostname.is_empty() {
		return Err(Error::Message(format!(
			"hostname has not been provided for the segment with port {} and data_directory {}",
			segment.port, segment.data_directory
		)));
	}
	if segment.address.is_empty() {
		warn!(
			"address has not been provided, defaulting to hostname {} for segment with port {} and data_directory {}",
			segment.hostname, segment.port, segment.data_directory
		);
		segment.address = segment.hostname.clone();
	}
	if segment.port == 0 {
		return Err(Error::Message(format!(
			"invalid port has been provided for segment with hostname {} and data_directory {}",
			segment.hostname, segment.data_directory
		)));
	}
	if segment.data_directory.is_empty() {
		return Err(Error::Message(format!(
			"data_directory has not been provided for segment with hostname {} and port {}",
			segment.hostname, segment.port
		)));
	}
	Ok(())
}

/// Both checks key on a different field on purpose: data-directory
/// uniqueness is keyed by hostname (multiple NICs on one host still
/// share one filesystem), port uniqueness is keyed by address (multiple
/// NICs on one host may legitimately reuse a port number, one per
/// address).
fn check_duplicates(segments: &[&Segment]) -> Result<(), Error> {
	let mut host_to_dirs: HashMap<&str, HashSet<&str>> = HashMap::new();
	let mut address_to_ports: HashMap<&str, HashSet<u16>> = HashMap::new();

	for seg in segments {
		let dirs = host_to_dirs.entry(&seg.hostname).or_default();
		if !dirs.insert(&seg.data_directory) {
			return Err(Error::Message(format!(
				"duplicate data directory entry {} found for host {}",
				seg.data_directory, seg.hostname
			)));
		}

		let ports = address_to_ports.entry(&seg.address).or_default();
		if !ports.insert(seg.port) {
			return Err(Error::Message(format!(
				"duplicate port entry {} found for host {}",
				seg.port, seg.hostname
			)));
		}
	}
	Ok(())
}

fn cascade_max_connections(
	params: &mut meshctl_rpc::ClusterParams,
) -> Result<(), Error> {
	params
		.common_config
		.entry("max_connections".into())
		.or_insert_with(|| DEFAULT_QD_MAX_CONNECT.to_string());

	if !params.coordinator_config.contains_key("max_connections") {
		let common = params.common_config["max_connections"].clone();
		params.coordinator_config.insert("max_connections".into(), common);
	}
	let coordinator_max: i64 = params.coordinator_config["max_connections"]
		.parse()
		.map_err(|e| {
			Error::Message(format!(
				"invalid value {} for max_connections, must be an integer. error: {}",
				params.coordinator_config["max_connections"], e
			))
		})?;
	if coordinator_max < 1 {
		return Err(Error::Message(format!(
			"coordinator max_connections value {} is too small. Should be more than 1.",
			coordinator_max
		)));
	}

	if !params.segment_config.contains_key("max_connections") {
		let common_max: i64 = params.common_config["max_connections"].parse().map_err(|e| {
			Error::Message(format!(
				"invalid value {} for max_connections, must be an integer. error: {}",
				params.common_config["max_connections"], e
			))
		})?;
		let segment_max = common_max * i64::from(QE_CONNECT_FACTOR);
		params
			.segment_config
			.insert("max_connections".into(), segment_max.to_string());
	}
	Ok(())
}

fn cascade_default(params: &mut meshctl_rpc::ClusterParams, key: &str, default: &str) {
	params
		.common_config
		.entry(key.into())
		.or_insert_with(|| default.into());
	let common_value = params.common_config[key].clone();
	params
		.coordinator_config
		.entry(key.into())
		.or_insert_with(|| common_value.clone());
	params
		.segment_config
		.entry(key.into())
		.or_insert_with(|| common_value);
}

/// Post-expansion validation of a fully materialized `MakeClusterRequest`.
/// Mutates the request in place to apply the defaulting rules
/// (address-from-hostname, encoding, config cascades).
pub fn validate_request(
	request: &mut MakeClusterRequest,
	known_hostnames: &[String],
) -> Result<(), Error> {
	let num_primary = request.array.pairs.len();
	if num_primary == 0 {
		return Err(Error::Message(
			"no primary segments are provided in input config file".into(),
		));
	}
	let num_mirror = request
		.array
		.pairs
		.iter()
		.filter(|p| p.mirror.is_some())
		.count();
	if num_mirror != 0 && num_mirror != num_primary {
		return Err(Error::Message(format!(
			"number of primary segments {} and number of mirror segments {} must be equal",
			num_primary, num_mirror
		)));
	}

	validate_segment(&mut request.array.coordinator)?;
	for pair in &mut request.array.pairs {
		validate_segment(&mut pair.primary)?;
		if let Some(mirror) = &mut pair.mirror {
			validate_segment(mirror)?;
		}
	}

	{
		let coordinator = &request.array.coordinator;
		let mut segments: Vec<&Segment> = vec![coordinator];
		for pair in &request.array.pairs {
			segments.push(&pair.primary);
			if let Some(mirror) = &pair.mirror {
				segments.push(mirror);
			}
		}
		check_duplicates(&segments)?;
	}

	{
		let mut hostnames: Vec<&str> = vec![request.array.coordinator.hostname.as_str()];
		hostnames.extend(request.array.pairs.iter().map(|p| p.primary.hostname.as_str()));
		hostnames.sort();
		hostnames.dedup();
		let known: HashSet<&str> = known_hostnames.iter().map(|s| s.as_str()).collect();
		let missing: Vec<&str> = hostnames
			.into_iter()
			.filter(|h| !known.contains(h))
			.collect();
		if !missing.is_empty() {
			return Err(Error::Message(format!(
				"following hostnames {:?} do not have gp services configured. Please configure the services",
				missing
			)));
		}
	}

	if request.params.encoding.is_empty() {
		info!(
			"could not find encoding in cluster config, defaulting to {}",
			DEFAULT_ENCODING
		);
		request.params.encoding = DEFAULT_ENCODING.into();
	}
	if request.params.encoding == "SQL_ASCII" {
		return Err(Error::Message(
			"SQL_ASCII is no longer supported as a server encoding".into(),
		));
	}

	cascade_max_connections(&mut request.params)?;
	cascade_default(&mut request.params, "shared_buffers", DEFAULT_SHARED_BUFFERS);

	Ok(())
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::expand::HostResolution;
	use std::collections::BTreeMap;

	fn resolution(hosts: &[&str]) -> HostResolution {
		let map = hosts.iter().map(|h| (h.to_string(), h.to_string())).collect();
		HostResolution::from_address_map(map)
	}

	#[test]
	fn primary_base_port_equal_to_coordinator_port_is_rejected() {
		let mut config = ClusterConfig {
			hostlist: vec!["h1".into()],
			primary_data_directories: vec!["/data/p0".into()],
			primary_base_port: Some(5432),
			..Default::default()
		};
		let err = validate_and_fill_defaults(&mut config, 5432, &resolution(&["h1"])).unwrap_err();
		assert!(err.to_string().contains("cannot be same"));
	}

	#[test]
	fn single_host_spread_mirror_is_rejected() {
		let mut config = ClusterConfig {
			hostlist: vec!["h1".into()],
			primary_data_directories: vec!["/data/p0".into()],
			mirror_data_directories: vec!["/data/m0".into()],
			mirroring_type: Some(MirroringType::Spread),
			..Default::default()
		};
		let err = validate_and_fill_defaults(&mut config, 5432, &resolution(&["h1"])).unwrap_err();
		assert!(err.to_string().contains("spread mirroring"));
	}

	#[test]
	fn max_connections_cascades_with_qe_factor() {
		let mut params = meshctl_rpc::ClusterParams {
			db_name: "gpdb".into(),
			encoding: "UTF8".into(),
			hba_hostnames: false,
			data_checksums: true,
			su_password: "x".into(),
			locale: Default::default(),
			common_config: [("max_connections".to_string(), "100".to_string())].into(),
			coordinator_config: Default::default(),
			segment_config: Default::default(),
		};
		cascade_max_connections(&mut params).unwrap();
		assert_eq!(params.coordinator_config["max_connections"], "100");
		assert_eq!(
			params.segment_config["max_connections"],
			(100 * QE_CONNECT_FACTOR as i64).to_string()
		);
	}

	#[test]
	fn sql_ascii_encoding_is_rejected() {
		let mut request = MakeClusterRequest {
			array: meshctl_rpc::GpArray {
				coordinator: Segment {
					hostname: "h1".into(),
					address: "h1".into(),
					port: 5432,
					data_directory: "/data/coord".into(),
				},
				pairs: vec![meshctl_rpc::SegmentPair {
					primary: Segment {
						hostname: "h1".into(),
						address: "h1".into(),
						port: 7000,
						data_directory: "/data/p0/seg0".into(),
					},
					mirror: None,
				}],
			},
			params: meshctl_rpc::ClusterParams {
				db_name: "gpdb".into(),
				encoding: "SQL_ASCII".into(),
				hba_hostnames: false,
				data_checksums: true,
				su_password: "x".into(),
				locale: Default::default(),
				common_config: Default::default(),
				coordinator_config: Default::default(),
				segment_config: Default::default(),
			},
			force: false,
			verbose: false,
		};
		let err = validate_request(&mut request, &["h1".into()]).unwrap_err();
		assert!(err.to_string().contains("SQL_ASCII"));
	}
}

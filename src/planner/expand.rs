//! The four segment-placement expansion layouts, transcribed from
//! `ExpandNonMultiHomePrimaryList` /
//! `ExpandNonMultiHomeGroupMirrorList` / `ExpandNonMultiHomeSpreadMirroring`
//! / `ExpandMultiHomePrimaryArray` / `ExpandMultiHomeGroupMirrorList` /
//! `ExpandMultiHomeSpreadMirrorList` in the original `gpctl` source, kept
//! index-for-index so the segment numbering and host/address rotation
//! match exactly.
use std::collections::BTreeMap;

use meshctl_rpc::{Segment, SegmentPair};

use crate::input::{ClusterConfig, MirroringType, SEGMENT_NAME_PREFIX};

/// What the Hub's `GetAllHostNames` resolution told the Planner about
/// the operator's host list.
#[derive(Debug, Clone)]
pub struct HostResolution {
	pub is_multi_home: bool,
	/// hostname -> sorted list of addresses that resolve to it.
	pub name_to_addresses: BTreeMap<String, Vec<String>>,
	/// address -> canonical hostname (only meaningful when not multi-home).
	pub address_to_name: BTreeMap<String, String>,
}

impl HostResolution {
	/// `is_multi_home` holds iff distinct addresses resolve to fewer
	/// distinct hostnames than there are addresses (spec 4.1).
	pub fn from_address_map(address_to_name: BTreeMap<String, String>) -> Self {
		let distinct_addresses = address_to_name.len();
		let distinct_hostnames: std::collections::BTreeSet<&String> =
			address_to_name.values().collect();
		let is_multi_home = distinct_hostnames.len() < distinct_addresses;

		let mut name_to_addresses: BTreeMap<String, Vec<String>> = BTreeMap::new();
		for (address, hostname) in &address_to_name {
			name_to_addresses
				.entry(hostname.clone())
				.or_default()
				.push(address.clone());
		}
		for addrs in name_to_addresses.values_mut() {
			addrs.sort();
		}

		Self {
			is_multi_home,
			name_to_addresses,
			address_to_name,
		}
	}
}

fn segment_name(seg_num: usize) -> String {
	format!("{}{}", SEGMENT_NAME_PREFIX, seg_num)
}

fn join_data_dir(dir: &str, seg_num: usize) -> String {
	format!("{}/{}", dir.trim_end_matches('/'), segment_name(seg_num))
}

fn expand_non_multi_home_primary(
	primary_base_port: u16,
	primary_dirs: &[String],
	hosts: &[String],
	address_to_name: &BTreeMap<String, String>,
) -> Vec<SegmentPair> {
	let mut pairs = Vec::new();
	let mut seg_num = 0usize;
	for host_address in hosts {
		for (seg_idx, dir) in primary_dirs.iter().enumerate() {
			let primary = Segment {
				hostname: address_to_name[host_address].clone(),
				address: host_address.clone(),
				port: primary_base_port + seg_idx as u16,
				data_directory: join_data_dir(dir, seg_num),
			};
			pairs.push(SegmentPair {
				primary,
				mirror: None,
			});
			seg_num += 1;
		}
	}
	pairs
}

fn expand_non_multi_home_group_mirror(
	pairs: &mut [SegmentPair],
	mirror_base_port: u16,
	mirror_dirs: &[String],
	hosts: &[String],
	address_to_name: &BTreeMap<String, String>,
) {
	let host_len = hosts.len();
	let mut seg_num = 0usize;
	for host_idx in 0..host_len {
		for (seg_idx, dir) in mirror_dirs.iter().enumerate() {
			let host_address = &hosts[(host_idx + 1) % host_len];
			pairs[seg_num].mirror = Some(Segment {
				hostname: address_to_name[host_address].clone(),
				address: host_address.clone(),
				port: mirror_base_port + seg_idx as u16,
				data_directory: join_data_dir(dir, seg_num),
			});
			seg_num += 1;
		}
	}
}

fn expand_non_multi_home_spread_mirror(
	pairs: &mut [SegmentPair],
	mirror_base_port: u16,
	mirror_dirs: &[String],
	hosts: &[String],
	address_to_name: &BTreeMap<String, String>,
) {
	let host_len = hosts.len();
	let segments_per_host = mirror_dirs.len();
	let mut seg_num = 0usize;
	for host_index in 0..host_len {
		let mut mirror_host_index = (host_index + 1) % host_len;
		for local_seg in 0..segments_per_host {
			let host_address = &hosts[mirror_host_index];
			pairs[seg_num].mirror = Some(Segment {
				hostname: address_to_name[host_address].clone(),
				address: host_address.clone(),
				port: mirror_base_port + local_seg as u16,
				data_directory: join_data_dir(&mirror_dirs[local_seg], seg_num),
			});
			seg_num += 1;
			mirror_host_index = (mirror_host_index + 1) % host_len;
		}
	}
}

fn expand_multi_home_primary(
	primary_base_port: u16,
	primary_dirs: &[String],
	hostname_array: &[String],
	name_to_addresses: &BTreeMap<String, Vec<String>>,
) -> Vec<SegmentPair> {
	let mut pairs = Vec::new();
	let mut seg_num = 0usize;
	for hostname in hostname_array {
		let addresses = &name_to_addresses[hostname];
		for (idx, dir) in primary_dirs.iter().enumerate() {
			let primary = Segment {
				hostname: hostname.clone(),
				address: addresses[idx % addresses.len()].clone(),
				port: primary_base_port + idx as u16,
				data_directory: join_data_dir(dir, seg_num),
			};
			pairs.push(SegmentPair {
				primary,
				mirror: None,
			});
			seg_num += 1;
		}
	}
	pairs
}

fn expand_multi_home_group_mirror(
	pairs: &mut [SegmentPair],
	mirror_base_port: u16,
	mirror_dirs: &[String],
	hostname_array: &[String],
	name_to_addresses: &BTreeMap<String, Vec<String>>,
) {
	let unique_host_count = hostname_array.len();
	let mut seg_num = 0usize;
	for idx in 0..unique_host_count {
		let hostname = &hostname_array[(idx + 1) % unique_host_count];
		let addresses = &name_to_addresses[hostname];
		for (seg_idx, dir) in mirror_dirs.iter().enumerate() {
			pairs[seg_num].mirror = Some(Segment {
				hostname: hostname.clone(),
				address: addresses[seg_idx % addresses.len()].clone(),
				port: mirror_base_port + seg_idx as u16,
				data_directory: join_data_dir(dir, seg_num),
			});
			seg_num += 1;
		}
	}
}

/// Multi-home spread mirroring additionally skips the self-hostname when
/// the rotation would otherwise land a mirror back on its own primary
/// host.
fn expand_multi_home_spread_mirror(
	pairs: &mut [SegmentPair],
	mirror_base_port: u16,
	mirror_dirs: &[String],
	hostname_array: &[String],
	name_to_addresses: &BTreeMap<String, Vec<String>>,
) {
	let unique_host_count = hostname_array.len();
	let mut seg_num = 0usize;
	for hostname_idx in 0..hostname_array.len() {
		for (seg_idx, dir) in mirror_dirs.iter().enumerate() {
			let mut next_host_idx = (hostname_idx + seg_idx + 1) % unique_host_count;
			if next_host_idx == hostname_idx {
				next_host_idx = (next_host_idx + 1) % unique_host_count;
			}
			let next_hostname = &hostname_array[next_host_idx];
			let addresses = &name_to_addresses[next_hostname];
			let address_count = addresses.len();
			pairs[seg_num].mirror = Some(Segment {
				hostname: next_hostname.clone(),
				address: addresses[(hostname_idx + seg_idx) % address_count].clone(),
				port: mirror_base_port + seg_idx as u16,
				data_directory: join_data_dir(dir, seg_num),
			});
			seg_num += 1;
		}
	}
}

/// Expand `config`'s host list / data-directory templates into a fully
/// enumerated `Vec<SegmentPair>`, picking one of the four layouts based
/// on `resolution.is_multi_home` and `config.mirroring_type`.
///
/// Callers are expected to have already run
/// [`crate::validate::validate_cluster_config`].
pub fn expand_seg_pairs(config: &ClusterConfig, resolution: &HostResolution) -> Vec<SegmentPair> {
	let mut hosts = config.hostlist.clone();
	hosts.sort();

	let primary_base_port = config.primary_base_port.unwrap_or(0);
	let mirror_base_port = config.mirror_base_port.unwrap_or(0);
	let mirroring_type = config.mirroring_type.unwrap_or_default();
	let contains_mirror = config.contains_mirror();

	if resolution.is_multi_home {
		let mut hostname_array: Vec<String> = resolution.name_to_addresses.keys().cloned().collect();
		hostname_array.sort();

		let mut pairs = expand_multi_home_primary(
			primary_base_port,
			&config.primary_data_directories,
			&hostname_array,
			&resolution.name_to_addresses,
		);
		if contains_mirror {
			match mirroring_type {
				MirroringType::Group => expand_multi_home_group_mirror(
					&mut pairs,
					mirror_base_port,
					&config.mirror_data_directories,
					&hostname_array,
					&resolution.name_to_addresses,
				),
				MirroringType::Spread => expand_multi_home_spread_mirror(
					&mut pairs,
					mirror_base_port,
					&config.mirror_data_directories,
					&hostname_array,
					&resolution.name_to_addresses,
				),
			}
		}
		pairs
	} else {
		let mut pairs = expand_non_multi_home_primary(
			primary_base_port,
			&config.primary_data_directories,
			&hosts,
			&resolution.address_to_name,
		);
		if contains_mirror {
			match mirroring_type {
				MirroringType::Group => expand_non_multi_home_group_mirror(
					&mut pairs,
					mirror_base_port,
					&config.mirror_data_directories,
					&hosts,
					&resolution.address_to_name,
				),
				MirroringType::Spread => expand_non_multi_home_spread_mirror(
					&mut pairs,
					mirror_base_port,
					&config.mirror_data_directories,
					&hosts,
					&resolution.address_to_name,
				),
			}
		}
		pairs
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn simple_resolution(hosts: &[&str]) -> HostResolution {
		let map = hosts
			.iter()
			.map(|h| (h.to_string(), h.to_string()))
			.collect();
		HostResolution::from_address_map(map)
	}

	fn cfg(hostlist: &[&str], primary_dirs: &[&str], base_port: u16) -> ClusterConfig {
		ClusterConfig {
			hostlist: hostlist.iter().map(|s| s.to_string()).collect(),
			primary_data_directories: primary_dirs.iter().map(|s| s.to_string()).collect(),
			primary_base_port: Some(base_port),
			..Default::default()
		}
	}

	#[test]
	fn happy_path_two_hosts_two_primaries_mirrorless() {
		let resolution = simple_resolution(&["h1", "h2"]);
		let config = cfg(&["h1", "h2"], &["/data/p0", "/data/p1"], 7000);

		let pairs = expand_seg_pairs(&config, &resolution);
		assert_eq!(pairs.len(), 4);

		assert_eq!(pairs[0].primary.hostname, "h1");
		assert_eq!(pairs[0].primary.port, 7000);
		assert_eq!(pairs[0].primary.data_directory, "/data/p0/seg0");

		assert_eq!(pairs[1].primary.hostname, "h1");
		assert_eq!(pairs[1].primary.port, 7001);
		assert_eq!(pairs[1].primary.data_directory, "/data/p1/seg1");

		assert_eq!(pairs[2].primary.hostname, "h2");
		assert_eq!(pairs[2].primary.port, 7000);
		assert_eq!(pairs[2].primary.data_directory, "/data/p0/seg2");

		assert_eq!(pairs[3].primary.hostname, "h2");
		assert_eq!(pairs[3].primary.port, 7001);
		assert_eq!(pairs[3].primary.data_directory, "/data/p1/seg3");

		assert!(pairs.iter().all(|p| p.mirror.is_none()));
	}

	#[test]
	fn group_mirror_three_hosts_two_primaries() {
		let resolution = simple_resolution(&["h1", "h2", "h3"]);
		let mut config = cfg(&["h1", "h2", "h3"], &["/data/p0", "/data/p1"], 7000);
		config.mirror_data_directories = vec!["/data/m0".into(), "/data/m1".into()];
		config.mirror_base_port = Some(8000);
		config.mirroring_type = Some(MirroringType::Group);

		let pairs = expand_seg_pairs(&config, &resolution);
		assert_eq!(pairs.len(), 6);

		let mirror_host = |i: usize| pairs[i].mirror.as_ref().unwrap().hostname.clone();
		assert_eq!(mirror_host(0), "h2");
		assert_eq!(mirror_host(1), "h2");
		assert_eq!(mirror_host(2), "h3");
		assert_eq!(mirror_host(3), "h3");
		assert_eq!(mirror_host(4), "h1");
		assert_eq!(mirror_host(5), "h1");
	}

	#[test]
	fn spread_mirror_three_hosts_two_primaries() {
		let resolution = simple_resolution(&["h1", "h2", "h3"]);
		let mut config = cfg(&["h1", "h2", "h3"], &["/data/p0", "/data/p1"], 7000);
		config.mirror_data_directories = vec!["/data/m0".into(), "/data/m1".into()];
		config.mirror_base_port = Some(8000);
		config.mirroring_type = Some(MirroringType::Spread);

		let pairs = expand_seg_pairs(&config, &resolution);
		let mirror_host = |i: usize| pairs[i].mirror.as_ref().unwrap().hostname.clone();

		// primary host index 0 (h1): local seg 0 -> h2, local seg 1 -> h3
		assert_eq!(mirror_host(0), "h2");
		assert_eq!(mirror_host(1), "h3");
		// primary host index 1 (h2): local seg 0 -> h3, local seg 1 -> h1
		assert_eq!(mirror_host(2), "h3");
		assert_eq!(mirror_host(3), "h1");
		// primary host index 2 (h3): local seg 0 -> h1, local seg 1 -> h2
		assert_eq!(mirror_host(4), "h1");
		assert_eq!(mirror_host(5), "h2");
	}

	#[test]
	fn multi_home_alternates_addresses_per_hostname() {
		let mut address_to_name = BTreeMap::new();
		address_to_name.insert("h1-a".to_string(), "h1".to_string());
		address_to_name.insert("h1-b".to_string(), "h1".to_string());
		address_to_name.insert("h2-a".to_string(), "h2".to_string());
		address_to_name.insert("h2-b".to_string(), "h2".to_string());
		let resolution = HostResolution::from_address_map(address_to_name);
		assert!(resolution.is_multi_home);

		let mut config = cfg(
			&["h1-a", "h1-b", "h2-a", "h2-b"],
			&["/data/p0", "/data/p1", "/data/p2", "/data/p3"],
			7000,
		);
		config.hostlist.sort();

		let pairs = expand_seg_pairs(&config, &resolution);
		assert_eq!(pairs.len(), 8);
		// within h1's four segments, addresses alternate h1-a, h1-b, h1-a, h1-b
		let h1_addrs: Vec<String> = pairs[0..4]
			.iter()
			.map(|p| p.primary.address.clone())
			.collect();
		assert_eq!(h1_addrs, vec!["h1-a", "h1-b", "h1-a", "h1-b"]);
	}
}

//! Node identity: the ed25519 keypair each of Hub, Agent and Controller
//! uses to authenticate itself on the mesh, persisted next to the
//! process's metadata directory.
use std::io::{Read, Write};
use std::path::Path;

use sodiumoxide::crypto::sign::ed25519;

use netapp::{NetApp, NetworkKey, NodeID, NodeKey};

use meshctl_util::error::Error;

/// Version tag exchanged on connection; mismatched tags refuse to pair.
pub const MESHCTL_VERSION_TAG: u64 = 0x6d65_7368_6374_6c01; // "meshctl" + version 1

const NODE_KEY_FILE: &str = "node_key";
const NODE_PUBKEY_FILE: &str = "node_key.pub";

pub fn read_node_id(state_dir: &Path) -> Result<NodeID, Error> {
	let mut pubkey_file = state_dir.to_path_buf();
	pubkey_file.push(NODE_PUBKEY_FILE);

	let mut f = std::fs::File::open(&pubkey_file)?;
	let mut d = vec![];
	f.read_to_end(&mut d)?;
	if d.len() != 32 {
		return Err(Error::Message(format!(
			"corrupt {} file",
			NODE_PUBKEY_FILE
		)));
	}

	let mut key = [0u8; 32];
	key.copy_from_slice(&d[..]);
	Ok(NodeID::from_slice(&key[..]).unwrap())
}

/// Load this process's node key from `state_dir`, generating and
/// persisting a fresh one (mode 0600) on first run.
pub fn gen_node_key(state_dir: &Path) -> Result<NodeKey, Error> {
	let mut key_file = state_dir.to_path_buf();
	key_file.push(NODE_KEY_FILE);
	if key_file.exists() {
		let mut f = std::fs::File::open(&key_file)?;
		let mut d = vec![];
		f.read_to_end(&mut d)?;
		if d.len() != 64 {
			return Err(Error::Message(format!("corrupt {} file", NODE_KEY_FILE)));
		}
		let mut key = [0u8; 64];
		key.copy_from_slice(&d[..]);
		Ok(NodeKey::from_slice(&key[..]).unwrap())
	} else {
		if !state_dir.exists() {
			info!("node state directory does not exist, creating it");
			std::fs::create_dir_all(state_dir)?;
		}

		info!("generating new node key pair");
		let (pubkey, key) = ed25519::gen_keypair();

		{
			use std::os::unix::fs::PermissionsExt;
			let mut f = std::fs::File::create(&key_file)?;
			let mut perm = f.metadata()?.permissions();
			perm.set_mode(0o600);
			std::fs::set_permissions(&key_file, perm)?;
			f.write_all(&key[..])?;
		}
		{
			let mut pubkey_file = state_dir.to_path_buf();
			pubkey_file.push(NODE_PUBKEY_FILE);
			let mut f2 = std::fs::File::create(&pubkey_file)?;
			f2.write_all(&pubkey[..])?;
		}

		Ok(key)
	}
}

/// Build the `NetApp` instance this process listens and dials with. The
/// network key is shared mesh-wide (from the service config's
/// credentials); the node key is this process's own identity.
pub fn new_netapp(state_dir: &Path, network_key: NetworkKey) -> Result<std::sync::Arc<NetApp>, Error> {
	let node_key = gen_node_key(state_dir)?;
	info!(
		"node id of this process: {}",
		hex::encode(&node_key.public_key()[..8])
	);
	Ok(NetApp::new(MESHCTL_VERSION_TAG, network_key, node_key))
}

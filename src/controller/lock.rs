//! Single-writer on-disk lock: an exclusive directory create/remove,
//! analogous in spirit to how the Hub's journal uses an atomic file
//! operation as its sole synchronization primitive, but scoped only to
//! one Controller run.
use std::path::{Path, PathBuf};

use meshctl_util::error::Error;

pub struct RunLock {
	path: PathBuf,
}

impl RunLock {
	/// Acquire the lock at `<state_dir>/init.lock`. Fails immediately if
	/// another Controller invocation already holds it.
	pub fn acquire(state_dir: &Path) -> Result<Self, Error> {
		let path = state_dir.join("init.lock");
		std::fs::create_dir(&path).map_err(|e| {
			if e.kind() == std::io::ErrorKind::AlreadyExists {
				Error::Message("another meshctl init is already running on this host".into())
			} else {
				Error::from(e)
			}
		})?;
		Ok(Self { path })
	}
}

impl Drop for RunLock {
	fn drop(&mut self) {
		let _ = std::fs::remove_dir(&self.path);
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn second_acquire_fails_while_first_is_held() {
		let dir = mktemp::Temp::new_dir().unwrap();
		let first = RunLock::acquire(dir.as_ref()).unwrap();
		assert!(RunLock::acquire(dir.as_ref()).is_err());
		drop(first);
		assert!(RunLock::acquire(dir.as_ref()).is_ok());
	}
}

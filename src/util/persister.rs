//! Small helper to atomically persist a piece of state to a JSON file on
//! disk.
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::Error;

/// Persists a single `T` to `<dir>/<name>.json`.
///
/// Saves are write-to-temp-then-rename so a crash mid-write never leaves a
/// truncated file behind; this is the property the rollback journal and the
/// service config file both rely on.
pub struct Persister<T> {
	path: PathBuf,
	_marker: PhantomData<T>,
}

impl<T: Serialize + DeserializeOwned> Persister<T> {
	pub fn new(base_dir: &Path, name: &str) -> Self {
		let mut path = base_dir.to_path_buf();
		path.push(format!("{}.json", name));
		Self {
			path,
			_marker: PhantomData,
		}
	}

	pub fn load(&self) -> Result<T, Error> {
		let bytes = std::fs::read(&self.path)?;
		Ok(serde_json::from_slice(&bytes)?)
	}

	pub async fn load_async(&self) -> Result<T, Error> {
		let bytes = tokio::fs::read(&self.path).await?;
		Ok(serde_json::from_slice(&bytes)?)
	}

	pub fn save(&self, value: &T) -> Result<(), Error> {
		let bytes = serde_json::to_vec_pretty(value)?;
		let tmp_path = self.path.with_extension("json.tmp");
		std::fs::write(&tmp_path, &bytes)?;
		std::fs::rename(&tmp_path, &self.path)?;
		Ok(())
	}

	pub async fn save_async(&self, value: &T) -> Result<(), Error> {
		let bytes = serde_json::to_vec_pretty(value)?;
		let tmp_path = self.path.with_extension("json.tmp");
		tokio::fs::write(&tmp_path, &bytes).await?;
		tokio::fs::rename(&tmp_path, &self.path).await?;
		Ok(())
	}

	pub fn exists(&self) -> bool {
		self.path.exists()
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn remove(&self) -> Result<(), Error> {
		match std::fs::remove_file(&self.path) {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(e.into()),
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use serde::Deserialize;

	#[derive(Debug, Serialize, Deserialize, PartialEq)]
	struct Dummy {
		a: u32,
		b: String,
	}

	#[test]
	fn round_trips() {
		let dir = mktemp::Temp::new_dir().unwrap();
		let p: Persister<Dummy> = Persister::new(dir.as_ref(), "dummy");
		assert!(!p.exists());

		let v = Dummy {
			a: 42,
			b: "hello".into(),
		};
		p.save(&v).unwrap();
		assert!(p.exists());

		let loaded = p.load().unwrap();
		assert_eq!(loaded, v);

		p.remove().unwrap();
		assert!(!p.exists());
		// Removing twice is a no-op.
		p.remove().unwrap();
	}
}

//! The rollback journal: an append-only plain text file, one
//! `<hostname> <data_directory>` entry per line, whose mere existence is
//! the "a cluster-init run is in progress" flag.
use std::collections::HashMap;
use std::path::PathBuf;

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use meshctl_util::error::Error;

const JOURNAL_FILE_NAME: &str = "rollback_journal";

/// Owns the one on-disk journal file for a Hub process. All appends go
/// through `write_lock`, the single serializing component that keeps
/// readers (`CleanInitCluster`) from racing a writer — they only ever
/// run after a `MakeCluster` run has finished appending.
pub struct Journal {
	path: PathBuf,
	write_lock: Mutex<()>,
}

impl Journal {
	pub fn new(log_dir: &std::path::Path) -> Self {
		let mut path = log_dir.to_path_buf();
		path.push(JOURNAL_FILE_NAME);
		Self {
			path,
			write_lock: Mutex::new(()),
		}
	}

	pub fn exists(&self) -> bool {
		self.path.exists()
	}

	/// Append one entry. The write happens-before whatever progress frame
	/// the caller emits next simply because this future is awaited before
	/// that frame is sent.
	pub async fn append(&self, hostname: &str, data_directory: &str) -> Result<(), Error> {
		let _guard = self.write_lock.lock().await;
		if let Some(parent) = self.path.parent() {
			tokio::fs::create_dir_all(parent).await?;
		}
		let mut file = tokio::fs::OpenOptions::new()
			.create(true)
			.append(true)
			.open(&self.path)
			.await?;
		let line = format!("{} {}\n", hostname, data_directory);
		file.write_all(line.as_bytes()).await?;
		file.flush().await?;
		Ok(())
	}

	/// Parse the journal into hostname -> list-of-directories. Rejects
	/// any line whose field count isn't exactly two.
	pub async fn parse(&self) -> Result<HashMap<String, Vec<String>>, Error> {
		let contents = tokio::fs::read_to_string(&self.path).await?;
		let mut by_host: HashMap<String, Vec<String>> = HashMap::new();
		for line in contents.lines() {
			if line.trim().is_empty() {
				continue;
			}
			let fields: Vec<&str> = line.split_whitespace().collect();
			if fields.len() != 2 {
				return Err(Error::Message("invalid entries in cleanup file".into()));
			}
			by_host
				.entry(fields[0].to_string())
				.or_default()
				.push(fields[1].to_string());
		}
		Ok(by_host)
	}

	/// Deleting a journal that is already gone is success: rollback must
	/// stay idempotent under retry.
	pub async fn remove(&self) -> Result<(), Error> {
		match tokio::fs::remove_file(&self.path).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(e.into()),
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[tokio::test]
	async fn append_then_parse_round_trips() {
		let dir = mktemp::Temp::new_dir().unwrap();
		let journal = Journal::new(dir.as_ref());
		assert!(!journal.exists());

		journal.append("h1", "/data/p0/seg0").await.unwrap();
		journal.append("h1", "/data/p1/seg1").await.unwrap();
		journal.append("h2", "/data/p0/seg2").await.unwrap();
		assert!(journal.exists());

		let parsed = journal.parse().await.unwrap();
		assert_eq!(parsed["h1"], vec!["/data/p0/seg0", "/data/p1/seg1"]);
		assert_eq!(parsed["h2"], vec!["/data/p0/seg2"]);

		journal.remove().await.unwrap();
		assert!(!journal.exists());
		// Removing twice is a no-op (rollback idempotence).
		journal.remove().await.unwrap();
	}

	#[tokio::test]
	async fn malformed_line_is_rejected() {
		let dir = mktemp::Temp::new_dir().unwrap();
		let journal = Journal::new(dir.as_ref());
		tokio::fs::write(
			dir.as_ref().join(JOURNAL_FILE_NAME),
			"h1 /data/p0/seg0 extra_field\n",
		)
		.await
		.unwrap();

		let err = journal.parse().await.unwrap_err();
		assert!(err.to_string().contains("invalid entries in cleanup file"));
	}
}

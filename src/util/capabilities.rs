//! Injected side-effect seams.
//!
//! The original Go implementation mocks system calls by re-binding
//! package-level function variables (see `original_source`'s
//! `utils.System` struct of function pointers). Per the redesign notes,
//! we collect the same seams into one explicit `Capabilities` record
//! instead: the clock, the filesystem, and the subprocess runner. Agent and
//! Hub construction takes a `Capabilities` once in production wiring;
//! tests substitute a fake.
use std::path::Path;
use std::process::ExitStatus;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Error;

/// Output of a completed subprocess invocation.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
	pub status: ExitStatus,
	pub stdout: Vec<u8>,
	pub stderr: Vec<u8>,
}

impl ProcessOutput {
	pub fn success(&self) -> bool {
		self.status.success()
	}
}

/// Runs the engine's `initdb`/segment-startup binaries as opaque
/// subprocesses; their internals are never modeled here.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
	async fn run(&self, program: &str, args: &[String]) -> Result<ProcessOutput, Error>;
}

pub struct RealProcessRunner;

#[async_trait]
impl ProcessRunner for RealProcessRunner {
	async fn run(&self, program: &str, args: &[String]) -> Result<ProcessOutput, Error> {
		let output = tokio::process::Command::new(program)
			.args(args)
			.output()
			.await
			.map_err(|e| Error::Message(format!("failed to run {}: {}", program, e)))?;
		Ok(ProcessOutput {
			status: output.status,
			stdout: output.stdout,
			stderr: output.stderr,
		})
	}
}

/// Filesystem primitives an Agent performs locally: create, recursively
/// remove, and inspect directories.
#[async_trait]
pub trait Filesystem: Send + Sync {
	async fn create_dir_all(&self, path: &Path) -> Result<(), Error>;
	async fn remove_dir_all(&self, path: &Path) -> Result<(), Error>;
	async fn is_dir_empty(&self, path: &Path) -> Result<bool, Error>;
}

pub struct RealFilesystem;

#[async_trait]
impl Filesystem for RealFilesystem {
	async fn create_dir_all(&self, path: &Path) -> Result<(), Error> {
		Ok(tokio::fs::create_dir_all(path).await?)
	}

	async fn remove_dir_all(&self, path: &Path) -> Result<(), Error> {
		match tokio::fs::remove_dir_all(path).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(e.into()),
		}
	}

	async fn is_dir_empty(&self, path: &Path) -> Result<bool, Error> {
		match tokio::fs::read_dir(path).await {
			Ok(mut rd) => Ok(rd.next_entry().await?.is_none()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
			Err(e) => Err(e.into()),
		}
	}
}

/// One structure whose fields are the testing seams; production wiring
/// populates it once, tests substitute fakes for individual fields.
#[derive(Clone)]
pub struct Capabilities {
	pub process: Arc<dyn ProcessRunner>,
	pub fs: Arc<dyn Filesystem>,
}

impl Capabilities {
	pub fn production() -> Self {
		Self {
			process: Arc::new(RealProcessRunner),
			fs: Arc::new(RealFilesystem),
		}
	}
}

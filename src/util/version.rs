//! Version string plumbing: a build-injected string reported by every
//! binary's `--version` output and startup log line.
use std::sync::OnceLock;

static VERSION: OnceLock<String> = OnceLock::new();

pub fn init_version(git_version: &'static str) {
	let _ = VERSION.set(git_version.to_string());
}

pub fn meshctl_version() -> &'static str {
	VERSION.get().map(|s| s.as_str()).unwrap_or("unknown")
}

//! Time helpers shared by the rollback journal and log lines.
use std::time::{SystemTime, UNIX_EPOCH};

/// Current time, in milliseconds since the Unix epoch.
pub fn now_msec() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("clock is set before the Unix epoch")
		.as_millis() as u64
}

/// Render a millisecond timestamp as an RFC 3339 string, for log lines and
/// the rollback journal's companion debug output.
pub fn msec_to_rfc3339(msec: u64) -> String {
	let dt = chrono::DateTime::<chrono::Utc>::from(
		UNIX_EPOCH + std::time::Duration::from_millis(msec),
	);
	dt.to_rfc3339()
}

//! Error type shared by every crate in the control plane.
use err_derive::Error;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// The single error type used throughout the control plane.
///
/// Errors that cross an RPC boundary lose their source chain: the remote
/// side only ever gets to see the formatted message, reconstructed here as
/// [`Error::RemoteError`].
#[derive(Debug, Error)]
pub enum Error {
	#[error(display = "{}", _0)]
	Message(String),

	#[error(display = "{}", _0)]
	RemoteError(String),

	#[error(display = "IO error: {}", _0)]
	Io(#[error(source)] std::io::Error),

	#[error(display = "JSON error: {}", _0)]
	SerdeJson(#[error(source)] serde_json::Error),

	#[error(display = "TOML decode error: {}", _0)]
	TomlDecode(#[error(source)] toml::de::Error),

	#[error(display = "TOML encode error: {}", _0)]
	TomlEncode(#[error(source)] toml::ser::Error),

	#[error(display = "RPC error: {}", _0)]
	Rpc(#[error(source)] netapp::error::Error),

	#[error(display = "Operation timed out")]
	Timeout,
}

impl From<&str> for Error {
	fn from(v: &str) -> Error {
		Error::Message(v.into())
	}
}

impl From<String> for Error {
	fn from(v: String) -> Error {
		Error::Message(v)
	}
}

impl Error {
	/// Build an error for an RPC handler that received a message it has no
	/// handler for.
	pub fn unexpected_rpc_message<M: std::fmt::Debug>(msg: M) -> Self {
		Self::Message(format!("Unexpected RPC message: {:?}", msg))
	}
}

// Errors travel over the wire as their formatted message: the concrete
// variant (IO vs JSON vs...) only matters on the node where it originated.
impl Serialize for Error {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		self.to_string().serialize(serializer)
	}
}

impl<'de> Deserialize<'de> for Error {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let msg = String::deserialize(deserializer).map_err(de::Error::custom)?;
		Ok(Error::RemoteError(msg))
	}
}

/// Adds `.ok_or_message(...)` to `Option<T>`, turning a missing value into
/// an [`Error::Message`] with the given context.
pub trait OptionExt<T> {
	fn ok_or_message<S: Into<String>>(self, msg: S) -> Result<T, Error>;
}

impl<T> OptionExt<T> for Option<T> {
	fn ok_or_message<S: Into<String>>(self, msg: S) -> Result<T, Error> {
		self.ok_or_else(|| Error::Message(msg.into()))
	}
}

/// Adds `.ok_or_message(...)` / `.err_context(...)` to any `Result`,
/// prefixing the underlying error with context while converting it to
/// [`Error`].
pub trait ResultExt<T> {
	fn ok_or_message<S: Into<String>>(self, msg: S) -> Result<T, Error>;
	fn err_context<S: Into<String>>(self, msg: S) -> Result<T, Error>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
	fn ok_or_message<S: Into<String>>(self, msg: S) -> Result<T, Error> {
		self.map_err(|e| Error::Message(format!("{}: {}", msg.into(), e)))
	}
	fn err_context<S: Into<String>>(self, msg: S) -> Result<T, Error> {
		self.map_err(|e| Error::Message(format!("{}: {}", msg.into(), e)))
	}
}

/// The six distinct failure categories the Controller surfaces to the
/// operator (exit code + one-line message), separate from [`Error`]
/// which is this workspace's general `?`-propagation type. A Hub/Agent
/// `Error` gets mapped to the nearest `ErrorKind` only at the
/// Controller's top level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
	/// Planner/validator rejected the input before any mutation happened.
	ConfigInvalid,
	/// Hub or an Agent could not be reached after mesh startup.
	MeshUnavailable,
	/// One or more Agents reported failure; auto-rollback was triggered.
	SegmentInitFailed,
	/// SIGINT/SIGTERM observed during a run.
	UserTermination,
	/// Best-effort rollback could not complete; the journal is preserved.
	RollbackFailed,
	/// Assertion-style invariant violation.
	Internal,
}

impl ErrorKind {
	pub fn hint(&self) -> Option<&'static str> {
		match self {
			ErrorKind::MeshUnavailable => Some("Hub service must be running; check meshctl-hub's logs"),
			ErrorKind::RollbackFailed => Some("journal was preserved; re-run `meshctl init --clean`"),
			_ => None,
		}
	}
}

impl std::fmt::Display for ErrorKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let s = match self {
			ErrorKind::ConfigInvalid => "ConfigInvalid",
			ErrorKind::MeshUnavailable => "MeshUnavailable",
			ErrorKind::SegmentInitFailed => "SegmentInitFailed",
			ErrorKind::UserTermination => "UserTermination",
			ErrorKind::RollbackFailed => "RollbackFailed",
			ErrorKind::Internal => "Internal",
		};
		write!(f, "{}", s)
	}
}

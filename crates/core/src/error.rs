//! Error types for Eyes sessions.

use eyes_protocol::TestResults;
use thiserror::Error;

/// Errors raised by the session façade and its capture backends.
#[derive(Debug, Error)]
pub enum Error {
	/// An argument had the wrong shape or was missing.
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),

	/// The operation is not valid in the session's current state.
	#[error("Illegal state: {0}")]
	IllegalState(String),

	/// The test ended new, failed or with differences and the caller asked
	/// for failures to be raised. The results are attached for inspection.
	#[error("{message}")]
	TestFailure { message: String, results: Box<TestResults> },

	/// The browser-automation driver failed.
	#[error("Driver error: {0}")]
	Driver(String),

	#[error(transparent)]
	Runtime(#[from] eyes_runtime::Error),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	/// Results carried by a [`Error::TestFailure`].
	pub fn test_results(&self) -> Option<&TestResults> {
		match self {
			Error::TestFailure { results, .. } => Some(results),
			_ => None,
		}
	}
}

/// Result type alias for Eyes operations.
pub type Result<T> = std::result::Result<T, Error>;

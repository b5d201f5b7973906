//! Error types for the runtime layer.

use thiserror::Error;

/// Errors raised by server connectors and runners.
#[derive(Debug, Error)]
pub enum Error {
	/// The server rejected or failed a request.
	#[error("Server error: {0}")]
	Server(String),

	/// A request referenced a session the server does not know.
	#[error("Session not started: {0}")]
	SessionNotStarted(String),

	/// The session task went away before replying.
	#[error("Session channel closed")]
	ChannelClosed,

	/// The runner stopped accepting work.
	#[error("Runner is shut down")]
	RunnerShutdown,
}

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

//! Contract between sessions and the visual testing server.

use async_trait::async_trait;
use eyes_protocol::{MatchResult, MatchWindowData, RenderRequest, SessionStartInfo, TestResults};

use crate::error::Result;

/// Server-side handle of a started session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningSession {
	pub id: String,
	pub app_name: String,
	pub test_name: String,
	/// No baseline existed when the session started.
	pub is_new: bool,
	pub session_url: Option<String>,
}

/// How a session should be stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StopOptions {
	pub aborted: bool,
	/// Promote the recorded steps to the new baseline.
	pub update_baseline: bool,
}

impl StopOptions {
	pub fn aborted() -> Self {
		Self {
			aborted: true,
			update_baseline: false,
		}
	}

	/// Picks the baseline policy from the session's novelty.
	pub fn closing(session: &RunningSession, save_new_tests: bool, save_failed_tests: bool) -> Self {
		Self {
			aborted: false,
			update_baseline: if session.is_new { save_new_tests } else { save_failed_tests },
		}
	}
}

/// Operations a session needs from the server.
///
/// Implementations must be safe to share between sessions running
/// concurrently on different tasks.
#[async_trait]
pub trait ServerConnector: Send + Sync {
	async fn start_session(&self, info: &SessionStartInfo) -> Result<RunningSession>;

	/// Compares a locally captured screenshot with the baseline.
	async fn match_window(&self, session: &RunningSession, data: &MatchWindowData) -> Result<MatchResult>;

	/// Renders a DOM snapshot server-side and compares it with the baseline.
	async fn render(&self, session: &RunningSession, request: &RenderRequest) -> Result<MatchResult>;

	async fn stop_session(&self, session: &RunningSession, options: StopOptions) -> Result<TestResults>;
}

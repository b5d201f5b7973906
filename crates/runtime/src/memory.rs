//! Process-local baseline store implementing [`ServerConnector`].
//!
//! Baselines are keyed by application and test name. A checkpoint matches
//! when its captured bytes equal the baseline image recorded at the same
//! step index. Rendering-grid requests are "rendered" by serializing the
//! request, so identical DOM snapshots of identical targets match.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use eyes_protocol::{MatchResult, MatchWindowData, RenderRequest, SessionStartInfo, TestResultStatus, TestResults};
use parking_lot::Mutex;
use tracing::debug;

use crate::connector::{RunningSession, ServerConnector, StopOptions};
use crate::error::{Error, Result};

type BaselineKey = (String, String);

struct SessionRecord {
	info: SessionStartInfo,
	expected: Vec<Vec<u8>>,
	actual: Vec<Vec<u8>>,
	mismatches: u32,
}

/// In-memory stand-in for the visual testing server.
#[derive(Default)]
pub struct InMemoryServer {
	next_session: AtomicU64,
	baselines: Mutex<HashMap<BaselineKey, Vec<Vec<u8>>>>,
	sessions: Mutex<HashMap<String, SessionRecord>>,
}

impl InMemoryServer {
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of steps in the stored baseline for `app` / `test`.
	pub fn baseline_steps(&self, app: &str, test: &str) -> usize {
		self.baselines
			.lock()
			.get(&(app.to_string(), test.to_string()))
			.map_or(0, Vec::len)
	}

	/// Number of sessions started and not yet stopped.
	pub fn open_sessions(&self) -> usize {
		self.sessions.lock().len()
	}

	fn record(&self, session: &RunningSession, image: Vec<u8>, ignore_mismatch: bool) -> Result<MatchResult> {
		let mut sessions = self.sessions.lock();
		let record = sessions
			.get_mut(&session.id)
			.ok_or_else(|| Error::SessionNotStarted(session.id.clone()))?;

		let step = record.actual.len();
		let window_id = step as u64 + 1;
		let as_expected = match record.expected.get(step) {
			Some(expected) => *expected == image,
			None => session.is_new,
		};

		if ignore_mismatch {
			return Ok(MatchResult {
				as_expected: Some(as_expected),
				window_id: None,
			});
		}

		if !as_expected {
			record.mismatches += 1;
		}
		record.actual.push(image);

		debug!(target = "eyes.server", session = %session.id, step = window_id, as_expected, "step recorded");
		Ok(if as_expected {
			MatchResult::matched(window_id)
		} else {
			MatchResult::mismatched(window_id)
		})
	}
}

#[async_trait]
impl ServerConnector for InMemoryServer {
	async fn start_session(&self, info: &SessionStartInfo) -> Result<RunningSession> {
		if info.app_name.is_empty() || info.test_name.is_empty() {
			return Err(Error::Server("app name and test name are required to start a session".to_string()));
		}

		let key = (info.app_name.clone(), info.test_name.clone());
		let expected = self.baselines.lock().get(&key).cloned();
		let is_new = expected.is_none();
		let id = format!("session-{}", self.next_session.fetch_add(1, Ordering::SeqCst) + 1);

		self.sessions.lock().insert(
			id.clone(),
			SessionRecord {
				info: info.clone(),
				expected: expected.unwrap_or_default(),
				actual: Vec::new(),
				mismatches: 0,
			},
		);

		debug!(target = "eyes.server", session = %id, app = %info.app_name, test = %info.test_name, is_new, "session started");
		Ok(RunningSession {
			session_url: Some(format!("memory://sessions/{id}")),
			id,
			app_name: info.app_name.clone(),
			test_name: info.test_name.clone(),
			is_new,
		})
	}

	async fn match_window(&self, session: &RunningSession, data: &MatchWindowData) -> Result<MatchResult> {
		self.record(session, data.app_output.screenshot.clone(), data.ignore_mismatch)
	}

	async fn render(&self, session: &RunningSession, request: &RenderRequest) -> Result<MatchResult> {
		let rendered = serde_json::to_vec(request).map_err(|e| Error::Server(format!("render failed: {e}")))?;
		self.record(session, rendered, false)
	}

	async fn stop_session(&self, session: &RunningSession, options: StopOptions) -> Result<TestResults> {
		let record = self
			.sessions
			.lock()
			.remove(&session.id)
			.ok_or_else(|| Error::SessionNotStarted(session.id.clone()))?;

		let steps = record.actual.len() as u32;
		let missing = if session.is_new {
			0
		} else {
			record.expected.len().saturating_sub(record.actual.len()) as u32
		};

		let status = if options.aborted {
			TestResultStatus::Failed
		} else if record.mismatches > 0 || missing > 0 {
			TestResultStatus::Unresolved
		} else {
			TestResultStatus::Passed
		};

		if options.update_baseline && !options.aborted {
			let key = (record.info.app_name.clone(), record.info.test_name.clone());
			self.baselines.lock().insert(key, record.actual);
		}

		Ok(TestResults {
			name: record.info.test_name,
			app_name: record.info.app_name,
			status,
			is_new: session.is_new,
			is_aborted: options.aborted,
			steps,
			matches: steps - record.mismatches,
			mismatches: record.mismatches,
			missing,
			host_display_size: record.info.viewport_size,
			url: session.session_url.clone(),
		})
	}
}

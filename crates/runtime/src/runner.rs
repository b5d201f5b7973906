//! Runners coordinate sessions that complete asynchronously.
//!
//! A [`VisualGridRunner`] owns one tokio task per grid session. Each task
//! drains an ordered command queue: checkpoints are rendered as they arrive
//! and the close (or abort) command finalizes the session and yields its
//! [`TestResultContainer`]. Renders across all sessions share a semaphore so
//! that at most `concurrency` of them talk to the server at once.
//!
//! # Message Flow
//!
//! 1. The façade opens a session: the runner spawns its task
//! 2. Each check enqueues a [`RenderRequest`] and returns immediately
//! 3. `close` enqueues a close command carrying a oneshot reply and awaits it;
//!    `close_async` enqueues it without a reply
//! 4. [`VisualGridRunner::get_all_test_results`] awaits every task and
//!    returns the accumulated containers

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use downcast_rs::{DowncastSync, impl_downcast};
use eyes_protocol::{RenderRequest, SessionStartInfo, TestResultContainer, TestResults, TestResultsSummary};
use futures_util::future::join_all;
use parking_lot::Mutex;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::connector::{RunningSession, ServerConnector, StopOptions};
use crate::error::{Error, Result};

/// Shared coordinator whose sessions report results out of band.
///
/// Implemented by every runner a façade can be constructed with. The
/// supertrait lets the façade recognise the concrete runner type behind an
/// `Arc<dyn EyesRunner>`.
#[async_trait]
pub trait EyesRunner: DowncastSync {
	/// Waits for outstanding sessions and returns everything collected so far.
	async fn get_all_test_results(&self) -> TestResultsSummary;
}
impl_downcast!(sync EyesRunner);

enum SessionCommand {
	Check(RenderRequest),
	Close { reply: Option<oneshot::Sender<Result<TestResults>>> },
	Abort { reply: oneshot::Sender<Result<TestResults>> },
}

/// Baseline policy applied when a grid session closes normally.
#[derive(Debug, Clone, Copy)]
struct SavePolicy {
	save_new_tests: bool,
	save_failed_tests: bool,
}

/// Runner for sessions rendered on a remote grid.
pub struct VisualGridRunner {
	connector: Arc<dyn ServerConnector>,
	concurrency: usize,
	render_permits: Arc<Semaphore>,
	sessions: Mutex<Vec<JoinHandle<TestResultContainer>>>,
	collected: Mutex<Vec<TestResultContainer>>,
}

impl VisualGridRunner {
	/// Creates a runner allowing `concurrency` renders in flight (at least one).
	pub fn new(concurrency: usize, connector: Arc<dyn ServerConnector>) -> Self {
		let concurrency = concurrency.max(1);
		Self {
			connector,
			concurrency,
			render_permits: Arc::new(Semaphore::new(concurrency)),
			sessions: Mutex::new(Vec::new()),
			collected: Mutex::new(Vec::new()),
		}
	}

	pub fn concurrency(&self) -> usize {
		self.concurrency
	}

	/// Number of sessions whose results have not been awaited yet.
	pub fn pending_sessions(&self) -> usize {
		self.sessions.lock().len()
	}

	/// Starts a session task and returns the handle used to feed it.
	///
	/// Must be called from within a tokio runtime.
	pub fn open_session(&self, info: SessionStartInfo, save_new_tests: bool, save_failed_tests: bool) -> GridSession {
		let (tx, rx) = mpsc::unbounded_channel();
		let label = format!("{}/{}", info.app_name, info.test_name);
		let policy = SavePolicy {
			save_new_tests,
			save_failed_tests,
		};

		let handle = tokio::spawn(run_session(Arc::clone(&self.connector), Arc::clone(&self.render_permits), info, policy, rx));
		self.sessions.lock().push(handle);

		info!(target = "eyes.runner", session = %label, "grid session queued");
		GridSession { label, commands: tx }
	}

	/// Waits for every session opened so far and returns all results.
	///
	/// Sessions that have neither been closed nor aborted keep this call
	/// waiting until their [`GridSession`] handle is dropped.
	pub async fn get_all_test_results(&self) -> TestResultsSummary {
		let handles = std::mem::take(&mut *self.sessions.lock());
		let finished = join_all(handles).await;

		let mut collected = self.collected.lock();
		for joined in finished {
			match joined {
				Ok(container) => collected.push(container),
				Err(e) => collected.push(TestResultContainer::from_error(format!("session task failed: {e}"))),
			}
		}

		TestResultsSummary {
			containers: collected.clone(),
		}
	}
}

#[async_trait]
impl EyesRunner for VisualGridRunner {
	async fn get_all_test_results(&self) -> TestResultsSummary {
		VisualGridRunner::get_all_test_results(self).await
	}
}

impl fmt::Debug for VisualGridRunner {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("VisualGridRunner")
			.field("concurrency", &self.concurrency)
			.field("pending_sessions", &self.pending_sessions())
			.finish()
	}
}

/// Handle to one queued grid session.
///
/// Dropping the handle without closing aborts the session.
#[derive(Debug)]
pub struct GridSession {
	label: String,
	commands: mpsc::UnboundedSender<SessionCommand>,
}

impl GridSession {
	pub fn label(&self) -> &str {
		&self.label
	}

	/// Queues a render; returns as soon as the request is enqueued.
	pub fn enqueue_check(&self, request: RenderRequest) -> Result<()> {
		self.commands.send(SessionCommand::Check(request)).map_err(|_| Error::RunnerShutdown)
	}

	/// Closes the session and waits for its results.
	pub async fn close(self) -> Result<TestResults> {
		let (reply, rx) = oneshot::channel();
		self.commands
			.send(SessionCommand::Close { reply: Some(reply) })
			.map_err(|_| Error::RunnerShutdown)?;
		rx.await.map_err(|_| Error::ChannelClosed).and_then(|result| result)
	}

	/// Queues the close; results are collected through the runner.
	pub fn close_async(self) -> Result<()> {
		self.commands
			.send(SessionCommand::Close { reply: None })
			.map_err(|_| Error::RunnerShutdown)
	}

	/// Aborts the session and waits until the server released it.
	pub async fn abort(self) -> Result<TestResults> {
		let (reply, rx) = oneshot::channel();
		self.commands
			.send(SessionCommand::Abort { reply })
			.map_err(|_| Error::RunnerShutdown)?;
		rx.await.map_err(|_| Error::ChannelClosed).and_then(|result| result)
	}
}

async fn run_session(
	connector: Arc<dyn ServerConnector>,
	permits: Arc<Semaphore>,
	info: SessionStartInfo,
	policy: SavePolicy,
	mut commands: mpsc::UnboundedReceiver<SessionCommand>,
) -> TestResultContainer {
	let session = match connector.start_session(&info).await {
		Ok(session) => session,
		Err(e) => {
			warn!(target = "eyes.runner", app = %info.app_name, test = %info.test_name, error = %e, "grid session failed to start");
			let message = e.to_string();
			reject_remaining(&mut commands, &message).await;
			return TestResultContainer::from_error(message);
		}
	};

	let mut render_error: Option<Error> = None;
	while let Some(command) = commands.recv().await {
		match command {
			SessionCommand::Check(request) => {
				if render_error.is_some() {
					continue;
				}
				let Ok(_permit) = permits.acquire().await else {
					render_error = Some(Error::RunnerShutdown);
					continue;
				};
				match connector.render(&session, &request).await {
					Ok(result) => {
						debug!(target = "eyes.runner", session = %session.id, tag = ?request.tag, as_expected = ?result.as_expected, "render compared");
					}
					Err(e) => {
						warn!(target = "eyes.runner", session = %session.id, error = %e, "render failed");
						render_error = Some(e);
					}
				}
			}
			SessionCommand::Close { reply } => {
				let outcome = match render_error.take() {
					Some(e) => {
						if let Err(stop) = connector.stop_session(&session, StopOptions::aborted()).await {
							warn!(target = "eyes.runner", session = %session.id, error = %stop, "failed to abort session after render error");
						}
						Err(e)
					}
					None => {
						let options = StopOptions::closing(&session, policy.save_new_tests, policy.save_failed_tests);
						connector.stop_session(&session, options).await
					}
				};
				return finish(&session, outcome, reply);
			}
			SessionCommand::Abort { reply } => {
				let outcome = connector.stop_session(&session, StopOptions::aborted()).await;
				return finish(&session, outcome, Some(reply));
			}
		}
	}

	debug!(target = "eyes.runner", session = %session.id, "session handle dropped; aborting");
	let outcome = connector.stop_session(&session, StopOptions::aborted()).await;
	finish(&session, outcome, None)
}

fn finish(
	session: &RunningSession,
	outcome: Result<TestResults>,
	reply: Option<oneshot::Sender<Result<TestResults>>>,
) -> TestResultContainer {
	let container = match &outcome {
		Ok(results) => TestResultContainer::from_results(results.clone()),
		Err(e) => TestResultContainer::from_error(e.to_string()),
	};
	info!(target = "eyes.runner", session = %session.id, ok = outcome.is_ok(), "grid session finished");

	if let Some(reply) = reply {
		let _ = reply.send(outcome);
	}
	container
}

async fn reject_remaining(commands: &mut mpsc::UnboundedReceiver<SessionCommand>, message: &str) {
	while let Some(command) = commands.recv().await {
		match command {
			SessionCommand::Check(_) => {}
			SessionCommand::Close { reply } => {
				if let Some(reply) = reply {
					let _ = reply.send(Err(Error::SessionNotStarted(message.to_string())));
				}
				return;
			}
			SessionCommand::Abort { reply } => {
				let _ = reply.send(Err(Error::SessionNotStarted(message.to_string())));
				return;
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::memory::InMemoryServer;
	use eyes_protocol::RenderTarget;

	fn start_info(test: &str) -> SessionStartInfo {
		SessionStartInfo {
			agent_id: "test".to_string(),
			app_name: "App".to_string(),
			test_name: test.to_string(),
			..Default::default()
		}
	}

	fn window_request(tag: &str) -> RenderRequest {
		RenderRequest {
			tag: Some(tag.to_string()),
			url: None,
			dom: Some("<html></html>".to_string()),
			frames: Vec::new(),
			target: RenderTarget::Window { fully: false },
			viewport_size: None,
		}
	}

	#[test]
	fn concurrency_is_at_least_one() {
		let runner = VisualGridRunner::new(0, Arc::new(InMemoryServer::new()));
		assert_eq!(runner.concurrency(), 1);
	}

	#[tokio::test]
	async fn close_returns_results_and_runner_keeps_them() {
		let runner = VisualGridRunner::new(2, Arc::new(InMemoryServer::new()));
		let session = runner.open_session(start_info("T1"), true, false);
		session.enqueue_check(window_request("a")).unwrap();
		session.enqueue_check(window_request("b")).unwrap();

		let results = session.close().await.unwrap();
		assert_eq!(results.steps, 2);
		assert!(results.is_new);

		let summary = runner.get_all_test_results().await;
		assert_eq!(summary.len(), 1);
		assert_eq!(summary.test_results().next().unwrap().name, "T1");

		// Collected results stay available for later calls.
		assert_eq!(runner.get_all_test_results().await.len(), 1);
	}

	#[tokio::test]
	async fn close_async_results_are_collected_later() {
		let runner = VisualGridRunner::new(1, Arc::new(InMemoryServer::new()));
		for test in ["A", "B", "C"] {
			let session = runner.open_session(start_info(test), true, false);
			session.enqueue_check(window_request("step")).unwrap();
			session.close_async().unwrap();
		}

		let summary = runner.get_all_test_results().await;
		let mut names: Vec<_> = summary.test_results().map(|r| r.name.clone()).collect();
		names.sort();
		assert_eq!(names, vec!["A", "B", "C"]);
		assert_eq!(runner.pending_sessions(), 0);
	}

	#[tokio::test]
	async fn failed_start_is_kept_as_error() {
		let runner = VisualGridRunner::new(1, Arc::new(InMemoryServer::new()));
		let session = runner.open_session(start_info(""), true, false);
		let err = session.close().await.unwrap_err();
		assert!(matches!(err, Error::SessionNotStarted(_)));

		let summary = runner.get_all_test_results().await;
		assert_eq!(summary.exceptions().count(), 1);
	}

	#[tokio::test]
	async fn dropped_handle_aborts_session() {
		let server = Arc::new(InMemoryServer::new());
		let runner = VisualGridRunner::new(1, server.clone());
		drop(runner.open_session(start_info("Dropped"), true, false));

		let summary = runner.get_all_test_results().await;
		let results = summary.test_results().next().unwrap();
		assert!(results.is_aborted);
		assert_eq!(server.open_sessions(), 0);
	}

	/// Renders and stops always fail; sessions still start.
	struct BrokenServer(InMemoryServer);

	#[async_trait::async_trait]
	impl ServerConnector for BrokenServer {
		async fn start_session(&self, info: &SessionStartInfo) -> Result<RunningSession> {
			self.0.start_session(info).await
		}

		async fn match_window(&self, session: &RunningSession, data: &eyes_protocol::MatchWindowData) -> Result<eyes_protocol::MatchResult> {
			self.0.match_window(session, data).await
		}

		async fn render(&self, _: &RunningSession, _: &RenderRequest) -> Result<eyes_protocol::MatchResult> {
			Err(Error::Server("renderer unavailable".to_string()))
		}

		async fn stop_session(&self, _: &RunningSession, _: StopOptions) -> Result<TestResults> {
			Err(Error::Server("connection reset".to_string()))
		}
	}

	#[tokio::test]
	async fn render_error_wins_over_failed_cleanup() {
		let runner = VisualGridRunner::new(1, Arc::new(BrokenServer(InMemoryServer::new())));
		let session = runner.open_session(start_info("Broken"), true, false);
		session.enqueue_check(window_request("a")).unwrap();

		let err = session.close().await.unwrap_err();
		assert!(matches!(err, Error::Server(ref message) if message == "renderer unavailable"), "{err}");
		assert_eq!(runner.get_all_test_results().await.exceptions().count(), 1);
	}

	#[tokio::test]
	async fn runner_downcasts_from_trait_object() {
		let runner: Arc<dyn EyesRunner> = Arc::new(VisualGridRunner::new(1, Arc::new(InMemoryServer::new())));
		assert!(runner.downcast_arc::<VisualGridRunner>().is_ok());
	}
}

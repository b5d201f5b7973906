//! Grid capture: checkpoints ship a DOM snapshot to a rendering grid and
//! return immediately; verdicts arrive through the runner.

use std::sync::Arc;

use async_trait::async_trait;
use eyes_protocol::{MatchResult, PropertyData, RenderRequest, RenderTarget, SessionStartInfo, TestResults};
use eyes_runtime::{GridSession, VisualGridRunner};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::{BackendKind, CaptureBackend, evaluate_results, required_name};
use crate::config::Configuration;
use crate::driver::EyesDriver;
use crate::error::{Error, Result};
use crate::target::{CheckTarget, RegionLocator, TargetKind};

#[derive(Default)]
struct GridState {
	session: Option<GridSession>,
	driver: Option<EyesDriver>,
	properties: Vec<PropertyData>,
}

/// Backend that renders checkpoints on a visual grid.
pub struct GridCaptureBackend {
	runner: Arc<VisualGridRunner>,
	state: Mutex<GridState>,
}

impl GridCaptureBackend {
	pub fn new(runner: Arc<VisualGridRunner>) -> Self {
		Self {
			runner,
			state: Mutex::new(GridState::default()),
		}
	}

	pub fn runner(&self) -> &Arc<VisualGridRunner> {
		&self.runner
	}

	fn take_session(&self) -> Option<GridSession> {
		self.state.lock().session.take()
	}
}

fn render_target(target: &CheckTarget) -> RenderTarget {
	match target.kind() {
		TargetKind::Window => RenderTarget::Window { fully: target.fully() },
		TargetKind::Frame(_) => RenderTarget::Frame {
			stitch_content: target.stitch_content(),
		},
		TargetKind::Region(RegionLocator::Rect(region)) => RenderTarget::Region {
			region: Some(*region),
			selector: None,
			stitch_content: target.stitch_content(),
		},
		TargetKind::Region(RegionLocator::Selector(selector)) => RenderTarget::Region {
			region: None,
			selector: Some(selector.clone()),
			stitch_content: target.stitch_content(),
		},
	}
}

#[async_trait]
impl CaptureBackend for GridCaptureBackend {
	fn kind(&self) -> BackendKind {
		BackendKind::Grid
	}

	async fn open(&self, driver: EyesDriver, configuration: &Configuration) -> Result<EyesDriver> {
		if configuration.is_disabled {
			info!(target = "eyes.grid", "open(): ignored (disabled)");
			return Ok(driver);
		}

		if self.state.lock().session.is_some() {
			self.abort().await?;
			return Err(Error::IllegalState("a test is already running".to_string()));
		}

		let app_name = required_name(configuration.app_name.as_deref(), "app_name")?;
		let test_name = required_name(configuration.test_name.as_deref(), "test_name")?;

		let viewport_size = match configuration.viewport_size {
			Some(size) => Some(size),
			None => driver.viewport_size().await.ok(),
		};

		let info = SessionStartInfo {
			agent_id: self.full_agent_id(configuration),
			app_name,
			test_name,
			viewport_size,
			batch_name: configuration.batch_name.clone(),
			branch_name: configuration.branch_name.clone(),
			properties: self.state.lock().properties.clone(),
		};
		let session = self
			.runner
			.open_session(info, configuration.save_new_tests, configuration.save_failed_tests);
		info!(target = "eyes.grid", session = %session.label(), "test started");

		let mut state = self.state.lock();
		state.session = Some(session);
		state.driver = Some(driver.clone());
		Ok(driver)
	}

	/// Queues the checkpoint and returns a neutral result.
	async fn check(&self, tag: Option<&str>, target: &CheckTarget, configuration: &Configuration) -> Result<MatchResult> {
		let driver = self
			.state
			.lock()
			.driver
			.clone()
			.ok_or_else(|| Error::IllegalState("no test is running".to_string()))?;

		let dom = match driver.capture_dom().await {
			Ok(dom) => Some(dom),
			Err(e) => {
				warn!(target = "eyes.grid", error = %e, "failed to capture DOM snapshot");
				None
			}
		};
		let request = RenderRequest {
			tag: tag.map(str::to_string),
			url: driver.current_url().await.ok(),
			dom,
			frames: target.frames_to_enter().iter().map(ToString::to_string).collect(),
			target: render_target(target),
			viewport_size: configuration.viewport_size,
		};

		let state = self.state.lock();
		let session = state
			.session
			.as_ref()
			.ok_or_else(|| Error::IllegalState("no test is running".to_string()))?;
		session.enqueue_check(request)?;
		debug!(target = "eyes.grid", session = %session.label(), tag = ?tag, "checkpoint queued");
		Ok(MatchResult::default())
	}

	async fn close(&self, raise_on_failure: bool, configuration: &Configuration) -> Result<Option<TestResults>> {
		if configuration.is_disabled {
			info!(target = "eyes.grid", "close(): ignored (disabled)");
			return Ok(None);
		}

		let session = self
			.take_session()
			.ok_or_else(|| Error::IllegalState("no test is running".to_string()))?;
		let results = session.close().await?;
		info!(target = "eyes.grid", test = %results.name, status = ?results.status, "test ended");

		evaluate_results(results, raise_on_failure).map(Some)
	}

	async fn close_async(&self, _configuration: &Configuration) -> Result<()> {
		match self.take_session() {
			Some(session) => {
				debug!(target = "eyes.grid", session = %session.label(), "close queued");
				Ok(session.close_async()?)
			}
			None => Ok(()),
		}
	}

	async fn abort(&self) -> Result<Option<TestResults>> {
		let Some(session) = self.take_session() else {
			return Ok(None);
		};
		let results = session.abort().await?;
		info!(target = "eyes.grid", test = %results.name, "test aborted");
		Ok(Some(results))
	}

	fn add_property(&self, name: &str, value: &str) {
		self.state.lock().properties.push(PropertyData {
			name: name.to_string(),
			value: value.to_string(),
		});
	}

	fn clear_properties(&self) {
		self.state.lock().properties.clear();
	}

	fn base_agent_id(&self) -> String {
		format!("eyes.rust.visualgrid/{}", env!("CARGO_PKG_VERSION"))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::target::Target;
	use eyes_protocol::Region;
	use eyes_runtime::InMemoryServer;

	fn backend() -> GridCaptureBackend {
		GridCaptureBackend::new(Arc::new(VisualGridRunner::new(1, Arc::new(InMemoryServer::new()))))
	}

	#[test]
	fn capability_accessors_are_neutral() {
		let backend = backend();
		backend.set_scale_ratio(2.0);
		backend.set_debug_screenshot_provided(true);

		assert_eq!(backend.device_pixel_ratio(), 0.0);
		assert_eq!(backend.scale_ratio(), 0.0);
		assert!(backend.position_provider().is_none());
		assert!(backend.cut_provider().is_none());
		assert!(!backend.is_cut_provider_explicitly_set());
		assert!(backend.agent_setup().is_none());
		assert!(!backend.debug_screenshot_provided());
		assert!(!backend.should_stitch_content());
		assert!(backend.original_frame_chain().is_none());
	}

	#[test]
	fn render_targets_follow_the_checkpoint_kind() {
		assert_eq!(render_target(&Target::window().fully(true).build()), RenderTarget::Window { fully: true });
		assert_eq!(
			render_target(&Target::region("#logo").build()),
			RenderTarget::Region {
				region: None,
				selector: Some("#logo".to_string()),
				stitch_content: false,
			}
		);
		assert_eq!(
			render_target(&Target::region(Region::new(1, 2, 3, 4)).stitch_content(true).build()),
			RenderTarget::Region {
				region: Some(Region::new(1, 2, 3, 4)),
				selector: None,
				stitch_content: true,
			}
		);
		assert_eq!(render_target(&Target::frame("main").build()), RenderTarget::Frame { stitch_content: false });
	}

	#[tokio::test]
	async fn close_async_without_session_is_a_no_op() {
		let backend = backend();
		backend.close_async(&Configuration::new()).await.unwrap();
		assert!(backend.abort().await.unwrap().is_none());
	}
}

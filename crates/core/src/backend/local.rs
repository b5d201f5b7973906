//! Local capture: screenshots are taken through the browser driver and
//! compared by the server one checkpoint at a time.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use eyes_protocol::{
	AppOutput, Location, MatchResult, MatchWindowData, MouseAction, PropertyData, Region, SessionStartInfo, TestResults,
	Trigger,
};
use eyes_runtime::{RunningSession, ServerConnector, StopOptions};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::{AgentSetup, BackendKind, CaptureBackend, CutProvider, PositionProvider, evaluate_results, required_name};
use crate::config::{Configuration, StitchMode};
use crate::driver::EyesDriver;
use crate::error::{Error, Result};
use crate::target::{CheckTarget, FrameReference, RegionLocator, TargetKind};

/// Pause between retry attempts while waiting for a checkpoint to match.
const RETRY_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Default)]
struct LocalState {
	driver: Option<EyesDriver>,
	session: Option<RunningSession>,
	stitch_mode: StitchMode,
	hide_scrollbars: bool,
	properties: Vec<PropertyData>,
	triggers: Vec<Trigger>,
	device_pixel_ratio: f64,
	scale_ratio: Option<f64>,
	position_provider: Option<PositionProvider>,
	position_provider_explicit: bool,
	cut_provider: CutProvider,
	cut_provider_explicit: bool,
	current_frame_position_provider: Option<PositionProvider>,
	debug_screenshots: bool,
	should_stitch_content: bool,
	original_frame_chain: Option<Vec<FrameReference>>,
	steps: u32,
}

/// Backend that captures screenshots through the browser driver.
pub struct LocalCaptureBackend {
	connector: Arc<dyn ServerConnector>,
	state: Mutex<LocalState>,
}

impl LocalCaptureBackend {
	pub fn new(connector: Arc<dyn ServerConnector>) -> Self {
		Self {
			connector,
			state: Mutex::new(LocalState::default()),
		}
	}

	fn running(&self) -> Result<(EyesDriver, RunningSession)> {
		let state = self.state.lock();
		match (&state.driver, &state.session) {
			(Some(driver), Some(session)) => Ok((driver.clone(), session.clone())),
			_ => Err(Error::IllegalState("no test is running".to_string())),
		}
	}

	/// Drops the session once the server has stopped it.
	fn release(&self, session: &RunningSession) {
		let mut state = self.state.lock();
		if state.session.as_ref().is_some_and(|current| current.id == session.id) {
			state.session = None;
		}
	}

	async fn capture(&self, driver: &EyesDriver, target: &CheckTarget, configuration: &Configuration) -> Result<Vec<u8>> {
		match target.kind() {
			TargetKind::Window => {
				let full_page = target.fully() || configuration.force_full_page_screenshot;
				driver.screenshot(None, full_page).await
			}
			TargetKind::Frame(_) => driver.screenshot(None, target.stitch_content()).await,
			TargetKind::Region(RegionLocator::Rect(region)) => driver.screenshot(Some(*region), target.stitch_content()).await,
			TargetKind::Region(RegionLocator::Selector(selector)) => {
				let region = driver.element_region(selector).await?;
				driver.screenshot(Some(region), target.stitch_content()).await
			}
		}
	}

	/// Captures and matches until the checkpoint matches or `timeout` passes,
	/// then records one final attempt.
	async fn match_with_retry(
		&self,
		driver: &EyesDriver,
		session: &RunningSession,
		tag: Option<&str>,
		target: &CheckTarget,
		configuration: &Configuration,
	) -> Result<MatchResult> {
		let timeout = target.timeout().unwrap_or(configuration.match_timeout);
		let start = Instant::now();
		let mut screenshot = self.capture(driver, target, configuration).await?;

		if !timeout.is_zero() {
			loop {
				let attempt = self
					.connector
					.match_window(session, &self.window_data(tag, screenshot.clone(), true, Vec::new()))
					.await?;
				if attempt.as_expected == Some(true) || start.elapsed() >= timeout {
					break;
				}
				tokio::time::sleep(RETRY_INTERVAL.min(timeout)).await;
				screenshot = self.capture(driver, target, configuration).await?;
			}
		}

		let step = {
			let mut state = self.state.lock();
			state.steps += 1;
			state.steps
		};
		if self.debug_screenshot_provided() {
			save_debug_screenshot(configuration, step, tag, &screenshot).await;
		}

		let mut triggers = std::mem::take(&mut self.state.lock().triggers);
		triggers.extend(driver.take_triggers());

		let mut data = self.window_data(tag, screenshot, target.ignore_mismatch(), triggers);
		data.app_output.title = driver.title().await.ok();
		if configuration.send_dom {
			match driver.capture_dom().await {
				Ok(dom) => data.app_output.dom = Some(dom),
				Err(e) => warn!(target = "eyes", error = %e, "failed to capture DOM; matching without it"),
			}
		}

		let result = self.connector.match_window(session, &data).await?;
		debug!(target = "eyes", tag = ?tag, step, as_expected = ?result.as_expected, elapsed_ms = start.elapsed().as_millis() as u64, "checkpoint matched");
		Ok(result)
	}

	fn window_data(&self, tag: Option<&str>, screenshot: Vec<u8>, ignore_mismatch: bool, user_inputs: Vec<Trigger>) -> MatchWindowData {
		MatchWindowData {
			tag: tag.map(str::to_string),
			app_output: AppOutput {
				screenshot,
				..Default::default()
			},
			ignore_mismatch,
			user_inputs,
		}
	}
}

#[async_trait]
impl CaptureBackend for LocalCaptureBackend {
	fn kind(&self) -> BackendKind {
		BackendKind::Local
	}

	async fn open(&self, driver: EyesDriver, configuration: &Configuration) -> Result<EyesDriver> {
		if configuration.is_disabled {
			info!(target = "eyes", "open(): ignored (disabled)");
			return Ok(driver);
		}

		if self.state.lock().session.is_some() {
			self.abort().await?;
			return Err(Error::IllegalState("a test is already running".to_string()));
		}

		let app_name = required_name(configuration.app_name.as_deref(), "app_name")?;
		let test_name = required_name(configuration.test_name.as_deref(), "test_name")?;

		let viewport_size = match configuration.viewport_size {
			Some(size) => {
				driver.set_viewport_size(size).await?;
				size
			}
			None => driver.viewport_size().await?,
		};
		let device_pixel_ratio = driver.device_pixel_ratio().await.unwrap_or_else(|e| {
			warn!(target = "eyes", error = %e, "device pixel ratio unavailable");
			0.0
		});

		let info = SessionStartInfo {
			agent_id: self.full_agent_id(configuration),
			app_name,
			test_name,
			viewport_size: Some(viewport_size),
			batch_name: configuration.batch_name.clone(),
			branch_name: configuration.branch_name.clone(),
			properties: self.state.lock().properties.clone(),
		};
		let session = self.connector.start_session(&info).await?;
		info!(target = "eyes", backend = "local", app = %info.app_name, test = %info.test_name, viewport = %viewport_size, is_new = session.is_new, "test started");

		let mut state = self.state.lock();
		state.driver = Some(driver.clone());
		state.session = Some(session);
		state.device_pixel_ratio = device_pixel_ratio;
		state.stitch_mode = configuration.stitch_mode;
		state.hide_scrollbars = configuration.hide_scrollbars;
		if !state.position_provider_explicit {
			state.position_provider = Some(configuration.stitch_mode.into());
		}
		state.steps = 0;
		state.triggers.clear();
		Ok(driver)
	}

	async fn check(&self, tag: Option<&str>, target: &CheckTarget, configuration: &Configuration) -> Result<MatchResult> {
		let (driver, session) = self.running()?;
		let original = driver.frame_chain();
		let frames = target.frames_to_enter();
		{
			let mut state = self.state.lock();
			state.original_frame_chain = Some(original.clone());
			state.should_stitch_content = target.stitch_content();
		}
		debug!(target = "eyes", tag = ?tag, kind = ?target.kind(), frames = frames.len(), "check");

		let mut outcome = Ok(MatchResult::default());
		for frame in &frames {
			if let Err(e) = driver.switch_to_frame(frame).await {
				outcome = Err(e);
				break;
			}
		}
		if outcome.is_ok() {
			if !frames.is_empty() {
				let mut state = self.state.lock();
				let provider = if target.stitch_content() {
					PositionProvider::Element
				} else {
					state.position_provider.unwrap_or(PositionProvider::Scroll)
				};
				state.current_frame_position_provider = Some(provider);
			}
			outcome = self.match_with_retry(&driver, &session, tag, target, configuration).await;
		}

		self.state.lock().current_frame_position_provider = None;
		let restored = driver.restore_frame_chain(&original).await;
		let result = outcome?;
		restored?;
		Ok(result)
	}

	async fn close(&self, raise_on_failure: bool, configuration: &Configuration) -> Result<Option<TestResults>> {
		if configuration.is_disabled {
			info!(target = "eyes", "close(): ignored (disabled)");
			return Ok(None);
		}

		let session = self
			.state
			.lock()
			.session
			.clone()
			.ok_or_else(|| Error::IllegalState("no test is running".to_string()))?;

		let options = StopOptions::closing(&session, configuration.save_new_tests, configuration.save_failed_tests);
		let results = match self.connector.stop_session(&session, options).await {
			Ok(results) => results,
			Err(e) => {
				warn!(target = "eyes", session = %session.id, error = %e, "close failed; aborting the test");
				if self.connector.stop_session(&session, StopOptions::aborted()).await.is_ok() {
					self.release(&session);
				}
				return Err(e.into());
			}
		};
		self.release(&session);
		info!(target = "eyes", backend = "local", test = %results.name, status = ?results.status, is_new = results.is_new, steps = results.steps, "test ended");

		evaluate_results(results, raise_on_failure).map(Some)
	}

	async fn close_async(&self, configuration: &Configuration) -> Result<()> {
		self.close(false, configuration).await.map(|_| ())
	}

	async fn abort(&self) -> Result<Option<TestResults>> {
		let Some(session) = self.state.lock().session.clone() else {
			debug!(target = "eyes", "abort(): no running test");
			return Ok(None);
		};

		let results = self.connector.stop_session(&session, StopOptions::aborted()).await?;
		self.release(&session);
		info!(target = "eyes", backend = "local", test = %results.name, "test aborted");
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
		format!("eyes.rust.local/{}", env!("CARGO_PKG_VERSION"))
	}

	fn device_pixel_ratio(&self) -> f64 {
		self.state.lock().device_pixel_ratio
	}

	/// Explicit ratio when set, otherwise derived from the device pixel ratio
	/// (0 while unknown).
	fn scale_ratio(&self) -> f64 {
		let state = self.state.lock();
		match state.scale_ratio {
			Some(ratio) => ratio,
			None if state.device_pixel_ratio > 0.0 => 1.0 / state.device_pixel_ratio,
			None => 0.0,
		}
	}

	fn set_scale_ratio(&self, ratio: f64) {
		self.state.lock().scale_ratio = (ratio > 0.0).then_some(ratio);
	}

	fn position_provider(&self) -> Option<PositionProvider> {
		self.state.lock().position_provider
	}

	fn set_position_provider(&self, provider: PositionProvider) {
		let mut state = self.state.lock();
		state.position_provider = Some(provider);
		state.position_provider_explicit = true;
	}

	fn cut_provider(&self) -> Option<CutProvider> {
		Some(self.state.lock().cut_provider)
	}

	fn set_cut_provider(&self, provider: CutProvider) {
		let mut state = self.state.lock();
		state.cut_provider = provider;
		state.cut_provider_explicit = true;
	}

	fn is_cut_provider_explicitly_set(&self) -> bool {
		self.state.lock().cut_provider_explicit
	}

	fn agent_setup(&self) -> Option<AgentSetup> {
		let state = self.state.lock();
		Some(AgentSetup {
			driver_session_id: state.driver.as_ref().map(EyesDriver::session_id),
			stitch_mode: state.stitch_mode,
			hide_scrollbars: state.hide_scrollbars,
			position_provider: state.position_provider,
			cut_provider: state.cut_provider,
			scale_ratio: state.scale_ratio.unwrap_or(0.0),
			device_pixel_ratio: state.device_pixel_ratio,
		})
	}

	fn current_frame_position_provider(&self) -> Option<PositionProvider> {
		self.state.lock().current_frame_position_provider
	}

	fn debug_screenshot_provided(&self) -> bool {
		self.state.lock().debug_screenshots
	}

	fn set_debug_screenshot_provided(&self, save: bool) {
		self.state.lock().debug_screenshots = save;
	}

	fn should_stitch_content(&self) -> bool {
		self.state.lock().should_stitch_content
	}

	fn original_frame_chain(&self) -> Option<Vec<FrameReference>> {
		self.state.lock().original_frame_chain.clone()
	}

	fn add_mouse_trigger(&self, action: MouseAction, control: Region, location: Location) {
		let mut state = self.state.lock();
		if state.session.is_none() {
			debug!(target = "eyes", "mouse trigger ignored: no running test");
			return;
		}
		state.triggers.push(Trigger::Mouse { action, control, location });
	}

	fn add_text_trigger(&self, control: Region, text: &str) {
		let mut state = self.state.lock();
		if state.session.is_none() {
			debug!(target = "eyes", "text trigger ignored: no running test");
			return;
		}
		state.triggers.push(Trigger::Text {
			control,
			text: text.to_string(),
		});
	}
}

async fn save_debug_screenshot(configuration: &Configuration, step: u32, tag: Option<&str>, screenshot: &[u8]) {
	let dir = configuration.debug_screenshots_path.as_deref().unwrap_or(Path::new("."));
	let tag: String = tag
		.unwrap_or("untagged")
		.chars()
		.map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
		.collect();
	let path = dir.join(format!("{}{}_{}.png", configuration.debug_screenshots_prefix, step, tag));

	let written = match tokio::fs::create_dir_all(dir).await {
		Ok(()) => tokio::fs::write(&path, screenshot).await,
		Err(e) => Err(e),
	};
	match written {
		Ok(()) => debug!(target = "eyes", path = %path.display(), "debug screenshot saved"),
		Err(e) => warn!(target = "eyes", path = %path.display(), error = %e, "failed to save debug screenshot"),
	}
}

//! The session façade.
//!
//! [`Eyes`] owns one [`Configuration`], commits to a capture backend when it
//! is constructed and drives the `open -> check* -> close | abort` lifecycle
//! against it. Every method behaves the same whichever backend is live;
//! capture-tuning accessors that only apply to local screenshots return
//! neutral values under the grid backend.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use eyes_protocol::{Location, MatchResult, MouseAction, RectangleSize, Region, TestResults};
use eyes_runtime::{EyesRunner, InMemoryServer, ServerConnector, VisualGridRunner};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::backend::{
	ActiveBackend, AgentSetup, BackendKind, CaptureBackend, CutProvider, GridCaptureBackend, LocalCaptureBackend, PositionProvider,
};
use crate::config::{Configuration, StitchMode};
use crate::driver::{DriverHandle, EyesDriver, WebDriver};
use crate::error::{Error, Result};
use crate::target::{CheckTarget, FrameReference, RegionLocator, Target};

/// What an [`Eyes`] instance is constructed with.
#[derive(Default)]
pub enum RunnerOption {
	/// Capture locally.
	#[default]
	None,
	/// Legacy shorthand: a server URL stored into the configuration, then
	/// local capture.
	ServerUrl(String),
	/// A shared runner. Only [`VisualGridRunner`] is accepted.
	Runner(Arc<dyn EyesRunner>),
}

impl From<&str> for RunnerOption {
	fn from(url: &str) -> Self {
		RunnerOption::ServerUrl(url.to_string())
	}
}

impl From<String> for RunnerOption {
	fn from(url: String) -> Self {
		RunnerOption::ServerUrl(url)
	}
}

impl From<Arc<VisualGridRunner>> for RunnerOption {
	fn from(runner: Arc<VisualGridRunner>) -> Self {
		RunnerOption::Runner(runner)
	}
}

impl From<Arc<dyn EyesRunner>> for RunnerOption {
	fn from(runner: Arc<dyn EyesRunner>) -> Self {
		RunnerOption::Runner(runner)
	}
}

impl fmt::Debug for RunnerOption {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RunnerOption::None => write!(f, "None"),
			RunnerOption::ServerUrl(url) => f.debug_tuple("ServerUrl").field(url).finish(),
			RunnerOption::Runner(_) => write!(f, "Runner(..)"),
		}
	}
}

/// A visual test session.
///
/// # Example
///
/// ```ignore
/// let eyes = Eyes::new();
/// let driver = eyes.open(browser, Some("App"), Some("Login"), Some(RectangleSize::new(1024, 768))).await?;
/// eyes.check("login form", Target::region("#login").fully(false)).await?;
/// let results = eyes.close(true).await?;
/// ```
pub struct Eyes {
	configuration: Mutex<Configuration>,
	backend: ActiveBackend,
	driver: Mutex<Option<EyesDriver>>,
	is_open: AtomicBool,
}

impl Eyes {
	/// A local-capture session backed by an in-process baseline store.
	pub fn new() -> Self {
		Self::local(Configuration::default(), Arc::new(InMemoryServer::new()))
	}

	/// Selects the backend from `runner`; see [`Eyes::with_server`].
	pub fn with_runner(runner: impl Into<RunnerOption>) -> Result<Self> {
		Self::with_server(runner, Arc::new(InMemoryServer::new()))
	}

	/// Selects the backend once for the lifetime of the session.
	///
	/// Local capture talks to `connector`. A grid runner brings its own
	/// connector. Any runner other than [`VisualGridRunner`] is rejected with
	/// [`Error::InvalidArgument`].
	pub fn with_server(runner: impl Into<RunnerOption>, connector: Arc<dyn ServerConnector>) -> Result<Self> {
		match runner.into() {
			RunnerOption::None => Ok(Self::local(Configuration::default(), connector)),
			RunnerOption::ServerUrl(url) => {
				debug!(target = "eyes", server_url = %url, "runner given as server url; using local capture");
				Ok(Self::local(Configuration::default().with_server_url(url), connector))
			}
			RunnerOption::Runner(runner) => match runner.downcast_arc::<VisualGridRunner>() {
				Ok(grid) => Ok(Self::assemble(
					Configuration::default(),
					ActiveBackend::Grid(GridCaptureBackend::new(grid)),
				)),
				Err(_) => Err(Error::InvalidArgument("wrong runner".to_string())),
			},
		}
	}

	fn local(configuration: Configuration, connector: Arc<dyn ServerConnector>) -> Self {
		Self::assemble(configuration, ActiveBackend::Local(LocalCaptureBackend::new(connector)))
	}

	fn assemble(configuration: Configuration, backend: ActiveBackend) -> Self {
		Self {
			configuration: Mutex::new(configuration),
			backend,
			driver: Mutex::new(None),
			is_open: AtomicBool::new(false),
		}
	}

	fn active_backend(&self) -> &dyn CaptureBackend {
		self.backend.get()
	}

	pub fn backend_kind(&self) -> BackendKind {
		self.active_backend().kind()
	}

	/// The grid runner this session reports to, if any.
	pub fn runner(&self) -> Option<Arc<VisualGridRunner>> {
		match &self.backend {
			ActiveBackend::Grid(grid) => Some(Arc::clone(grid.runner())),
			ActiveBackend::Local(_) => None,
		}
	}

	/// True strictly between a successful `open` and the next close or abort.
	pub fn is_open(&self) -> bool {
		self.is_open.load(Ordering::SeqCst)
	}

	/// The instrumented driver bound by the last `open`.
	pub fn driver(&self) -> Option<EyesDriver> {
		self.driver.lock().clone()
	}

	/// Snapshot of the current configuration.
	pub fn configuration(&self) -> Configuration {
		self.configuration.lock().clone()
	}

	/// Replaces the configuration wholesale.
	///
	/// An API key or server URL set on the current configuration is kept when
	/// `configuration` leaves it empty. No other field is merged.
	pub fn set_configuration(&self, mut configuration: Configuration) {
		let mut current = self.configuration.lock();
		configuration.inherit_credentials(&current);
		*current = configuration;
	}

	/// Replaces the configuration from a loosely typed JSON document.
	pub fn set_configuration_json(&self, value: serde_json::Value) -> Result<()> {
		let configuration: Configuration =
			serde_json::from_value(value).map_err(|e| Error::InvalidArgument(format!("not a configuration: {e}")))?;
		self.set_configuration(configuration);
		Ok(())
	}

	/// Starts a test.
	///
	/// Names and viewport given here overwrite the configured ones. A raw
	/// driver is wrapped into an [`EyesDriver`]; an instrumented one is used
	/// as is. Returns the driver the session tracks.
	pub async fn open(
		&self,
		driver: impl Into<DriverHandle>,
		app_name: Option<&str>,
		test_name: Option<&str>,
		viewport_size: Option<RectangleSize>,
	) -> Result<EyesDriver> {
		let configuration = {
			let mut configuration = self.configuration.lock();
			if let Some(app_name) = app_name {
				configuration.app_name = Some(app_name.to_string());
			}
			if let Some(test_name) = test_name {
				configuration.test_name = Some(test_name.to_string());
			}
			if viewport_size.is_some() {
				configuration.viewport_size = viewport_size;
			}
			configuration.clone()
		};

		let driver = driver.into().into_instrumented();
		*self.driver.lock() = Some(driver.clone());

		let driver = match self.active_backend().open(driver, &configuration).await {
			Ok(driver) => driver,
			Err(e) => {
				self.is_open.store(false, Ordering::SeqCst);
				return Err(e);
			}
		};
		self.is_open.store(true, Ordering::SeqCst);
		info!(target = "eyes", backend = %self.backend_kind(), app = ?configuration.app_name, test = ?configuration.test_name, "open");
		Ok(driver)
	}

	/// Runs one checkpoint.
	///
	/// A disabled configuration returns a neutral result without touching the
	/// backend. Checking before `open` aborts the session and fails with
	/// [`Error::IllegalState`].
	pub async fn check(&self, name: &str, target: impl Into<CheckTarget>) -> Result<MatchResult> {
		let target = target.into();
		let configuration = self.configuration();
		if configuration.is_disabled {
			info!(target = "eyes", tag = name, "check(): ignored (disabled)");
			return Ok(MatchResult::default());
		}

		if !self.is_open() {
			if let Err(e) = self.abort().await {
				warn!(target = "eyes", error = %e, "abort after check() on unopened session failed");
			}
			return Err(Error::IllegalState("you must call open() before checking".to_string()));
		}

		let tag = (!name.is_empty()).then_some(name);
		self.active_backend().check(tag, &target, &configuration).await
	}

	/// Ends the test. The session is closed afterwards whatever the outcome.
	///
	/// With `raise_on_failure`, a new, failed or different result becomes
	/// [`Error::TestFailure`]; otherwise it is returned for inspection.
	/// Returns `None` when the configuration is disabled.
	pub async fn close(&self, raise_on_failure: bool) -> Result<Option<TestResults>> {
		let configuration = self.configuration();
		let outcome = self.active_backend().close(raise_on_failure, &configuration).await;
		self.is_open.store(false, Ordering::SeqCst);
		outcome
	}

	/// Ends the test without waiting for its verdict.
	///
	/// Grid results are collected later through the runner. Locally this is
	/// `close(false)` with the results dropped.
	pub async fn close_async(&self) -> Result<()> {
		let configuration = self.configuration();
		let outcome = self.active_backend().close_async(&configuration).await;
		self.is_open.store(false, Ordering::SeqCst);
		outcome
	}

	/// Aborts the running test. Safe to call at any time and repeatedly.
	pub async fn abort(&self) -> Result<Option<TestResults>> {
		let outcome = self.active_backend().abort().await;
		self.is_open.store(false, Ordering::SeqCst);
		outcome
	}

	#[deprecated(note = "use `abort`")]
	pub async fn abort_if_not_closed(&self) -> Result<Option<TestResults>> {
		warn!(target = "eyes", "abort_if_not_closed() is deprecated; use abort()");
		self.abort().await
	}

	pub async fn check_window(&self, tag: &str, timeout: Option<Duration>, fully: bool) -> Result<MatchResult> {
		self.check(tag, with_timeout(Target::window().fully(fully), timeout)).await
	}

	pub async fn check_frame(&self, frame: impl Into<FrameReference>, tag: &str, timeout: Option<Duration>) -> Result<MatchResult> {
		self.check(tag, with_timeout(Target::frame(frame), timeout)).await
	}

	pub async fn check_region(
		&self,
		region: impl Into<RegionLocator>,
		tag: &str,
		timeout: Option<Duration>,
		stitch_content: bool,
	) -> Result<MatchResult> {
		self.check(tag, with_timeout(Target::region(region).stitch_content(stitch_content), timeout))
			.await
	}

	/// Checks a region located inside `frame`.
	pub async fn check_region_in_frame(
		&self,
		frame: impl Into<FrameReference>,
		region: impl Into<RegionLocator>,
		tag: &str,
		timeout: Option<Duration>,
		stitch_content: bool,
	) -> Result<MatchResult> {
		if self.configuration.lock().is_disabled {
			info!(target = "eyes", tag, "check_region_in_frame(): ignored (disabled)");
			return Ok(MatchResult::default());
		}
		let target = Target::region(region).in_frame(frame).stitch_content(stitch_content);
		self.check(tag, with_timeout(target, timeout)).await
	}

	/// Reads the viewport size from a driver.
	pub async fn driver_viewport_size(driver: &dyn WebDriver) -> Result<RectangleSize> {
		driver.viewport_size().await
	}

	/// Resizes a driver's viewport.
	pub async fn set_driver_viewport_size(driver: &dyn WebDriver, size: Option<RectangleSize>) -> Result<()> {
		let size = size.ok_or_else(|| Error::InvalidArgument("set_viewport_size require `size` parameter".to_string()))?;
		driver.set_viewport_size(size).await
	}

	pub fn add_property(&self, name: &str, value: &str) {
		self.active_backend().add_property(name, value);
	}

	pub fn clear_properties(&self) {
		self.active_backend().clear_properties();
	}

	pub fn base_agent_id(&self) -> String {
		self.active_backend().base_agent_id()
	}

	pub fn full_agent_id(&self) -> String {
		let configuration = self.configuration();
		self.active_backend().full_agent_id(&configuration)
	}

	/// Whether DOM snapshots accompany local checkpoints. Always false under
	/// the grid backend, which ships the DOM by construction.
	pub fn send_dom(&self) -> bool {
		match self.backend_kind() {
			BackendKind::Local => self.configuration.lock().send_dom,
			BackendKind::Grid => false,
		}
	}

	pub fn set_send_dom(&self, send_dom: bool) {
		self.configuration.lock().send_dom = send_dom;
	}

	pub fn device_pixel_ratio(&self) -> f64 {
		self.active_backend().device_pixel_ratio()
	}

	pub fn scale_ratio(&self) -> f64 {
		self.active_backend().scale_ratio()
	}

	pub fn set_scale_ratio(&self, ratio: f64) {
		self.active_backend().set_scale_ratio(ratio);
	}

	pub fn position_provider(&self) -> Option<PositionProvider> {
		self.active_backend().position_provider()
	}

	pub fn set_position_provider(&self, provider: PositionProvider) {
		self.active_backend().set_position_provider(provider);
	}

	pub fn cut_provider(&self) -> Option<CutProvider> {
		self.active_backend().cut_provider()
	}

	pub fn set_cut_provider(&self, provider: CutProvider) {
		self.active_backend().set_cut_provider(provider);
	}

	pub fn is_cut_provider_explicitly_set(&self) -> bool {
		self.active_backend().is_cut_provider_explicitly_set()
	}

	pub fn agent_setup(&self) -> Option<AgentSetup> {
		self.active_backend().agent_setup()
	}

	pub fn current_frame_position_provider(&self) -> Option<PositionProvider> {
		self.active_backend().current_frame_position_provider()
	}

	pub fn debug_screenshot_provided(&self) -> bool {
		self.active_backend().debug_screenshot_provided()
	}

	pub fn set_debug_screenshot_provided(&self, save: bool) {
		self.active_backend().set_debug_screenshot_provided(save);
	}

	pub fn should_stitch_content(&self) -> bool {
		self.active_backend().should_stitch_content()
	}

	/// Frame chain active before the last checkpoint.
	pub fn original_fc(&self) -> Option<Vec<FrameReference>> {
		self.active_backend().original_frame_chain()
	}

	pub fn add_mouse_trigger(&self, action: MouseAction, control: Region, location: Location) {
		self.active_backend().add_mouse_trigger(action, control, location);
	}

	pub fn add_text_trigger(&self, control: Region, text: &str) {
		self.active_backend().add_text_trigger(control, text);
	}
}

fn with_timeout(target: Target, timeout: Option<Duration>) -> Target {
	match timeout {
		Some(timeout) => target.timeout(timeout),
		None => target,
	}
}

/// Emits a getter and setter on [`Eyes`] for each listed configuration
/// field, plus [`Eyes::FORWARDED_FIELDS`].
macro_rules! forward_configuration {
	(
		text { $($text:ident => $set_text:ident),* $(,)? }
		copy { $($copy:ident => $set_copy:ident: $copy_ty:ty),* $(,)? }
		owned { $($owned:ident => $set_owned:ident: $owned_ty:ty),* $(,)? }
	) => {
		impl Eyes {
			/// Configuration fields readable and writable on the façade.
			pub const FORWARDED_FIELDS: &'static [&'static str] = &[
				$(stringify!($text),)*
				$(stringify!($copy),)*
				$(stringify!($owned),)*
				"send_dom",
			];

			$(
				pub fn $text(&self) -> Option<String> {
					self.configuration.lock().$text.clone()
				}

				pub fn $set_text(&self, value: impl Into<String>) {
					self.configuration.lock().$text = Some(value.into());
				}
			)*

			$(
				pub fn $copy(&self) -> $copy_ty {
					self.configuration.lock().$copy
				}

				pub fn $set_copy(&self, value: $copy_ty) {
					self.configuration.lock().$copy = value;
				}
			)*

			$(
				pub fn $owned(&self) -> $owned_ty {
					self.configuration.lock().$owned.clone()
				}

				pub fn $set_owned(&self, value: $owned_ty) {
					self.configuration.lock().$owned = value;
				}
			)*
		}
	};
}

forward_configuration! {
	text {
		app_name => set_app_name,
		test_name => set_test_name,
		server_url => set_server_url,
		api_key => set_api_key,
		branch_name => set_branch_name,
		batch_name => set_batch_name,
		agent_id => set_agent_id,
	}
	copy {
		viewport_size => set_viewport_size: Option<RectangleSize>,
		is_disabled => set_is_disabled: bool,
		match_timeout => set_match_timeout: Duration,
		force_full_page_screenshot => set_force_full_page_screenshot: bool,
		hide_scrollbars => set_hide_scrollbars: bool,
		stitch_mode => set_stitch_mode: StitchMode,
		save_new_tests => set_save_new_tests: bool,
		save_failed_tests => set_save_failed_tests: bool,
	}
	owned {
		debug_screenshots_path => set_debug_screenshots_path: Option<PathBuf>,
		debug_screenshots_prefix => set_debug_screenshots_prefix: String,
	}
}

impl Default for Eyes {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Debug for Eyes {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Eyes")
			.field("backend", &self.backend_kind())
			.field("is_open", &self.is_open())
			.field("app_name", &self.app_name())
			.field("test_name", &self.test_name())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn forwarded_fields_cover_the_configuration() {
		let json = serde_json::to_value(Configuration::default()).unwrap();
		let keys = json.as_object().unwrap().len();
		assert_eq!(Eyes::FORWARDED_FIELDS.len(), keys);
		assert!(Eyes::FORWARDED_FIELDS.contains(&"api_key"));
		assert!(Eyes::FORWARDED_FIELDS.contains(&"send_dom"));
	}

	#[test]
	fn forwarded_setters_write_through() {
		let eyes = Eyes::new();
		eyes.set_app_name("App");
		eyes.set_viewport_size(Some(RectangleSize::new(800, 600)));
		eyes.set_debug_screenshots_prefix("shot_".to_string());

		let configuration = eyes.configuration();
		assert_eq!(configuration.app_name.as_deref(), Some("App"));
		assert_eq!(configuration.viewport_size, Some(RectangleSize::new(800, 600)));
		assert_eq!(eyes.debug_screenshots_prefix(), "shot_");
	}

	#[test]
	fn runner_option_conversions() {
		assert!(matches!(RunnerOption::from("http://legacy"), RunnerOption::ServerUrl(url) if url == "http://legacy"));
		let runner = Arc::new(VisualGridRunner::new(1, Arc::new(InMemoryServer::new())));
		assert!(matches!(RunnerOption::from(runner), RunnerOption::Runner(_)));
		assert!(matches!(RunnerOption::default(), RunnerOption::None));
	}
}

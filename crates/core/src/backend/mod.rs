//! Capture backends: the two interchangeable ways a session checks pixels.
//!
//! Both variants implement [`CaptureBackend`]. The façade picks one at
//! construction and holds it in [`ActiveBackend`], the single place that
//! knows which variant is live.
//!
//! Capability accessors that only make sense for locally captured
//! screenshots have default implementations returning neutral values
//! (`0`, `false`, `None`, no-op setters). The local backend overrides them;
//! the grid backend keeps the defaults.

mod grid;
mod local;

use std::fmt;

use async_trait::async_trait;
use eyes_protocol::{Location, MatchResult, MouseAction, Region, TestResults};
use serde::Serialize;

pub use grid::GridCaptureBackend;
pub use local::LocalCaptureBackend;

use crate::config::{Configuration, StitchMode};
use crate::driver::EyesDriver;
use crate::error::{Error, Result};
use crate::target::{CheckTarget, FrameReference};

/// Which backend variant a façade selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
	Local,
	Grid,
}

impl fmt::Display for BackendKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			BackendKind::Local => write!(f, "local"),
			BackendKind::Grid => write!(f, "grid"),
		}
	}
}

/// How the page is scrolled to bring content into view while capturing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PositionProvider {
	/// Native scrolling of the document.
	Scroll,
	/// CSS `transform: translate` of the document element.
	CssTranslate,
	/// Scrolling of a specific scrollable element.
	Element,
}

impl From<StitchMode> for PositionProvider {
	fn from(mode: StitchMode) -> Self {
		match mode {
			StitchMode::Scroll => PositionProvider::Scroll,
			StitchMode::Css => PositionProvider::CssTranslate,
		}
	}
}

/// Pixels trimmed from each captured image before matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CutProvider {
	#[default]
	Null,
	/// Fixed margins in device pixels.
	Fixed { header: u32, footer: u32, left: u32, right: u32 },
	/// Fixed margins in CSS pixels, scaled by the device pixel ratio.
	UnscaledFixed { header: u32, footer: u32, left: u32, right: u32 },
}

/// Snapshot of the capture settings a local session runs with.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSetup {
	pub driver_session_id: Option<String>,
	pub stitch_mode: StitchMode,
	pub hide_scrollbars: bool,
	pub position_provider: Option<PositionProvider>,
	pub cut_provider: CutProvider,
	pub scale_ratio: f64,
	pub device_pixel_ratio: f64,
}

/// Operations every capture strategy provides.
#[async_trait]
pub trait CaptureBackend: Send + Sync {
	fn kind(&self) -> BackendKind;

	/// Starts a test with the instrumented driver and returns it.
	async fn open(&self, driver: EyesDriver, configuration: &Configuration) -> Result<EyesDriver>;

	async fn check(&self, tag: Option<&str>, target: &CheckTarget, configuration: &Configuration) -> Result<MatchResult>;

	/// Ends the test. `None` when the configuration is disabled.
	async fn close(&self, raise_on_failure: bool, configuration: &Configuration) -> Result<Option<TestResults>>;

	/// Ends the test without waiting for a verdict the caller would act on.
	async fn close_async(&self, configuration: &Configuration) -> Result<()>;

	/// Aborts a running test. A no-op when nothing runs.
	async fn abort(&self) -> Result<Option<TestResults>>;

	fn add_property(&self, name: &str, value: &str);

	fn clear_properties(&self);

	/// SDK identity in the form `eyes.rust.<variant>/<version>`.
	fn base_agent_id(&self) -> String;

	fn full_agent_id(&self, configuration: &Configuration) -> String {
		match configuration.agent_id.as_deref().filter(|id| !id.is_empty()) {
			Some(suffix) => format!("{} [{}]", self.base_agent_id(), suffix),
			None => self.base_agent_id(),
		}
	}

	fn device_pixel_ratio(&self) -> f64 {
		0.0
	}

	fn scale_ratio(&self) -> f64 {
		0.0
	}

	fn set_scale_ratio(&self, _ratio: f64) {}

	fn position_provider(&self) -> Option<PositionProvider> {
		None
	}

	fn set_position_provider(&self, _provider: PositionProvider) {}

	fn cut_provider(&self) -> Option<CutProvider> {
		None
	}

	fn set_cut_provider(&self, _provider: CutProvider) {}

	fn is_cut_provider_explicitly_set(&self) -> bool {
		false
	}

	fn agent_setup(&self) -> Option<AgentSetup> {
		None
	}

	fn current_frame_position_provider(&self) -> Option<PositionProvider> {
		None
	}

	fn debug_screenshot_provided(&self) -> bool {
		false
	}

	fn set_debug_screenshot_provided(&self, _save: bool) {}

	/// Whether the last checkpoint stitched its content.
	fn should_stitch_content(&self) -> bool {
		false
	}

	/// Frame chain saved before the last checkpoint.
	fn original_frame_chain(&self) -> Option<Vec<FrameReference>> {
		None
	}

	fn add_mouse_trigger(&self, _action: MouseAction, _control: Region, _location: Location) {}

	fn add_text_trigger(&self, _control: Region, _text: &str) {}
}

/// The backend a façade committed to at construction.
pub(crate) enum ActiveBackend {
	Local(LocalCaptureBackend),
	Grid(GridCaptureBackend),
}

impl ActiveBackend {
	pub(crate) fn get(&self) -> &dyn CaptureBackend {
		match self {
			ActiveBackend::Local(backend) => backend,
			ActiveBackend::Grid(backend) => backend,
		}
	}
}

/// Converts a new, failed or different result into [`Error::TestFailure`]
/// when the caller asked for failures to be raised.
pub(crate) fn evaluate_results(results: TestResults, raise_on_failure: bool) -> Result<TestResults> {
	if !raise_on_failure {
		return Ok(results);
	}

	let url = results.url.as_deref().unwrap_or("<no session url>");
	let message = if results.is_new {
		format!("New test '{}' of '{}' ended. Please approve the new baseline at {}", results.name, results.app_name, url)
	} else if results.is_failed() {
		format!("Test '{}' of '{}' failed. See details at {}", results.name, results.app_name, url)
	} else if results.is_different() {
		format!("Test '{}' of '{}' detected differences. See details at {}", results.name, results.app_name, url)
	} else {
		return Ok(results);
	};

	Err(Error::TestFailure {
		message,
		results: Box::new(results),
	})
}

/// Reads a name `open` cannot start a test without.
pub(super) fn required_name(value: Option<&str>, field: &str) -> Result<String> {
	value
		.filter(|v| !v.is_empty())
		.map(str::to_string)
		.ok_or_else(|| Error::InvalidArgument(format!("{field} must be set before open()")))
}

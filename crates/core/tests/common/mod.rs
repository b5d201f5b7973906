// Shared fakes for the integration tests: a scripted browser driver and a
// server connector that records what sessions send it.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use eyes::{Error, FrameReference, MatchResult, RectangleSize, Region, Result, RunningSession, ServerConnector, StopOptions, TestResults, WebDriver};
use eyes_protocol::{MatchWindowData, RenderRequest, SessionStartInfo};
use eyes_runtime::InMemoryServer;
use parking_lot::Mutex;

/// One screenshot taken by [`FakeDriver`].
#[derive(Debug, Clone, PartialEq)]
pub struct Shot {
	pub clip: Option<Region>,
	pub full_page: bool,
	pub frames: Vec<FrameReference>,
}

/// Browser driver whose "page" is a string the test controls.
///
/// Screenshots are deterministic: the page content plus the frame, clip and
/// full-page flag they were taken with.
pub struct FakeDriver {
	page: Mutex<String>,
	viewport: Mutex<RectangleSize>,
	device_pixel_ratio: f64,
	frames: Mutex<Vec<FrameReference>>,
	calls: Mutex<Vec<String>>,
	shots: Mutex<Vec<Shot>>,
}

impl FakeDriver {
	pub fn new() -> Arc<Self> {
		Self::with_device_pixel_ratio(1.0)
	}

	pub fn with_device_pixel_ratio(device_pixel_ratio: f64) -> Arc<Self> {
		Arc::new(Self {
			page: Mutex::new("home".to_string()),
			viewport: Mutex::new(RectangleSize::new(1280, 800)),
			device_pixel_ratio,
			frames: Mutex::new(Vec::new()),
			calls: Mutex::new(Vec::new()),
			shots: Mutex::new(Vec::new()),
		})
	}

	pub fn handle(self: &Arc<Self>) -> Arc<dyn WebDriver> {
		Arc::clone(self) as Arc<dyn WebDriver>
	}

	pub fn set_page(&self, content: &str) {
		*self.page.lock() = content.to_string();
	}

	pub fn viewport(&self) -> RectangleSize {
		*self.viewport.lock()
	}

	pub fn current_frames(&self) -> Vec<FrameReference> {
		self.frames.lock().clone()
	}

	/// Names of the driver methods called so far, in order.
	pub fn calls(&self) -> Vec<String> {
		self.calls.lock().clone()
	}

	pub fn shots(&self) -> Vec<Shot> {
		self.shots.lock().clone()
	}

	fn log(&self, call: &str) {
		self.calls.lock().push(call.to_string());
	}
}

#[async_trait]
impl WebDriver for FakeDriver {
	fn session_id(&self) -> String {
		"fake-session".to_string()
	}

	async fn viewport_size(&self) -> Result<RectangleSize> {
		self.log("viewport_size");
		Ok(*self.viewport.lock())
	}

	async fn set_viewport_size(&self, size: RectangleSize) -> Result<()> {
		self.log("set_viewport_size");
		*self.viewport.lock() = size;
		Ok(())
	}

	async fn device_pixel_ratio(&self) -> Result<f64> {
		self.log("device_pixel_ratio");
		Ok(self.device_pixel_ratio)
	}

	async fn screenshot(&self, clip: Option<Region>, full_page: bool) -> Result<Vec<u8>> {
		self.log("screenshot");
		let frames = self.current_frames();
		let image = format!("{}|{:?}|{:?}|{}", self.page.lock(), frames, clip, full_page);
		self.shots.lock().push(Shot { clip, full_page, frames });
		Ok(image.into_bytes())
	}

	async fn element_region(&self, selector: &str) -> Result<Region> {
		self.log("element_region");
		match selector {
			"#missing" => Err(Error::Driver(format!("no element matches {selector}"))),
			_ => Ok(Region::new(10, 20, 100, 50)),
		}
	}

	async fn switch_to_frame(&self, frame: &FrameReference) -> Result<()> {
		self.log("switch_to_frame");
		if *frame == FrameReference::NameOrId("missing".to_string()) {
			return Err(Error::Driver("no such frame: missing".to_string()));
		}
		self.frames.lock().push(frame.clone());
		Ok(())
	}

	async fn switch_to_parent_frame(&self) -> Result<()> {
		self.log("switch_to_parent_frame");
		self.frames.lock().pop();
		Ok(())
	}

	async fn switch_to_default_content(&self) -> Result<()> {
		self.log("switch_to_default_content");
		self.frames.lock().clear();
		Ok(())
	}

	async fn capture_dom(&self) -> Result<String> {
		self.log("capture_dom");
		Ok(format!("<html><body>{}</body></html>", self.page.lock()))
	}

	async fn current_url(&self) -> Result<String> {
		self.log("current_url");
		Ok("https://shop.test/cart".to_string())
	}

	async fn title(&self) -> Result<String> {
		self.log("title");
		Ok("Shop".to_string())
	}

	async fn click(&self, _selector: &str) -> Result<()> {
		self.log("click");
		Ok(())
	}

	async fn send_keys(&self, _selector: &str, _text: &str) -> Result<()> {
		self.log("send_keys");
		Ok(())
	}
}

/// [`InMemoryServer`] wrapper that keeps every request it receives.
#[derive(Default)]
pub struct RecordingServer {
	inner: InMemoryServer,
	fail_renders: bool,
	failing_stops: AtomicUsize,
	started: Mutex<Vec<SessionStartInfo>>,
	windows: Mutex<Vec<MatchWindowData>>,
	renders: Mutex<Vec<RenderRequest>>,
}

impl RecordingServer {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// A server whose grid renders always fail.
	pub fn failing_renders() -> Arc<Self> {
		Arc::new(Self {
			fail_renders: true,
			..Self::default()
		})
	}

	/// A server that rejects the next `count` stop requests.
	pub fn failing_stops(count: usize) -> Arc<Self> {
		Arc::new(Self {
			failing_stops: AtomicUsize::new(count),
			..Self::default()
		})
	}

	pub fn inner(&self) -> &InMemoryServer {
		&self.inner
	}

	pub fn started(&self) -> Vec<SessionStartInfo> {
		self.started.lock().clone()
	}

	pub fn windows(&self) -> Vec<MatchWindowData> {
		self.windows.lock().clone()
	}

	pub fn renders(&self) -> Vec<RenderRequest> {
		self.renders.lock().clone()
	}
}

#[async_trait]
impl ServerConnector for RecordingServer {
	async fn start_session(&self, info: &SessionStartInfo) -> eyes_runtime::Result<RunningSession> {
		self.started.lock().push(info.clone());
		self.inner.start_session(info).await
	}

	async fn match_window(&self, session: &RunningSession, data: &MatchWindowData) -> eyes_runtime::Result<MatchResult> {
		self.windows.lock().push(data.clone());
		self.inner.match_window(session, data).await
	}

	async fn render(&self, session: &RunningSession, request: &RenderRequest) -> eyes_runtime::Result<MatchResult> {
		self.renders.lock().push(request.clone());
		if self.fail_renders {
			return Err(eyes_runtime::Error::Server("renderer unavailable".to_string()));
		}
		self.inner.render(session, request).await
	}

	async fn stop_session(&self, session: &RunningSession, options: StopOptions) -> eyes_runtime::Result<TestResults> {
		let failing = self.failing_stops.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1));
		if failing.is_ok() {
			return Err(eyes_runtime::Error::Server("connection reset".to_string()));
		}
		self.inner.stop_session(session, options).await
	}
}

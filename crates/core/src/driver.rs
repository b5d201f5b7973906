//! Browser-automation driver contract and the instrumented wrapper.
//!
//! The façade never talks to a browser directly. Callers hand it any
//! [`WebDriver`] implementation; `open` wraps it in an [`EyesDriver`] that
//! tracks the current frame chain and records user-input triggers.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use eyes_protocol::{MouseAction, RectangleSize, Region, Trigger};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::Result;
use crate::target::FrameReference;

/// Operations the capture backends need from a browser session.
#[async_trait]
pub trait WebDriver: Send + Sync {
	fn session_id(&self) -> String;

	async fn viewport_size(&self) -> Result<RectangleSize>;

	async fn set_viewport_size(&self, size: RectangleSize) -> Result<()>;

	async fn device_pixel_ratio(&self) -> Result<f64>;

	/// PNG screenshot of the current context, optionally clipped to a region.
	async fn screenshot(&self, clip: Option<Region>, full_page: bool) -> Result<Vec<u8>>;

	/// Bounds of the first element matching `selector` in the current context.
	async fn element_region(&self, selector: &str) -> Result<Region>;

	async fn switch_to_frame(&self, frame: &FrameReference) -> Result<()>;

	async fn switch_to_parent_frame(&self) -> Result<()>;

	async fn switch_to_default_content(&self) -> Result<()>;

	/// Serialized DOM of the current document.
	async fn capture_dom(&self) -> Result<String>;

	async fn current_url(&self) -> Result<String>;

	async fn title(&self) -> Result<String>;

	async fn click(&self, selector: &str) -> Result<()>;

	async fn send_keys(&self, selector: &str, text: &str) -> Result<()>;
}

/// Driver handed to `open`: either a plain driver or one already wrapped.
pub enum DriverHandle {
	Raw(Arc<dyn WebDriver>),
	Instrumented(EyesDriver),
}

impl DriverHandle {
	/// Wraps a raw driver; an instrumented one is returned unchanged.
	pub fn into_instrumented(self) -> EyesDriver {
		match self {
			DriverHandle::Raw(driver) => EyesDriver::new(driver),
			DriverHandle::Instrumented(driver) => driver,
		}
	}
}

impl From<Arc<dyn WebDriver>> for DriverHandle {
	fn from(driver: Arc<dyn WebDriver>) -> Self {
		DriverHandle::Raw(driver)
	}
}

impl From<EyesDriver> for DriverHandle {
	fn from(driver: EyesDriver) -> Self {
		DriverHandle::Instrumented(driver)
	}
}

impl From<&EyesDriver> for DriverHandle {
	fn from(driver: &EyesDriver) -> Self {
		DriverHandle::Instrumented(driver.clone())
	}
}

struct EyesDriverInner {
	driver: Arc<dyn WebDriver>,
	frame_chain: Mutex<Vec<FrameReference>>,
	triggers: Mutex<Vec<Trigger>>,
}

/// A driver instrumented for visual testing.
///
/// Clones share state, so the handle returned from `open` and the one the
/// backend keeps always agree on the current frame.
#[derive(Clone)]
pub struct EyesDriver {
	inner: Arc<EyesDriverInner>,
}

impl EyesDriver {
	pub fn new(driver: Arc<dyn WebDriver>) -> Self {
		Self {
			inner: Arc::new(EyesDriverInner {
				driver,
				frame_chain: Mutex::new(Vec::new()),
				triggers: Mutex::new(Vec::new()),
			}),
		}
	}

	/// The wrapped driver.
	pub fn driver(&self) -> &Arc<dyn WebDriver> {
		&self.inner.driver
	}

	/// True when both handles wrap the same instrumented state.
	pub fn same_as(&self, other: &EyesDriver) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}

	pub fn session_id(&self) -> String {
		self.inner.driver.session_id()
	}

	/// Frames currently entered, outermost first.
	pub fn frame_chain(&self) -> Vec<FrameReference> {
		self.inner.frame_chain.lock().clone()
	}

	pub async fn switch_to_frame(&self, frame: &FrameReference) -> Result<()> {
		self.inner.driver.switch_to_frame(frame).await?;
		self.inner.frame_chain.lock().push(frame.clone());
		Ok(())
	}

	pub async fn switch_to_parent_frame(&self) -> Result<()> {
		self.inner.driver.switch_to_parent_frame().await?;
		self.inner.frame_chain.lock().pop();
		Ok(())
	}

	pub async fn switch_to_default_content(&self) -> Result<()> {
		self.inner.driver.switch_to_default_content().await?;
		self.inner.frame_chain.lock().clear();
		Ok(())
	}

	/// Returns to `chain`, re-entering frames from the top document.
	pub async fn restore_frame_chain(&self, chain: &[FrameReference]) -> Result<()> {
		if self.frame_chain() == chain {
			return Ok(());
		}
		debug!(target = "eyes", depth = chain.len(), "restoring frame chain");
		self.switch_to_default_content().await?;
		for frame in chain {
			self.switch_to_frame(frame).await?;
		}
		Ok(())
	}

	/// Clicks an element and records a mouse trigger for the next checkpoint.
	pub async fn click_element(&self, selector: &str) -> Result<()> {
		let control = self.inner.driver.element_region(selector).await?;
		self.inner.driver.click(selector).await?;
		self.record_trigger(Trigger::Mouse {
			action: MouseAction::Click,
			control,
			location: control.middle_offset(),
		});
		Ok(())
	}

	/// Types into an element and records a text trigger for the next checkpoint.
	pub async fn send_keys_to_element(&self, selector: &str, text: &str) -> Result<()> {
		let control = self.inner.driver.element_region(selector).await?;
		self.inner.driver.send_keys(selector, text).await?;
		self.record_trigger(Trigger::Text {
			control,
			text: text.to_string(),
		});
		Ok(())
	}

	/// Drains the triggers recorded since the last checkpoint.
	pub fn take_triggers(&self) -> Vec<Trigger> {
		std::mem::take(&mut *self.inner.triggers.lock())
	}

	fn record_trigger(&self, trigger: Trigger) {
		self.inner.triggers.lock().push(trigger);
	}

	pub async fn viewport_size(&self) -> Result<RectangleSize> {
		self.inner.driver.viewport_size().await
	}

	pub async fn set_viewport_size(&self, size: RectangleSize) -> Result<()> {
		self.inner.driver.set_viewport_size(size).await
	}

	pub async fn device_pixel_ratio(&self) -> Result<f64> {
		self.inner.driver.device_pixel_ratio().await
	}

	pub async fn screenshot(&self, clip: Option<Region>, full_page: bool) -> Result<Vec<u8>> {
		self.inner.driver.screenshot(clip, full_page).await
	}

	pub async fn element_region(&self, selector: &str) -> Result<Region> {
		self.inner.driver.element_region(selector).await
	}

	pub async fn capture_dom(&self) -> Result<String> {
		self.inner.driver.capture_dom().await
	}

	pub async fn current_url(&self) -> Result<String> {
		self.inner.driver.current_url().await
	}

	pub async fn title(&self) -> Result<String> {
		self.inner.driver.title().await
	}
}

impl fmt::Debug for EyesDriver {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("EyesDriver")
			.field("session_id", &self.session_id())
			.field("frame_chain", &self.frame_chain())
			.finish()
	}
}

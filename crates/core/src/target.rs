//! Fluent description of what a checkpoint captures.
//!
//! [`Target`] is the builder; it turns into an immutable [`CheckTarget`]
//! when handed to `check`.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use eyes::Target;
//!
//! eyes.check("login", Target::window().fully(true)).await?;
//!
//! // Region inside a nested frame, stitched, with a custom retry timeout.
//! eyes.check(
//!     "chart",
//!     Target::region("#chart").in_frame("main").stitch_content(true).timeout(Duration::from_secs(5)),
//! )
//! .await?;
//! ```

use std::fmt;
use std::time::Duration;

use eyes_protocol::Region;

/// How to find a frame to switch into.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FrameReference {
	/// Zero-based index among the current context's frames.
	Index(u32),
	/// Value of the frame's `name` or `id` attribute.
	NameOrId(String),
	/// CSS selector of the frame element.
	Selector(String),
}

impl fmt::Display for FrameReference {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			FrameReference::Index(index) => write!(f, "index:{index}"),
			FrameReference::NameOrId(name) => write!(f, "name:{name}"),
			FrameReference::Selector(selector) => write!(f, "css:{selector}"),
		}
	}
}

impl From<u32> for FrameReference {
	fn from(index: u32) -> Self {
		FrameReference::Index(index)
	}
}

impl From<&str> for FrameReference {
	fn from(name: &str) -> Self {
		FrameReference::NameOrId(name.to_string())
	}
}

impl From<String> for FrameReference {
	fn from(name: String) -> Self {
		FrameReference::NameOrId(name)
	}
}

/// A region given either as coordinates or as an element selector.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RegionLocator {
	Rect(Region),
	Selector(String),
}

impl From<Region> for RegionLocator {
	fn from(region: Region) -> Self {
		RegionLocator::Rect(region)
	}
}

impl From<[i32; 4]> for RegionLocator {
	fn from(rect: [i32; 4]) -> Self {
		RegionLocator::Rect(Region::from(rect))
	}
}

impl From<&str> for RegionLocator {
	fn from(selector: &str) -> Self {
		RegionLocator::Selector(selector.to_string())
	}
}

impl From<String> for RegionLocator {
	fn from(selector: String) -> Self {
		RegionLocator::Selector(selector)
	}
}

/// The one kind of area a checkpoint captures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetKind {
	Window,
	Frame(FrameReference),
	Region(RegionLocator),
}

/// Builder for a [`CheckTarget`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct Target {
	kind: TargetKind,
	frame_chain: Vec<FrameReference>,
	timeout: Option<Duration>,
	fully: bool,
	stitch_content: bool,
	ignore_mismatch: bool,
}

impl Target {
	fn seeded(kind: TargetKind) -> Self {
		Self {
			kind,
			frame_chain: Vec::new(),
			timeout: None,
			fully: false,
			stitch_content: false,
			ignore_mismatch: false,
		}
	}

	/// The viewport (or the whole page with [`Target::fully`]).
	pub fn window() -> Self {
		Self::seeded(TargetKind::Window)
	}

	/// The content of a frame.
	pub fn frame(reference: impl Into<FrameReference>) -> Self {
		Self::seeded(TargetKind::Frame(reference.into()))
	}

	/// A region of the current context.
	pub fn region(locator: impl Into<RegionLocator>) -> Self {
		Self::seeded(TargetKind::Region(locator.into()))
	}

	/// Scopes the target to a frame.
	///
	/// On a region the frame is entered before locating the region; on a
	/// frame target it nests one level deeper; on a window target the target
	/// becomes that frame.
	pub fn in_frame(mut self, reference: impl Into<FrameReference>) -> Self {
		let reference = reference.into();
		match &mut self.kind {
			TargetKind::Window => self.kind = TargetKind::Frame(reference),
			TargetKind::Frame(current) => {
				let outer = std::mem::replace(current, reference);
				self.frame_chain.push(outer);
			}
			TargetKind::Region(_) => self.frame_chain.push(reference),
		}
		self
	}

	/// How long to keep retrying the match; unset uses the configured default.
	pub fn timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);
		self
	}

	/// Capture the entire page instead of the viewport. Window targets only.
	pub fn fully(mut self, fully: bool) -> Self {
		self.fully = fully;
		self
	}

	/// Stitch the scrollable content of a region or frame.
	pub fn stitch_content(mut self, stitch_content: bool) -> Self {
		self.stitch_content = stitch_content;
		self
	}

	/// Compare without recording the checkpoint as a step.
	pub fn ignore_mismatch(mut self, ignore: bool) -> Self {
		self.ignore_mismatch = ignore;
		self
	}

	pub fn build(self) -> CheckTarget {
		CheckTarget {
			kind: self.kind,
			frame_chain: self.frame_chain,
			timeout: self.timeout,
			fully: self.fully,
			stitch_content: self.stitch_content,
			ignore_mismatch: self.ignore_mismatch,
		}
	}
}

/// Immutable checkpoint specification produced from a [`Target`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckTarget {
	kind: TargetKind,
	frame_chain: Vec<FrameReference>,
	timeout: Option<Duration>,
	fully: bool,
	stitch_content: bool,
	ignore_mismatch: bool,
}

impl CheckTarget {
	pub fn kind(&self) -> &TargetKind {
		&self.kind
	}

	/// Frames entered before the target is resolved, outermost first.
	pub fn frame_chain(&self) -> &[FrameReference] {
		&self.frame_chain
	}

	/// Every frame to switch into, including a frame target's own frame.
	pub fn frames_to_enter(&self) -> Vec<FrameReference> {
		let mut frames = self.frame_chain.clone();
		if let TargetKind::Frame(reference) = &self.kind {
			frames.push(reference.clone());
		}
		frames
	}

	pub fn timeout(&self) -> Option<Duration> {
		self.timeout
	}

	/// Always false outside window targets.
	pub fn fully(&self) -> bool {
		matches!(self.kind, TargetKind::Window) && self.fully
	}

	pub fn stitch_content(&self) -> bool {
		self.stitch_content
	}

	pub fn ignore_mismatch(&self) -> bool {
		self.ignore_mismatch
	}
}

impl From<Target> for CheckTarget {
	fn from(target: Target) -> Self {
		target.build()
	}
}

//! Geometry primitives shared by viewport, region and trigger payloads.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Width and height in CSS pixels, used for viewport and display sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RectangleSize {
	pub width: u32,
	pub height: u32,
}

impl RectangleSize {
	pub const fn new(width: u32, height: u32) -> Self {
		Self { width, height }
	}

	pub fn is_empty(&self) -> bool {
		self.width == 0 || self.height == 0
	}
}

impl fmt::Display for RectangleSize {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}x{}", self.width, self.height)
	}
}

impl From<(u32, u32)> for RectangleSize {
	fn from((width, height): (u32, u32)) -> Self {
		Self { width, height }
	}
}

/// A point relative to the top-left corner of its containing element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Location {
	pub x: i32,
	pub y: i32,
}

impl Location {
	pub const fn new(x: i32, y: i32) -> Self {
		Self { x, y }
	}
}

/// Axis-aligned rectangle in CSS pixels.
///
/// Coordinates are relative to the viewport of the frame the region was
/// resolved in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Region {
	pub left: i32,
	pub top: i32,
	pub width: i32,
	pub height: i32,
}

impl Region {
	pub const fn new(left: i32, top: i32, width: i32, height: i32) -> Self {
		Self { left, top, width, height }
	}

	pub fn is_empty(&self) -> bool {
		self.width <= 0 || self.height <= 0
	}

	pub fn location(&self) -> Location {
		Location::new(self.left, self.top)
	}

	/// Center of the region relative to its own top-left corner.
	pub fn middle_offset(&self) -> Location {
		Location::new(self.width / 2, self.height / 2)
	}
}

impl From<[i32; 4]> for Region {
	fn from([left, top, width, height]: [i32; 4]) -> Self {
		Self { left, top, width, height }
	}
}

impl fmt::Display for Region {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "({}, {}) {}x{}", self.left, self.top, self.width, self.height)
	}
}

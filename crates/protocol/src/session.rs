//! Session payloads: start, match-window and render requests.

use serde::{Deserialize, Serialize};

use crate::geometry::{Location, RectangleSize, Region};

/// Custom key/value pair attached to a session for later filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyData {
	pub name: String,
	pub value: String,
}

/// Request to start a new test session on the server.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStartInfo {
	pub agent_id: String,
	pub app_name: String,
	pub test_name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub viewport_size: Option<RectangleSize>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub batch_name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub branch_name: Option<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub properties: Vec<PropertyData>,
}

/// Mouse gesture recorded as a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MouseAction {
	Click,
	RightClick,
	DoubleClick,
	Move,
	Down,
	Up,
}

/// User input performed between two checkpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "triggerType", rename_all = "camelCase")]
pub enum Trigger {
	Mouse { action: MouseAction, control: Region, location: Location },
	Text { control: Region, text: String },
}

/// Captured application state for one checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppOutput {
	#[serde(with = "base64_bytes")]
	pub screenshot: Vec<u8>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub title: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub dom: Option<String>,
}

/// Request to compare one captured window with the baseline.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchWindowData {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tag: Option<String>,
	pub app_output: AppOutput,
	/// Intermediate retry attempts are compared but not recorded as steps.
	#[serde(default)]
	pub ignore_mismatch: bool,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub user_inputs: Vec<Trigger>,
}

/// What a rendering grid should render for a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RenderTarget {
	Window {
		fully: bool,
	},
	#[serde(rename_all = "camelCase")]
	Region {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		region: Option<Region>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		selector: Option<String>,
		stitch_content: bool,
	},
	#[serde(rename_all = "camelCase")]
	Frame {
		stitch_content: bool,
	},
}

/// A DOM snapshot plus the target description, queued for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tag: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub dom: Option<String>,
	/// Frames to descend into, outermost first.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub frames: Vec<String>,
	pub target: RenderTarget,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub viewport_size: Option<RectangleSize>,
}

mod base64_bytes {
	use base64::Engine;
	use base64::engine::general_purpose::STANDARD;
	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&STANDARD.encode(bytes))
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
		let encoded = String::deserialize(deserializer)?;
		STANDARD.decode(encoded.as_bytes()).map_err(serde::de::Error::custom)
	}
}

//! Session configuration owned by the façade.
//!
//! A [`Configuration`] is a plain value: the façade holds exactly one and
//! replaces it wholesale on `set_configuration`, carrying the API key and
//! server URL forward when the replacement leaves them empty.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyes_protocol::RectangleSize;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Server used when no URL is configured.
pub const DEFAULT_SERVER_URL: &str = "https://eyesapi.applitools.com";

/// Default time to keep retrying a checkpoint before recording a mismatch.
pub const DEFAULT_MATCH_TIMEOUT: Duration = Duration::from_millis(2000);

const API_KEY_ENV: &str = "APPLITOOLS_API_KEY";
const SERVER_URL_ENV: &str = "APPLITOOLS_SERVER_URL";

/// How full-page screenshots are scrolled while stitching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StitchMode {
	#[default]
	Scroll,
	Css,
}

/// Test identity, server connection and capture options for a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct Configuration {
	pub app_name: Option<String>,
	pub test_name: Option<String>,
	pub server_url: Option<String>,
	pub api_key: Option<String>,
	pub branch_name: Option<String>,
	pub batch_name: Option<String>,
	/// Suffix appended to the SDK agent id.
	pub agent_id: Option<String>,
	pub viewport_size: Option<RectangleSize>,
	/// A disabled configuration turns every check into a no-op.
	pub is_disabled: bool,
	pub send_dom: bool,
	#[serde(with = "duration_ms")]
	pub match_timeout: Duration,
	pub force_full_page_screenshot: bool,
	pub hide_scrollbars: bool,
	pub stitch_mode: StitchMode,
	pub save_new_tests: bool,
	pub save_failed_tests: bool,
	pub debug_screenshots_path: Option<PathBuf>,
	pub debug_screenshots_prefix: String,
}

impl Default for Configuration {
	fn default() -> Self {
		Self {
			app_name: None,
			test_name: None,
			server_url: None,
			api_key: None,
			branch_name: None,
			batch_name: None,
			agent_id: None,
			viewport_size: None,
			is_disabled: false,
			send_dom: true,
			match_timeout: DEFAULT_MATCH_TIMEOUT,
			force_full_page_screenshot: false,
			hide_scrollbars: true,
			stitch_mode: StitchMode::Scroll,
			save_new_tests: true,
			save_failed_tests: false,
			debug_screenshots_path: None,
			debug_screenshots_prefix: "screenshot_".to_string(),
		}
	}
}

impl Configuration {
	pub fn new() -> Self {
		Self::default()
	}

	/// Defaults plus the API key and server URL from the environment.
	///
	/// An unset server URL stays `None` so that a replaced configuration can
	/// still inherit an endpoint; [`Configuration::effective_server_url`]
	/// resolves it to [`DEFAULT_SERVER_URL`].
	pub fn from_env() -> Self {
		Self {
			api_key: non_empty_env(API_KEY_ENV),
			server_url: non_empty_env(SERVER_URL_ENV),
			..Self::default()
		}
	}

	/// Loads a JSON configuration file; absent fields keep their defaults.
	pub fn from_file(path: &Path) -> Result<Self> {
		let content = fs::read_to_string(path)?;
		Ok(serde_json::from_str(&content)?)
	}

	/// Server URL to talk to, falling back to [`DEFAULT_SERVER_URL`].
	pub fn effective_server_url(&self) -> &str {
		self.server_url.as_deref().filter(|url| !url.is_empty()).unwrap_or(DEFAULT_SERVER_URL)
	}

	pub fn has_api_key(&self) -> bool {
		self.api_key.as_deref().is_some_and(|key| !key.is_empty())
	}

	pub fn has_server_url(&self) -> bool {
		self.server_url.as_deref().is_some_and(|url| !url.is_empty())
	}

	/// Copies the API key and server URL from `previous` where `self` has none.
	///
	/// No other field is merged.
	pub fn inherit_credentials(&mut self, previous: &Configuration) {
		if previous.has_api_key() && !self.has_api_key() {
			self.api_key = previous.api_key.clone();
		}
		if previous.has_server_url() && !self.has_server_url() {
			self.server_url = previous.server_url.clone();
		}
	}

	pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
		self.app_name = Some(app_name.into());
		self
	}

	pub fn with_test_name(mut self, test_name: impl Into<String>) -> Self {
		self.test_name = Some(test_name.into());
		self
	}

	pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
		self.api_key = Some(api_key.into());
		self
	}

	pub fn with_server_url(mut self, server_url: impl Into<String>) -> Self {
		self.server_url = Some(server_url.into());
		self
	}

	pub fn with_viewport_size(mut self, size: RectangleSize) -> Self {
		self.viewport_size = Some(size);
		self
	}

	pub fn with_disabled(mut self, disabled: bool) -> Self {
		self.is_disabled = disabled;
		self
	}

	pub fn with_match_timeout(mut self, timeout: Duration) -> Self {
		self.match_timeout = timeout;
		self
	}
}

fn non_empty_env(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

mod duration_ms {
	use std::time::Duration;

	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_u64(duration.as_millis() as u64)
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
		Ok(Duration::from_millis(u64::deserialize(deserializer)?))
	}
}

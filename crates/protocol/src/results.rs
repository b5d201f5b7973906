//! Result payloads returned by match and close operations.

use serde::{Deserialize, Serialize};

use crate::geometry::RectangleSize;

/// Outcome of a single checkpoint.
///
/// `as_expected` is `None` when no comparison took place: the session was
/// disabled, or the comparison was queued for a rendering grid and will only
/// be known once the runner collects results.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
	#[serde(default)]
	pub as_expected: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub window_id: Option<u64>,
}

impl MatchResult {
	pub fn matched(window_id: u64) -> Self {
		Self {
			as_expected: Some(true),
			window_id: Some(window_id),
		}
	}

	pub fn mismatched(window_id: u64) -> Self {
		Self {
			as_expected: Some(false),
			window_id: Some(window_id),
		}
	}

	/// True when no comparison was performed.
	pub fn is_neutral(&self) -> bool {
		self.as_expected.is_none()
	}
}

/// Final verdict of a test session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TestResultStatus {
	#[default]
	Passed,
	Unresolved,
	Failed,
}

/// Summary of a finished (or aborted) test session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResults {
	pub name: String,
	pub app_name: String,
	pub status: TestResultStatus,
	#[serde(default)]
	pub is_new: bool,
	#[serde(default)]
	pub is_aborted: bool,
	#[serde(default)]
	pub steps: u32,
	#[serde(default)]
	pub matches: u32,
	#[serde(default)]
	pub mismatches: u32,
	#[serde(default)]
	pub missing: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub host_display_size: Option<RectangleSize>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
}

impl TestResults {
	pub fn is_passed(&self) -> bool {
		self.status == TestResultStatus::Passed
	}

	pub fn is_failed(&self) -> bool {
		self.status == TestResultStatus::Failed
	}

	/// An existing baseline was compared and differences were found.
	pub fn is_different(&self) -> bool {
		!self.is_new && self.status == TestResultStatus::Unresolved
	}
}

/// Result slot for one session collected by a runner.
///
/// Exactly one of the two fields is set: sessions that errored keep the error
/// text so that a failure in one test never hides the results of others.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResultContainer {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub test_results: Option<TestResults>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub exception: Option<String>,
}

impl TestResultContainer {
	pub fn from_results(results: TestResults) -> Self {
		Self {
			test_results: Some(results),
			exception: None,
		}
	}

	pub fn from_error(message: impl Into<String>) -> Self {
		Self {
			test_results: None,
			exception: Some(message.into()),
		}
	}
}

/// Everything a runner accumulated across its sessions.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResultsSummary {
	pub containers: Vec<TestResultContainer>,
}

impl TestResultsSummary {
	pub fn test_results(&self) -> impl Iterator<Item = &TestResults> {
		self.containers.iter().filter_map(|c| c.test_results.as_ref())
	}

	pub fn exceptions(&self) -> impl Iterator<Item = &str> {
		self.containers.iter().filter_map(|c| c.exception.as_deref())
	}

	pub fn len(&self) -> usize {
		self.containers.len()
	}

	pub fn is_empty(&self) -> bool {
		self.containers.is_empty()
	}

	pub fn passed(&self) -> usize {
		self.count(TestResultStatus::Passed)
	}

	pub fn unresolved(&self) -> usize {
		self.count(TestResultStatus::Unresolved)
	}

	pub fn failed(&self) -> usize {
		self.count(TestResultStatus::Failed)
	}

	fn count(&self, status: TestResultStatus) -> usize {
		self.test_results().filter(|r| r.status == status).count()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn different_means_unresolved_existing_baseline() {
		let mut results = TestResults {
			status: TestResultStatus::Unresolved,
			..Default::default()
		};
		assert!(results.is_different());

		results.is_new = true;
		assert!(!results.is_different());
	}

	#[test]
	fn summary_counts_by_status_and_keeps_errors() {
		let summary = TestResultsSummary {
			containers: vec![
				TestResultContainer::from_results(TestResults::default()),
				TestResultContainer::from_results(TestResults {
					status: TestResultStatus::Failed,
					..Default::default()
				}),
				TestResultContainer::from_error("render failed"),
			],
		};

		assert_eq!(summary.len(), 3);
		assert_eq!(summary.passed(), 1);
		assert_eq!(summary.failed(), 1);
		assert_eq!(summary.unresolved(), 0);
		assert_eq!(summary.exceptions().collect::<Vec<_>>(), vec!["render failed"]);
	}

	#[test]
	fn neutral_match_result_deserializes_from_empty_object() {
		let result: MatchResult = serde_json::from_str("{}").unwrap();
		assert!(result.is_neutral());
	}
}

//! Eyes - visual regression test sessions for browser automation
//!
//! An [`Eyes`] session opens a test against a browser driver, runs one or
//! more checkpoints and closes (or aborts) the test. Checkpoints are either
//! captured locally through the driver or rendered on a visual grid; the
//! choice is made once, when the session is constructed, and every other
//! call behaves the same under both.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use eyes::{Eyes, InMemoryServer, Target, VisualGridRunner};
//!
//! let runner = Arc::new(VisualGridRunner::new(4, Arc::new(InMemoryServer::new())));
//! let eyes = Eyes::with_runner(runner.clone())?;
//! eyes.open(driver, Some("Shop"), Some("Checkout"), None).await?;
//! eyes.check("cart", Target::region("#cart").stitch_content(true)).await?;
//! eyes.close_async().await?;
//!
//! let summary = runner.get_all_test_results().await;
//! ```

pub mod backend;
pub mod config;
pub mod driver;
pub mod error;
pub mod eyes;
pub mod logging;
pub mod target;

pub use backend::{AgentSetup, BackendKind, CaptureBackend, CutProvider, GridCaptureBackend, LocalCaptureBackend, PositionProvider};
pub use config::{Configuration, DEFAULT_MATCH_TIMEOUT, DEFAULT_SERVER_URL, StitchMode};
pub use driver::{DriverHandle, EyesDriver, WebDriver};
pub use error::{Error, Result};
pub use eyes::{Eyes, RunnerOption};
pub use eyes_protocol::{
	Location, MatchResult, MouseAction, PropertyData, RectangleSize, Region, TestResultContainer, TestResultStatus, TestResults,
	TestResultsSummary, Trigger,
};
pub use eyes_runtime::{EyesRunner, InMemoryServer, RunningSession, ServerConnector, StopOptions, VisualGridRunner};
pub use logging::init_logging;
pub use target::{CheckTarget, FrameReference, RegionLocator, Target, TargetKind};

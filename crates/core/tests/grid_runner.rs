// Sessions rendered through a shared VisualGridRunner.

mod common;

use std::sync::Arc;

use common::{FakeDriver, RecordingServer};
use eyes::{BackendKind, Error, Eyes, InMemoryServer, RectangleSize, Target, VisualGridRunner};
use eyes_protocol::RenderTarget;

fn grid_runner() -> Arc<VisualGridRunner> {
	Arc::new(VisualGridRunner::new(2, Arc::new(InMemoryServer::new())))
}

#[tokio::test]
async fn close_async_results_are_collected_by_the_runner() -> anyhow::Result<()> {
	let runner = grid_runner();
	let eyes = Eyes::with_runner(runner.clone())?;
	assert_eq!(eyes.backend_kind(), BackendKind::Grid);

	let driver = FakeDriver::new();
	eyes.open(driver.handle(), Some("App"), Some("Test1"), Some(RectangleSize::new(1024, 768)))
		.await?;
	let result = eyes
		.check("step1", Target::region([0_i32, 0, 100, 50]).stitch_content(true))
		.await?;
	assert!(result.is_neutral());

	eyes.close_async().await?;
	assert!(!eyes.is_open());

	let summary = runner.get_all_test_results().await;
	let results = summary.test_results().find(|r| r.name == "Test1").expect("Test1 collected");
	assert_eq!(results.steps, 1);
	assert!(results.is_new);
	Ok(())
}

#[tokio::test]
async fn grid_accessors_return_neutral_defaults() {
	let eyes = Eyes::with_runner(grid_runner()).unwrap();
	eyes.open(FakeDriver::with_device_pixel_ratio(2.0).handle(), Some("App"), Some("Neutral"), None)
		.await
		.unwrap();

	eyes.set_scale_ratio(3.0);
	eyes.set_debug_screenshot_provided(true);
	assert_eq!(eyes.device_pixel_ratio(), 0.0);
	assert_eq!(eyes.scale_ratio(), 0.0);
	assert!(eyes.position_provider().is_none());
	assert!(eyes.cut_provider().is_none());
	assert!(!eyes.is_cut_provider_explicitly_set());
	assert!(eyes.agent_setup().is_none());
	assert!(eyes.current_frame_position_provider().is_none());
	assert!(!eyes.debug_screenshot_provided());
	assert!(!eyes.send_dom());
	assert!(eyes.base_agent_id().starts_with("eyes.rust.visualgrid/"));
	eyes.abort().await.unwrap();
}

#[tokio::test]
async fn checks_enqueue_dom_snapshots() {
	let server = RecordingServer::new();
	let runner = Arc::new(VisualGridRunner::new(1, server.clone()));
	let eyes = Eyes::with_runner(runner.clone()).unwrap();

	eyes.open(FakeDriver::new().handle(), Some("App"), Some("Snapshots"), None).await.unwrap();
	eyes.check("cart", Target::region("#cart").in_frame("checkout")).await.unwrap();
	eyes.check("page", Target::window().fully(true)).await.unwrap();
	let results = eyes.close(false).await.unwrap().expect("results");
	assert_eq!(results.steps, 2);

	let renders = server.renders();
	assert_eq!(renders.len(), 2);
	assert_eq!(renders[0].tag.as_deref(), Some("cart"));
	assert_eq!(renders[0].frames, vec!["name:checkout".to_string()]);
	assert_eq!(renders[0].url.as_deref(), Some("https://shop.test/cart"));
	assert!(renders[0].dom.as_deref().is_some_and(|dom| dom.contains("<body>")));
	assert!(matches!(renders[0].target, RenderTarget::Region { ref selector, .. } if selector.as_deref() == Some("#cart")));
	assert_eq!(renders[1].target, RenderTarget::Window { fully: true });

	assert_eq!(server.started()[0].viewport_size, Some(RectangleSize::new(1280, 800)));
}

#[tokio::test]
async fn one_runner_serves_many_sessions() {
	let runner = grid_runner();
	let mut tasks = tokio::task::JoinSet::new();

	for i in 0..5 {
		let runner = runner.clone();
		tasks.spawn(async move {
			let eyes = Eyes::with_runner(runner).expect("grid eyes");
			eyes.open(FakeDriver::new().handle(), Some("App"), Some(&format!("Parallel {i}")), None)
				.await
				.expect("open");
			eyes.check("home", Target::window()).await.expect("check");
			eyes.close_async().await.expect("close_async");
		});
	}
	while let Some(joined) = tasks.join_next().await {
		joined.unwrap();
	}

	let summary = runner.get_all_test_results().await;
	assert_eq!(summary.len(), 5);
	assert_eq!(summary.exceptions().count(), 0);
}

#[tokio::test]
async fn raised_failures_are_still_collected() {
	let runner = grid_runner();
	let eyes = Eyes::with_runner(runner.clone()).unwrap();
	eyes.open(FakeDriver::new().handle(), Some("App"), Some("New on grid"), None).await.unwrap();
	eyes.check("home", Target::window()).await.unwrap();

	let err = eyes.close(true).await.unwrap_err();
	assert!(matches!(err, Error::TestFailure { .. }), "{err}");
	assert!(!eyes.is_open());

	let summary = runner.get_all_test_results().await;
	assert_eq!(summary.test_results().count(), 1);
}

#[tokio::test]
async fn render_errors_surface_on_close_and_stay_in_the_summary() {
	let server = RecordingServer::failing_renders();
	let runner = Arc::new(VisualGridRunner::new(1, server.clone()));
	let eyes = Eyes::with_runner(runner.clone()).unwrap();

	eyes.open(FakeDriver::new().handle(), Some("App"), Some("Broken renderer"), None).await.unwrap();
	eyes.check("home", Target::window()).await.unwrap();

	let err = eyes.close(false).await.unwrap_err();
	assert!(matches!(err, Error::Runtime(eyes_runtime::Error::Server(_))), "{err}");
	assert!(!eyes.is_open());

	let summary = runner.get_all_test_results().await;
	let exceptions: Vec<_> = summary.exceptions().collect();
	assert_eq!(exceptions.len(), 1);
	assert!(exceptions[0].contains("renderer unavailable"));
	assert_eq!(server.inner().open_sessions(), 0);
}

#[tokio::test]
async fn grid_check_before_open_aborts_and_fails() {
	let runner = grid_runner();
	let eyes = Eyes::with_runner(runner.clone()).unwrap();

	let err = eyes.check("early", Target::window()).await.unwrap_err();
	assert!(matches!(err, Error::IllegalState(_)));
	assert!(eyes.abort().await.unwrap().is_none());
	assert_eq!(runner.pending_sessions(), 0);
}

#[tokio::test]
async fn grid_abort_is_idempotent() {
	let runner = grid_runner();
	let eyes = Eyes::with_runner(runner.clone()).unwrap();
	eyes.open(FakeDriver::new().handle(), Some("App"), Some("Aborted"), None).await.unwrap();

	let aborted = eyes.abort().await.unwrap().expect("results");
	assert!(aborted.is_aborted);
	assert!(eyes.abort().await.unwrap().is_none());

	let summary = runner.get_all_test_results().await;
	assert!(summary.test_results().all(|r| r.is_aborted));
}

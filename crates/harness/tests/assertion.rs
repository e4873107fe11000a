//! Assertion engine against a live HTTP server

mod common;

use std::time::Duration;

use common::spawn_site;
use tenrankai_harness::catalog::ROOT_MARKER;
use tenrankai_harness::readiness::{await_ready, ProcessWatch, ProbePolicy, Readiness};
use tenrankai_harness::{AssertionEngine, JsonKind, TestCase};
use test_case::test_case;

struct Alive;

impl ProcessWatch for Alive {
    fn has_exited(&mut self) -> bool {
        false
    }
}

fn engine() -> AssertionEngine {
    AssertionEngine::new(Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn root_marker_passes() {
    let port = spawn_site().await;
    let base_url = format!("http://127.0.0.1:{}", port);

    let case = TestCase::new("/", "Homepage").content(ROOT_MARKER);
    let result = engine().check(&base_url, &case).await;
    assert!(result.passed, "{:?}", result.message);
    assert_eq!(result.path, "/");
}

#[test_case("/nonexistent" ; "unknown page")]
#[test_case("/gallery/nonexistent" ; "unknown gallery")]
#[tokio::test]
async fn unknown_paths_pass_as_404(path: &str) {
    let port = spawn_site().await;
    let base_url = format!("http://127.0.0.1:{}/", port);

    let case = TestCase::new(path, "404 page").status(404);
    assert!(engine().check(&base_url, &case).await.passed);
}

#[tokio::test]
async fn gallery_preview_reports_image_count() {
    let port = spawn_site().await;
    let base_url = format!("http://127.0.0.1:{}", port);

    let case = TestCase::new("/api/gallery/main/preview?count=6", "Gallery preview")
        .json_kind("images", JsonKind::Array)
        .json_field("gallery", serde_json::json!("main"));
    let result = engine().check(&base_url, &case).await;
    assert!(result.passed, "{:?}", result.message);
    assert_eq!(result.array_lengths.get("images"), Some(&6));
}

#[tokio::test]
async fn html_page_fails_json_expectation() {
    let port = spawn_site().await;
    let base_url = format!("http://127.0.0.1:{}", port);

    let case = TestCase::new("/", "Not JSON").json_kind("images", JsonKind::Array);
    let result = engine().check(&base_url, &case).await;
    assert!(!result.passed);
    assert!(result.message.unwrap().contains("not valid JSON"));
}

#[tokio::test]
async fn connection_refused_is_a_failing_result() {
    let port = tenrankai_harness::server::find_free_port().unwrap();
    let base_url = format!("http://127.0.0.1:{}", port);

    let case = TestCase::new("/", "Homepage");
    let result = engine().check(&base_url, &case).await;
    assert!(!result.passed);
    assert!(result.message.unwrap().starts_with("Request failed"));
}

#[tokio::test]
async fn probe_is_ready_on_first_answer() {
    let port = spawn_site().await;
    let base_url = format!("http://127.0.0.1:{}", port);
    let policy = ProbePolicy {
        max_attempts: 10,
        interval: Duration::from_millis(20),
        attempt_timeout: Duration::from_secs(1),
    };

    let readiness = await_ready(&mut Alive, &base_url, &policy).await.unwrap();
    assert_eq!(readiness, Readiness::Ready { attempts: 1 });
}

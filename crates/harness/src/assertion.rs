//! Assertion engine - one request, one verdict

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::HarnessResult;
use crate::spec::{JsonKind, TestCase};

/// Characters of body shown when a content expectation fails
pub const PREVIEW_CHARS: usize = 200;

/// Outcome of evaluating one test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub path: String,
    pub passed: bool,

    /// Mismatch description on failure, observations on success
    pub message: Option<String>,

    pub duration_ms: u64,

    /// Length of every array-typed key that was checked
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub array_lengths: BTreeMap<String, usize>,
}

impl TestResult {
    pub fn pass(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            passed: true,
            message: None,
            duration_ms: 0,
            array_lengths: BTreeMap::new(),
        }
    }

    pub fn fail(
        name: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            passed: false,
            message: Some(message.into()),
            ..Self::pass(name, path)
        }
    }
}

/// Issues GET requests and checks them against a [`TestCase`]
#[derive(Debug, Clone)]
pub struct AssertionEngine {
    client: reqwest::Client,
}

impl AssertionEngine {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(request_timeout: Duration) -> HarnessResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self { client })
    }

    /// Request `base_url + case.path` and evaluate the response. Request
    /// errors become failing results; nothing is raised.
    pub async fn check(&self, base_url: &str, case: &TestCase) -> TestResult {
        let url = format!("{}{}", base_url.trim_end_matches('/'), case.path);
        debug!("GET {}", url);
        let start = Instant::now();

        let mut result = match self.client.get(&url).send().await {
            Ok(resp) => {
                let status = resp.status().as_u16();
                match resp.text().await {
                    Ok(body) => evaluate(case, status, &body),
                    Err(e) => TestResult::fail(
                        &case.name,
                        &case.path,
                        format!("Failed to read response body: {}", e),
                    ),
                }
            }
            Err(e) => TestResult::fail(&case.name, &case.path, format!("Request failed: {}", e)),
        };

        result.duration_ms = start.elapsed().as_millis() as u64;
        result
    }
}

/// Check a received response against the case, short-circuiting on the
/// first failed expectation.
pub fn evaluate(case: &TestCase, status: u16, body: &str) -> TestResult {
    let fail = |message: String| TestResult::fail(&case.name, &case.path, message);

    if status != case.expected_status {
        return fail(format!("Expected {}, got {}", case.expected_status, status));
    }

    if let Some(expected) = &case.expected_content {
        if !body.contains(expected.as_str()) {
            return fail(format!(
                "Missing expected content '{}'; response preview: {}",
                expected,
                preview(body)
            ));
        }
    }

    let mut array_lengths = BTreeMap::new();

    if case.expects_json() {
        let parsed: Value = match serde_json::from_str(body) {
            Ok(v) => v,
            Err(e) => return fail(format!("Response is not valid JSON: {}", e)),
        };
        let Some(object) = parsed.as_object() else {
            return fail(format!("Response is a JSON {}, not an object", JsonKind::of(&parsed)));
        };

        if let Some(expected) = &case.expected_json {
            for (key, value) in expected {
                match object.get(key) {
                    None => return fail(format!("JSON key '{}' missing", key)),
                    Some(actual) if actual != value => {
                        return fail(format!(
                            "JSON key '{}' mismatch: expected {}, got {}",
                            key, value, actual
                        ))
                    }
                    Some(_) => {}
                }
            }
        }

        for (key, kind) in &case.expected_json_kinds {
            let Some(actual) = object.get(key) else {
                return fail(format!("JSON key '{}' missing", key));
            };
            if !kind.matches(actual) {
                return fail(format!(
                    "JSON key '{}' should be {}, got {}",
                    key,
                    kind,
                    JsonKind::of(actual)
                ));
            }
            if let Value::Array(items) = actual {
                array_lengths.insert(key.clone(), items.len());
            }
        }
    }

    let mut result = TestResult::pass(&case.name, &case.path);
    if !array_lengths.is_empty() {
        let observed: Vec<String> = array_lengths
            .iter()
            .map(|(key, len)| format!("{}: {} items", key, len))
            .collect();
        result.message = Some(observed.join(", "));
    }
    result.array_lengths = array_lengths;
    result
}

fn preview(body: &str) -> String {
    let mut chars = body.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

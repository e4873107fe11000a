//! Result aggregation and rendering

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

use crate::assertion::TestResult;
use crate::context::Style;
use crate::error::HarnessResult;

/// Lines of server output kept in a failed suite's report
pub const OUTPUT_TAIL_LINES: usize = 10;

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Per-endpoint lines and a summary table
    #[default]
    Table,
    /// A single JSON document on stdout
    Json,
}

/// Results of one suite
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub name: String,
    pub startup_failed: bool,
    pub results: Vec<TestResult>,

    /// Tail of the server's output, kept when anything failed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub server_output: Vec<String>,
}

impl SuiteReport {
    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.passed()
    }
}

/// Aggregate of a whole run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub suites: Vec<SuiteReport>,
}

impl RunSummary {
    pub fn success(&self) -> bool {
        self.failed == 0
    }

    /// 0 if and only if nothing failed
    pub fn exit_code(&self) -> i32 {
        if self.success() {
            0
        } else {
            1
        }
    }
}

/// Running pass/fail counters
#[derive(Debug)]
pub struct Aggregator {
    started: Instant,
    started_at: DateTime<Utc>,
    passed: usize,
    failed: usize,
    suites: Vec<SuiteReport>,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl Aggregator {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            started_at: Utc::now(),
            passed: 0,
            failed: 0,
            suites: Vec::new(),
        }
    }

    pub fn record(&mut self, result: &TestResult) {
        if result.passed {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
    }

    /// Record every result of a finished suite and keep its report
    pub fn record_suite(&mut self, report: SuiteReport) {
        for result in &report.results {
            self.record(result);
        }
        self.suites.push(report);
    }

    /// Snapshot of the counters; may be called any number of times
    pub fn summarize(&self) -> RunSummary {
        RunSummary {
            total: self.passed + self.failed,
            passed: self.passed,
            failed: self.failed,
            started_at: self.started_at,
            duration_ms: self.started.elapsed().as_millis() as u64,
            suites: self.suites.clone(),
        }
    }
}

/// Prints progress and the final summary
#[derive(Debug, Clone, Copy)]
pub struct Reporter {
    style: Style,
    format: OutputFormat,
    silent: bool,
}

impl Reporter {
    pub fn new(style: Style, format: OutputFormat) -> Self {
        Self {
            style,
            format,
            silent: false,
        }
    }

    pub fn silent() -> Self {
        Self {
            style: Style::plain(),
            format: OutputFormat::Table,
            silent: true,
        }
    }

    fn progress(&self) -> bool {
        !self.silent && self.format == OutputFormat::Table
    }

    pub fn suite_started(&self, name: &str) {
        if self.progress() {
            println!("\n{}", render_header(&self.style, name));
        }
    }

    pub fn result(&self, result: &TestResult) {
        if self.progress() {
            println!("{}", render_result(&self.style, result));
        }
    }

    pub fn note(&self, text: &str) {
        if self.progress() {
            println!("{}", self.style.info(&format!("ℹ {}", text)));
        }
    }

    pub fn summary(&self, summary: &RunSummary) -> HarnessResult<()> {
        if self.silent {
            return Ok(());
        }
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(summary)?),
            OutputFormat::Table => println!("{}", render_summary(&self.style, summary)),
        }
        Ok(())
    }
}

pub fn render_header(style: &Style, text: &str) -> String {
    format!("{}\n{}", style.header(text), "=".repeat(text.chars().count()))
}

pub fn render_result(style: &Style, result: &TestResult) -> String {
    let detail = result.message.as_deref().unwrap_or("OK");
    let mut lines: Vec<String> = detail.lines().map(str::to_string).collect();
    if lines.is_empty() {
        lines.push(String::new());
    }
    let first = if result.passed {
        style.success(&format!("✓ {}: {}", result.name, lines[0]))
    } else {
        style.failure(&format!("✗ {}: {}", result.name, lines[0]))
    };

    let mut out = first;
    for line in &lines[1..] {
        out.push_str("\n    ");
        out.push_str(line);
    }
    out
}

pub fn render_summary(style: &Style, summary: &RunSummary) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Suite", "Passed", "Failed", "Status"]);

    for suite in &summary.suites {
        let status = if suite.startup_failed {
            "startup failed"
        } else if suite.failed() == 0 {
            "ok"
        } else {
            "failed"
        };
        table.add_row(vec![
            suite.name.clone(),
            suite.passed().to_string(),
            suite.failed().to_string(),
            status.to_string(),
        ]);
    }

    let mut out = format!("\n{}\n{}\n", render_header(style, "Test Summary"), table);
    out.push_str(&format!("Total tests: {}\n", summary.total));
    out.push_str(&style.success(&format!("Passed: {}", summary.passed)));
    out.push('\n');
    if summary.failed > 0 {
        out.push_str(&style.failure(&format!("Failed: {}", summary.failed)));
        out.push('\n');
    }

    for suite in summary.suites.iter().filter(|s| !s.server_output.is_empty()) {
        out.push_str(&format!("\n{}\n", style.header(&format!("Recent server logs ({}):", suite.name))));
        for line in &suite.server_output {
            out.push_str(&format!("  {}\n", line));
        }
    }

    if summary.success() {
        out.push_str(&style.success("\nAll tests passed!"));
    } else {
        out.push_str(&style.failure("\nSome tests failed"));
    }
    out
}

/// Write the summary as `test-results.json` under `output_dir`
pub fn write_results(summary: &RunSummary, output_dir: &Path) -> HarnessResult<PathBuf> {
    std::fs::create_dir_all(output_dir)?;

    let path = output_dir.join("test-results.json");
    let json = serde_json::to_string_pretty(summary)?;
    std::fs::write(&path, json)?;

    info!("Results written to: {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suite(name: &str, results: Vec<TestResult>) -> SuiteReport {
        SuiteReport {
            name: name.to_string(),
            startup_failed: false,
            results,
            server_output: vec![],
        }
    }

    #[test]
    fn test_counts_add_up() {
        let mut agg = Aggregator::new();
        agg.record_suite(suite(
            "Main Pages",
            vec![
                TestResult::pass("Homepage", "/"),
                TestResult::fail("About", "/about", "Expected 200, got 500"),
            ],
        ));
        agg.record_suite(suite("Blog", vec![TestResult::pass("Blog", "/blog")]));

        let summary = agg.summarize();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.passed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.passed + summary.failed, summary.total);
        assert_eq!(summary.exit_code(), 1);
    }

    #[test]
    fn test_summarize_is_idempotent() {
        let mut agg = Aggregator::new();
        agg.record(&TestResult::pass("Homepage", "/"));
        let first = agg.summarize();
        let second = agg.summarize();
        assert_eq!(first.total, second.total);
        assert_eq!(first.passed, second.passed);
        assert_eq!(second.exit_code(), 0);
    }

    #[test]
    fn test_empty_run_exits_zero() {
        let summary = Aggregator::new().summarize();
        assert_eq!(summary.total, 0);
        assert_eq!(summary.exit_code(), 0);
    }

    #[test]
    fn test_render_result_lines() {
        let style = Style::plain();
        assert_eq!(
            render_result(&style, &TestResult::pass("Homepage", "/")),
            "✓ Homepage: OK"
        );
        let failed = TestResult::fail("About", "/about", "Server failed\nline one");
        assert_eq!(render_result(&style, &failed), "✗ About: Server failed\n    line one");
    }

    #[test]
    fn test_render_summary_mentions_logs_and_verdict() {
        let mut agg = Aggregator::new();
        let mut report = suite(
            "Main Pages",
            vec![TestResult::fail("Main Pages (server startup)", "/", "no answer")],
        );
        report.startup_failed = true;
        report.server_output = vec!["listening failed".to_string()];
        agg.record_suite(report);

        let text = render_summary(&Style::plain(), &agg.summarize());
        assert!(text.contains("startup failed"));
        assert!(text.contains("  listening failed"));
        assert!(text.contains("Failed: 1"));
        assert!(text.ends_with("Some tests failed"));
    }

    #[test]
    fn test_write_results() {
        let dir = tempfile::tempdir().unwrap();
        let mut agg = Aggregator::new();
        agg.record_suite(suite("Blog", vec![TestResult::pass("Blog", "/blog")]));

        let path = write_results(&agg.summarize(), &dir.path().join("out")).unwrap();
        let parsed: RunSummary =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(parsed.total, 1);
        assert_eq!(parsed.suites[0].name, "Blog");
    }
}

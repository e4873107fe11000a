//! Suite runner - one fresh server per suite, teardown on every path

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::assertion::{AssertionEngine, TestResult};
use crate::context::{RunContext, Timeline};
use crate::error::HarnessResult;
use crate::readiness::{await_ready, ProbePolicy};
use crate::report::{SuiteReport, OUTPUT_TAIL_LINES};
use crate::server::{find_free_port, ProcessState, ServerConfig, ServerProcess};
use crate::spec::TestSuite;

/// Lines of server output embedded in a startup failure message
const STARTUP_OUTPUT_LINES: usize = 50;

/// Configuration for the suite runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Server settings shared by all suites; suites may override port and
    /// configuration file
    pub server: ServerConfig,
    pub probe: ProbePolicy,
    pub request_timeout: Duration,

    /// Hand the last suite's server back instead of stopping it
    pub keep_running: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            probe: ProbePolicy::default(),
            request_timeout: AssertionEngine::DEFAULT_TIMEOUT,
            keep_running: false,
        }
    }
}

/// What one suite produced
pub struct SuiteOutcome {
    pub report: SuiteReport,

    /// Present only when the server was kept running
    pub kept: Option<ServerProcess>,
}

/// Body of a suite, run while the server is held
struct SuiteBody {
    results: Vec<TestResult>,

    /// Why the server never became ready; the failing result is built
    /// after teardown so it carries the complete server output
    startup_failure: Option<String>,
}

pub struct SuiteRunner {
    config: RunnerConfig,
    engine: AssertionEngine,

    /// Panic inside the suite body once the server is running
    #[cfg(test)]
    panic_in_body: Option<&'static str>,
}

impl SuiteRunner {
    pub fn new(config: RunnerConfig) -> HarnessResult<Self> {
        let engine = AssertionEngine::new(config.request_timeout)?;
        Ok(Self {
            config,
            engine,
            #[cfg(test)]
            panic_in_body: None,
        })
    }

    /// Server settings for one suite
    pub fn server_config_for(&self, suite: &TestSuite) -> HarnessResult<ServerConfig> {
        let mut server = self.config.server.clone();
        if let Some(port) = suite.port {
            server.port = port;
        }
        if server.port == 0 {
            server.port = find_free_port()?;
        }
        if let Some(config) = &suite.config {
            server.config_path = config.clone();
        }
        Ok(server)
    }

    /// Run one suite and stop its server
    pub async fn run(&self, ctx: &mut RunContext, suite: &TestSuite) -> Vec<TestResult> {
        self.run_suite(ctx, suite, false).await.report.results
    }

    /// Run every suite strictly in sequence, recording into the aggregator.
    /// Returns the last suite's server when `keep_running` is set and it
    /// came up.
    pub async fn run_all(
        &self,
        ctx: &mut RunContext,
        suites: &[TestSuite],
    ) -> Option<ServerProcess> {
        info!("Running {} suite(s)...", suites.len());
        let mut kept = None;

        for (i, suite) in suites.iter().enumerate() {
            let keep = self.config.keep_running && i + 1 == suites.len();
            ctx.reporter.suite_started(&suite.name);

            let outcome = self.run_suite(ctx, suite, keep).await;
            for result in &outcome.report.results {
                ctx.reporter.result(result);
            }
            ctx.aggregator.record_suite(outcome.report);
            kept = outcome.kept;
        }

        kept
    }

    /// Acquire a server, run the body, release the server. Release happens
    /// whatever the body does, including panicking.
    pub async fn run_suite(
        &self,
        ctx: &mut RunContext,
        suite: &TestSuite,
        keep: bool,
    ) -> SuiteOutcome {
        let startup_failure = |message: String, output: Vec<String>| SuiteOutcome {
            report: SuiteReport {
                name: suite.name.clone(),
                startup_failed: true,
                results: vec![startup_result(suite, &message)],
                server_output: output,
            },
            kept: None,
        };

        let server_config = match self.server_config_for(suite) {
            Ok(config) => config,
            Err(e) => return startup_failure(e.to_string(), vec![]),
        };
        let port = server_config.port;

        if let Err(e) = ctx.ports.claim(port, &suite.name) {
            return startup_failure(e.to_string(), vec![]);
        }

        let mut process = match ServerProcess::start(server_config) {
            Ok(process) => process,
            Err(e) => {
                error!("{}: {}", suite.name, e);
                ctx.timeline.record(&suite.name, port, ProcessState::Failed);
                ctx.ports.release(port);
                return startup_failure(e.to_string(), vec![]);
            }
        };
        ctx.timeline.record(&suite.name, port, ProcessState::Starting);

        let body = AssertUnwindSafe(self.exercise(&mut process, suite, &mut ctx.timeline))
            .catch_unwind()
            .await;

        let aborted = body.is_err();
        let body = match body {
            Ok(body) => body,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("Suite '{}' aborted: {}", suite.name, message);
                SuiteBody {
                    results: vec![TestResult::fail(
                        format!("{} (aborted)", suite.name),
                        "/",
                        format!("Suite aborted unexpectedly: {}", message),
                    )],
                    startup_failure: None,
                }
            }
        };

        let startup_failed = body.startup_failure.is_some();
        let failed = startup_failed || body.results.iter().any(|r| !r.passed);
        let mut report = SuiteReport {
            name: suite.name.clone(),
            startup_failed,
            results: body.results,
            server_output: vec![],
        };

        if keep && !startup_failed && !aborted && process.state() == ProcessState::Running {
            info!("Keeping server for '{}' running on port {}", suite.name, port);
            return SuiteOutcome {
                report,
                kept: Some(process),
            };
        }

        let final_state = process.stop().await;
        ctx.timeline.record(&suite.name, port, final_state);
        if let Some(reason) = &body.startup_failure {
            let message = startup_message(reason, &process.output().tail(STARTUP_OUTPUT_LINES));
            report.results = vec![startup_result(suite, &message)];
        }
        if failed {
            report.server_output = process.output().tail(OUTPUT_TAIL_LINES);
        }
        drop(process);
        ctx.ports.release(port);
        debug!("Suite '{}' released port {}", suite.name, port);

        SuiteOutcome { report, kept: None }
    }

    async fn exercise(
        &self,
        process: &mut ServerProcess,
        suite: &TestSuite,
        timeline: &mut Timeline,
    ) -> SuiteBody {
        let base_url = process.base_url();
        let port = process.port();

        let readiness = match await_ready(process, &base_url, &self.config.probe).await {
            Ok(readiness) => readiness,
            Err(e) => return SuiteBody::startup_failure(e.to_string()),
        };

        if !readiness.is_ready() {
            warn!("Server for '{}' not ready: {}", suite.name, readiness);
            return SuiteBody::startup_failure(readiness.to_string());
        }

        if let Err(e) = process.mark_running() {
            return SuiteBody::startup_failure(e.to_string());
        }
        timeline.record(&suite.name, port, ProcessState::Running);
        info!("Server for '{}' {} on port {}", suite.name, readiness, port);

        #[cfg(test)]
        if let Some(message) = self.panic_in_body {
            panic!("{}", message);
        }

        let mut results = Vec::with_capacity(suite.cases.len());
        for case in &suite.cases {
            results.push(self.engine.check(&base_url, case).await);
        }

        SuiteBody {
            results,
            startup_failure: None,
        }
    }
}

impl SuiteBody {
    fn startup_failure(reason: String) -> Self {
        Self {
            results: vec![],
            startup_failure: Some(reason),
        }
    }
}

/// The single failing result that stands in for a suite whose server never
/// became ready
fn startup_result(suite: &TestSuite, message: &str) -> TestResult {
    TestResult::fail(format!("{} (server startup)", suite.name), "/", message)
}

fn startup_message(reason: &str, output: &[String]) -> String {
    let mut message = format!("Server failed to start: {}", reason);
    if output.is_empty() {
        message.push_str("\nServer output: (none)");
    } else {
        message.push_str("\nServer output:");
        for line in output {
            message.push('\n');
            message.push_str(line);
        }
    }
    message
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

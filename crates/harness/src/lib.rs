//! Tenrankai site harness
//!
//! Black-box checks against a prebuilt Tenrankai server:
//! - Spawns the server as a subprocess, one fresh instance per suite
//! - Polls the site root until the server answers (bounded)
//! - Checks status codes, body substrings and JSON fields per endpoint
//! - Stops the server on every path and aggregates results into an exit code
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  SuiteRunner                                                │
//! │    ├── ServerProcess::start() / stop()      (server)        │
//! │    ├── await_ready() -> Readiness            (readiness)    │
//! │    ├── AssertionEngine::check() -> TestResult (assertion)   │
//! │    └── Aggregator::record_suite()            (report)       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestSuite (built-in catalog or YAML)                       │
//! │    ├── name, port?, config?                                 │
//! │    └── cases: [TestCase]                                    │
//! │          ├── path, name, expected_status                    │
//! │          ├── expected_content?                              │
//! │          └── expected_json? / expected_json_kinds?          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod assertion;
pub mod build;
pub mod catalog;
pub mod config;
pub mod context;
pub mod error;
pub mod readiness;
pub mod report;
pub mod runner;
pub mod server;
pub mod spec;

pub use assertion::{AssertionEngine, TestResult};
pub use context::RunContext;
pub use error::{HarnessError, HarnessResult};
pub use report::RunSummary;
pub use runner::{RunnerConfig, SuiteRunner};
pub use server::{ProcessState, ServerConfig, ServerProcess};
pub use spec::{JsonKind, TestCase, TestSuite};

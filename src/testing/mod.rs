//! Smoke-test suite for a stdio tool server
//!
//! Cases are plain data (`scenario`), executed in order by `runner`
//! against one launched server, and folded into a verdict by `report`.
//! `startup` holds the separate missing-API-key launch check.

pub mod report;
pub mod runner;
pub mod scenario;
pub mod startup;

pub use report::RunResult;
pub use runner::{run_suite, CaseRecord, CaseState, RunOptions, ScenarioRunner};
pub use scenario::{builtin, load_yaml, Expectation, Observation, TestCase};
pub use startup::{StartupCheck, StartupVerdict};

//! Test runner implementation
//!
//! Executes test cases in order against one server. A failing case is
//! recorded and the run moves on; only a launch failure ends it early.

use std::time::{Duration, Instant};

use crate::common::Result;
use crate::rpc::{CallOutcome, LaunchSpec, RpcClient, Transport};

use super::report::{self, RunResult};
use super::scenario::{Observation, TestCase};

/// Lifecycle of one case
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseState {
    Pending,
    Running,
    Passed,
    Failed,
}

impl CaseState {
    pub fn is_terminal(self) -> bool {
        matches!(self, CaseState::Passed | CaseState::Failed)
    }
}

/// Record of one case's execution
#[derive(Debug, Clone)]
pub struct CaseRecord {
    pub name: String,
    pub method: String,
    pub state: CaseState,
    /// Classified reply, when the request got that far
    pub outcome: Option<CallOutcome>,
    /// Why the case failed
    pub failure: Option<String>,
    pub elapsed: Duration,
}

impl CaseRecord {
    pub fn new(case: &TestCase) -> Self {
        Self {
            name: case.name.clone(),
            method: case.method.clone(),
            state: CaseState::Pending,
            outcome: None,
            failure: None,
            elapsed: Duration::ZERO,
        }
    }

    fn start(&mut self) {
        debug_assert_eq!(self.state, CaseState::Pending);
        self.state = CaseState::Running;
    }

    fn finish(&mut self, passed: bool, failure: Option<String>, elapsed: Duration) {
        debug_assert_eq!(self.state, CaseState::Running);
        self.state = if passed {
            CaseState::Passed
        } else {
            CaseState::Failed
        };
        self.failure = failure;
        self.elapsed = elapsed;
    }

    pub fn passed(&self) -> bool {
        self.state == CaseState::Passed
    }

    /// The undecodable reply line, verbatim, if that is why it failed
    pub fn raw_response(&self) -> Option<&str> {
        match &self.outcome {
            Some(CallOutcome::MalformedResponse { raw, .. }) => Some(raw),
            _ => None,
        }
    }
}

/// Knobs for a run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Pause between consecutive cases
    pub pacing: Duration,
    /// Deadline for each reply; `None` waits indefinitely
    pub read_timeout: Option<Duration>,
    /// Fail tool results flagged `isError`
    pub strict_tool_errors: bool,
    /// Print full previews
    pub verbose: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            pacing: Duration::from_secs(1),
            read_timeout: None,
            strict_tool_errors: false,
            verbose: false,
        }
    }
}

/// Runs an ordered list of cases against one client
pub struct ScenarioRunner {
    cases: Vec<TestCase>,
    options: RunOptions,
}

impl ScenarioRunner {
    pub fn new(cases: Vec<TestCase>, options: RunOptions) -> Self {
        Self { cases, options }
    }

    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    /// Execute every case once, in declaration order
    pub async fn run(&self, client: &mut RpcClient) -> RunResult {
        let mut result = RunResult::new(self.cases.len());

        for (i, case) in self.cases.iter().enumerate() {
            if i > 0 && !self.options.pacing.is_zero() {
                tokio::time::sleep(self.options.pacing).await;
            }

            let record = self.run_case(client, case).await;
            result.record(record);
        }

        result
    }

    async fn run_case(&self, client: &mut RpcClient, case: &TestCase) -> CaseRecord {
        let mut record = CaseRecord::new(case);
        report::case_started(case);
        record.start();

        let started = Instant::now();
        match client.call(&case.method, case.params.clone()).await {
            Ok(outcome) => {
                let verdict = case.check(&outcome, self.options.strict_tool_errors);
                record.outcome = Some(outcome);
                match verdict {
                    Ok(observation) => {
                        record.finish(true, None, started.elapsed());
                        warn_on_tool_error(case, &observation);
                        report::case_passed(case, &observation, self.options.verbose);
                    }
                    Err(reason) => {
                        record.finish(false, Some(reason), started.elapsed());
                        report::case_failed(&record);
                    }
                }
            }
            Err(e) => {
                // Transport failures are downgraded to a failed case
                record.finish(false, Some(e.to_string()), started.elapsed());
                report::case_failed(&record);
            }
        }

        tracing::debug!(
            case = %record.name,
            state = ?record.state,
            elapsed_ms = record.elapsed.as_millis() as u64,
            "Case finished"
        );
        record
    }
}

fn warn_on_tool_error(case: &TestCase, observation: &Observation) {
    if let Observation::ToolOutput { is_error: true, .. } = observation {
        tracing::warn!("Tool call '{}' returned a result flagged isError", case.name);
    }
}

/// Launch the server, run every case, and stop the server
///
/// The transport is stopped on every path after a successful launch;
/// if this future is dropped midway the transport's own drop kills the
/// process. A launch failure is the only error returned.
pub async fn run_suite(spec: &LaunchSpec, runner: &ScenarioRunner) -> Result<RunResult> {
    let transport = Transport::start(spec).await?;
    let mut client = RpcClient::new(transport).with_read_timeout(runner.options.read_timeout);

    let mut result = runner.run(&mut client).await;

    match client.shutdown().await {
        Ok(transport) => {
            result.server_exit = transport.exit_status();
            result.server_stderr = transport.stderr_tail();
        }
        Err(e) => tracing::warn!("Failed to stop server cleanly: {}", e),
    }

    Ok(result)
}

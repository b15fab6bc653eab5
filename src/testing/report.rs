//! Run results and console output
//!
//! The console output is informational only. The verdict that matters is
//! [`RunResult::all_passed`], which decides the exit status.

use std::process::ExitStatus;

use colored::Colorize;

use crate::common::truncate_chars;

use super::runner::CaseRecord;
use super::scenario::{Observation, TestCase};

/// Outcome of a whole run
#[derive(Debug, Default)]
pub struct RunResult {
    /// Number of cases in the suite
    planned: usize,
    /// One record per executed case, in order
    records: Vec<CaseRecord>,
    /// Set when the run ended before any case executed
    aborted: Option<String>,
    /// Server exit status after shutdown
    pub server_exit: Option<ExitStatus>,
    /// Last lines the server wrote to stderr
    pub server_stderr: Vec<String>,
}

impl RunResult {
    pub fn new(planned: usize) -> Self {
        Self {
            planned,
            ..Default::default()
        }
    }

    /// A run that never executed its cases
    pub fn aborted(planned: usize, reason: impl Into<String>) -> Self {
        Self {
            planned,
            aborted: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn record(&mut self, record: CaseRecord) {
        debug_assert!(record.state.is_terminal());
        self.records.push(record);
    }

    pub fn records(&self) -> &[CaseRecord] {
        &self.records
    }

    /// Number of cases in the suite
    pub fn total(&self) -> usize {
        self.planned.max(self.records.len())
    }

    /// Number of cases that ran
    pub fn executed(&self) -> usize {
        self.records.len()
    }

    pub fn passed(&self) -> usize {
        self.records.iter().filter(|r| r.passed()).count()
    }

    pub fn abort_reason(&self) -> Option<&str> {
        self.aborted.as_deref()
    }

    /// Every case ran and passed
    pub fn all_passed(&self) -> bool {
        self.aborted.is_none() && self.passed() == self.total()
    }

    pub fn exit_code(&self) -> i32 {
        if self.all_passed() {
            0
        } else {
            1
        }
    }
}

/// First `max` non-blank lines of `text`, and whether more lines exist
pub fn preview_lines(text: &str, max: Option<usize>) -> (Vec<&str>, bool) {
    let total = text.lines().count();
    let limit = max.unwrap_or(total);
    let shown = text
        .lines()
        .take(limit)
        .filter(|line| !line.trim().is_empty())
        .collect();
    (shown, total > limit)
}

/// Lines of tool output to print for `case`, and whether to follow them
/// with a truncation marker
pub fn tool_preview<'a>(case: &TestCase, text: &'a str, verbose: bool) -> (Vec<&'a str>, bool) {
    let max = if verbose { None } else { case.preview_lines };
    let (lines, truncated) = preview_lines(text, max);
    (lines, truncated && case.truncation_note)
}

// === Console Output ===

const RULE_WIDTH: usize = 50;

pub fn banner(server: &str) {
    println!("{} {}", "Starting tests for".blue().bold(), server.white().bold());
    println!("{}", "=".repeat(RULE_WIDTH));
}

pub fn case_started(case: &TestCase) {
    println!("\n{} {}", "Testing".cyan(), case.name.cyan());
}

pub fn case_passed(case: &TestCase, observation: &Observation, verbose: bool) {
    println!("  {} {}", "✓".green(), case.name);

    match observation {
        Observation::Nothing => {}
        Observation::Tools(tools) => {
            println!("  Found {} tools:", tools.len());
            for tool in tools {
                let description = tool.description.as_deref().unwrap_or("No description");
                println!("    - {}: {}", tool.name, description.dimmed());
            }
        }
        Observation::ToolOutput { text, is_error } => {
            if *is_error {
                println!("  {} tool flagged its result as an error", "!".yellow());
            }
            if let Some(text) = text {
                let (lines, note) = tool_preview(case, text, verbose);
                for line in lines {
                    println!("    {}", line.dimmed());
                }
                if note {
                    println!("    {}", "... (truncated)".dimmed());
                }
            }
        }
    }
}

pub fn case_failed(record: &CaseRecord) {
    let reason = record.failure.as_deref().unwrap_or("unknown failure");
    println!("  {} {}: {}", "✗".red(), record.name, reason);
    if let Some(raw) = record.raw_response() {
        println!("    raw response: {}", truncate_chars(raw, 500).dimmed());
    }
}

pub fn launch_failed(reason: &str) {
    println!("  {} {}", "✗".red(), reason);
}

pub fn summary(result: &RunResult) {
    println!("\n{}", "=".repeat(RULE_WIDTH));
    println!(
        "{} {}/{} tests passed",
        "Test Results:".bold(),
        result.passed(),
        result.total()
    );

    if let Some(reason) = result.abort_reason() {
        println!("{} {}", "Run aborted:".red().bold(), reason);
    }

    if result.all_passed() {
        println!("{}", "All tests passed! The server is working correctly.".green().bold());
    } else {
        println!(
            "{}",
            "Some tests failed. Check the output above for details.".yellow().bold()
        );
        if !result.server_stderr.is_empty() {
            println!("\n{}", "Server stderr (most recent lines):".dimmed());
            for line in &result.server_stderr {
                println!("  {}", line.dimmed());
            }
        }
    }
}

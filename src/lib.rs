//! mcp-smoke - smoke tests for stdio JSON-RPC tool servers
//!
//! Launches a tool server as a child process, speaks line-delimited
//! JSON-RPC over its stdin/stdout, runs an ordered list of test cases and
//! reports a pass/fail verdict.

pub mod cli;
pub mod commands;
pub mod common;
pub mod preflight;
pub mod rpc;
pub mod testing;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use rpc::{CallOutcome, LaunchSpec, RpcClient, Transport};

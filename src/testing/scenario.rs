//! Test case definitions
//!
//! A test case is data: the method to call, its params, and what a
//! passing reply looks like. The built-in table exercises the RateSpot
//! mortgage server; a YAML file can replace it.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::common::{Error, Result};
use crate::rpc::{
    CallOutcome, InitializeParams, ToolDescriptor, ToolListing, ToolResult, METHOD_INITIALIZE,
    METHOD_TOOLS_CALL, METHOD_TOOLS_LIST,
};

/// What a passing reply must look like
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Expectation {
    /// Any `result`
    #[default]
    Success,
    /// A `result` with a `tools` array of descriptors
    ToolListing,
    /// A `result` shaped like a tool call result
    ToolContent,
}

/// A single named test case
#[derive(Deserialize, Debug, Clone)]
pub struct TestCase {
    /// Name shown in the report
    pub name: String,
    /// JSON-RPC method to call
    pub method: String,
    /// Method parameters
    #[serde(default = "empty_params")]
    pub params: Value,
    /// Pass predicate
    #[serde(default)]
    pub expect: Expectation,
    /// Lines of tool output to preview; all of them when unset
    #[serde(default)]
    pub preview_lines: Option<usize>,
    /// Print a marker when the preview cuts the output short
    #[serde(default)]
    pub truncation_note: bool,
}

fn empty_params() -> Value {
    json!({})
}

/// What a passing case observed, for the console preview
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    Nothing,
    Tools(Vec<ToolDescriptor>),
    ToolOutput { text: Option<String>, is_error: bool },
}

impl TestCase {
    pub fn new(name: &str, method: &str, params: Value) -> Self {
        Self {
            name: name.to_string(),
            method: method.to_string(),
            params,
            expect: Expectation::Success,
            preview_lines: None,
            truncation_note: false,
        }
    }

    pub fn expect(mut self, expect: Expectation) -> Self {
        self.expect = expect;
        self
    }

    pub fn preview_lines(mut self, lines: usize) -> Self {
        self.preview_lines = Some(lines);
        self
    }

    pub fn with_truncation_note(mut self) -> Self {
        self.truncation_note = true;
        self
    }

    /// Tool-invocation case
    pub fn tool_call(name: &str, tool: &str, arguments: Value) -> Self {
        Self::new(
            name,
            METHOD_TOOLS_CALL,
            json!({ "name": tool, "arguments": arguments }),
        )
        .expect(Expectation::ToolContent)
    }

    /// Judge a call outcome against this case's expectation
    ///
    /// `strict_tool_errors` turns a tool result flagged `isError` into a
    /// failure instead of a warning.
    pub fn check(
        &self,
        outcome: &CallOutcome,
        strict_tool_errors: bool,
    ) -> std::result::Result<Observation, String> {
        let result = match outcome {
            CallOutcome::Success(result) => result,
            other => return Err(other.to_string()),
        };

        match self.expect {
            Expectation::Success => Ok(Observation::Nothing),
            Expectation::ToolListing => {
                let listing: ToolListing = serde_json::from_value(result.clone())
                    .map_err(|e| format!("result is not a tool listing: {}", e))?;

                let mut seen = HashSet::new();
                if let Some(dup) = listing.tools.iter().find(|t| !seen.insert(t.name.as_str())) {
                    return Err(format!("duplicate tool name '{}' in listing", dup.name));
                }
                Ok(Observation::Tools(listing.tools))
            }
            Expectation::ToolContent => {
                let tool_result: ToolResult = serde_json::from_value(result.clone())
                    .map_err(|e| format!("result is not a tool result: {}", e))?;

                if tool_result.is_error && strict_tool_errors {
                    let detail = tool_result.first_text().unwrap_or("no details");
                    return Err(format!("tool reported an error: {}", detail));
                }
                Ok(Observation::ToolOutput {
                    text: tool_result.first_text().map(str::to_string),
                    is_error: tool_result.is_error,
                })
            }
        }
    }
}

/// The built-in suite, in execution order
pub fn builtin() -> Vec<TestCase> {
    vec![
        TestCase::new(
            "server initialization",
            METHOD_INITIALIZE,
            json!(InitializeParams::default()),
        ),
        TestCase::new("tool listing", METHOD_TOOLS_LIST, json!({}))
            .expect(Expectation::ToolListing),
        TestCase::tool_call(
            "mortgage rates",
            "get-mortgage-rates",
            json!({
                "loanAmount": 400000,
                "creditScore": 790,
                "downPayment": 100000,
                "propertyValue": 500000,
                "propertyType": "single_family",
                "occupancy": "primary",
                "zipCode": "90210"
            }),
        )
        .preview_lines(10)
        .with_truncation_note(),
        TestCase::tool_call(
            "monthly payment calculator",
            "calculate-monthly-payment",
            json!({
                "loanAmount": 400000,
                "interestRate": 6.5,
                "loanTerm": 30,
                "propertyTax": 6000,
                "homeInsurance": 1200,
                "pmi": 200
            }),
        ),
        TestCase::tool_call(
            "loan comparison",
            "compare-loan-products",
            json!({
                "loanAmount": 400000,
                "creditScore": 790,
                "downPayment": 100000,
                "propertyValue": 500000,
                "zipCode": "90210",
                "propertyType": "single_family",
                "occupancy": "primary"
            }),
        )
        .preview_lines(20),
    ]
}

/// Load a suite from a YAML file
pub fn load_yaml(path: &Path) -> Result<Vec<TestCase>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read scenario file '{}': {}",
            path.display(),
            e
        ))
    })?;

    parse_yaml(&content)
}

/// Parse a suite from YAML text
pub fn parse_yaml(content: &str) -> Result<Vec<TestCase>> {
    let cases: Vec<TestCase> = serde_yaml::from_str(content)
        .map_err(|e| Error::Config(format!("Failed to parse scenario file: {}", e)))?;

    if cases.is_empty() {
        return Err(Error::Config("Scenario file defines no test cases".to_string()));
    }
    Ok(cases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{NoResponseReason, RpcError};

    #[test]
    fn test_builtin_order_and_payloads() {
        let cases = builtin();
        let names: Vec<_> = cases.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "server initialization",
                "tool listing",
                "mortgage rates",
                "monthly payment calculator",
                "loan comparison"
            ]
        );

        assert_eq!(cases[0].method, "initialize");
        assert_eq!(cases[0].params["protocolVersion"], "2024-11-05");
        assert_eq!(cases[0].params["clientInfo"]["name"], "test-client");

        assert_eq!(cases[2].method, "tools/call");
        assert_eq!(cases[2].params["name"], "get-mortgage-rates");
        assert_eq!(cases[2].params["arguments"]["zipCode"], "90210");
        assert_eq!(cases[2].preview_lines, Some(10));
        assert!(cases[2].truncation_note);

        assert_eq!(cases[3].params["arguments"]["interestRate"], 6.5);
        assert_eq!(cases[3].preview_lines, None);
        assert_eq!(cases[4].preview_lines, Some(20));
        assert!(!cases[4].truncation_note);
    }

    #[test]
    fn test_check_requires_success() {
        let case = TestCase::new("init", "initialize", json!({}));

        assert_eq!(
            case.check(&CallOutcome::Success(json!({})), false),
            Ok(Observation::Nothing)
        );

        let failures = [
            CallOutcome::ProtocolError(RpcError {
                code: Some(-32601),
                message: "Method not found".into(),
                data: None,
            }),
            CallOutcome::MalformedResponse {
                raw: "oops".into(),
                reason: "invalid JSON".into(),
            },
            CallOutcome::NoResponse(NoResponseReason::EndOfStream),
        ];
        for outcome in &failures {
            assert!(case.check(outcome, false).is_err(), "{:?}", outcome);
        }
    }

    #[test]
    fn test_check_tool_listing() {
        let case = TestCase::new("list", "tools/list", json!({})).expect(Expectation::ToolListing);

        let ok = case.check(
            &CallOutcome::Success(json!({"tools": [{"name": "a", "description": "A"}, {"name": "b"}]})),
            false,
        );
        match ok {
            Ok(Observation::Tools(tools)) => assert_eq!(tools.len(), 2),
            other => panic!("unexpected {:?}", other),
        }

        assert!(case.check(&CallOutcome::Success(json!({})), false).is_err());
        assert!(case
            .check(&CallOutcome::Success(json!({"tools": [{"name": "a"}, {"name": "a"}]})), false)
            .unwrap_err()
            .contains("duplicate"));
    }

    #[test]
    fn test_check_tool_content() {
        let case = TestCase::tool_call("rates", "get-mortgage-rates", json!({}));

        let ok = case
            .check(&CallOutcome::Success(json!({"content": [{"type": "text", "text": "6.5%"}]})), false)
            .unwrap();
        assert_eq!(
            ok,
            Observation::ToolOutput {
                text: Some("6.5%".into()),
                is_error: false
            }
        );

        let flagged = CallOutcome::Success(json!({
            "content": [{"type": "text", "text": "API request failed"}],
            "isError": true
        }));
        assert!(case.check(&flagged, false).is_ok());
        assert!(case.check(&flagged, true).unwrap_err().contains("API request failed"));

        assert!(case.check(&CallOutcome::Success(json!("text")), false).is_err());
    }

    #[test]
    fn test_parse_yaml() {
        let cases = parse_yaml(
            r#"
- name: handshake
  method: initialize
  params:
    protocolVersion: "2024-11-05"
    capabilities: {}
    clientInfo: { name: test-client, version: "1.0.0" }
- name: listing
  method: tools/list
  expect: tool_listing
- name: rates
  method: tools/call
  params: { name: get-mortgage-rates, arguments: { loanAmount: 400000 } }
  expect: tool_content
  preview_lines: 5
  truncation_note: true
"#,
        )
        .unwrap();

        assert_eq!(cases.len(), 3);
        assert_eq!(cases[0].expect, Expectation::Success);
        assert_eq!(cases[1].params, json!({}));
        assert_eq!(cases[1].expect, Expectation::ToolListing);
        assert_eq!(cases[2].params["arguments"]["loanAmount"], 400000);
        assert_eq!(cases[2].preview_lines, Some(5));
        assert!(cases[2].truncation_note);
        assert!(!cases[1].truncation_note);
    }

    #[test]
    fn test_parse_yaml_rejects_empty_and_invalid() {
        assert!(matches!(parse_yaml("[]"), Err(Error::Config(_))));
        assert!(matches!(parse_yaml("- name: x\n  expect: nope\n"), Err(Error::Config(_))));
    }
}

//! Mock tool server binary for integration testing
//!
//! Speaks line-delimited JSON-RPC on stdin/stdout like the RateSpot
//! mortgage server, without any network access. Behaviour is picked with
//! `MOCK_SERVER_MODE`:
//!
//! - `compliant` (default): answers every request correctly
//! - `exit`: exits before reading anything
//! - `malformed`: answers every request with a broken JSON line
//! - `tool-error`: like `compliant`, but `get-mortgage-rates` returns a JSON-RPC error
//! - `flagged`: tool results carry `isError: true`
//! - `hang`: reads requests and never answers
//! - `slow`: like `compliant`, but every reply is delayed by one second
//! - `require-key`: exits with status 1 unless `RATESPOT_API_KEY` is set, then acts compliant
//!
//! `MOCK_SERVER_TOOLS` may hold a JSON array that replaces the tool listing.
//! Any other command-line arguments (such as an artifact path) are ignored.

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::time::Duration;

/// Line sent in `malformed` mode
const MALFORMED_LINE: &str = r#"{"jsonrpc":"2.0","id":1,"result":{"tools":["#;

/// Reply delay in `slow` mode
const SLOW_REPLY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Compliant,
    Exit,
    Malformed,
    ToolError,
    Flagged,
    Hang,
    Slow,
    RequireKey,
}

impl Mode {
    fn from_env() -> Self {
        match std::env::var("MOCK_SERVER_MODE").as_deref() {
            Ok("exit") => Mode::Exit,
            Ok("malformed") => Mode::Malformed,
            Ok("tool-error") => Mode::ToolError,
            Ok("flagged") => Mode::Flagged,
            Ok("hang") => Mode::Hang,
            Ok("slow") => Mode::Slow,
            Ok("require-key") => Mode::RequireKey,
            _ => Mode::Compliant,
        }
    }
}

fn main() {
    // Lets the binary stand in for a runtime during preflight
    if std::env::args().any(|a| a == "--version") {
        println!("v20.11.0");
        return;
    }

    let mode = Mode::from_env();

    match mode {
        Mode::Exit => std::process::exit(0),
        Mode::RequireKey => {
            let key = std::env::var("RATESPOT_API_KEY").unwrap_or_default();
            if key.is_empty() {
                eprintln!("RATESPOT_API_KEY environment variable is required");
                std::process::exit(1);
            }
        }
        _ => {}
    }

    eprintln!("mock server running in {:?} mode", mode);

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut reader = BufReader::new(stdin.lock());
    let mut writer = stdout.lock();
    let tools = tool_listing();

    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap_or(0) == 0 {
            break; // EOF
        }
        if line.trim().is_empty() {
            continue;
        }

        match mode {
            Mode::Hang => continue,
            Mode::Malformed => {
                send_line(&mut writer, MALFORMED_LINE);
                continue;
            }
            _ => {}
        }

        let message: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                let reply = error_reply(Value::Null, -32700, &format!("Parse error: {}", e));
                send_line(&mut writer, &reply.to_string());
                continue;
            }
        };

        // Notifications get no reply
        let Some(id) = message.get("id").cloned() else {
            continue;
        };

        let reply = handle_request(mode, &tools, id, &message);
        if mode == Mode::Slow {
            std::thread::sleep(SLOW_REPLY_DELAY);
        }
        send_line(&mut writer, &reply.to_string());
    }
}

fn send_line<W: Write>(writer: &mut W, line: &str) {
    writer.write_all(line.as_bytes()).ok();
    writer.write_all(b"\n").ok();
    writer.flush().ok();
}

fn result_reply(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn error_reply(id: Value, code: i64, message: &str) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message } })
}

fn handle_request(mode: Mode, tools: &Value, id: Value, message: &Value) -> Value {
    let method = message.get("method").and_then(Value::as_str).unwrap_or("");
    let params = message.get("params").cloned().unwrap_or(json!({}));

    match method {
        "initialize" => {
            let version = params
                .get("protocolVersion")
                .and_then(Value::as_str)
                .unwrap_or("2024-11-05");
            result_reply(
                id,
                json!({
                    "protocolVersion": version,
                    "capabilities": { "tools": {} },
                    "serverInfo": { "name": "RateSpot Mortgage Server", "version": "1.0.0" }
                }),
            )
        }
        "tools/list" => result_reply(id, json!({ "tools": tools })),
        "tools/call" => {
            let name = params.get("name").and_then(Value::as_str).unwrap_or("");
            let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

            if mode == Mode::ToolError && name == "get-mortgage-rates" {
                return error_reply(id, -32603, "API request failed: 503 Service Unavailable");
            }

            match tool_text(name, &arguments) {
                Some(text) => {
                    let mut result = json!({ "content": [{ "type": "text", "text": text }] });
                    if mode == Mode::Flagged {
                        result["isError"] = json!(true);
                    }
                    result_reply(id, result)
                }
                None => error_reply(id, -32602, &format!("Unknown tool: {}", name)),
            }
        }
        other => error_reply(id, -32601, &format!("Method not found: {}", other)),
    }
}

fn tool_listing() -> Value {
    if let Ok(raw) = std::env::var("MOCK_SERVER_TOOLS") {
        if let Ok(tools) = serde_json::from_str::<Value>(&raw) {
            return tools;
        }
    }

    json!([
        { "name": "get-mortgage-rates", "description": "Get current mortgage rates" },
        { "name": "get-lender-info", "description": "Get information about a lender" },
        { "name": "compare-loan-products", "description": "Compare loan products side by side" },
        { "name": "calculate-monthly-payment", "description": "Calculate a monthly mortgage payment" },
        { "name": "get-market-trends", "description": "Get mortgage market trends" },
        { "name": "get-loan-requirements", "description": "Get loan program requirements" },
        { "name": "prequalify-borrower", "description": "Prequalify a borrower" },
        { "name": "get-rate-history" }
    ])
}

fn tool_text(name: &str, arguments: &Value) -> Option<String> {
    let amount = arguments.get("loanAmount").and_then(Value::as_f64).unwrap_or(0.0);

    let text = match name {
        "get-mortgage-rates" => {
            let rates = json!({
                "loan_amount": amount,
                "zip_code": arguments.get("zipCode").cloned().unwrap_or(Value::Null),
                "rates": [
                    { "product": "30yr_fixed", "rate": 6.625, "apr": 6.71 },
                    { "product": "15yr_fixed", "rate": 5.875, "apr": 6.02 },
                    { "product": "7_1_arm", "rate": 6.125, "apr": 6.88 }
                ]
            });
            serde_json::to_string_pretty(&rates).unwrap_or_default()
        }
        "calculate-monthly-payment" => {
            let annual = arguments.get("interestRate").and_then(Value::as_f64).unwrap_or(0.0);
            let years = arguments.get("loanTerm").and_then(Value::as_f64).unwrap_or(30.0);
            let r = annual / 100.0 / 12.0;
            let n = years * 12.0;
            let principal = if r > 0.0 {
                amount * r * (1.0 + r).powf(n) / ((1.0 + r).powf(n) - 1.0)
            } else {
                amount / n
            };
            format!("Monthly principal and interest: ${:.2}", principal)
        }
        "compare-loan-products" => {
            let mut lines = vec!["Loan comparison".to_string(), String::new()];
            for (product, rate) in [("30yr_fixed", 6.625), ("15yr_fixed", 5.875), ("FHA 30yr", 6.25)] {
                lines.push(format!("{}: {:.3}% on ${:.0}", product, rate, amount));
            }
            lines.join("\n")
        }
        "get-lender-info" | "get-market-trends" | "get-loan-requirements"
        | "prequalify-borrower" | "get-rate-history" => format!("{} ok", name),
        _ => return None,
    };

    Some(text)
}

//! Error types for the smoke-test harness
//!
//! Only failures that stop a whole run live here. Per-call failures
//! (no reply, undecodable reply, protocol error payload) are values of
//! [`crate::rpc::CallOutcome`] and never surface as `Error`.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // === Preflight Errors ===
    #[error("Server artifact not found: {0}. Run 'npm run build' first to compile the server")]
    ArtifactNotFound(String),

    #[error("Runtime '{0}' not found. Install it or set [server].runtime in the config")]
    RuntimeNotFound(String),

    #[error("Runtime probe '{runtime} --version' failed: {reason}")]
    RuntimeProbeFailed { runtime: String, reason: String },

    #[error("Runtime '{runtime}' is version {found}, but {required} is required")]
    RuntimeTooOld {
        runtime: String,
        found: String,
        required: String,
    },

    // === Launch Errors ===
    #[error("Failed to launch server: {0}")]
    LaunchFailed(String),

    // === Transport Errors ===
    #[error("Failed to write to server stdin: {0}")]
    TransportWrite(#[source] io::Error),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a runtime probe failure
    pub fn probe_failed(runtime: &str, reason: impl Into<String>) -> Self {
        Self::RuntimeProbeFailed {
            runtime: runtime.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error was raised before any process was spawned
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            Error::ArtifactNotFound(_)
                | Error::RuntimeNotFound(_)
                | Error::RuntimeProbeFailed { .. }
                | Error::RuntimeTooOld { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preflight_classification() {
        assert!(Error::ArtifactNotFound("server.js".into()).is_preflight());
        assert!(Error::RuntimeNotFound("node".into()).is_preflight());
        assert!(Error::probe_failed("node", "exit status 1").is_preflight());
        assert!(!Error::LaunchFailed("boom".into()).is_preflight());
        assert!(!Error::Config("x".into()).is_preflight());
    }

    #[test]
    fn test_messages_carry_hints() {
        let msg = Error::ArtifactNotFound("ratespot_mcp_server.js".into()).to_string();
        assert!(msg.contains("ratespot_mcp_server.js"));
        assert!(msg.contains("npm run build"));
    }
}

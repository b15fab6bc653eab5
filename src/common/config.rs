//! Configuration file handling

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::config_path;
use super::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Server under test
    #[serde(default)]
    pub server: ServerConfig,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Run settings
    #[serde(default)]
    pub run: RunConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How to launch the server under test
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Runtime used to execute the artifact (looked up in PATH)
    #[serde(default = "default_runtime")]
    pub runtime: String,

    /// Built server artifact handed to the runtime
    #[serde(default = "default_artifact")]
    pub artifact: PathBuf,

    /// Additional arguments appended after the artifact
    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment variables for the server process
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Semver requirement for the runtime version, e.g. ">=18"
    #[serde(default)]
    pub min_runtime_version: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            runtime: default_runtime(),
            artifact: default_artifact(),
            args: Vec::new(),
            env: HashMap::new(),
            min_runtime_version: None,
        }
    }
}

fn default_runtime() -> String {
    "node".to_string()
}

fn default_artifact() -> PathBuf {
    PathBuf::from("ratespot_mcp_server.js")
}

/// Timeout settings
#[derive(Debug, Deserialize, Clone)]
pub struct Timeouts {
    /// Grace delay after spawning before the first request
    #[serde(default = "default_startup_grace")]
    pub startup_grace_ms: u64,

    /// Deadline for a single reply line; 0 waits forever
    #[serde(default = "default_request")]
    pub request_secs: u64,

    /// How long `stop()` waits after SIGTERM before killing
    #[serde(default = "default_shutdown")]
    pub shutdown_secs: u64,

    /// Deadline for the runtime version probe
    #[serde(default = "default_runtime_probe")]
    pub runtime_probe_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            startup_grace_ms: default_startup_grace(),
            request_secs: default_request(),
            shutdown_secs: default_shutdown(),
            runtime_probe_secs: default_runtime_probe(),
        }
    }
}

impl Timeouts {
    pub fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_ms)
    }

    /// `None` means the read blocks until a line or end-of-file
    pub fn request(&self) -> Option<Duration> {
        (self.request_secs > 0).then(|| Duration::from_secs(self.request_secs))
    }

    pub fn shutdown(&self) -> Duration {
        Duration::from_secs(self.shutdown_secs)
    }

    pub fn runtime_probe(&self) -> Duration {
        Duration::from_secs(self.runtime_probe_secs)
    }
}

fn default_startup_grace() -> u64 {
    1000
}
fn default_request() -> u64 {
    30
}
fn default_shutdown() -> u64 {
    5
}
fn default_runtime_probe() -> u64 {
    10
}

/// Run settings
#[derive(Debug, Deserialize, Clone)]
pub struct RunConfig {
    /// Pause between test cases
    #[serde(default = "default_pacing")]
    pub pacing_ms: u64,

    /// YAML file replacing the built-in scenario table
    #[serde(default)]
    pub scenarios: Option<PathBuf>,

    /// Fail tool calls whose result carries `isError: true`
    #[serde(default)]
    pub strict_tool_errors: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            pacing_ms: default_pacing(),
            scenarios: None,
            strict_tool_errors: false,
        }
    }
}

impl RunConfig {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }
}

fn default_pacing() -> u64 {
    1000
}

/// Logging settings
#[derive(Debug, Deserialize, Default, Clone)]
pub struct LoggingConfig {
    /// Also write logs to this file
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit path, which must exist
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| super::Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_harness() {
        let config = Config::default();
        assert_eq!(config.server.runtime, "node");
        assert_eq!(config.server.artifact, PathBuf::from("ratespot_mcp_server.js"));
        assert_eq!(config.timeouts.startup_grace(), Duration::from_secs(1));
        assert_eq!(config.run.pacing(), Duration::from_secs(1));
        assert!(!config.run.strict_tool_errors);
    }

    #[test]
    fn test_parse_partial_file() {
        let config = Config::parse(
            r#"
[server]
artifact = "dist/server.js"
min_runtime_version = ">=18"

[server.env]
RATESPOT_API_KEY = "test-key"

[timeouts]
request_secs = 0
"#,
        )
        .unwrap();

        assert_eq!(config.server.runtime, "node");
        assert_eq!(config.server.artifact, PathBuf::from("dist/server.js"));
        assert_eq!(config.server.env.get("RATESPOT_API_KEY").unwrap(), "test-key");
        assert_eq!(config.server.min_runtime_version.as_deref(), Some(">=18"));
        assert_eq!(config.timeouts.request(), None);
        assert_eq!(config.timeouts.shutdown_secs, 5);
    }

    #[test]
    fn test_parse_invalid_file() {
        let err = Config::parse("[server\nruntime = 1").unwrap_err();
        assert!(matches!(err, crate::common::Error::ConfigParse(_)));
    }

    #[test]
    fn test_load_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load_from(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, crate::common::Error::FileRead { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[run]\npacing_ms = 0\nstrict_tool_errors = true\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.run.pacing(), Duration::ZERO);
        assert!(config.run.strict_tool_errors);
    }
}

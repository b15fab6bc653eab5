//! Preflight checks
//!
//! Verifies the server artifact exists and the runtime that executes it
//! is installed, before any process is spawned.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use semver::{Version, VersionReq};
use tokio::process::Command;

use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::rpc::LaunchSpec;

/// What preflight found
#[derive(Debug, Clone)]
pub struct Preflight {
    /// Resolved runtime executable
    pub runtime: PathBuf,
    /// Version string reported by the runtime
    pub runtime_version: String,
    /// Server artifact
    pub artifact: PathBuf,
}

impl Preflight {
    /// Build the launch command for the server: `<runtime> <artifact> <args...>`
    pub fn launch_spec(&self, config: &Config) -> LaunchSpec {
        let mut spec = LaunchSpec::new(&self.runtime)
            .arg(&self.artifact)
            .startup_grace(config.timeouts.startup_grace())
            .shutdown_timeout(config.timeouts.shutdown());

        for arg in &config.server.args {
            spec = spec.arg(arg);
        }
        for (key, value) in &config.server.env {
            spec = spec.env(key, value);
        }
        spec
    }
}

/// Run all preflight checks
pub async fn run(config: &Config) -> Result<Preflight> {
    let artifact = check_artifact(&config.server.artifact)?;
    tracing::debug!("Server artifact: {}", artifact.display());

    let runtime = resolve_runtime(&config.server.runtime)?;
    let runtime_version = probe_runtime(&runtime, config.timeouts.runtime_probe()).await?;
    tracing::info!("Using {} {}", runtime.display(), runtime_version);

    if let Some(required) = &config.server.min_runtime_version {
        check_version(&config.server.runtime, &runtime_version, required)?;
    }

    Ok(Preflight {
        runtime,
        runtime_version,
        artifact,
    })
}

/// The artifact must exist as a regular file
pub fn check_artifact(path: &Path) -> Result<PathBuf> {
    if path.is_file() {
        Ok(path.to_path_buf())
    } else {
        Err(Error::ArtifactNotFound(path.display().to_string()))
    }
}

/// Find the runtime in PATH (or accept an explicit path)
pub fn resolve_runtime(name: &str) -> Result<PathBuf> {
    which::which(name).map_err(|_| Error::RuntimeNotFound(name.to_string()))
}

/// Run `<runtime> --version` and return its trimmed output
pub async fn probe_runtime(runtime: &Path, limit: Duration) -> Result<String> {
    let name = runtime.display().to_string();

    let output = Command::new(runtime)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(limit, output).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return Err(Error::probe_failed(&name, e.to_string())),
        Err(_) => return Err(Error::probe_failed(&name, format!("timed out after {:?}", limit))),
    };

    if !output.status.success() {
        return Err(Error::probe_failed(&name, format!("exited with {}", output.status)));
    }

    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if version.is_empty() {
        return Err(Error::probe_failed(&name, "printed no version"));
    }
    Ok(version)
}

/// Parse a runtime's version banner, e.g. `v20.11.0` or `Python 3.12`
pub fn parse_version(banner: &str) -> Option<Version> {
    let token = banner
        .split_whitespace()
        .find(|t| t.trim_start_matches('v').starts_with(|c: char| c.is_ascii_digit()))?;
    let token = token.trim_start_matches('v');

    if let Ok(version) = Version::parse(token) {
        return Some(version);
    }

    // Pad "18" or "3.12" out to full semver
    let mut parts = token.split('.').map(|p| p.parse::<u64>());
    let major = parts.next()?.ok()?;
    let minor = parts.next().transpose().ok()?.unwrap_or(0);
    let patch = parts.next().transpose().ok()?.unwrap_or(0);
    Some(Version::new(major, minor, patch))
}

/// Check a version banner against a semver requirement
pub fn check_version(runtime: &str, banner: &str, required: &str) -> Result<()> {
    let req = VersionReq::parse(required).map_err(|e| {
        Error::Config(format!("Invalid min_runtime_version '{}': {}", required, e))
    })?;
    let found = parse_version(banner)
        .ok_or_else(|| Error::probe_failed(runtime, format!("unrecognized version '{}'", banner)))?;

    if req.matches(&found) {
        Ok(())
    } else {
        Err(Error::RuntimeTooOld {
            runtime: runtime.to_string(),
            found: found.to_string(),
            required: required.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("server.js");

        let err = check_artifact(&artifact).unwrap_err();
        assert!(err.is_preflight());

        std::fs::write(&artifact, "// built").unwrap();
        assert_eq!(check_artifact(&artifact).unwrap(), artifact);

        // A directory is not an artifact
        assert!(check_artifact(dir.path()).is_err());
    }

    #[test]
    fn test_resolve_missing_runtime() {
        let err = resolve_runtime("definitely-not-a-runtime-mcp-smoke").unwrap_err();
        assert!(matches!(err, Error::RuntimeNotFound(_)));
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("v20.11.0"), Some(Version::new(20, 11, 0)));
        assert_eq!(parse_version("Python 3.12"), Some(Version::new(3, 12, 0)));
        assert_eq!(parse_version("18"), Some(Version::new(18, 0, 0)));
        assert_eq!(parse_version("no digits here"), None);
    }

    #[test]
    fn test_check_version() {
        assert!(check_version("node", "v20.11.0", ">=18").is_ok());

        let err = check_version("node", "v16.20.2", ">=18").unwrap_err();
        assert!(matches!(err, Error::RuntimeTooOld { .. }));
        assert!(err.is_preflight());

        let err = check_version("node", "v20.0.0", "not a req").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_probe_runtime() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let runtime = dir.path().join("fake-node");
        std::fs::write(&runtime, "#!/bin/sh\necho v20.11.0\n").unwrap();
        std::fs::set_permissions(&runtime, std::fs::Permissions::from_mode(0o755)).unwrap();

        let version = probe_runtime(&runtime, Duration::from_secs(5)).await.unwrap();
        assert_eq!(version, "v20.11.0");

        let err = probe_runtime(&dir.path().join("missing"), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.is_preflight());
    }

    #[test]
    fn test_launch_spec_order() {
        let mut config = Config::default();
        config.server.args = vec!["--stdio".to_string()];
        config.server.env.insert("RATESPOT_API_KEY".into(), "k".into());

        let preflight = Preflight {
            runtime: PathBuf::from("/usr/bin/node"),
            runtime_version: "v20.11.0".into(),
            artifact: PathBuf::from("ratespot_mcp_server.js"),
        };
        let spec = preflight.launch_spec(&config);

        assert_eq!(spec.display(), "/usr/bin/node ratespot_mcp_server.js --stdio");
        assert_eq!(spec.env, vec![("RATESPOT_API_KEY".to_string(), "k".to_string())]);
        assert_eq!(spec.startup_grace, Duration::from_secs(1));
    }
}

//! CLI command handling
//!
//! Resolves configuration, runs preflight, and drives the suite or the
//! startup check. Each command returns the process exit code.

use std::time::Duration;

use colored::Colorize;

use crate::commands::{Commands, RunArgs, ServerArgs};
use crate::common::config::Config;
use crate::common::Result;
use crate::preflight;
use crate::testing::{self, report, RunOptions, RunResult, ScenarioRunner, StartupCheck, StartupVerdict};

/// Load configuration and apply command-line overrides
pub fn load_config(args: &ServerArgs) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if let Some(artifact) = &args.artifact {
        config.server.artifact = artifact.clone();
    }
    if let Some(runtime) = &args.runtime {
        config.server.runtime = runtime.clone();
    }

    Ok(config)
}

/// Dispatch a CLI command
pub async fn dispatch(config: Config, command: Commands) -> Result<i32> {
    match command {
        Commands::Run(args) => run(config, args).await,
        Commands::StartupCheck { timeout_secs } => startup_check(config, timeout_secs).await,
    }
}

fn apply_run_args(config: &mut Config, args: &RunArgs) {
    if let Some(path) = &args.scenarios {
        config.run.scenarios = Some(path.clone());
    }
    if let Some(pacing) = args.pacing_ms {
        config.run.pacing_ms = pacing;
    }
    if let Some(timeout) = args.timeout_secs {
        config.timeouts.request_secs = timeout;
    }
    if args.strict_tool_errors {
        config.run.strict_tool_errors = true;
    }
}

async fn run(mut config: Config, args: RunArgs) -> Result<i32> {
    apply_run_args(&mut config, &args);

    let cases = match &config.run.scenarios {
        Some(path) => testing::load_yaml(path)?,
        None => testing::builtin(),
    };

    let preflight = preflight::run(&config).await?;
    let spec = preflight.launch_spec(&config);

    report::banner(&preflight.artifact.display().to_string());

    let runner = ScenarioRunner::new(
        cases,
        RunOptions {
            pacing: config.run.pacing(),
            read_timeout: config.timeouts.request(),
            strict_tool_errors: config.run.strict_tool_errors,
            verbose: args.verbose,
        },
    );

    let result = match testing::run_suite(&spec, &runner).await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!("{}", e);
            report::launch_failed(&e.to_string());
            RunResult::aborted(runner.cases().len(), e.to_string())
        }
    };

    report::summary(&result);
    Ok(result.exit_code())
}

async fn startup_check(config: Config, timeout_secs: u64) -> Result<i32> {
    let preflight = preflight::run(&config).await?;
    let spec = preflight.launch_spec(&config);

    let check = StartupCheck {
        deadline: Duration::from_secs(timeout_secs),
        ..Default::default()
    };

    println!("{} {}", "Checking startup of".blue().bold(), spec.display().white().bold());

    let verdict = check.run(&spec).await?;
    match &verdict {
        StartupVerdict::Passed => {
            println!("  {} Server rejects a missing {}", "✓".green(), check.key_var);
        }
        StartupVerdict::UnexpectedExit { status, stderr } => {
            println!("  {} Unexpected server behaviour (exit: {})", "✗".red(), status);
            for line in stderr {
                println!("    {}", line.dimmed());
            }
        }
        StartupVerdict::TimedOut { stderr } => {
            println!(
                "  {} Server still running after {}s",
                "✗".red(),
                timeout_secs
            );
            for line in stderr {
                println!("    {}", line.dimmed());
            }
        }
    }

    Ok(if verdict.passed() { 0 } else { 1 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_load_config_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nruntime = \"bun\"\nartifact = \"a.js\"\n").unwrap();

        let config = load_config(&ServerArgs {
            config: Some(path),
            artifact: Some(PathBuf::from("dist/server.js")),
            runtime: None,
        })
        .unwrap();

        assert_eq!(config.server.runtime, "bun");
        assert_eq!(config.server.artifact, PathBuf::from("dist/server.js"));
    }

    #[test]
    fn test_apply_run_args() {
        let mut config = Config::default();
        apply_run_args(
            &mut config,
            &RunArgs {
                pacing_ms: Some(0),
                timeout_secs: Some(0),
                strict_tool_errors: true,
                ..Default::default()
            },
        );

        assert_eq!(config.run.pacing(), Duration::ZERO);
        assert_eq!(config.timeouts.request(), None);
        assert!(config.run.strict_tool_errors);
    }

    #[tokio::test]
    async fn test_missing_artifact_aborts_before_launch() {
        let mut config = Config::default();
        config.server.artifact = PathBuf::from("/nonexistent/ratespot_mcp_server.js");

        let err = dispatch(config, Commands::default()).await.unwrap_err();
        assert!(err.is_preflight());
    }
}

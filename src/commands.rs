//! CLI command definitions
//!
//! Defines the clap commands for the smoke-test harness. Running with no
//! subcommand is the same as `run` with every option at its default.

use clap::{Args, Subcommand};
use std::path::PathBuf;

/// Options that pick and launch the server, shared by all commands
#[derive(Args, Debug, Default, Clone)]
pub struct ServerArgs {
    /// Configuration file (default: platform config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Built server artifact to launch
    #[arg(long, global = true)]
    pub artifact: Option<PathBuf>,

    /// Runtime used to execute the artifact
    #[arg(long, global = true)]
    pub runtime: Option<String>,
}

/// Options for a suite run
#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// YAML file replacing the built-in test cases
    #[arg(long)]
    pub scenarios: Option<PathBuf>,

    /// Pause between test cases, in milliseconds
    #[arg(long)]
    pub pacing_ms: Option<u64>,

    /// Seconds to wait for each reply (0 waits forever)
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Fail tool calls whose result is flagged isError
    #[arg(long)]
    pub strict_tool_errors: bool,

    /// Print complete tool output instead of a preview
    #[arg(long, short)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the test suite against the server (default)
    Run(RunArgs),

    /// Check that the server refuses to start without its API key
    StartupCheck {
        /// Seconds to wait for the server to exit
        #[arg(long, default_value = "5")]
        timeout_secs: u64,
    },
}

impl Default for Commands {
    fn default() -> Self {
        Commands::Run(RunArgs::default())
    }
}

//! mcp-smoke - smoke tests for stdio JSON-RPC tool servers
//!
//! Launches the server under test, runs the test suite over its stdio,
//! and exits 0 only if every case passed.

use clap::Parser;
use mcp_smoke::commands::{Commands, ServerArgs};
use mcp_smoke::{cli, common::logging};

#[derive(Parser)]
#[command(name = "mcp-smoke", about = "Smoke-test harness for stdio tool servers")]
#[command(version, long_about = None)]
struct Cli {
    #[command(flatten)]
    server: ServerArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match cli::load_config(&cli.server) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let guard = logging::init_cli(config.logging.file.as_deref());

    let code = match cli::dispatch(config, cli.command.unwrap_or_default()).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            1
        }
    };

    // Flush the file log before exiting
    drop(guard);
    std::process::exit(code);
}

//! Logging and tracing configuration
//!
//! Logs go to stderr so stdout carries only the console report.
//! An optional file layer mirrors everything with full detail.

use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is unset
const DEFAULT_FILTER: &str = "mcp_smoke=info,warn";

/// Initialize tracing for the CLI
///
/// Log level is controlled by `RUST_LOG`. When `log_file` is given, a
/// non-blocking file layer is added; keep the returned guard alive until
/// exit so buffered lines are flushed.
pub fn init_cli(log_file: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let (writer, guard) = match log_file.and_then(open_log_file) {
        Some((writer, guard)) => (Some(writer), Some(guard)),
        None => (None, None),
    };

    let file_layer = writer.map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();

    guard
}

/// Open a non-blocking writer for `path`, creating its directory
fn open_log_file(path: &Path) -> Option<(NonBlocking, WorkerGuard)> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let file_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "mcp-smoke.log".into());

    if let Err(e) = std::fs::create_dir_all(dir) {
        eprintln!("Warning: Could not create log directory {}: {}", dir.display(), e);
        return None;
    }

    let appender = tracing_appender::rolling::never(dir, file_name);
    Some(tracing_appender::non_blocking(appender))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_log_file_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("run.log");

        let opened = open_log_file(&path);
        assert!(opened.is_some());
        assert!(dir.path().join("logs").is_dir());
    }
}

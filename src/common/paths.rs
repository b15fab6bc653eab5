//! Configuration file location

use std::path::PathBuf;

/// Application name used for platform directories
const APP_NAME: &str = "mcp-smoke";

/// Get the default configuration file path
///
/// - Linux: `~/.config/mcp-smoke/config.toml`
/// - macOS: `~/Library/Application Support/mcp-smoke/config.toml`
/// - Windows: `%APPDATA%\mcp-smoke\config\config.toml`
pub fn config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME)
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_file_name() {
        if let Some(path) = config_path() {
            assert_eq!(path.file_name().unwrap(), "config.toml");
            assert!(path.to_string_lossy().contains(APP_NAME));
        }
    }
}

//! Path helpers shared by the run configuration and the CLI.

use std::path::PathBuf;

use directories::{BaseDirs, ProjectDirs};

const QUALIFIER: &str = "cloud";
const ORGANIZATION: &str = "oneoh";
const APPLICATION: &str = "singbox-synth";

// ============================================================================
// Path Utilities
// ============================================================================

/// Expand ~ to home directory in path
pub fn expand_tilde(path: &str) -> String {
    if (path.starts_with("~/") || path == "~")
        && let Some(home) = home_dir()
    {
        return path.replacen('~', &home, 1);
    }
    path.to_string()
}

pub fn home_dir() -> Option<String> {
    BaseDirs::new().map(|dirs| dirs.home_dir().to_string_lossy().into_owned())
}

/// Per-user configuration directory, e.g. `~/.config/singbox-synth` on
/// Linux. Falls back to the working directory when no home is known.
pub fn default_config_dir() -> PathBuf {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
        .map(|dirs| dirs.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

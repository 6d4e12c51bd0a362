use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::version::CoreFamily;

use super::helpers::{default_config_dir, expand_tilde};

// ============================================================================
// Run Config Types
// ============================================================================

/// CLI run configuration parsed from a TOML file.
///
/// Every path may start with `~`. Relative defaults are resolved against
/// `config_dir`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct RunConfig {
    /// Proxy-core version the document targets, e.g. "1.12.0"
    #[serde(default)]
    pub core_version: Option<String>,

    /// Per-user configuration directory; holds cache databases by default
    #[serde(default)]
    pub config_dir: Option<String>,

    /// Settings store file, default "<config_dir>/settings.json"
    #[serde(default)]
    pub settings: Option<String>,

    /// Subscription cache directory, default "<config_dir>/subscriptions"
    #[serde(default)]
    pub subscriptions_dir: Option<String>,

    /// Output file, default "<config_dir>/config.json"
    #[serde(default)]
    pub output: Option<String>,
}

impl RunConfig {
    /// Parse run config from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: RunConfig =
            toml::from_str(content).context("Failed to parse run config TOML")?;

        if let Some(version) = &config.core_version {
            CoreFamily::resolve(version)
                .with_context(|| format!("Invalid core_version: {}", version))?;
        }

        Ok(config)
    }

    /// Load run config from file path
    pub async fn load(path: &str) -> Result<Self> {
        let expanded = expand_tilde(path);
        let content = tokio::fs::read_to_string(Path::new(&expanded))
            .await
            .with_context(|| format!("Failed to read run config from {}", expanded))?;
        Self::from_toml(&content)
    }

    pub fn config_dir(&self) -> PathBuf {
        self.config_dir
            .as_deref()
            .map(|dir| PathBuf::from(expand_tilde(dir)))
            .unwrap_or_else(default_config_dir)
    }

    pub fn settings_path(&self) -> PathBuf {
        self.resolve(self.settings.as_deref(), "settings.json")
    }

    pub fn subscriptions_dir(&self) -> PathBuf {
        self.resolve(self.subscriptions_dir.as_deref(), "subscriptions")
    }

    pub fn output_path(&self) -> PathBuf {
        self.resolve(self.output.as_deref(), "config.json")
    }

    fn resolve(&self, value: Option<&str>, default_name: &str) -> PathBuf {
        match value {
            Some(path) => PathBuf::from(expand_tilde(path)),
            None => self.config_dir().join(default_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_RUN_TOML: &str = r#"
core_version = "1.12.0"
config_dir = "/var/lib/synth"
settings = "/etc/synth/settings.json"
subscriptions_dir = "/var/cache/synth"
output = "/run/synth/config.json"
"#;

    #[test]
    fn test_parse_full_run_config() {
        let config = RunConfig::from_toml(FULL_RUN_TOML).unwrap();
        assert_eq!(config.core_version.as_deref(), Some("1.12.0"));
        assert_eq!(config.config_dir(), PathBuf::from("/var/lib/synth"));
        assert_eq!(
            config.settings_path(),
            PathBuf::from("/etc/synth/settings.json")
        );
        assert_eq!(config.subscriptions_dir(), PathBuf::from("/var/cache/synth"));
        assert_eq!(config.output_path(), PathBuf::from("/run/synth/config.json"));
    }

    #[test]
    fn test_defaults_live_under_config_dir() {
        let config = RunConfig::from_toml("config_dir = \"/srv/app\"").unwrap();
        assert_eq!(config.core_version, None);
        assert_eq!(config.settings_path(), PathBuf::from("/srv/app/settings.json"));
        assert_eq!(config.subscriptions_dir(), PathBuf::from("/srv/app/subscriptions"));
        assert_eq!(config.output_path(), PathBuf::from("/srv/app/config.json"));
    }

    #[test]
    fn test_empty_run_config() {
        let config = RunConfig::from_toml("").unwrap();
        assert_eq!(config, RunConfig::default());
        assert_eq!(config.output_path(), default_config_dir().join("config.json"));
    }

    #[test]
    fn test_unsupported_core_version_fails() {
        let err = RunConfig::from_toml("core_version = \"2.0.0\"").unwrap_err();
        assert!(format!("{:#}", err).contains("2.0.0"));
    }

    #[test]
    fn test_malformed_toml_fails() {
        assert!(RunConfig::from_toml("core_version = ").is_err());
    }
}

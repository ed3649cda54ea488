//! tierctl configuration file
//!
//! Connection and retry settings live in `~/.config/tierctl/config.toml`;
//! the policy itself lives in a separate file so it can be versioned next
//! to the databases it describes.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use resmgr::RetryConfig;
use resmgr::backend::sqlplus::SqlplusConfig;

/// Get the config directory path
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("tierctl"))
}

/// The tierctl configuration structure
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct TierctlConfig {
    /// Default policy file path (tilde-expanded)
    #[serde(default)]
    pub policy_file: Option<String>,

    /// Database connection settings
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Retry settings for transient failures
    #[serde(default)]
    pub retry: RetrySettings,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ConnectionConfig {
    /// Path to the sqlplus binary
    #[serde(default = "default_sqlplus_binary")]
    pub sqlplus_binary: String,

    /// Connect string passed to sqlplus
    #[serde(default = "default_connect")]
    pub connect: String,

    /// Timeout applied to every external call, in seconds
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            sqlplus_binary: default_sqlplus_binary(),
            connect: default_connect(),
            call_timeout_secs: default_call_timeout(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay")]
    pub base_delay_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_secs: default_base_delay(),
        }
    }
}

fn default_sqlplus_binary() -> String {
    "sqlplus".to_string()
}

fn default_connect() -> String {
    "/ as sysdba".to_string()
}

fn default_call_timeout() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    2
}

impl TierctlConfig {
    /// Load the config from ~/.config/tierctl/config.toml
    pub fn load() -> Result<Self> {
        let config_path = config_dir()?.join("config.toml");

        if !config_path.exists() {
            // Return default config if file doesn't exist
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Could not read config file: {}", config_path.display()))?;

        toml::from_str(&content).context("Invalid TOML format in tierctl config")
    }

    /// Resolve the policy file path: CLI flag, then config, then default.
    pub fn policy_path(&self, cli_override: Option<&std::path::Path>) -> Result<PathBuf> {
        if let Some(path) = cli_override {
            return Ok(path.to_path_buf());
        }
        if let Some(configured) = &self.policy_file {
            let expanded = shellexpand::tilde(configured);
            return Ok(PathBuf::from(expanded.as_ref()));
        }
        Ok(config_dir()?.join("tiers.toml"))
    }

    /// sqlplus settings for the backend.
    pub fn sqlplus(&self) -> SqlplusConfig {
        SqlplusConfig {
            binary: PathBuf::from(&self.connection.sqlplus_binary),
            connect: self.connection.connect.clone(),
            call_timeout: Duration::from_secs(self.connection.call_timeout_secs),
        }
    }

    /// Retry settings for transient failures.
    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_secs(self.retry.base_delay_secs),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_example_config() {
        let toml = r#"
policy_file = "~/db/tiers.toml"

[connection]
connect = "admin@cdb1"
call_timeout_secs = 30

[retry]
max_attempts = 5
"#;
        let config: TierctlConfig = toml::from_str(toml).expect("Failed to parse config");

        assert_eq!(config.policy_file.as_deref(), Some("~/db/tiers.toml"));
        assert_eq!(config.connection.connect, "admin@cdb1");
        assert_eq!(config.connection.sqlplus_binary, "sqlplus");
        assert_eq!(config.sqlplus().call_timeout, Duration::from_secs(30));
        assert_eq!(config.retry().max_attempts, 5);
        assert_eq!(config.retry().base_delay, Duration::from_secs(2));
    }

    #[test]
    fn test_defaults() {
        let config = TierctlConfig::default();
        assert_eq!(config.connection.connect, "/ as sysdba");
        assert_eq!(config.connection.call_timeout_secs, 60);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_policy_path_cli_override_wins() {
        let config = TierctlConfig {
            policy_file: Some("~/db/tiers.toml".to_string()),
            ..Default::default()
        };
        let path = config
            .policy_path(Some(std::path::Path::new("/tmp/other.toml")))
            .unwrap();
        assert_eq!(path, PathBuf::from("/tmp/other.toml"));
    }
}

//! Configuration settings and validation.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// What to do with an "ask" tier file when nobody is there to answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnattendedPolicy {
    /// Leave the file out of the inventory (journaled as unclassified).
    #[default]
    Ignore,
    /// Record the file as if the operator had chosen "process once".
    Process,
}

impl fmt::Display for UnattendedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ignore => f.write_str("ignore"),
            Self::Process => f.write_str("process"),
        }
    }
}

impl std::str::FromStr for UnattendedPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ignore" => Ok(Self::Ignore),
            "process" => Ok(Self::Process),
            other => Err(Error::config(format!(
                "invalid unattended policy '{other}', must be one of: ignore, process"
            ))),
        }
    }
}

/// Main configuration for a ledger run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory for the `SQLite` database.
    pub data_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Root directories to scan and watch.
    pub roots: Vec<PathBuf>,

    /// Optional TOML file overriding the classification rules.
    pub rules_file: Option<PathBuf>,

    /// Prompt the operator for unknown extensions during the bulk scan.
    pub interactive: bool,

    /// Fallback for unknown extensions when no prompt is possible.
    pub unattended: UnattendedPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            log_level: "info".to_string(),
            roots: Vec::new(),
            rules_file: None,
            interactive: true,
            unattended: UnattendedPolicy::default(),
        }
    }
}

impl Config {
    /// Create a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate configuration values.
    ///
    /// Roots that do not exist are not an error here; the scanner and the
    /// watcher skip them with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(Error::config(format!(
                "invalid log level '{}', must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.roots.is_empty() {
            return Err(Error::config("at least one root directory is required"));
        }

        if let Some(root) = self.roots.iter().find(|r| !r.is_absolute()) {
            return Err(Error::config(format!(
                "root '{}' must be an absolute path",
                root.display()
            )));
        }

        Ok(())
    }

    /// Get the path to the `SQLite` database file.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("ledger.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            roots: vec![PathBuf::from("/home/user/Documents")],
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, "info");
        assert!(config.interactive);
        assert_eq!(config.unattended, UnattendedPolicy::Ignore);
    }

    #[test]
    fn test_valid_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_requires_roots() {
        let err = Config::new().validate().unwrap_err();
        assert!(err.to_string().contains("root"));
    }

    #[test]
    fn test_validate_relative_root() {
        let config = Config {
            roots: vec![PathBuf::from("Documents")],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("absolute"));
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let config = Config {
            log_level: "loud".to_string(),
            ..valid_config()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log level"));
    }

    #[test]
    fn test_log_level_case_insensitive() {
        for level in ["TRACE", "Debug", "INFO", "Warn", "ERROR"] {
            let config = Config {
                log_level: level.to_string(),
                ..valid_config()
            };
            assert!(
                config.validate().is_ok(),
                "Level '{level}' should be valid (case insensitive)"
            );
        }
    }

    #[test]
    fn test_database_path() {
        let config = Config {
            data_dir: PathBuf::from("/var/lib/ledger"),
            ..Default::default()
        };
        assert_eq!(
            config.database_path(),
            PathBuf::from("/var/lib/ledger/ledger.db")
        );
    }

    #[test]
    fn test_unattended_policy_parse() {
        assert_eq!(
            "Ignore".parse::<UnattendedPolicy>().unwrap(),
            UnattendedPolicy::Ignore
        );
        assert_eq!(
            "process".parse::<UnattendedPolicy>().unwrap(),
            UnattendedPolicy::Process
        );
        assert!("maybe".parse::<UnattendedPolicy>().is_err());
        assert_eq!(UnattendedPolicy::Process.to_string(), "process");
    }
}

//! Manager configuration.
//!
//! ```rust,no_run
//! use lazyplug::config::{EnvOverrides, SettingsLoader};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut settings = SettingsLoader::new()
//!     .file("lazyplug.json")
//!     .load()
//!     .await?;
//! EnvOverrides::from_env()?.apply(&mut settings.config)?;
//! # Ok(())
//! # }
//! ```

pub mod env;
pub mod settings;

pub use env::EnvOverrides;
pub use settings::{Settings, SettingsLoader};

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default number of plugin operations allowed in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Host assumed for `owner/repo` shorthand URLs.
pub const DEFAULT_GIT_HOST: &str = "github.com";

/// Errors that can occur in configuration operations
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid configuration value
    #[error("Invalid value for {key}: {message}")]
    InvalidValue {
        /// The key with invalid value
        key: String,
        /// Error message
        message: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Options shared by every plugin a [`Manager`](crate::Manager) handles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ManagerConfig {
    /// Root of the `<host>/<owner>/<repo>` layout.
    pub base: PathBuf,

    /// Maximum number of install/update/source operations in flight.
    pub concurrency: usize,

    /// Active profiles. Specs that list profiles load only if one is active.
    pub profiles: Vec<String>,

    /// Forward failures and update summaries to the host's message area.
    pub notify: bool,

    /// Collect new commit subjects after an update.
    pub log_updates: bool,

    /// Shallow clone depth applied when a spec does not set its own.
    pub clone_depth: Option<u32>,

    /// Host for `owner/repo` shorthand.
    pub default_host: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            base: default_base_dir(),
            concurrency: DEFAULT_CONCURRENCY,
            profiles: Vec::new(),
            notify: false,
            log_updates: true,
            clone_depth: None,
            default_host: DEFAULT_GIT_HOST.to_string(),
        }
    }
}

impl ManagerConfig {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            ..Default::default()
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_profiles<I, S>(mut self, profiles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.profiles = profiles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_notify(mut self, notify: bool) -> Self {
        self.notify = notify;
        self
    }

    pub fn with_log_updates(mut self, log_updates: bool) -> Self {
        self.log_updates = log_updates;
        self
    }

    pub fn with_clone_depth(mut self, depth: u32) -> Self {
        self.clone_depth = Some(depth);
        self
    }

    pub fn with_default_host(mut self, host: impl Into<String>) -> Self {
        self.default_host = host.into();
        self
    }

    pub fn is_profile_active(&self, profile: &str) -> bool {
        self.profiles.iter().any(|p| p == profile)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "concurrency".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.base.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "base".into(),
                message: "must not be empty".into(),
            });
        }
        if self.default_host.is_empty() || self.default_host.contains('/') {
            return Err(ConfigError::InvalidValue {
                key: "defaultHost".into(),
                message: format!("'{}' is not a host name", self.default_host),
            });
        }
        Ok(())
    }
}

/// Returns the default plugin root: the platform data dir plus `plugins`.
pub fn default_base_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "lazyplug")
        .map(|dirs| dirs.data_dir().join("plugins"))
        .unwrap_or_else(|| PathBuf::from(".lazyplug").join("plugins"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ManagerConfig::default();
        assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(config.default_host, "github.com");
        assert!(config.log_updates);
        assert!(config.base.ends_with("plugins"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let config = ManagerConfig::new("/tmp/p").with_concurrency(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "concurrency"
        ));
    }

    #[test]
    fn test_validate_rejects_bad_host() {
        let config = ManagerConfig::new("/tmp/p").with_default_host("github.com/x");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_camel_case_deserialize() {
        let config: ManagerConfig = serde_json::from_str(
            r#"{"base":"/srv/plugins","cloneDepth":1,"logUpdates":false,"profiles":["work"]}"#,
        )
        .unwrap();
        assert_eq!(config.base, PathBuf::from("/srv/plugins"));
        assert_eq!(config.clone_depth, Some(1));
        assert!(!config.log_updates);
        assert!(config.is_profile_active("work"));
        assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
    }
}

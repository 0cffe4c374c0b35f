//! Environment variable overrides for [`ManagerConfig`].
//!
//! Environment variables are read once into an immutable snapshot; nothing
//! here mutates the process environment.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::PathBuf;

use super::{ConfigError, ConfigResult, ManagerConfig};

/// Default prefix for override variables.
pub const ENV_PREFIX: &str = "LAZYPLUG_";

/// Snapshot of `LAZYPLUG_*` variables.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    vars: HashMap<String, String>,
}

impl EnvOverrides {
    /// Reads the process environment. Unrelated variables that are not valid
    /// UTF-8 are skipped; a `LAZYPLUG_*` value that is not fails.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_os_vars(std::env::vars_os())
    }

    pub fn from_os_vars<I>(vars: I) -> ConfigResult<Self>
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        let mut pairs = Vec::new();
        for (key, value) in vars {
            let Some(key) = key.to_str().filter(|k| k.starts_with(ENV_PREFIX)) else {
                continue;
            };
            let value = value.into_string().map_err(|raw| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{}' is not valid UTF-8", raw.to_string_lossy()),
            })?;
            pairs.push((key.to_string(), value));
        }
        Ok(Self::from_vars(pairs))
    }

    /// Builds overrides from explicit `(name, value)` pairs; names without the
    /// prefix are ignored.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = vars
            .into_iter()
            .filter_map(|(k, v)| {
                let k = k.into();
                k.strip_prefix(ENV_PREFIX)
                    .map(|key| (key.to_ascii_uppercase(), v.into()))
            })
            .collect();
        Self { vars }
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn apply(&self, config: &mut ManagerConfig) -> ConfigResult<()> {
        if let Some(base) = self.get("BASE") {
            config.base = PathBuf::from(base);
        }
        if let Some(raw) = self.get("CONCURRENCY") {
            config.concurrency = raw.parse().map_err(|e| ConfigError::InvalidValue {
                key: format!("{ENV_PREFIX}CONCURRENCY"),
                message: format!("'{}': {}", raw, e),
            })?;
        }
        if let Some(raw) = self.get("PROFILES") {
            config.profiles = raw
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(raw) = self.get("NOTIFY") {
            config.notify = parse_flag("NOTIFY", raw)?;
        }
        if let Some(raw) = self.get("CLONE_DEPTH") {
            config.clone_depth = Some(raw.parse().map_err(|e| ConfigError::InvalidValue {
                key: format!("{ENV_PREFIX}CLONE_DEPTH"),
                message: format!("'{}': {}", raw, e),
            })?);
        }
        config.validate()
    }
}

fn parse_flag(key: &str, raw: &str) -> ConfigResult<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: format!("{ENV_PREFIX}{key}"),
            message: format!("'{}' is not a boolean", raw),
        }),
    }
}

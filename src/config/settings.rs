//! JSON settings files with layered loading.
//!
//! Files are merged in the order they were added (later files win). Top-level
//! keys replace earlier values, except `plugins`, which accumulates so a local
//! file can append plugins to a shared list.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};

use super::{ConfigResult, ManagerConfig};
use crate::plugin::PluginSpec;

const PLUGINS_KEY: &str = "plugins";

/// Parsed settings: manager options plus the declared plugin list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(flatten)]
    pub config: ManagerConfig,

    #[serde(default)]
    pub plugins: Vec<PluginSpec>,
}

impl Settings {
    pub fn from_json(content: &str) -> ConfigResult<Self> {
        Ok(serde_json::from_str(content)?)
    }
}

/// Settings loader that merges from multiple files.
#[derive(Debug, Default)]
pub struct SettingsLoader {
    files: Vec<PathBuf>,
}

impl SettingsLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `<config dir>/settings.json` for the current user.
    pub fn user(mut self) -> Self {
        if let Some(path) = Self::user_settings_path() {
            self.files.push(path);
        }
        self
    }

    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.push(path.into());
        self
    }

    pub fn user_settings_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "lazyplug")
            .map(|dirs| dirs.config_dir().join("settings.json"))
    }

    /// Reads every existing file and merges them. Missing files are skipped.
    pub async fn load(&self) -> ConfigResult<Settings> {
        let mut merged = Map::new();
        for path in &self.files {
            if let Some(object) = Self::read_object(path).await? {
                Self::merge(&mut merged, object);
            } else {
                tracing::debug!(path = %path.display(), "Settings file not present");
            }
        }
        Ok(serde_json::from_value(Value::Object(merged))?)
    }

    async fn read_object(path: &Path) -> ConfigResult<Option<Map<String, Value>>> {
        if !tokio::fs::try_exists(path).await? {
            return Ok(None);
        }
        let content = tokio::fs::read_to_string(path).await?;
        match serde_json::from_str(&content)? {
            Value::Object(map) => Ok(Some(map)),
            other => Err(super::ConfigError::InvalidValue {
                key: path.display().to_string(),
                message: format!("expected a JSON object, found {}", json_kind(&other)),
            }),
        }
    }

    fn merge(target: &mut Map<String, Value>, source: Map<String, Value>) {
        for (key, value) in source {
            match (key.as_str(), target.get_mut(&key), value) {
                (PLUGINS_KEY, Some(Value::Array(existing)), Value::Array(more)) => {
                    existing.extend(more);
                }
                (_, _, value) => {
                    target.insert(key, value);
                }
            }
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

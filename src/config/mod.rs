//! Engine configuration
//!
//! A flat string-to-string map with typed accessors. Values are layered:
//! explicit entries, then an optional configuration file, then
//! environment overrides.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::error::EngineError;

/// Well-known configuration keys.
pub mod keys {
    /// Process-wide cap on concurrently executing class subtrees.
    pub const CLASS_PARALLELISM: &str = "engine.class.parallelism";

    /// Engine-wide ceiling on per-class argument parallelism.
    pub const ARGUMENT_PARALLELISM: &str = "engine.argument.parallelism";

    /// Randomize class submission order.
    pub const TEST_CLASS_SHUFFLE: &str = "engine.test.class.shuffle";

    /// Path to a class-name filter file.
    pub const FILTERS_FILENAME: &str = "engine.filters.filename";
}

/// Environment variable prefix for overrides
/// (`VERIFYICA_ENGINE_CLASS_PARALLELISM` maps to `engine.class.parallelism`).
const ENV_PREFIX: &str = "VERIFYICA_";

/// Environment variable naming the configuration file.
const ENV_CONFIG_FILE: &str = "VERIFYICA_CONFIG";

/// Default configuration file names probed in the working directory.
const DEFAULT_CONFIG_FILES: [&str; 2] = ["verifyica.yaml", "verifyica.json"];

/// Engine configuration map.
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    values: BTreeMap<String, String>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load layered configuration: optional file, then environment
    /// overrides.
    pub fn load() -> Result<Self> {
        let mut configuration = Self::new();

        if let Some(path) = Self::config_file_path() {
            configuration = Self::from_file(&path)?;
        }

        configuration.apply_env_overrides();
        Ok(configuration)
    }

    fn config_file_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(ENV_CONFIG_FILE) {
            return Some(PathBuf::from(path));
        }

        DEFAULT_CONFIG_FILES
            .iter()
            .map(|name| PathBuf::from(*name))
            .find(|path| path.exists())
    }

    /// Load configuration from a YAML or JSON file. Nested maps are
    /// flattened with `.` separators.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        let is_yaml = path
            .extension()
            .map(|e| e == "yaml" || e == "yml")
            .unwrap_or(true);

        let mut values = BTreeMap::new();
        if is_yaml {
            let root: serde_yaml::Value =
                serde_yaml::from_str(&content).context("failed to parse YAML config")?;
            flatten_yaml(None, &root, &mut values);
        } else {
            let root: serde_json::Value =
                serde_json::from_str(&content).context("failed to parse JSON config")?;
            flatten_json(None, &root, &mut values);
        }

        Ok(Self { values })
    }

    fn apply_env_overrides(&mut self) {
        for (name, value) in std::env::vars() {
            if name == ENV_CONFIG_FILE {
                continue;
            }
            if let Some(suffix) = name.strip_prefix(ENV_PREFIX) {
                let key = suffix.to_lowercase().replace('_', ".");
                self.values.insert(key, value);
            }
        }
    }

    /// Set a value, chainable.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// `engine.class.parallelism` (int >= 1, default 1).
    pub fn class_parallelism(&self) -> Result<usize, EngineError> {
        self.parallelism(keys::CLASS_PARALLELISM)
    }

    /// `engine.argument.parallelism` (int >= 1, default 1).
    pub fn argument_parallelism(&self) -> Result<usize, EngineError> {
        self.parallelism(keys::ARGUMENT_PARALLELISM)
    }

    fn parallelism(&self, key: &str) -> Result<usize, EngineError> {
        match self.get(key) {
            None => Ok(1),
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(value) if value >= 1 => Ok(value),
                Ok(_) => Err(EngineError::configuration(key, "must be >= 1")),
                Err(_) => Err(EngineError::configuration(
                    key,
                    format!("not an integer: [{raw}]"),
                )),
            },
        }
    }

    /// `engine.test.class.shuffle` (`true|false`, default false).
    pub fn shuffle_test_classes(&self) -> Result<bool, EngineError> {
        match self.get(keys::TEST_CLASS_SHUFFLE) {
            None => Ok(false),
            Some(raw) => raw.trim().parse::<bool>().map_err(|_| {
                EngineError::configuration(
                    keys::TEST_CLASS_SHUFFLE,
                    format!("not a boolean: [{raw}]"),
                )
            }),
        }
    }

    /// `engine.filters.filename`, if set.
    pub fn filters_filename(&self) -> Option<PathBuf> {
        self.get(keys::FILTERS_FILENAME)
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
    }
}

fn flatten_yaml(
    prefix: Option<&str>,
    value: &serde_yaml::Value,
    out: &mut BTreeMap<String, String>,
) {
    match value {
        serde_yaml::Value::Mapping(mapping) => {
            for (key, child) in mapping {
                let key = match key {
                    serde_yaml::Value::String(s) => s.clone(),
                    other => serde_yaml::to_string(other)
                        .unwrap_or_default()
                        .trim()
                        .to_string(),
                };
                let full = match prefix {
                    Some(prefix) => format!("{prefix}.{key}"),
                    None => key,
                };
                flatten_yaml(Some(&full), child, out);
            }
        }
        serde_yaml::Value::String(s) => {
            if let Some(prefix) = prefix {
                out.insert(prefix.to_string(), s.clone());
            }
        }
        serde_yaml::Value::Bool(b) => {
            if let Some(prefix) = prefix {
                out.insert(prefix.to_string(), b.to_string());
            }
        }
        serde_yaml::Value::Number(n) => {
            if let Some(prefix) = prefix {
                out.insert(prefix.to_string(), n.to_string());
            }
        }
        _ => {}
    }
}

fn flatten_json(
    prefix: Option<&str>,
    value: &serde_json::Value,
    out: &mut BTreeMap<String, String>,
) {
    match value {
        serde_json::Value::Object(object) => {
            for (key, child) in object {
                let full = match prefix {
                    Some(prefix) => format!("{prefix}.{key}"),
                    None => key.clone(),
                };
                flatten_json(Some(&full), child, out);
            }
        }
        serde_json::Value::String(s) => {
            if let Some(prefix) = prefix {
                out.insert(prefix.to_string(), s.clone());
            }
        }
        serde_json::Value::Bool(b) => {
            if let Some(prefix) = prefix {
                out.insert(prefix.to_string(), b.to_string());
            }
        }
        serde_json::Value::Number(n) => {
            if let Some(prefix) = prefix {
                out.insert(prefix.to_string(), n.to_string());
            }
        }
        _ => {}
    }
}
